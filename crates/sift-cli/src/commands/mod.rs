//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Init and shared utilities (open_db, load_config, build_classifier)
//! - `categories` - Category commands (list, add)
//! - `patterns` - Check pattern commands (list, add, disable, enable)
//! - `classify` - Classification commands (classify, batch, describe)
//! - `backend` - AI backend status

pub mod backend;
pub mod categories;
pub mod classify;
pub mod core;
pub mod patterns;

// Re-export command functions for main.rs
pub use backend::*;
pub use categories::*;
pub use classify::*;
pub use core::*;
pub use patterns::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
