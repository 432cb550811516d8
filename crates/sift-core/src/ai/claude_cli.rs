//! Claude CLI backend implementation
//!
//! Runs the locally installed `claude` binary in print mode. The prompt is
//! written to stdin and stdout is the raw model text. The child is spawned
//! with `kill_on_drop`, so a cancelled or timed-out call kills the process.
//!
//! # Configuration
//!
//! Environment variables:
//! - `CLAUDE_CLI_BINARY`: Path to the binary (default: `claude` on PATH)
//! - `CLAUDE_CLI_MODEL`: Model alias passed via `--model` (optional)

use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::error::{Error, Result};

use super::types::Prompt;
use super::AIBackend;

static CLAUDE_BINARY: OnceLock<Option<String>> = OnceLock::new();

/// Environment variables forwarded to the child process
const FORWARDED_ENV: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "ANTHROPIC_API_KEY",
    "CLAUDE_CONFIG_DIR",
];

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ClaudeCliBackend {
    binary: String,
    model: Option<String>,
}

impl ClaudeCliBackend {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
            model: None,
        }
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            binary: self.binary.clone(),
            model: Some(model.to_string()).filter(|m| !m.is_empty()),
        }
    }

    /// Create from environment variables
    ///
    /// Returns None when no binary is configured and `claude` is not on PATH.
    pub fn from_env() -> Option<Self> {
        let binary = std::env::var("CLAUDE_CLI_BINARY")
            .ok()
            .filter(|b| !b.is_empty())
            .or_else(detect_claude_binary)?;
        let backend = Self::new(&binary);
        match std::env::var("CLAUDE_CLI_MODEL") {
            Ok(model) => Some(backend.with_model(&model)),
            Err(_) => Some(backend),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.env_clear()
            .envs(FORWARDED_ENV.iter().filter_map(|key| {
                std::env::var(key).ok().map(|value| (*key, value))
            }))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn invoke(&self, prompt: &Prompt) -> Result<String> {
        let mut cmd = self.command();
        cmd.arg("--print").stdin(Stdio::piped());
        if let Some(ref model) = self.model {
            cmd.arg("--model").arg(model);
        }
        if let Some(ref system) = prompt.system {
            cmd.arg("--append-system-prompt").arg(system);
        }

        debug!(binary = %self.binary, kind = prompt.kind.as_str(), "Invoking claude CLI");

        let mut child = cmd.spawn().map_err(|e| {
            Error::ProviderPermanent(format!("failed to spawn {}: {}", self.binary, e))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A child that exits without reading stdin reports through its status
            if let Err(e) = stdin.write_all(prompt.user.as_bytes()).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
            // Dropping stdin closes it so the CLI sees EOF
        }

        let output = child.wait_with_output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            warn!(exit_code, stderr = %stderr.trim(), "claude subprocess failed");
            return Err(Error::ProviderPermanent(format!(
                "claude exited with status {}: {}",
                exit_code,
                stderr.trim()
            )));
        }

        if stdout.trim().is_empty() {
            return Err(Error::ProviderPermanent("empty output from claude".into()));
        }

        debug!(output_len = stdout.len(), "claude subprocess completed");
        Ok(stdout)
    }
}

/// Locate `claude` on PATH, caching the answer for the process lifetime
pub fn detect_claude_binary() -> Option<String> {
    CLAUDE_BINARY
        .get_or_init(|| match which::which("claude") {
            Ok(path) => {
                let path = path.to_string_lossy().to_string();
                debug!(path = %path, "Detected claude binary");
                Some(path)
            }
            Err(_) => {
                debug!("claude binary not found on PATH");
                None
            }
        })
        .clone()
}

#[async_trait]
impl AIBackend for ClaudeCliBackend {
    async fn complete(&self, ctx: &RequestContext, prompt: &Prompt) -> Result<String> {
        ctx.run(prompt.default_timeout(), self.invoke(prompt)).await
    }

    async fn health_check(&self) -> bool {
        let mut cmd = self.command();
        cmd.arg("--version").stdin(Stdio::null());
        match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) => output.status.success(),
            _ => false,
        }
    }

    fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("default")
    }

    fn host(&self) -> &str {
        &self.binary
    }
}
