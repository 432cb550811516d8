//! AI backend status command

use anyhow::Result;
use sift_core::{AIBackend, AIClient};

pub async fn cmd_backend(client: &AIClient) -> Result<bool> {
    println!("🔍 Checking AI backend...\n");
    println!("  Backend: {}", client.kind());
    println!("  Host:    {}", client.host());
    println!("  Model:   {}", client.model());
    println!();

    print!("Checking availability... ");
    let healthy = client.health_check().await;
    if healthy {
        println!("✅ Connected");
    } else {
        println!("❌ Failed");
        println!();
        println!("Backend selection (AI_BACKEND):");
        println!("  ollama             OLLAMA_HOST, OLLAMA_MODEL");
        println!("  openai_compatible  OPENAI_COMPATIBLE_HOST, OPENAI_COMPATIBLE_MODEL, OPENAI_COMPATIBLE_API_KEY");
        println!("  claude_cli         CLAUDE_CLI_BINARY, CLAUDE_CLI_MODEL");
    }
    Ok(healthy)
}
