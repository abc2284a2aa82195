//! `madoguchi serve` — Start the LINE webhook server.

use super::load_config;
use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    port_override: Option<u16>,
    host_override: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(config_path)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }
    if let Some(host) = host_override {
        config.gateway.host = host;
    }

    // Refuse to start half-configured.
    if let Err(e) = config.validate_credentials() {
        eprintln!();
        eprintln!("  ERROR: {e}");
        eprintln!();
        eprintln!("  Set them in the environment or in:");
        eprintln!("    {}", super::config_file(config_path).display());
        eprintln!();
        return Err(e.into());
    }

    println!("Madoguchi Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Callback:  POST /callback");
    println!("   Model:     {}", config.model.name);
    println!("   Mode:      {}", config.dialogue.mode);

    madoguchi_gateway::start(config).await?;

    Ok(())
}
