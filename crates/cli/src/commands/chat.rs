//! `madoguchi chat` — Interactive console chat through the turn pipeline.

use super::load_config;
use madoguchi_agent::{Catalog, TurnOrchestrator};
use madoguchi_channels::ConsoleChannel;
use std::path::Path;
use std::sync::Arc;

pub async fn run(config_path: Option<&Path>, user: String) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;

    if config.model.api_key.is_none() {
        eprintln!();
        eprintln!("  WARNING: GEMINI_API_KEY is not set; every turn will get the fallback reply.");
        eprintln!();
    }

    let catalog = Arc::new(Catalog::load(&config.catalog.path));
    let provider = madoguchi_providers::build_from_config(&config);
    let journal = madoguchi_journal::build_from_config(&config).await?;
    let orchestrator = TurnOrchestrator::from_config(&config, provider, catalog.clone())
        .with_journal(journal);

    println!("Madoguchi chat ({} services, mode {})", catalog.len(), config.dialogue.mode);
    println!("   Type your message; 'exit' to quit, 'リセット' to start over.");
    println!();

    let console = ConsoleChannel::new(user);
    let mut inbound = console.start();
    while let Some(message) = inbound.recv().await {
        orchestrator.handle_message(&message, &console).await;
    }

    println!("Goodbye!");
    Ok(())
}
