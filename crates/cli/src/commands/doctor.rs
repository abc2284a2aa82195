//! `madoguchi doctor` — Diagnose configuration.

use super::config_file;
use madoguchi_agent::Catalog;
use madoguchi_config::AppConfig;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Madoguchi Doctor");
    println!("================\n");

    let mut issues = 0;

    let path = config_file(config_path);
    if !path.exists() {
        println!("  ⚠️  No config file at {} — using defaults", path.display());
    }
    let config = match AppConfig::load_with_env(&path) {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ Configuration invalid: {e}");
            println!("\n  1 issue(s) found.");
            return Ok(());
        }
    };

    // Credentials
    for (name, value) in [
        ("GEMINI_API_KEY", &config.model.api_key),
        ("LINE_CHANNEL_SECRET", &config.line.channel_secret),
        ("LINE_CHANNEL_ACCESS_TOKEN", &config.line.channel_access_token),
    ] {
        if value.as_deref().is_some_and(|v| !v.trim().is_empty()) {
            println!("  ✅ {name} set");
        } else {
            println!("  ❌ {name} missing");
            issues += 1;
        }
    }

    // Catalog
    let catalog_path = &config.catalog.path;
    match Catalog::try_load(catalog_path) {
        Ok(catalog) if catalog.is_empty() => {
            println!(
                "  ⚠️  Catalog at {} is empty or missing — no services will be recommended",
                catalog_path.display()
            );
            issues += 1;
        }
        Ok(catalog) => println!("  ✅ Catalog: {} services", catalog.len()),
        Err(e) => {
            println!("  ❌ Catalog unusable: {e}");
            issues += 1;
        }
    }

    // Journal
    match madoguchi_journal::build_from_config(&config).await {
        Ok(journal) => {
            let count = journal.count().await.unwrap_or(0);
            println!("  ✅ Journal: {} ({count} turns)", journal.name());
        }
        Err(e) => {
            println!("  ❌ Journal unavailable: {e}");
            issues += 1;
        }
    }

    println!("  ℹ️  Model {} / mode {}", config.model.name, config.dialogue.mode);

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
