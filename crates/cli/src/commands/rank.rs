//! `madoguchi rank` — Show the services a message would surface.

use super::load_config;
use madoguchi_agent::{Catalog, rank};
use std::path::Path;

pub fn run(
    config_path: Option<&Path>,
    query: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let catalog = Catalog::load(&config.catalog.path);
    let matches = rank(query, catalog.records(), limit.unwrap_or(config.catalog.limit));

    if json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
        return Ok(());
    }

    if matches.is_empty() {
        println!("No matching services ({} in catalog).", catalog.len());
        return Ok(());
    }

    println!("{:>5}  {:<20}  URL", "SCORE", "NAME");
    for m in &matches {
        println!(
            "{:>5}  {:<20}  {}",
            m.score,
            m.record.name,
            m.record.url.as_deref().unwrap_or("(unknown)")
        );
    }
    Ok(())
}
