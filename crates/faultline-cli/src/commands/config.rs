//! Configuration display.

use std::path::Path;

use anyhow::{Context, Result, bail};
use faultline::ConfigLoader;

pub fn show(project: &Path, format: &str) -> Result<()> {
    let config = ConfigLoader::new()
        .with_project_dir(project)
        .load()
        .context("Failed to load configuration")?;

    match format {
        "toml" => print!("{}", config.to_toml_string()?),
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        other => bail!("Unknown format '{other}' (expected toml or json)"),
    }
    Ok(())
}
