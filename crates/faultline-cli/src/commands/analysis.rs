//! Analysis file validation.

use std::path::Path;

use anyhow::{Context, Result, bail};
use faultline::AnalysisFile;

use crate::style::{Paint, Role, print_header, print_ok};

pub fn check(file: &Path) -> Result<()> {
    let analysis = AnalysisFile::load(file)
        .with_context(|| format!("Invalid analysis file {}", file.display()))?;
    if analysis.is_empty() {
        bail!("{} defines no configurations", file.display());
    }

    print_header(&format!("Analysis file {}", file.display()));
    for configuration in analysis.configurations() {
        println!(
            "  {} {}",
            configuration.name(),
            configuration.pattern().paint(Role::Code)
        );
        for entry in configuration.transformers() {
            println!("    transformer {}", entry.transformer.paint(Role::Muted));
        }
    }
    println!();
    print_ok(&format!(
        "{} configuration(s) valid",
        analysis.configurations().len()
    ));
    Ok(())
}
