//! Execution index utilities.

use anyhow::{Context, Result};
use faultline::ExecutionIndex;

use crate::style::{Paint, Role};

pub fn parse(text: &str) -> Result<()> {
    let index = ExecutionIndex::parse(text).context("Invalid execution index")?;
    println!("{index}");
    for (depth, segment) in index.segments().iter().enumerate() {
        println!(
            "  {}{} {}",
            "  ".repeat(depth),
            segment.key(),
            format!("#{}", segment.occurrence()).paint(Role::Muted)
        );
    }
    Ok(())
}

pub fn legacy(text: &str) -> Result<()> {
    let index = ExecutionIndex::parse(text).context("Invalid execution index")?;
    println!("{}", index.to_legacy_string());
    Ok(())
}
