//! Counterexample inspection.

use std::path::Path;

use anyhow::{Context, Result};
use faultline::{ExecutionIndex, TestExecutionDocument};

use crate::style::{Paint, Role, print_header};

pub fn run(file: &Path, dei: Option<&str>) -> Result<()> {
    let document = TestExecutionDocument::load(Some(file))
        .with_context(|| format!("Invalid counterexample {}", file.display()))?;

    let Some(text) = dei else {
        print_header(&format!("{} recorded call(s)", document.failures.len()));
        for record in &document.failures {
            let verdict = match record.fault()? {
                Some(fault) => fault.to_string().paint(Role::Fault),
                None => "no fault".paint(Role::Muted),
            };
            println!("  {}  {verdict}", record.execution_index);
        }
        return Ok(());
    };

    let index = ExecutionIndex::parse(text).context("Invalid execution index")?;
    let fault = match document.should_fail_request_with(&index) {
        Some(record) => record.fault()?,
        None => None,
    };
    match fault {
        Some(fault) => println!("{}", fault.to_string().paint(Role::Fault)),
        None => println!("{}", "no fault".paint(Role::Muted)),
    }
    Ok(())
}
