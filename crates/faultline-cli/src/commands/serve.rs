//! Serve command - runs the HTTP decision service.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use faultline::{
    ConfigLoader, DecisionServer, DecisionService, InProcessService, IterationOrchestrator,
    Settings,
};
use tracing::info;

use crate::style::{print_labeled, print_ok};

pub fn run(project: &Path, address: Option<&str>) -> Result<()> {
    let mut config = ConfigLoader::new()
        .with_project_dir(project)
        .load()
        .context("Failed to load configuration")?;
    if let Some(address) = address {
        config.service.address = address.to_string();
    }
    let settings = Settings::from_config(&config).context("Invalid configuration")?;

    let orchestrator = IterationOrchestrator::new(settings.orchestrator)
        .context("Invalid orchestrator options")?;
    let service: Arc<dyn DecisionService> = Arc::new(InProcessService::new(orchestrator));
    let server = DecisionServer::bind(settings.address, service)
        .with_context(|| format!("Failed to bind {}", settings.address))?;

    println!();
    println!("Faultline decision service");
    println!();
    print_labeled("Bind address", &server.local_addr().to_string());
    print_labeled("Max iterations", &settings.orchestrator.max_iterations.to_string());
    print_labeled(
        "Search",
        &format!("{:?}", settings.orchestrator.search_strategy),
    );
    println!();
    println!("Press Ctrl+C to stop.");
    println!();

    install_shutdown(&server)?;
    info!(addr = %server.local_addr(), "decision service listening");
    server.run().context("Server error during operation")?;

    print_ok("Server stopped gracefully.");
    Ok(())
}

#[cfg(unix)]
fn install_shutdown(server: &DecisionServer) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to install signal handlers")?;
    let handle = server.shutdown_handle();
    std::thread::Builder::new()
        .name("faultline-signals".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                info!(signal, "shutdown requested");
                handle.shutdown();
            }
        })
        .context("Failed to spawn signal thread")?;
    Ok(())
}

#[cfg(windows)]
fn install_shutdown(server: &DecisionServer) -> Result<()> {
    let handle = server.shutdown_handle();
    ctrlc::set_handler(move || {
        info!("shutdown requested");
        handle.shutdown();
    })
    .context("Failed to install Ctrl+C handler")
}
