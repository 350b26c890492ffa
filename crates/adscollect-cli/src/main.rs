//! `adscollect` – controller supervision and variable collection service.
//!
//! The binary:
//!
//! 1. Initialises structured logging (and OTLP export when configured).
//! 2. Loads `~/.adscollect/config.toml` (or `$ADSCOLLECT_CONFIG`) and resolves
//!    the device `AmsNetId` and the variable list.
//! 3. Connects the session and runs the supervisory loop, one cycle roughly
//!    every two seconds.
//! 4. On Ctrl-C / SIGTERM stops the loop and closes every connection.
//!
//! No wire backend is linked into this build, so the collector drives the
//! in-process simulated controller from `adscollect-hal`.

mod config;

use std::process::ExitCode;

use colored::Colorize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use adscollect_hal::sim::SimDevice;
use adscollect_runtime::{
    PollingCycle, RuntimeController, SessionSupervisor, SupervisoryLoop, VariableRegistry,
    init_tracing,
};
use adscollect_types::{AmsAddress, CollectorError, ExecutionState};

#[tokio::main]
async fn main() -> ExitCode {
    let _guard = init_tracing("adscollect");
    print_banner();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "collector failed to start");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), CollectorError> {
    let path = config::config_path();
    let cfg = config::load_from(&path)?;
    let net_id = cfg.ams_net_id()?;
    let registry = VariableRegistry::from_config(&cfg);
    info!(
        config = %path.display(),
        %net_id,
        variables = registry.table().len(),
        "configuration loaded"
    );

    let device = simulated_device(&registry);
    info!(%net_id, "using in-process simulated controller");

    let mut cycle = PollingCycle::new(
        SessionSupervisor::new(device.session(), net_id),
        RuntimeController::new(device.runtime_client(), AmsAddress::plc_runtime(net_id)),
        registry,
    );
    let state = cycle.start().await;
    info!(%state, "initial session state");

    let cancel = CancellationToken::new();
    install_shutdown_handler(cancel.clone());

    let mut collector = SupervisoryLoop::new(cycle);
    collector.run(&cancel).await;
    collector.shutdown().await;

    println!("{}", "  ✓ Connections closed. Exiting.".green());
    Ok(())
}

/// A stopped controller that accepts start/reset and answers every
/// configured variable.
fn simulated_device(registry: &VariableRegistry) -> SimDevice {
    let device = SimDevice::new()
        .with_state(ExecutionState::Stopped)
        .applying_commands();
    for key in registry.table().keys() {
        device.set_value(key, "0");
    }
    device
}

fn install_shutdown_handler(cancel: CancellationToken) {
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Shutdown requested – stopping collector …".yellow().bold());
        cancel.cancel();
    }) {
        warn!(
            error = %e,
            "Failed to install Ctrl-C handler; graceful shutdown will not be available"
        );
    }
}

fn print_banner() {
    println!();
    println!(
        "  {} {}",
        "adscollect".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Controller supervision & variable collection");
    println!();
}
