use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::{Parser, Subcommand};
use tracing::{error, info};
use wmg::{
    adapters::Adapter,
    bootstrap::Gateway,
    config,
    core::page::BrowserLauncher,
};

/// Exit code reserved for preflight/dependency failure; the watchdog does
/// not auto-restart on it.
const EXIT_PREFLIGHT: u8 = 78;

#[derive(Parser)]
#[command(name = "wmg", about = "OpenAI-compatible gateway over browser-driven web UIs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway.
    Serve {
        /// Data directory holding config.yaml, user-data dirs and temp files.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
        /// Skip navigation handlers so a human can log into the pages.
        #[arg(long)]
        login_mode: bool,
    },
    /// Validate the configuration and exit.
    CheckConfig {
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
    },
}

/// The browser-driver stack compiled into this build: the anti-fingerprint
/// launcher and the adapter set. Both live in the (closed) driver crates;
/// a build without them cannot drive any upstream.
fn driver_stack() -> anyhow::Result<(Arc<dyn BrowserLauncher>, Vec<Arc<dyn Adapter>>)> {
    anyhow::bail!("no browser driver stack compiled into this build")
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve {
            data_dir,
            login_mode,
        } => serve(data_dir, login_mode),
        Command::CheckConfig { data_dir } => check_config(data_dir),
    }
}

fn check_config(data_dir: PathBuf) -> ExitCode {
    match config::load(&data_dir) {
        Ok(config) => {
            let workers: usize = config
                .backend
                .pool
                .instances
                .iter()
                .map(|i| i.workers.len())
                .sum();
            println!(
                "config ok: {} instance(s), {} worker(s), strategy {:?}",
                config.backend.pool.instances.len(),
                workers,
                config.backend.pool.strategy
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("config error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn serve(data_dir: PathBuf, login_mode: bool) -> ExitCode {
    // Preflight: the data directory must be usable before logging starts
    // writing into it.
    if let Err(e) = std::fs::create_dir_all(data_dir.join("temp")) {
        eprintln!("preflight failed: cannot create {}: {e}", data_dir.display());
        return ExitCode::from(EXIT_PREFLIGHT);
    }

    let log_buffer = match wmg::observability::init(&data_dir) {
        Ok(buffer) => buffer,
        Err(e) => {
            eprintln!("preflight failed: logging: {e}");
            return ExitCode::from(EXIT_PREFLIGHT);
        }
    };

    let config = match config::load(&data_dir) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Configuration rejected");
            return ExitCode::from(EXIT_PREFLIGHT);
        }
    };

    let (launcher, adapters) = match driver_stack() {
        Ok(stack) => stack,
        Err(e) => {
            error!(error = %e, "Driver stack unavailable");
            return ExitCode::from(EXIT_PREFLIGHT);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "Tokio runtime failed to start");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async move {
        let mut builder = Gateway::builder(config)
            .data_dir(data_dir)
            .launcher(launcher)
            .login_mode(login_mode)
            .log_buffer(log_buffer);
        for adapter in adapters {
            builder = builder.adapter(adapter);
        }
        let gateway = builder.build()?;
        info!("Gateway assembled, starting");
        gateway.run(shutdown_signal()).await
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Gateway exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Signal received");
}
