mod config;
mod cycle;
mod debug_dump;
mod errors;
mod extract;
mod metrics;
mod model;
mod publisher;
mod reader;
mod scheduler;
mod session;
#[cfg(test)]
mod stub_server;

use clap::Parser;
use config::Config;
use cycle::CycleController;
use debug_dump::DebugDump;
use errors::ConfigError;
use metrics::{
    LOGIN_ATTEMPTS_TOTAL, LOGIN_FAILURES_TOTAL, PUBLISH_FAILURES_TOTAL, READ_FAILURES_TOTAL,
};
use publisher::MqttPublisher;
use reader::DeviceReader;
use scheduler::Scheduler;
use session::SessionManager;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Polls two portal devices and republishes their particulate readings over MQTT.
#[derive(Parser, Debug)]
#[command(name = "spm-bridge", version)]
struct Cli {
    /// Increase verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Load settings from this file instead of ./.env
    #[arg(long, value_name = "FILE", env = "SPM_BRIDGE_ENV_FILE")]
    env_file: Option<PathBuf>,

    /// Do not write debug_<LABEL>_ajax.json response dumps
    #[arg(long)]
    no_debug_dump: bool,

    /// Log in, run a single cycle and exit
    #[arg(long)]
    once: bool,
}

fn load_env(cli: &Cli) -> Result<(), ConfigError> {
    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Forwards every SIGINT/SIGTERM into `signals` until the receiver goes away.
#[cfg(unix)]
async fn listen_for_signals(signals: mpsc::Sender<()>) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    loop {
        tokio::select! {
            _ = sigint.recv() => {},
            _ = sigterm.recv() => {},
        }
        if signals.send(()).await.is_err() {
            return Ok(());
        }
    }
}

#[cfg(not(unix))]
async fn listen_for_signals(signals: mpsc::Sender<()>) -> std::io::Result<()> {
    loop {
        tokio::signal::ctrl_c().await?;
        if signals.send(()).await.is_err() {
            return Ok(());
        }
    }
}

/// The first signal asks the scheduler to stop after the current cycle.
/// Returns true once a second signal arrives, meaning the operator does not
/// want to wait for an in-flight request.
async fn relay_signals(mut signals: mpsc::Receiver<()>, stop: watch::Sender<bool>) -> bool {
    if signals.recv().await.is_none() {
        // no signal source: hold the sender so the loop keeps running
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal, finishing the current cycle (signal again to force exit)");
    let _ = stop.send(true);
    signals.recv().await.is_some()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let env_loaded = load_env(&cli);
    init_tracing(cli.verbose);

    if let Err(e) = env_loaded {
        error!("{}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = Config::from_env()?;
    info!("Configuration loaded: {:?}", config);

    metrics::init_metrics();

    let dump = if cli.no_debug_dump {
        DebugDump::disabled()
    } else {
        DebugDump::new(&config.debug_dir)
    };
    let reader = DeviceReader::new(&config.web, dump)?;
    let publisher = MqttPublisher::new(config.mqtt.clone());
    let cycle = CycleController::new(
        reader,
        publisher,
        config.mill_1.clone(),
        config.mill_2.clone(),
    );
    let scheduler = Scheduler::new(
        SessionManager::new(config.web.clone()),
        cycle,
        config.interval,
    );

    if cli.once {
        let result = scheduler.run_once().await?;
        return Ok(if result.success {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    info!("Starting SPM bridge in continuous mode, press Ctrl+C to stop");

    let (stop, shutdown) = watch::channel(false);
    let (signal_tx, signal_rx) = mpsc::channel(2);
    tokio::spawn(async move {
        if let Err(e) = listen_for_signals(signal_tx).await {
            error!("Cannot listen for shutdown signals: {}", e);
        }
    });
    tokio::spawn(async move {
        if relay_signals(signal_rx, stop).await {
            warn!("Received second shutdown signal, exiting immediately");
            std::process::exit(130);
        }
    });

    let summary = scheduler.run(shutdown).await?;

    info!(
        "Logins: {} attempted, {} failed; reads failed: {}; publishes failed: {}; re-logins: {}",
        LOGIN_ATTEMPTS_TOTAL.get(),
        LOGIN_FAILURES_TOTAL.get(),
        READ_FAILURES_TOTAL.get(),
        PUBLISH_FAILURES_TOTAL.get(),
        summary.relogins
    );
    debug!("Final metrics:\n{}", metrics::gather_metrics());
    info!("Exiting gracefully");

    Ok(ExitCode::SUCCESS)
}
