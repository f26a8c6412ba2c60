use anyhow::Context;
use clap::Parser;
use std::future::Future;
use wire::ArgumentBatch;

use browser::app::{serve, AppContext};
use browser::cli::{absolutize_paths, LaunchArgs};
use browser::endpoint::Endpoint;
use browser::instance::{determine_role, InstanceRole, Timeouts};
use browser::journal::JournalFactory;
use browser::paths;
use browser::sessions::SessionsManager;
use browser::settings::{register_defaults, SettingsStore};

// Single-threaded: each forwarded launch is handled to completion before the next.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Quiet by default; RUST_LOG=info shows window and instance activity.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .try_init();

    let endpoint = Endpoint::default();
    let timeouts = Timeouts::default();

    // The running instance may sit in another directory.
    let batch = match std::env::current_dir() {
        Ok(cwd) => absolutize_paths(ArgumentBatch::from_env(), &cwd),
        Err(e) => {
            log::warn!("otter: no working directory, forwarding paths as given: {e}");
            ArgumentBatch::from_env()
        }
    };

    // Role first: a running instance gets even arguments we would reject.
    let primary = match determine_role(&endpoint, &batch, &timeouts)
        .await
        .context("single instance check")?
    {
        InstanceRole::Secondary => {
            log::info!("otter: arguments handed to running instance");
            return Ok(());
        }
        InstanceRole::Primary(p) => p,
    };

    let args = match LaunchArgs::try_parse_from(batch.iter()) {
        Ok(args) => args,
        Err(e) => {
            // Give the endpoint back before exiting on --help or bad options.
            drop(primary);
            e.exit();
        }
    };

    let settings_path = args.config.clone().unwrap_or_else(paths::settings_path);
    let mut settings = SettingsStore::open(&settings_path)?;
    register_defaults(&mut settings);

    let sessions = SessionsManager::new(paths::sessions_dir());
    let factory = JournalFactory::new(paths::journal_path());
    let mut ctx = AppContext::new(settings, sessions, factory);
    ctx.start(&args);

    let shutdown = shutdown_signal()?;
    serve(&mut ctx, &primary, &timeouts, shutdown).await;
    log::info!("otter: exiting");
    Ok(())
}

fn shutdown_signal() -> anyhow::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("install SIGINT handler")?;
    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    })
}
