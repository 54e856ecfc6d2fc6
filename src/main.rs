use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use journal_notify::app::{Config, Dispatcher, OnlineRecipients, SessionRecipient};
use journal_notify::logwatch::{EntryFilter, Journalctl, LogTailer};
use journal_notify::notify::Notifier;
use journal_notify::session::{Logind, PrivateBusConnector, Registry};

/// Journal Notify - forward new journal entries as desktop notifications
///
/// Run as a regular user to notify your own session. Run as root to notify
/// every logged-in user.
#[derive(Parser)]
#[command(name = "journal-notify")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Configuration file (defaults to the per-user or /etc location)
    #[arg(short, long, env = "JOURNAL_NOTIFY_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    let privileged = nix::unistd::geteuid().is_root();
    let config = Config::load(cli.config.as_deref(), privileged)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create runtime")?;

    if privileged {
        runtime.block_on(run_system(config))
    } else {
        runtime.block_on(run_session(config))
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open_journal(config: &Config) -> Result<LogTailer<Journalctl>> {
    let source = Journalctl::open(&config.journal.command, config.journal.replay_records)?;
    Ok(LogTailer::new(
        source,
        EntryFilter::from_config(&config.journal),
        config.journal.wait_interval(),
    ))
}

/// Notify the invoking user's own session
async fn run_session(config: Config) -> Result<()> {
    let bus = zbus::Connection::session()
        .await
        .context("Failed to connect to the session bus")?;
    let tailer = open_journal(&config)?;
    info!("Forwarding journal entries to the session bus");

    Dispatcher::new(
        tailer,
        SessionRecipient::new(bus),
        Notifier::from_config(&config.notify),
        config.notify.body_capacity,
    )
    .run()
    .await
}

/// Notify every logged-in user through their own session bus
async fn run_system(config: Config) -> Result<()> {
    let system = zbus::Connection::system()
        .await
        .context("Failed to connect to the system bus")?;
    let logind = Logind::subscribe(&system, config.session.query_timeout()).await?;

    let mut registry = Registry::new(logind, config.session.runtime_root.clone());
    if let Err(e) = registry.refresh().await {
        warn!("Failed to list logged-in users, retrying while following the journal: {:#}", e);
    }

    let tailer = open_journal(&config)?;
    info!("Forwarding journal entries to every logged-in user");

    let recipients = OnlineRecipients::new(
        registry,
        PrivateBusConnector::new(config.session.connect_timeout()),
        config.session.poll_timeout(),
    );
    Dispatcher::new(
        tailer,
        recipients,
        Notifier::from_config(&config.notify),
        config.notify.body_capacity,
    )
    .run()
    .await
}
