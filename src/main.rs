use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};

mod actions;
mod app;
mod config;
mod error;
mod events;
mod platform;
mod process;
mod profiles;
mod recording;
mod session;
mod storage;

use actions::{read_commands, Action, HELP};
use app::App;
use config::Config;
use events::ChannelBus;
use profiles::JsonProfileProvider;
use storage::JsonFileStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Arc::new(Config::load().context("failed to load configuration")?);

    // Create event channel
    let (tx, mut rx) = mpsc::unbounded_channel::<Action>();

    // Forward bus events into the action loop
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<(String, Value)>();
    let forward_tx = tx.clone();
    tokio::spawn(async move {
        while let Some((topic, payload)) = event_rx.recv().await {
            if forward_tx.send(Action::Event(topic, payload)).is_err() {
                break;
            }
        }
    });

    let profiles = JsonProfileProvider::load(config.profiles_file())
        .with_context(|| format!("failed to read {}", config.profiles_file().display()))?;
    let app = App::build(
        config.clone(),
        Arc::new(ChannelBus::new(event_tx)),
        Arc::new(JsonFileStore::new(config.storage_file())),
        Arc::new(profiles),
    )
    .await
    .context("failed to load sessions")?;

    app.startup().await.context("startup reconciliation failed")?;

    // Spawn input handler; it pauses while playback owns the terminal
    let (resume_tx, resume_rx) = mpsc::unbounded_channel::<()>();
    tokio::spawn(read_commands(
        BufReader::new(tokio::io::stdin()),
        tx.clone(),
        resume_rx,
    ));

    // Spawn reconciliation ticker
    let scan_tx = tx.clone();
    let scan_interval = config.scan_interval;
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + scan_interval, scan_interval);
        loop {
            ticker.tick().await;
            if scan_tx.send(Action::Rescan).is_err() {
                break;
            }
        }
    });

    println!("{}", HELP);

    // Main event loop
    let result = loop {
        let Some(action) = rx.recv().await else {
            break Ok(());
        };
        let interactive = action.takes_terminal();
        let outcome = app.handle_action(action).await;
        if interactive {
            let _ = resume_tx.send(());
        }
        match outcome {
            Ok(true) => break Ok(()),
            Ok(false) => {}
            Err(e) => break Err(e),
        }
    };

    app.shutdown();
    result
}
