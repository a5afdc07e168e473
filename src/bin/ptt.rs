//! Push-to-talk walkie-talkie
//!
//! Runs both pipelines. Starts out listening; every line on stdin (just
//! press Enter) switches between talking and listening.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_ptt::{
    audio::{list_devices, AudioBackend, CpalBackend},
    network::{AddressLookup, InterfaceAddresses},
    Player, Recorder, SessionConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting LAN push-to-talk");

    let path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => SessionConfig::default_path()?,
    };
    let config = SessionConfig::load_or_default(&path)
        .with_context(|| format!("loading {}", path.display()))?;

    println!("\n=== Available Audio Devices ===");
    for device in &list_devices() {
        let device_type = match (device.is_input, device.is_output) {
            (true, true) => "Input/Output",
            (true, false) => "Input",
            (false, true) => "Output",
            _ => "Unknown",
        };
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {} ({}){}", device.name, device_type, default_marker);
    }
    println!();

    let backend: Arc<dyn AudioBackend> = Arc::new(CpalBackend::new());
    let addresses: Arc<dyn AddressLookup> = Arc::new(InterfaceAddresses::new());

    let recorder = Recorder::spawn(config.clone(), backend.clone(), addresses.clone())?;
    let player = Player::spawn(config, backend, addresses)?;

    player.resume();
    let mut talking = false;
    tracing::info!("Listening - press Enter to talk, Ctrl+C to quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                match line? {
                    Some(_) => {
                        talking = !talking;
                        if talking {
                            player.pause();
                            recorder.resume();
                            tracing::info!("Talking - press Enter to listen");
                        } else {
                            recorder.pause();
                            player.resume();
                            let stats = player.stats();
                            tracing::info!(
                                "Listening (seq {}, {} played, {} lost)",
                                stats.seq_num,
                                stats.progress,
                                stats.losses
                            );
                        }
                    }
                    // stdin closed
                    None => break,
                }
            }
        }
    }

    tracing::info!("Shutting down");
    recorder.finish();
    player.finish();
    recorder.join();
    player.join();

    Ok(())
}
