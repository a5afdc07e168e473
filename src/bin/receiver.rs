//! Push-to-talk receiver
//!
//! Plays every voice packet received on the configured port and reports
//! loss statistics until Ctrl+C.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_ptt::{
    audio::{list_devices, CpalBackend},
    network::InterfaceAddresses,
    Player, SessionConfig,
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

    tracing::info!("Starting LAN push-to-talk receiver");

    let path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => SessionConfig::default_path()?,
    };
    let config = SessionConfig::load_or_default(&path)
        .with_context(|| format!("loading {}", path.display()))?;

    // List available output devices
    println!("\n=== Available Output Devices ===");
    for device in list_devices().iter().filter(|d| d.is_output) {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}{}:", device.name, default_marker);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();

    tracing::info!(
        "Listening on {} ({}, {}-byte packets, echo suppression {})",
        config.cast.listen_addr(),
        config.cast.mode,
        config.layout().packet_len(),
        config.audio.echo_suppression
    );

    let player = Player::spawn(
        config,
        Arc::new(CpalBackend::new()),
        Arc::new(InterfaceAddresses::new()),
    )?;
    player.resume();

    tracing::info!("Receiving - press Ctrl+C to stop");

    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    let mut last_progress = 0u64;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let stats = player.stats();
                let loss_pct = if stats.progress + stats.losses > 0 {
                    100.0 * stats.losses as f64 / (stats.progress + stats.losses) as f64
                } else {
                    0.0
                };
                tracing::info!(
                    "Stats: seq {}, {} played (+{}), {} lost ({:.1}%), {} echoes, {} malformed",
                    stats.seq_num,
                    stats.progress,
                    stats.progress.saturating_sub(last_progress),
                    stats.losses,
                    loss_pct,
                    stats.suppressed,
                    stats.malformed
                );
                last_progress = stats.progress;

                if let Some(e) = player.last_error() {
                    tracing::warn!("Last session failed: {}", e);
                }
            }
        }
    }

    tracing::info!("Shutting down");
    player.finish();
    player.join();

    Ok(())
}
