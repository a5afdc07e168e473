//! Push-to-talk sender
//!
//! Captures the microphone and streams it to the configured destination
//! until Ctrl+C. Set `PTT_HEARTBEAT=on_ms:off_ms` to talk in bursts.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_ptt::{
    audio::{list_devices, CpalBackend},
    heartbeat::Heartbeat,
    network::InterfaceAddresses,
    Recorder, SessionConfig,
};

fn load_config() -> Result<SessionConfig> {
    let path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => SessionConfig::default_path()?,
    };
    tracing::info!("Config: {}", path.display());
    SessionConfig::load_or_default(&path).with_context(|| format!("loading {}", path.display()))
}

fn heartbeat_periods() -> Result<Option<(Duration, Duration)>> {
    let Ok(periods) = std::env::var("PTT_HEARTBEAT") else {
        return Ok(None);
    };
    let (on, off) = periods
        .split_once(':')
        .context("PTT_HEARTBEAT must look like on_ms:off_ms")?;
    let on: u64 = on.trim().parse().context("PTT_HEARTBEAT on period")?;
    let off: u64 = off.trim().parse().context("PTT_HEARTBEAT off period")?;
    Ok(Some((Duration::from_millis(on), Duration::from_millis(off))))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting LAN push-to-talk sender");

    let config = load_config()?;

    println!("\n=== Available Input Devices ===");
    for device in list_devices().iter().filter(|d| d.is_input) {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}{}:", device.name, default_marker);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();

    tracing::info!(
        "Sending {} to {} ({} Hz, {} samples/frame, compression {}, quality {})",
        config.cast.mode,
        config.cast.destination(),
        config.audio.sample_rate,
        config.audio.frame_size,
        config.audio.compression,
        config.audio.quality
    );

    let recorder = Arc::new(Recorder::spawn(
        config,
        Arc::new(CpalBackend::new()),
        Arc::new(InterfaceAddresses::new()),
    )?);

    let heartbeat = match heartbeat_periods()? {
        Some((on, off)) => {
            tracing::info!("Heartbeat: {:?} on, {:?} off", on, off);
            Some(Heartbeat::spawn(recorder.clone(), on, off)?)
        }
        None => {
            recorder.resume();
            None
        }
    };

    tracing::info!("Talking - press Ctrl+C to stop");

    let mut ticker = tokio::time::interval(Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let stats = recorder.stats();
                tracing::info!(
                    "Stats: state {:?}, seq {}, {} packets sent, {} send failures",
                    recorder.state(),
                    stats.seq_num,
                    stats.frames_sent,
                    stats.send_failures
                );
                if let Some(e) = recorder.last_error() {
                    tracing::warn!("Last session failed: {}", e);
                }
            }
        }
    }

    tracing::info!("Shutting down");
    drop(heartbeat);
    recorder.finish();
    recorder.join();

    Ok(())
}
