//! freedv-tnc: TNC daemon
//!
//! Runs the host link and protocol engine against the in-process loopback
//! modem. Capture is fed silence and playback is discarded, which is enough
//! to exercise the host link, carrier sense and keying end to end.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use freedv_tnc::core::{HostConfig, CAPTURE_BLOCK_MS, SAMPLE_RATE};
use freedv_tnc::device::{open_ptt, LoopbackModem, MemoryAudio};
use freedv_tnc::engine::{run_transmitter, Engine};
use freedv_tnc::network::HostServer;
use freedv_tnc::util::samples_for;
use freedv_tnc::{Config, Result};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };
    config.validate()?;
    tracing::info!(
        version = freedv_tnc::VERSION,
        mode = %config.modem.mode,
        "freedv-tnc starting"
    );

    // Startup resources are fatal
    let ptt = open_ptt(&config.ptt)?;
    let modem = LoopbackModem::open(&config.modem)?;
    let audio = MemoryAudio::new();

    let shutdown = CancellationToken::new();
    let (tx_queue, tx_packets) = mpsc::channel(config.host.tx_queue);
    let (rx_queue, rx_packets) = mpsc::channel(config.host.rx_queue);

    let engine = Engine::new(&config, modem, audio.clone(), ptt, rx_queue, shutdown.clone())?;
    let host = HostConfig {
        mtu: engine.host_mtu(),
        ..config.host.clone()
    };
    let server = HostServer::bind(&host).await?;

    let Engine {
        transmitter,
        mut receiver,
        ..
    } = engine;

    let capture_shutdown = shutdown.clone();
    let capture = tokio::spawn(async move {
        let block = vec![0i16; samples_for(Duration::from_millis(CAPTURE_BLOCK_MS), SAMPLE_RATE)];
        let mut ticker = tokio::time::interval(Duration::from_millis(CAPTURE_BLOCK_MS));
        loop {
            tokio::select! {
                _ = capture_shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let played = audio.take_samples();
                    if !played.is_empty() {
                        tracing::trace!(samples = played.len(), "playback drained");
                    }
                    receiver.on_samples(&block);
                }
            }
        }
    });

    let tx_task = tokio::spawn(run_transmitter(transmitter, tx_packets, shutdown.clone()));
    let host_task = tokio::spawn(server.run(tx_queue, rx_packets, shutdown.clone()));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupt received, shutting down"),
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();

    if let Err(e) = capture.await {
        tracing::warn!(error = %e, "capture task failed");
    }
    for (name, task) in [("transmitter", tx_task), ("host link", host_task)] {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(task = name, error = %e, "task ended with error"),
            Err(e) => tracing::warn!(task = name, error = %e, "task panicked"),
        }
    }

    tracing::info!("freedv-tnc stopped");
    Ok(())
}
