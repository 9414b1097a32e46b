//! loragated — LoRa relay gateway daemon.

use std::time::Duration;

use anyhow::{Context, Result};

use loragate_core::config::GatewayConfig;
use loragate_services::{handoff, BufferPolicy, DuplicateFilter, ResponseAccumulator};

use loragated::egress::{EgressLoop, RetryPolicy};
use loragated::http::HttpCollector;
use loragated::ingest::IngestLoop;
use loragated::radio::UdpRadio;
use loragated::stats::{self, EgressStats, IngestStats};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = GatewayConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = GatewayConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        GatewayConfig::default()
    });
    config.validate().context("refusing to start")?;
    tracing::info!(path = %GatewayConfig::file_path().display(), "loragated starting");

    // Radio
    let radio = UdpRadio::bind(&config.radio.bind_addr)?;
    tracing::info!(addr = %radio.local_addr()?, "radio bridge listening");

    // Collector
    let collector = HttpCollector::new(&config.collector)?;
    tracing::info!(
        url = %collector.url(),
        timeout_ms = config.collector.timeout_ms,
        "collector client ready"
    );

    let policy = match config.collector.response_buffer_bytes {
        0 => BufferPolicy::ContentLength {
            max: config.collector.max_response_bytes,
        },
        n => BufferPolicy::Fixed(n),
    };

    // Handoff between the two loops
    let (packet_tx, packet_rx) = handoff(config.pipeline.queue_capacity);

    let ingest_stats = IngestStats::new();
    let egress_stats = EgressStats::new();

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let ingest_task = tokio::spawn(
        IngestLoop::new(
            radio,
            DuplicateFilter::new(config.pipeline.dedup_capacity),
            packet_tx,
            config.radio.receive_buffer_bytes,
            config.radio.poll_interval(),
            ingest_stats.clone(),
        )
        .run(shutdown_tx.subscribe()),
    );

    let egress_task = tokio::spawn(
        EgressLoop::new(
            collector,
            packet_rx,
            ResponseAccumulator::new(policy),
            RetryPolicy::from(&config.pipeline),
            egress_stats.clone(),
        )
        .run(shutdown_tx.subscribe()),
    );

    let stats_printer = {
        let ingest = ingest_stats.clone();
        let egress = egress_stats.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                stats::print_stats(&ingest, &egress);
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = ingest_task        => tracing::error!("ingest task exited: {:?}", r),
        r = egress_task        => tracing::error!("egress task exited: {:?}", r),
        r = stats_printer      => tracing::error!("stats printer exited: {:?}", r),
    }

    stats::print_stats(&ingest_stats, &egress_stats);
    Ok(())
}
