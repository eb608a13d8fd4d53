//! CLI command implementations

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::chain::RpcChainClient;
use crate::config::Config;
use crate::engine::{EngineChannels, EngineEvent, StrategyEngine};
use crate::journal::FeatureStore;
use crate::ml::ModelSet;
use crate::risk::dev_exit::DevExitProbe;
use crate::risk::RiskAssessor;
use crate::stream::PortalClient;

/// Start the engine: wire streams, probes, journals and sinks, then run
/// the strategy task until ctrl-c.
pub async fn start(config: &Config, dry_run: bool) -> Result<()> {
    if dry_run {
        warn!("Running in DRY-RUN mode - signals are logged, never executed");
    }

    info!("Starting momentum engine...");
    info!(
        "Trade size: {} SOL, min TPS: {}, momentum trigger: {:+.0}%",
        config.entry.trade_size_sol,
        config.entry.min_tps,
        config.entry.exceptional_momentum_pct * 100.0
    );

    // Chain access for the risk and dev-exit probes
    let chain = Arc::new(RpcChainClient::new(&config.rpc));
    let risk = Arc::new(RiskAssessor::new(
        chain.clone(),
        config.admission.bundler_programs.clone(),
    ));
    let dev_probe = Arc::new(DevExitProbe::new(chain));

    // Optional model pair; load failure downgrades to heuristics
    let models = ModelSet::load(&config.ml);

    // Append-only journals
    let journal = FeatureStore::open(&config.journal)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open journals: {}", e))?;

    // Engine message channel plus the outbound sinks
    let (engine_tx, engine_rx) = mpsc::channel::<EngineEvent>(config.engine.channel_capacity);
    let (signal_tx, _) = broadcast::channel(config.engine.channel_capacity);
    let (pnl_tx, _) = broadcast::channel(256);
    let (track_tx, track_rx) = mpsc::unbounded_channel();

    // Execution sink: the adapter boundary. Without a wired adapter every
    // signal is logged; a real executor subscribes to the same channel.
    let mut signal_rx = signal_tx.subscribe();
    tokio::spawn(async move {
        loop {
            match signal_rx.recv().await {
                Ok(signal) => {
                    if dry_run {
                        info!(?signal, "Trade signal (dry-run)");
                    } else {
                        info!(?signal, "Trade signal -> execution adapter");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Signal subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // PnL sink
    let mut pnl_rx = pnl_tx.subscribe();
    tokio::spawn(async move {
        while let Ok(profit_sol) = pnl_rx.recv().await {
            info!(profit_sol, "Realized PnL updated");
        }
    });

    // Stream ingest follows the engine's track/untrack requests
    let portal = PortalClient::new(config.stream.clone(), engine_tx.clone());
    portal.start(track_rx).await?;

    let engine = StrategyEngine::new(
        config.clone(),
        risk,
        dev_probe,
        models,
        journal,
        EngineChannels {
            self_tx: engine_tx,
            signal_tx,
            pnl_tx,
            track_tx: Some(track_tx),
        },
    );

    tokio::select! {
        _ = engine.run(engine_rx) => {
            warn!("Engine loop ended");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            portal.stop();
        }
    }

    Ok(())
}

/// Print the masked configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}
