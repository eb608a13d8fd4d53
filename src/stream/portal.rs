//! WebSocket client for launch and trade events
//!
//! Connects to a PumpPortal-style data feed, subscribes to new-token
//! events plus per-mint trade streams, and converts the raw payloads into
//! engine events. The connection reconnects forever by default; engine
//! state survives reconnects because the strategy task never restarts.

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::config::StreamConfig;
use crate::engine::EngineEvent;
use crate::error::{Error, Result};
use crate::events::{PoolEvent, PriceEvent, Side, TrackRequest};

/// Lamports per SOL
const LAMPORTS_PER_SOL: f64 = 1e9;
/// Bonding-curve tokens use 6 decimals
const TOKEN_SCALE: f64 = 1e6;

/// Subscription control message
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionMessage {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
}

impl SubscriptionMessage {
    /// Subscribe to new token creation events
    pub fn subscribe_new_tokens() -> Self {
        Self {
            method: "subscribeNewToken".to_string(),
            keys: None,
        }
    }

    /// Subscribe to trades on specific tokens
    pub fn subscribe_token_trades(mints: Vec<String>) -> Self {
        Self {
            method: "subscribeTokenTrade".to_string(),
            keys: Some(mints),
        }
    }

    /// Unsubscribe from token trades
    pub fn unsubscribe_token_trades(mints: Vec<String>) -> Self {
        Self {
            method: "unsubscribeTokenTrade".to_string(),
            keys: Some(mints),
        }
    }
}

/// New token event as it arrives on the wire
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLaunchEvent {
    pub signature: String,
    pub mint: String,
    pub trader_public_key: String,
    pub tx_type: String,
    pub market_cap_sol: f64,
    pub v_tokens_in_bonding_curve: u64,
    pub v_sol_in_bonding_curve: u64,
    pub name: String,
    pub symbol: String,
}

/// Trade event as it arrives on the wire
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTradeEvent {
    pub signature: String,
    pub mint: String,
    pub trader_public_key: String,
    /// "buy" or "sell"
    pub tx_type: String,
    pub token_amount: u64,
    pub sol_amount: u64,
    pub v_tokens_in_bonding_curve: u64,
    pub v_sol_in_bonding_curve: u64,
    pub market_cap_sol: f64,
}

impl From<RawLaunchEvent> for PoolEvent {
    fn from(event: RawLaunchEvent) -> Self {
        Self {
            mint: event.mint,
            created_at: chrono::Utc::now().timestamp(),
            initial_mcap: event.market_cap_sol,
            symbol: Some(event.symbol),
            dev_wallet: Some(event.trader_public_key),
            signature: Some(event.signature),
        }
    }
}

impl From<RawTradeEvent> for PriceEvent {
    fn from(event: RawTradeEvent) -> Self {
        let curve_sol = event.v_sol_in_bonding_curve as f64 / LAMPORTS_PER_SOL;
        let curve_tokens = event.v_tokens_in_bonding_curve as f64 / TOKEN_SCALE;
        let notional = event.sol_amount as f64 / LAMPORTS_PER_SOL;
        let side = if event.tx_type == "buy" {
            Side::Buy
        } else {
            Side::Sell
        };

        Self {
            mint: event.mint,
            price: if curve_tokens > 0.0 {
                curve_sol / curve_tokens
            } else {
                0.0
            },
            liquidity: curve_sol,
            sol: match side {
                Side::Buy => notional,
                Side::Sell => -notional,
            },
            wallet: event.trader_public_key,
            tokens_curve: curve_tokens,
            side,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// WebSocket ingest client
pub struct PortalClient {
    config: StreamConfig,
    engine_tx: mpsc::Sender<EngineEvent>,
    shutdown: tokio::sync::broadcast::Sender<()>,
    /// Mints with an active trade subscription; replayed on reconnect
    subscribed: Arc<DashMap<String, ()>>,
}

impl PortalClient {
    pub fn new(config: StreamConfig, engine_tx: mpsc::Sender<EngineEvent>) -> Self {
        let (shutdown, _) = tokio::sync::broadcast::channel(1);
        Self {
            config,
            engine_tx,
            shutdown,
            subscribed: Arc::new(DashMap::new()),
        }
    }

    /// Start the connection loop. `track_rx` carries the engine's
    /// subscription requests.
    pub async fn start(&self, mut track_rx: mpsc::UnboundedReceiver<TrackRequest>) -> Result<()> {
        info!(url = %self.config.ws_url, "Starting stream client");

        // Fail fast on an unparseable endpoint before spawning anything
        url::Url::parse(&self.config.ws_url)
            .map_err(|e| Error::Config(format!("Invalid WebSocket URL: {}", e)))?;

        let config = self.config.clone();
        let engine_tx = self.engine_tx.clone();
        let subscribed = self.subscribed.clone();
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut reconnect_attempts = 0u32;

            loop {
                if shutdown_rx.try_recv().is_ok() {
                    info!("Stream client shutting down");
                    break;
                }

                match Self::connect_and_stream(&config, &engine_tx, &subscribed, &mut track_rx)
                    .await
                {
                    Ok(_) => {
                        reconnect_attempts = 0;
                    }
                    Err(e) => {
                        error!(error = %e, "Stream error");
                        reconnect_attempts += 1;

                        if config.max_reconnect_attempts > 0
                            && reconnect_attempts >= config.max_reconnect_attempts
                        {
                            error!(
                                attempts = reconnect_attempts,
                                "Max reconnect attempts reached; giving up"
                            );
                            break;
                        }
                    }
                }

                let delay = Duration::from_millis(config.reconnect_delay_ms);
                warn!("Reconnecting in {:?}...", delay);
                sleep(delay).await;
            }
        });

        Ok(())
    }

    /// Stop the client
    pub fn stop(&self) {
        let _ = self.shutdown.send(());
    }

    async fn connect_and_stream(
        config: &StreamConfig,
        engine_tx: &mpsc::Sender<EngineEvent>,
        subscribed: &DashMap<String, ()>,
        track_rx: &mut mpsc::UnboundedReceiver<TrackRequest>,
    ) -> Result<()> {
        info!("Connecting to event stream...");

        let (ws_stream, _) = connect_async(config.ws_url.as_str())
            .await
            .map_err(|e| Error::StreamConnection(format!("WebSocket connect failed: {}", e)))?;

        info!("Connected to event stream");
        let (mut write, mut read) = ws_stream.split();

        let subscribe = SubscriptionMessage::subscribe_new_tokens();
        send_control(&mut write, &subscribe).await?;
        info!("Subscribed to new token events");

        // Replay per-mint trade subscriptions lost with the old connection
        let tracked: Vec<String> = subscribed.iter().map(|e| e.key().clone()).collect();
        if !tracked.is_empty() {
            send_control(&mut write, &SubscriptionMessage::subscribe_token_trades(tracked.clone()))
                .await?;
            info!(mints = tracked.len(), "Restored trade subscriptions");
        }

        let mut ping_timer = tokio::time::interval(Duration::from_secs(config.ping_interval_secs));

        loop {
            tokio::select! {
                _ = ping_timer.tick() => {
                    if let Err(e) = write.send(Message::Ping(vec![])).await {
                        error!(error = %e, "Failed to send ping");
                        break;
                    }
                }

                request = track_rx.recv() => {
                    match request {
                        Some(TrackRequest::Track(mint)) => {
                            subscribed.insert(mint.clone(), ());
                            send_control(
                                &mut write,
                                &SubscriptionMessage::subscribe_token_trades(vec![mint]),
                            )
                            .await?;
                        }
                        Some(TrackRequest::Untrack(mint)) => {
                            subscribed.remove(&mint);
                            send_control(
                                &mut write,
                                &SubscriptionMessage::unsubscribe_token_trades(vec![mint]),
                            )
                            .await?;
                        }
                        None => {
                            info!("Track channel closed; stopping stream");
                            return Ok(());
                        }
                    }
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = Self::handle_message(&text, engine_tx).await {
                                warn!(error = %e, "Failed to handle message");
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            debug!("Received pong");
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("WebSocket closed by server");
                            break;
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            break;
                        }
                        None => {
                            info!("WebSocket stream ended");
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }

        Err(Error::StreamDisconnected)
    }

    /// Parse one text frame and forward it to the engine
    async fn handle_message(text: &str, engine_tx: &mpsc::Sender<EngineEvent>) -> Result<()> {
        if let Ok(launch) = serde_json::from_str::<RawLaunchEvent>(text) {
            if launch.tx_type == "create" {
                debug!(mint = %launch.mint, symbol = %launch.symbol, "New token");
                engine_tx
                    .send(EngineEvent::Pool(launch.into()))
                    .await
                    .map_err(|e| Error::Internal(e.to_string()))?;
                return Ok(());
            }
        }

        if let Ok(trade) = serde_json::from_str::<RawTradeEvent>(text) {
            if trade.tx_type == "buy" || trade.tx_type == "sell" {
                engine_tx
                    .send(EngineEvent::Price(trade.into()))
                    .await
                    .map_err(|e| Error::Internal(e.to_string()))?;
                return Ok(());
            }
        }

        // Malformed or unrecognized payloads are logged and dropped
        let head: String = text.chars().take(120).collect();
        debug!(head = %head, "Unknown message");
        Ok(())
    }
}

async fn send_control<S>(write: &mut S, msg: &SubscriptionMessage) -> Result<()>
where
    S: SinkExt<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = serde_json::to_string(msg)?;
    write
        .send(Message::Text(json))
        .await
        .map_err(|e| Error::StreamConnection(format!("Failed to send control message: {}", e)))
}
