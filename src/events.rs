//! Event and signal types shared across the engine
//!
//! Pool and price events arrive from the stream layer; trade signals and
//! PnL updates leave through broadcast sinks.

use serde::{Deserialize, Serialize};

/// Notification that a new bonding-curve market was created
#[derive(Debug, Clone)]
pub struct PoolEvent {
    /// Token mint address
    pub mint: String,
    /// Creation time (epoch seconds)
    pub created_at: i64,
    /// Initial market cap in SOL
    pub initial_mcap: f64,
    /// Token symbol, when the source provides one
    pub symbol: Option<String>,
    /// Creator wallet
    pub dev_wallet: Option<String>,
    /// Creation transaction signature
    pub signature: Option<String>,
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

/// A single trade observed on a tracked token's curve
#[derive(Debug, Clone)]
pub struct PriceEvent {
    /// Token mint address
    pub mint: String,
    /// Price in SOL per token
    pub price: f64,
    /// Curve liquidity in SOL
    pub liquidity: f64,
    /// Signed trade notional in SOL (sells negative)
    pub sol: f64,
    /// Trader wallet
    pub wallet: String,
    /// Tokens remaining on the bonding curve
    pub tokens_curve: f64,
    /// Buy or sell
    pub side: Side,
    /// Trade time (epoch seconds)
    pub timestamp: i64,
}

/// Signal action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeAction {
    Buy,
    Sell,
}

/// Why a SELL fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SellReason {
    /// Take profit
    Tp,
    /// Stop loss (also covers rug exits)
    Sl,
    /// Bonding curve nearly depleted
    Migration,
    /// Liquidity pulled by the creator
    Rug,
    /// Operator-initiated
    Manual,
}

/// Trade signal published to the execution adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub mint: String,
    pub action: TradeAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SellReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
}

/// Subscription request from the engine to the upstream trade source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackRequest {
    Track(String),
    Untrack(String),
}
