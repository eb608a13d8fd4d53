//! Per-token mutable state
//!
//! One `TokenState` exists per tracked mint; dropping it is what untracking
//! means. Position fields are written once at entry and never mutated.

use tokio::task::JoinHandle;

use super::features::FeatureVector;
use super::indicators::{Atr, EmaPair};
use super::rolling::RollingWindow;

/// Minimum spacing between dev-exit probes for one token, seconds
pub const DEV_PROBE_INTERVAL_SEC: i64 = 15;

/// Per-token record holding features, position and timers
#[derive(Debug)]
pub struct TokenState {
    // Identity
    pub symbol: Option<String>,
    pub dev_wallet: Option<String>,
    /// Admission time (epoch seconds)
    pub created_at: i64,
    /// True when this is the creator's first launch we have seen
    pub dev_first_token: bool,

    // Lifecycle flags
    pub risk_checked: bool,
    pub is_bundler: bool,
    pub transfer_fee_bps: Option<u16>,
    pub dev_sold: bool,
    pub has_bought: bool,
    pub is_exceptional: bool,

    // Price stats
    pub highest_price: f64,
    pub lowest_price: f64,
    pub peak_since_entry: Option<f64>,

    // Liquidity stats
    pub liquidity: f64,
    pub peak_liquidity: f64,

    // Volume
    pub volume_sol: f64,

    // Rolling aggregates and indicators
    pub window: RollingWindow,
    pub ema: EmaPair,
    pub atr: Atr,

    // Position
    pub entry_price: Option<f64>,
    pub entry_sol: Option<f64>,
    pub entry_features: Option<FeatureVector>,

    // Curve
    pub initial_tokens: Option<f64>,

    // Timers
    pub no_buy_timer: Option<JoinHandle<()>>,
    /// Earliest epoch second the next dev-exit probe may fire
    pub next_dev_check: i64,
    pub dev_probe_inflight: bool,
}

impl TokenState {
    pub fn new(
        symbol: Option<String>,
        dev_wallet: Option<String>,
        created_at: i64,
        initial_liquidity: f64,
        dev_first_token: bool,
        window_ms: u64,
    ) -> Self {
        Self {
            symbol,
            dev_wallet,
            created_at,
            dev_first_token,
            risk_checked: false,
            is_bundler: false,
            transfer_fee_bps: None,
            dev_sold: false,
            has_bought: false,
            is_exceptional: false,
            highest_price: 0.0,
            lowest_price: f64::INFINITY,
            peak_since_entry: None,
            liquidity: initial_liquidity,
            peak_liquidity: initial_liquidity,
            volume_sol: 0.0,
            window: RollingWindow::new(window_ms),
            ema: EmaPair::default(),
            atr: Atr::default(),
            entry_price: None,
            entry_sol: None,
            entry_features: None,
            initial_tokens: None,
            no_buy_timer: None,
            next_dev_check: 0,
            dev_probe_inflight: false,
        }
    }

    /// Cancel the pending no-buy timer, if any
    pub fn cancel_no_buy_timer(&mut self) {
        if let Some(handle) = self.no_buy_timer.take() {
            handle.abort();
        }
    }

    /// Token age relative to `now` (epoch seconds)
    pub fn age_sec(&self, now: i64) -> i64 {
        now - self.created_at
    }
}

impl Drop for TokenState {
    fn drop(&mut self) {
        self.cancel_no_buy_timer();
    }
}

/// Running realized-PnL scalars
#[derive(Debug, Clone, Copy, Default)]
pub struct PnlBook {
    pub profit_sol: f64,
    pub invested_sol: f64,
    pub total_invested_sol: f64,
}

impl PnlBook {
    /// Account a new position of `entry_sol`
    pub fn open(&mut self, entry_sol: f64) {
        self.invested_sol += entry_sol;
        self.total_invested_sol += entry_sol;
    }

    /// Realize a closed position, returning its PnL in SOL
    pub fn settle(&mut self, entry_sol: f64, entry_price: f64, exit_price: f64) -> f64 {
        let pnl_sol = entry_sol * (exit_price - entry_price) / entry_price;
        self.profit_sol += pnl_sol;
        self.invested_sol = (self.invested_sol - entry_sol).max(0.0);
        pnl_sol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_defaults() {
        let state = TokenState::new(
            Some("AAA".to_string()),
            Some("dev1".to_string()),
            1_700_000_000,
            10.0,
            false,
            4_000,
        );
        assert!(!state.has_bought);
        assert!(!state.risk_checked);
        assert_eq!(state.highest_price, 0.0);
        assert!(state.lowest_price.is_infinite());
        assert_eq!(state.liquidity, 10.0);
        assert_eq!(state.peak_liquidity, 10.0);
    }

    #[test]
    fn test_pnl_book_settle() {
        let mut book = PnlBook::default();
        book.open(0.5);
        assert_eq!(book.invested_sol, 0.5);
        assert_eq!(book.total_invested_sol, 0.5);

        let pnl = book.settle(0.5, 3.5, 6.65);
        assert!((pnl - 0.45).abs() < 1e-9);
        assert!((book.profit_sol - 0.45).abs() < 1e-9);
        assert_eq!(book.invested_sol, 0.0);
        // Total invested never decreases
        assert_eq!(book.total_invested_sol, 0.5);
    }

    #[test]
    fn test_invested_never_negative() {
        let mut book = PnlBook::default();
        book.open(0.5);
        book.settle(0.6, 1.0, 1.0);
        assert!(book.invested_sol >= 0.0);
    }
}
