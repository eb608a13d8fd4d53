//! Time-bounded rolling aggregates
//!
//! Tracks trades and wallet observations inside a sliding window and
//! derives the activity metrics the entry gates consume.

use std::collections::{HashSet, VecDeque};

/// A trade retained in the window
#[derive(Debug, Clone, Copy)]
struct WindowTrade {
    ts_ms: i64,
    sol: f64,
}

/// A wallet observation retained in the window
#[derive(Debug, Clone)]
struct WindowWallet {
    ts_ms: i64,
    addr: String,
}

/// Rolling activity metrics derived at a point in time
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowMetrics {
    pub trade_count: usize,
    pub tps: f64,
    pub window_volume: f64,
    pub unique_wallets: usize,
    pub avg_sol: f64,
}

/// Fixed time-window aggregation of trades and wallets
#[derive(Debug)]
pub struct RollingWindow {
    window_ms: i64,
    trades: VecDeque<WindowTrade>,
    wallets: VecDeque<WindowWallet>,
}

impl RollingWindow {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms: window_ms as i64,
            trades: VecDeque::new(),
            wallets: VecDeque::new(),
        }
    }

    /// Record a trade and its wallet at `ts_ms`, then prune stale entries
    pub fn record(&mut self, ts_ms: i64, sol: f64, wallet: &str) {
        self.trades.push_back(WindowTrade { ts_ms, sol });
        self.wallets.push_back(WindowWallet {
            ts_ms,
            addr: wallet.to_string(),
        });
        self.prune(ts_ms);
    }

    /// Drop entries older than the window relative to `now_ms`
    pub fn prune(&mut self, now_ms: i64) {
        while let Some(front) = self.trades.front() {
            if now_ms - front.ts_ms > self.window_ms {
                self.trades.pop_front();
            } else {
                break;
            }
        }
        while let Some(front) = self.wallets.front() {
            if now_ms - front.ts_ms > self.window_ms {
                self.wallets.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }

    /// Metrics over the current window contents
    pub fn metrics(&self) -> WindowMetrics {
        let trade_count = self.trades.len();
        let window_volume: f64 = self.trades.iter().map(|t| t.sol).sum();
        let unique_wallets = self
            .wallets
            .iter()
            .map(|w| w.addr.as_str())
            .collect::<HashSet<_>>()
            .len();

        WindowMetrics {
            trade_count,
            tps: trade_count as f64 / (self.window_ms as f64 / 1_000.0),
            window_volume,
            unique_wallets,
            avg_sol: window_volume / 1.0_f64.max(trade_count as f64),
        }
    }

    /// Oldest retained trade timestamp, for invariant checks
    #[cfg(test)]
    fn oldest_ts_ms(&self) -> Option<i64> {
        self.trades.front().map(|t| t.ts_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_keeps_window_bound() {
        let mut window = RollingWindow::new(4_000);

        window.record(0, 0.1, "w1");
        window.record(1_000, 0.1, "w2");
        window.record(5_500, 0.1, "w3");

        // Entries at 0 and 1000 are older than 4s relative to 5500
        assert_eq!(window.trade_count(), 1);
        assert_eq!(window.oldest_ts_ms(), Some(5_500));
    }

    #[test]
    fn test_retained_trades_satisfy_window_invariant() {
        let mut window = RollingWindow::new(4_000);
        for i in 0..20 {
            window.record(i * 700, 0.05, "w");
        }
        let now = 19 * 700;
        assert!(window.oldest_ts_ms().unwrap() >= now - 4_000);
    }

    #[test]
    fn test_metrics() {
        let mut window = RollingWindow::new(4_000);
        window.record(0, 0.5, "alice");
        window.record(100, 0.3, "bob");
        window.record(200, 0.2, "alice");

        let m = window.metrics();
        assert_eq!(m.trade_count, 3);
        assert_eq!(m.unique_wallets, 2);
        assert!((m.window_volume - 1.0).abs() < 1e-9);
        assert!((m.tps - 0.75).abs() < 1e-9);
        assert!((m.avg_sol - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_window_metrics() {
        let window = RollingWindow::new(4_000);
        let m = window.metrics();
        assert_eq!(m.trade_count, 0);
        assert_eq!(m.avg_sol, 0.0);
        assert_eq!(m.tps, 0.0);
    }
}
