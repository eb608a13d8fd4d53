//! Price indicators: adaptive EMA pair and ATR
//!
//! The smoothing factors adapt to trade density: the mean inter-trade gap
//! inside the rolling window stands in for a fixed bar interval, so a burst
//! of trades tightens the EMAs and a quiet stretch relaxes them.

/// Short/long EMA pair with trade-density-adaptive smoothing
#[derive(Debug, Clone, Copy, Default)]
pub struct EmaPair {
    pub short: Option<f64>,
    pub long: Option<f64>,
}

impl EmaPair {
    /// Update both EMAs with a new price.
    ///
    /// `dt_eff_ms` is the estimated inter-trade gap (window / trade count).
    pub fn update(&mut self, price: f64, dt_eff_ms: f64, short_ms: f64, long_ms: f64) {
        let alpha_short = 2.0 / (short_ms / dt_eff_ms + 1.0);
        let alpha_long = 2.0 / (long_ms / dt_eff_ms + 1.0);

        self.short = Some(match self.short {
            None => price,
            Some(prev) => alpha_short * price + (1.0 - alpha_short) * prev,
        });
        self.long = Some(match self.long {
            None => price,
            Some(prev) => alpha_long * price + (1.0 - alpha_long) * prev,
        });
    }

    /// Short minus long, normalized by price; zero until both are seeded
    pub fn gap(&self, price: f64) -> f64 {
        match (self.short, self.long) {
            (Some(s), Some(l)) if price > 0.0 => (s - l) / price,
            _ => 0.0,
        }
    }
}

/// Smoothed mean absolute price change
#[derive(Debug, Clone, Copy, Default)]
pub struct Atr {
    value: Option<f64>,
    last_price: Option<f64>,
}

impl Atr {
    /// Feed the next trade price; the first observation only seeds the
    /// reference price.
    pub fn update(&mut self, price: f64, window_sec: f64) {
        if let Some(last) = self.last_price {
            let true_range = (price - last).abs();
            let alpha = 2.0 / (window_sec + 1.0);
            self.value = Some(match self.value {
                None => true_range,
                Some(prev) => alpha * true_range + (1.0 - alpha) * prev,
            });
        }
        self.last_price = Some(price);
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn last_price(&self) -> Option<f64> {
        self.last_price
    }
}
