//! Fixed feature vector fed to the model scorer and the feature journal
//!
//! The entry order is contractual: trained models index features by
//! position, so reordering entries invalidates every saved model dump.

/// Number of features in the vector
pub const FEATURE_COUNT: usize = 10;

/// Journal field names, index-aligned with the vector
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "ln_price",
    "ln_liquidity",
    "tps_norm",
    "rise_from_low",
    "unique_wallets_norm",
    "ema_gap",
    "atr_ratio",
    "age_min_norm",
    "drawdown",
    "rise_from_entry",
];

/// Stack-allocated feature vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

/// Raw inputs for one feature computation
#[derive(Debug, Clone, Copy)]
pub struct FeatureInputs {
    pub price: f64,
    pub liquidity: f64,
    pub tps: f64,
    /// Lowest price seen so far; +inf until first extrema update
    pub lowest_price: f64,
    pub unique_wallets: usize,
    pub ema_gap: f64,
    pub atr: Option<f64>,
    /// Token age in seconds
    pub age_sec: i64,
    pub peak_since_entry: Option<f64>,
    pub entry_price: Option<f64>,
}

impl FeatureVector {
    pub fn compute(inp: &FeatureInputs) -> Self {
        let rise_from_low = if inp.lowest_price.is_finite() && inp.lowest_price > 0.0 {
            inp.price / inp.lowest_price - 1.0
        } else {
            0.0
        };
        let atr_ratio = match inp.atr {
            Some(atr) if inp.price > 0.0 => atr / inp.price,
            _ => 0.0,
        };
        let drawdown = match inp.peak_since_entry {
            Some(peak) if inp.price > 0.0 => peak / inp.price - 1.0,
            _ => 0.0,
        };
        let rise_from_entry = match inp.entry_price {
            Some(entry) if entry > 0.0 => inp.price / entry - 1.0,
            _ => 0.0,
        };

        FeatureVector([
            (inp.price + 1e-12).ln(),
            (inp.liquidity + 1.0).ln(),
            inp.tps / 10.0,
            rise_from_low,
            inp.unique_wallets as f64 / 10.0,
            inp.ema_gap,
            atr_ratio,
            (inp.age_sec as f64 / 60.0) / 60.0,
            drawdown,
            rise_from_entry,
        ])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_inputs() -> FeatureInputs {
        FeatureInputs {
            price: 1.0,
            liquidity: 30.0,
            tps: 5.0,
            lowest_price: f64::INFINITY,
            unique_wallets: 7,
            ema_gap: 0.0,
            atr: None,
            age_sec: 120,
            peak_since_entry: None,
            entry_price: None,
        }
    }

    #[test]
    fn test_undefined_inputs_default_to_zero() {
        let v = FeatureVector::compute(&base_inputs());
        assert_eq!(v.0[3], 0.0); // rise_from_low with no observed low
        assert_eq!(v.0[6], 0.0); // atr_ratio without an ATR
        assert_eq!(v.0[8], 0.0); // drawdown without a position
        assert_eq!(v.0[9], 0.0); // rise_from_entry without a position
    }

    #[test]
    fn test_feature_order() {
        let mut inp = base_inputs();
        inp.lowest_price = 0.5;
        inp.atr = Some(0.1);
        inp.peak_since_entry = Some(2.0);
        inp.entry_price = Some(0.8);

        let v = FeatureVector::compute(&inp);
        assert!((v.0[0] - (1.0_f64 + 1e-12).ln()).abs() < 1e-12);
        assert!((v.0[1] - 31.0_f64.ln()).abs() < 1e-12);
        assert!((v.0[2] - 0.5).abs() < 1e-12);
        assert!((v.0[3] - 1.0).abs() < 1e-12); // 1.0 / 0.5 - 1
        assert!((v.0[4] - 0.7).abs() < 1e-12);
        assert!((v.0[6] - 0.1).abs() < 1e-12);
        assert!((v.0[7] - 2.0 / 60.0).abs() < 1e-12); // 2 minutes / 60
        assert!((v.0[8] - 1.0).abs() < 1e-12); // 2.0 / 1.0 - 1
        assert!((v.0[9] - 0.25).abs() < 1e-9); // 1.0 / 0.8 - 1
    }

    #[test]
    fn test_names_align_with_count() {
        assert_eq!(FEATURE_NAMES.len(), FEATURE_COUNT);
    }
}
