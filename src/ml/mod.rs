//! Model wiring
//!
//! A `ModelSet` holds the optional buy and sell scorers. Load failures
//! downgrade to heuristic-only operation instead of aborting startup.

pub mod gbm;

use std::path::Path;
use tracing::{info, warn};

use crate::config::MlConfig;

pub use gbm::{sigmoid, GbmModel};

/// Buy-side model file name inside the model directory
const BUY_MODEL_FILE: &str = "buy.json";
/// Sell-side model file name inside the model directory
const SELL_MODEL_FILE: &str = "sell.json";

/// Optional buy/sell model pair plus decision thresholds
pub struct ModelSet {
    buy: Option<GbmModel>,
    sell: Option<GbmModel>,
    pub threshold_buy: f64,
    pub threshold_sell: f64,
}

impl ModelSet {
    /// Load models from the configured directory.
    ///
    /// A missing or unreadable dump logs a warning and leaves that side
    /// disabled; the engine continues on heuristics.
    pub fn load(cfg: &MlConfig) -> Self {
        if !cfg.lgbm_enabled {
            return Self::disabled();
        }

        let dir = Path::new(&cfg.lgbm_model_dir);
        let buy = Self::load_side(&dir.join(BUY_MODEL_FILE), "buy");
        let sell = Self::load_side(&dir.join(SELL_MODEL_FILE), "sell");

        if buy.is_none() && sell.is_none() {
            warn!(
                dir = %cfg.lgbm_model_dir,
                "No usable model dumps; running heuristic-only"
            );
        }

        Self {
            buy,
            sell,
            threshold_buy: cfg.lgbm_threshold_buy,
            threshold_sell: cfg.lgbm_threshold_sell,
        }
    }

    fn load_side(path: &Path, side: &str) -> Option<GbmModel> {
        match GbmModel::load(path) {
            Ok(model) => {
                info!(side, path = %path.display(), "Loaded model dump");
                Some(model)
            }
            Err(e) => {
                warn!(side, error = %e, "Model unavailable");
                None
            }
        }
    }

    /// A set with no models loaded
    pub fn disabled() -> Self {
        Self {
            buy: None,
            sell: None,
            threshold_buy: 0.5,
            threshold_sell: 0.5,
        }
    }

    /// Build from already-parsed models (tests, tools)
    pub fn from_models(
        buy: Option<GbmModel>,
        sell: Option<GbmModel>,
        threshold_buy: f64,
        threshold_sell: f64,
    ) -> Self {
        Self {
            buy,
            sell,
            threshold_buy,
            threshold_sell,
        }
    }

    pub fn buy(&self) -> Option<&GbmModel> {
        self.buy.as_ref()
    }

    pub fn sell(&self) -> Option<&GbmModel> {
        self.sell.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_when_not_enabled() {
        let set = ModelSet::load(&MlConfig::default());
        assert!(set.buy().is_none());
        assert!(set.sell().is_none());
    }

    #[test]
    fn test_missing_dir_downgrades() {
        let cfg = MlConfig {
            lgbm_enabled: true,
            lgbm_model_dir: "does/not/exist".to_string(),
            ..Default::default()
        };
        let set = ModelSet::load(&cfg);
        assert!(set.buy().is_none());
        assert!(set.sell().is_none());
    }

    #[test]
    fn test_loads_present_side_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(BUY_MODEL_FILE),
            r#"{"init_score": 0.0, "num_trees": 1,
                "tree_info": [{"tree_structure": {"leaf_value": 2.0}}]}"#,
        )
        .unwrap();

        let cfg = MlConfig {
            lgbm_enabled: true,
            lgbm_model_dir: dir.path().to_string_lossy().to_string(),
            lgbm_threshold_buy: 0.6,
            ..Default::default()
        };
        let set = ModelSet::load(&cfg);
        assert!(set.buy().is_some());
        assert!(set.sell().is_none());
        assert_eq!(set.threshold_buy, 0.6);
    }
}
