//! Append-only feature and prediction journals
//!
//! Records are serialized to one JSON object per line. Writes go through a
//! channel into a dedicated writer task so journal I/O never stalls the
//! strategy task; a failed write is logged and the record dropped.

use serde::Serialize;
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::JournalConfig;
use crate::error::Result;

/// One feature observation for a tracked token
#[derive(Debug, Clone, Serialize)]
pub struct FeatureRecord {
    pub ts: i64,
    pub mint: String,
    pub ln_price: f64,
    pub ln_liquidity: f64,
    pub tps_norm: f64,
    pub rise_from_low: f64,
    pub unique_wallets_norm: f64,
    pub ema_gap: f64,
    pub atr_ratio: f64,
    pub age_min_norm: f64,
    pub drawdown: f64,
    pub rise_from_entry: f64,
    pub has_bought: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_bps: Option<u16>,
    pub bundler: bool,
}

/// One model score emitted at decision time
#[derive(Debug, Clone, Serialize)]
pub struct PredictionRecord {
    pub ts: i64,
    pub mint: String,
    /// "buy" or "sell"
    pub model: &'static str,
    pub score: f64,
    pub threshold: f64,
    pub fired: bool,
}

/// Append-only line-oriented sink pair for features and predictions
pub struct FeatureStore {
    feature_tx: Option<mpsc::UnboundedSender<String>>,
    pred_tx: Option<mpsc::UnboundedSender<String>>,
}

impl FeatureStore {
    /// Open the configured sinks. Files are created (with parent
    /// directories) and held open for the engine's lifetime.
    pub async fn open(cfg: &JournalConfig) -> Result<Self> {
        let feature_tx = if cfg.feature_logging {
            Some(spawn_writer(&cfg.feature_log_path).await?)
        } else {
            None
        };
        let pred_tx = if cfg.pred_logging {
            Some(spawn_writer(&cfg.pred_log_path).await?)
        } else {
            None
        };

        Ok(Self {
            feature_tx,
            pred_tx,
        })
    }

    /// A store that drops everything
    pub fn disabled() -> Self {
        Self {
            feature_tx: None,
            pred_tx: None,
        }
    }

    pub fn features_enabled(&self) -> bool {
        self.feature_tx.is_some()
    }

    pub fn predictions_enabled(&self) -> bool {
        self.pred_tx.is_some()
    }

    pub fn record_features(&self, record: &FeatureRecord) {
        Self::push(&self.feature_tx, record);
    }

    pub fn record_prediction(&self, record: &PredictionRecord) {
        Self::push(&self.pred_tx, record);
    }

    fn push<T: Serialize>(tx: &Option<mpsc::UnboundedSender<String>>, record: &T) {
        let Some(tx) = tx else { return };
        match serde_json::to_string(record) {
            Ok(line) => {
                if tx.send(line).is_err() {
                    debug!("Journal writer gone; dropping record");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize journal record"),
        }
    }
}

/// Open `path` for append and spawn the writer task feeding it
async fn spawn_writer(path: &str) -> Result<mpsc::UnboundedSender<String>> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let path = path.to_string();

    tokio::spawn(async move {
        while let Some(mut line) = rx.recv().await {
            line.push('\n');
            if let Err(e) = file.write_all(line.as_bytes()).await {
                warn!(path = %path, error = %e, "Journal write failed; record lost");
            }
        }
        let _ = file.flush().await;
        debug!(path = %path, "Journal writer closed");
    });

    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature_record() -> FeatureRecord {
        FeatureRecord {
            ts: 1_700_000_000,
            mint: "mint1".to_string(),
            ln_price: 0.0,
            ln_liquidity: 3.4,
            tps_norm: 0.5,
            rise_from_low: 1.2,
            unique_wallets_norm: 0.3,
            ema_gap: 0.01,
            atr_ratio: 0.02,
            age_min_norm: 0.1,
            drawdown: 0.0,
            rise_from_entry: 0.0,
            has_bought: false,
            fee_bps: None,
            bundler: false,
        }
    }

    #[tokio::test]
    async fn test_records_append_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let feature_path = dir.path().join("features.log");
        let cfg = JournalConfig {
            feature_logging: true,
            feature_log_path: feature_path.to_string_lossy().to_string(),
            pred_logging: false,
            ..Default::default()
        };

        let store = FeatureStore::open(&cfg).await.unwrap();
        store.record_features(&feature_record());
        store.record_features(&feature_record());

        // Give the writer task a turn
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let contents = std::fs::read_to_string(&feature_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["mint"], "mint1");
        assert_eq!(parsed["has_bought"], false);
        // fee_bps was None and is omitted
        assert!(parsed.get("fee_bps").is_none());
    }

    #[tokio::test]
    async fn test_disabled_store_drops_silently() {
        let store = FeatureStore::disabled();
        store.record_features(&feature_record());
        store.record_prediction(&PredictionRecord {
            ts: 0,
            mint: "m".to_string(),
            model: "buy",
            score: 0.7,
            threshold: 0.5,
            fired: true,
        });
        assert!(!store.features_enabled());
        assert!(!store.predictions_enabled());
    }
}
