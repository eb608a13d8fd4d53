//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Program ids whose presence as the first instruction of a create
/// transaction marks the mint as bundler-launched.
pub const DEFAULT_BUNDLER_PROGRAMS: &[&str] = &["BLoomqsEL9iGjmkUttDTP5RBnPsCBrzaeWRuHEXPJvpp"];

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub entry: EntryConfig,
    #[serde(default)]
    pub exit: ExitConfig,
    #[serde(default)]
    pub ml: MlConfig,
    #[serde(default)]
    pub journal: JournalConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_rpc_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// 0 = reconnect forever
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

/// Rolling window and indicator parameters plus runtime knobs
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_tps_window_ms")]
    pub tps_window_ms: u64,
    #[serde(default = "default_ema_short_ms")]
    pub ema_short_ms: f64,
    #[serde(default = "default_ema_long_ms")]
    pub ema_long_ms: f64,
    #[serde(default = "default_atr_window_sec")]
    pub atr_window_sec: f64,
    /// Liquidity floor on the price path; tokens below it are dropped
    #[serde(default = "default_min_runtime_mcap_sol")]
    pub min_runtime_mcap_sol: f64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Log every rejection reason at info level
    #[serde(default)]
    pub debug_filters: bool,
}

/// Pool-event admission filters
#[derive(Debug, Clone, Deserialize)]
pub struct AdmissionConfig {
    /// Maximum token age at admission, seconds
    #[serde(default = "default_token_max_age")]
    pub token_max_age: i64,
    #[serde(default)]
    pub min_initial_mcap: f64,
    #[serde(default = "default_max_initial_liquidity_sol")]
    pub max_initial_liquidity_sol: f64,
    /// Untrack if no BUY happened within this many seconds
    #[serde(default = "default_no_trade_timeout_sec")]
    pub no_trade_timeout_sec: u64,
    /// Reject a dev relaunching the same ticker back to back
    #[serde(default)]
    pub skip_dev_same_ticker: bool,
    /// Run the transfer-fee / bundler probe on admission
    #[serde(default = "default_true")]
    pub enable_tax_bundler_filter: bool,
    #[serde(default)]
    pub max_transfer_fee_bps: u16,
    #[serde(default)]
    pub allow_bundler: bool,
    #[serde(default = "default_bundler_programs")]
    pub bundler_programs: Vec<String>,
    /// Drop tokens whose creator has never launched before
    #[serde(default = "default_true")]
    pub skip_dev_first_token: bool,
}

/// Heuristic entry gates
#[derive(Debug, Clone, Deserialize)]
pub struct EntryConfig {
    #[serde(default = "default_min_tps")]
    pub min_tps: f64,
    #[serde(default)]
    pub min_unique_wallets: usize,
    #[serde(default = "default_max_avg_sol_per_tx")]
    pub max_avg_sol_per_tx: f64,
    #[serde(default)]
    pub min_liquidity_sol: f64,
    #[serde(default)]
    pub min_volume_sol: f64,
    /// Rise from the observed low that triggers an entry (2.0 = +200%)
    #[serde(default = "default_exceptional_momentum_pct")]
    pub exceptional_momentum_pct: f64,
    #[serde(default = "default_trade_size_sol")]
    pub trade_size_sol: f64,
    /// Cooldown on the creator wallet after we buy one of their tokens
    #[serde(default = "default_dev_blacklist_sec")]
    pub dev_blacklist_sec: i64,
    /// Only enter after the creator has fully exited
    #[serde(default = "default_true")]
    pub require_dev_sold: bool,
}

/// Exit rules
#[derive(Debug, Clone, Deserialize)]
pub struct ExitConfig {
    /// Drop from peak liquidity that counts as a rug (0.4 = -40%)
    #[serde(default = "default_rug_liquidity_drop_pct")]
    pub rug_liquidity_drop_pct: f64,
    /// Curve depletion that forces an exit before migration
    #[serde(default = "default_migrate_fill_pct")]
    pub migrate_fill_pct: f64,
    /// Hard take-profit as a gain fraction; unset = disabled
    #[serde(default)]
    pub take_profit: Option<f64>,
    #[serde(default = "default_base_trail_dd")]
    pub base_trail_dd: f64,
    #[serde(default = "default_tps_trail_scale")]
    pub tps_trail_scale: f64,
    #[serde(default = "default_atr_mult")]
    pub atr_mult: f64,
    /// Past this gain, weak-signal exits (EMA cross, TPS collapse) are off
    #[serde(default = "default_disable_ema_tps_gain_pct")]
    pub disable_ema_tps_gain_pct: f64,
    /// TPS collapse exit threshold; unset = max(1, min_tps / 2)
    #[serde(default)]
    pub exit_tps: Option<f64>,
}

impl ExitConfig {
    /// Effective TPS collapse threshold
    pub fn exit_tps(&self, min_tps: f64) -> f64 {
        self.exit_tps.unwrap_or_else(|| (min_tps / 2.0).max(1.0))
    }
}

/// Gradient-boosted-tree model wiring
#[derive(Debug, Clone, Deserialize)]
pub struct MlConfig {
    #[serde(default)]
    pub lgbm_enabled: bool,
    #[serde(default = "default_model_dir")]
    pub lgbm_model_dir: String,
    #[serde(default = "default_threshold")]
    pub lgbm_threshold_buy: f64,
    #[serde(default = "default_threshold")]
    pub lgbm_threshold_sell: f64,
    /// Disable the heuristic entry/exit paths entirely
    #[serde(default)]
    pub pure_ml: bool,
}

/// Append-only feature/prediction journals
#[derive(Debug, Clone, Deserialize)]
pub struct JournalConfig {
    #[serde(default)]
    pub feature_logging: bool,
    #[serde(default = "default_feature_log_path")]
    pub feature_log_path: String,
    #[serde(default)]
    pub pred_logging: bool,
    #[serde(default = "default_pred_log_path")]
    pub pred_log_path: String,
}

fn default_true() -> bool {
    true
}
fn default_rpc_endpoint() -> String {
    "https://api.mainnet-beta.solana.com".to_string()
}
fn default_rpc_timeout_ms() -> u64 {
    10_000
}
fn default_ws_url() -> String {
    "wss://pumpportal.fun/api/data".to_string()
}
fn default_reconnect_delay_ms() -> u64 {
    1_000
}
fn default_ping_interval_secs() -> u64 {
    30
}
fn default_tps_window_ms() -> u64 {
    4_000
}
fn default_ema_short_ms() -> f64 {
    5_000.0
}
fn default_ema_long_ms() -> f64 {
    20_000.0
}
fn default_atr_window_sec() -> f64 {
    20.0
}
fn default_min_runtime_mcap_sol() -> f64 {
    30.0
}
fn default_channel_capacity() -> usize {
    1_024
}
fn default_token_max_age() -> i64 {
    600
}
fn default_max_initial_liquidity_sol() -> f64 {
    f64::INFINITY
}
fn default_no_trade_timeout_sec() -> u64 {
    60
}
fn default_bundler_programs() -> Vec<String> {
    DEFAULT_BUNDLER_PROGRAMS.iter().map(|s| s.to_string()).collect()
}
fn default_min_tps() -> f64 {
    5.0
}
fn default_max_avg_sol_per_tx() -> f64 {
    2.0
}
fn default_exceptional_momentum_pct() -> f64 {
    2.0
}
fn default_trade_size_sol() -> f64 {
    0.5
}
fn default_dev_blacklist_sec() -> i64 {
    3_600
}
fn default_rug_liquidity_drop_pct() -> f64 {
    0.4
}
fn default_migrate_fill_pct() -> f64 {
    0.97
}
fn default_base_trail_dd() -> f64 {
    0.2
}
fn default_tps_trail_scale() -> f64 {
    0.04
}
fn default_atr_mult() -> f64 {
    3.0
}
fn default_disable_ema_tps_gain_pct() -> f64 {
    0.3
}
fn default_model_dir() -> String {
    "models".to_string()
}
fn default_threshold() -> f64 {
    0.5
}
fn default_feature_log_path() -> String {
    "data/features.log".to_string()
}
fn default_pred_log_path() -> String {
    "data/predictions.log".to_string()
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rpc_endpoint(),
            timeout_ms: default_rpc_timeout_ms(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_attempts: 0,
            ping_interval_secs: default_ping_interval_secs(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tps_window_ms: default_tps_window_ms(),
            ema_short_ms: default_ema_short_ms(),
            ema_long_ms: default_ema_long_ms(),
            atr_window_sec: default_atr_window_sec(),
            min_runtime_mcap_sol: default_min_runtime_mcap_sol(),
            channel_capacity: default_channel_capacity(),
            debug_filters: false,
        }
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            token_max_age: default_token_max_age(),
            min_initial_mcap: 0.0,
            max_initial_liquidity_sol: default_max_initial_liquidity_sol(),
            no_trade_timeout_sec: default_no_trade_timeout_sec(),
            skip_dev_same_ticker: false,
            enable_tax_bundler_filter: true,
            max_transfer_fee_bps: 0,
            allow_bundler: false,
            bundler_programs: default_bundler_programs(),
            skip_dev_first_token: true,
        }
    }
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            min_tps: default_min_tps(),
            min_unique_wallets: 0,
            max_avg_sol_per_tx: default_max_avg_sol_per_tx(),
            min_liquidity_sol: 0.0,
            min_volume_sol: 0.0,
            exceptional_momentum_pct: default_exceptional_momentum_pct(),
            trade_size_sol: default_trade_size_sol(),
            dev_blacklist_sec: default_dev_blacklist_sec(),
            require_dev_sold: true,
        }
    }
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            rug_liquidity_drop_pct: default_rug_liquidity_drop_pct(),
            migrate_fill_pct: default_migrate_fill_pct(),
            take_profit: None,
            base_trail_dd: default_base_trail_dd(),
            tps_trail_scale: default_tps_trail_scale(),
            atr_mult: default_atr_mult(),
            disable_ema_tps_gain_pct: default_disable_ema_tps_gain_pct(),
            exit_tps: None,
        }
    }
}

impl Default for MlConfig {
    fn default() -> Self {
        Self {
            lgbm_enabled: false,
            lgbm_model_dir: default_model_dir(),
            lgbm_threshold_buy: default_threshold(),
            lgbm_threshold_sell: default_threshold(),
            pure_ml: false,
        }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            feature_logging: false,
            feature_log_path: default_feature_log_path(),
            pred_logging: false,
            pred_log_path: default_pred_log_path(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            stream: StreamConfig::default(),
            engine: EngineConfig::default(),
            admission: AdmissionConfig::default(),
            entry: EntryConfig::default(),
            exit: ExitConfig::default(),
            ml: MlConfig::default(),
            journal: JournalConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            // Override with environment variables (prefix RIDER_)
            .add_source(
                config::Environment::with_prefix("RIDER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values; errors here are fatal at startup
    fn validate(&self) -> Result<()> {
        if self.engine.tps_window_ms == 0 {
            anyhow::bail!("tps_window_ms must be positive");
        }

        if self.engine.ema_short_ms <= 0.0 || self.engine.ema_long_ms <= 0.0 {
            anyhow::bail!("ema_short_ms and ema_long_ms must be positive");
        }

        if self.engine.ema_short_ms >= self.engine.ema_long_ms {
            anyhow::bail!("ema_short_ms must be below ema_long_ms");
        }

        if self.engine.atr_window_sec <= 0.0 {
            anyhow::bail!("atr_window_sec must be positive");
        }

        if self.entry.trade_size_sol <= 0.0 {
            anyhow::bail!("trade_size_sol must be positive");
        }

        if self.entry.min_tps <= 0.0 {
            anyhow::bail!("min_tps must be positive");
        }

        if !(0.0..1.0).contains(&self.exit.rug_liquidity_drop_pct) {
            anyhow::bail!("rug_liquidity_drop_pct must be in [0, 1)");
        }

        if !(0.0..=1.0).contains(&self.exit.migrate_fill_pct) {
            anyhow::bail!("migrate_fill_pct must be in [0, 1]");
        }

        if let Some(tp) = self.exit.take_profit {
            if tp <= 0.0 {
                anyhow::bail!("take_profit must be positive when set");
            }
        }

        for threshold in [self.ml.lgbm_threshold_buy, self.ml.lgbm_threshold_sell] {
            if !(0.0..=1.0).contains(&threshold) {
                anyhow::bail!("model thresholds must be in [0, 1]");
            }
        }

        if self.ml.pure_ml && !self.ml.lgbm_enabled {
            anyhow::bail!("pure_ml requires lgbm_enabled");
        }

        for program in &self.admission.bundler_programs {
            if program.len() < 32 || program.len() > 44 {
                anyhow::bail!("Invalid bundler program id: {}", program);
            }
        }

        Ok(())
    }

    /// Get masked configuration for display (hide API keys in URLs)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  RPC:
    endpoint: {}
    timeout: {}ms
  Stream:
    ws_url: {}
    reconnect_delay: {}ms
  Admission:
    token_max_age: {}s
    no_trade_timeout: {}s
    tax/bundler filter: {}
    skip_dev_first_token: {}
  Entry:
    min_tps: {}
    exceptional_momentum: {:+.0}%
    trade_size: {} SOL
    require_dev_sold: {}
  Exit:
    rug_liquidity_drop: {:.0}%
    migrate_fill: {:.0}%
    take_profit: {}
    base_trail_dd: {:.0}%
  ML:
    enabled: {}
    model_dir: {}
    pure_ml: {}
"#,
            mask_url(&self.rpc.endpoint),
            self.rpc.timeout_ms,
            mask_url(&self.stream.ws_url),
            self.stream.reconnect_delay_ms,
            self.admission.token_max_age,
            self.admission.no_trade_timeout_sec,
            self.admission.enable_tax_bundler_filter,
            self.admission.skip_dev_first_token,
            self.entry.min_tps,
            self.entry.exceptional_momentum_pct * 100.0,
            self.entry.trade_size_sol,
            self.entry.require_dev_sold,
            self.exit.rug_liquidity_drop_pct * 100.0,
            self.exit.migrate_fill_pct * 100.0,
            self.exit
                .take_profit
                .map(|tp| format!("{:+.0}%", tp * 100.0))
                .unwrap_or_else(|| "(unset)".to_string()),
            self.exit.base_trail_dd * 100.0,
            self.ml.lgbm_enabled,
            self.ml.lgbm_model_dir,
            self.ml.pure_ml,
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}
