//! Strategy engine
//!
//! Single-task state machine over all tracked tokens. Pool events admit
//! tokens, price events drive feature updates and entry/exit decisions,
//! and fire-and-forget probes re-enter the task as completion messages so
//! the hot path never blocks on RPC.
//!
//! A probe result or timer firing may arrive after its token was dropped;
//! every completion handler re-checks presence before mutating.

pub mod features;
pub mod indicators;
pub mod rolling;
pub mod state;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::events::{PoolEvent, PriceEvent, SellReason, Side, TrackRequest, TradeAction, TradeSignal};
use crate::journal::{FeatureRecord, FeatureStore, PredictionRecord};
use crate::ml::ModelSet;
use crate::risk::dev_exit::DevExitProbe;
use crate::risk::{RiskAssessor, RiskReport};

use features::{FeatureInputs, FeatureVector};
use state::{PnlBook, TokenState, DEV_PROBE_INTERVAL_SEC};

/// Messages consumed by the strategy task
#[derive(Debug)]
pub enum EngineEvent {
    Pool(PoolEvent),
    Price(PriceEvent),
    /// Risk probe finished for an admitted token
    RiskChecked { mint: String, report: RiskReport },
    /// Dev-exit probe finished
    DevProbe { mint: String, exited: bool },
    /// No-buy timer fired
    NoBuyTimeout { mint: String },
}

/// What the price pipeline decided about the token's continued tracking
enum Disposition {
    Keep,
    Untracked,
}

/// Snapshot of the engine's running totals
#[derive(Debug, Clone, Copy)]
pub struct EngineStats {
    pub tracked: usize,
    pub profit_sol: f64,
    pub invested_sol: f64,
    pub total_invested_sol: f64,
}

/// Channel endpoints the engine publishes and listens on
pub struct EngineChannels {
    /// Loops probe results and timer firings back into the engine task
    pub self_tx: mpsc::Sender<EngineEvent>,
    pub signal_tx: broadcast::Sender<TradeSignal>,
    /// Cumulative realized profit after every settle
    pub pnl_tx: broadcast::Sender<f64>,
    /// Subscription requests to the upstream trade source
    pub track_tx: Option<mpsc::UnboundedSender<TrackRequest>>,
}

/// Momentum strategy engine
pub struct StrategyEngine {
    cfg: Config,
    states: HashMap<String, TokenState>,
    dev_token_count: HashMap<String, u32>,
    dev_last_ticker: HashMap<String, String>,
    /// Creator wallet -> blacklist expiry (epoch seconds)
    dev_blacklist: HashMap<String, i64>,
    pnl: PnlBook,
    risk: Arc<RiskAssessor>,
    dev_probe: Arc<DevExitProbe>,
    models: ModelSet,
    journal: FeatureStore,
    channels: EngineChannels,
}

impl StrategyEngine {
    pub fn new(
        cfg: Config,
        risk: Arc<RiskAssessor>,
        dev_probe: Arc<DevExitProbe>,
        models: ModelSet,
        journal: FeatureStore,
        channels: EngineChannels,
    ) -> Self {
        Self {
            cfg,
            states: HashMap::new(),
            dev_token_count: HashMap::new(),
            dev_last_ticker: HashMap::new(),
            dev_blacklist: HashMap::new(),
            pnl: PnlBook::default(),
            risk,
            dev_probe,
            models,
            journal,
            channels,
        }
    }

    /// Consume engine events until the channel closes
    pub async fn run(mut self, mut rx: mpsc::Receiver<EngineEvent>) {
        info!("Strategy engine started");
        while let Some(event) = rx.recv().await {
            self.handle(event);
        }
        let stats = self.stats();
        info!(
            profit_sol = stats.profit_sol,
            total_invested_sol = stats.total_invested_sol,
            tracked = stats.tracked,
            "Strategy engine stopped"
        );
    }

    /// Apply a single event to the engine state
    pub fn handle(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Pool(pool) => self.on_pool(pool),
            EngineEvent::Price(price) => self.on_price(price),
            EngineEvent::RiskChecked { mint, report } => self.on_risk_checked(&mint, report),
            EngineEvent::DevProbe { mint, exited } => self.on_dev_probe(&mint, exited),
            EngineEvent::NoBuyTimeout { mint } => self.on_no_buy_timeout(&mint),
        }
    }

    pub fn is_tracked(&self, mint: &str) -> bool {
        self.states.contains_key(mint)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            tracked: self.states.len(),
            profit_sol: self.pnl.profit_sol,
            invested_sol: self.pnl.invested_sol,
            total_invested_sol: self.pnl.total_invested_sol,
        }
    }

    // ---- pool admission ----

    fn on_pool(&mut self, pool: PoolEvent) {
        let now = chrono::Utc::now().timestamp();
        let adm = self.cfg.admission.clone();

        // Same-ticker relaunch dedup
        if adm.skip_dev_same_ticker {
            if let (Some(dev), Some(symbol)) = (&pool.dev_wallet, &pool.symbol) {
                let ticker = symbol.to_lowercase();
                if self.dev_last_ticker.get(dev) == Some(&ticker) {
                    self.dev_last_ticker.insert(dev.clone(), ticker);
                    self.log_reject(&pool.mint, "same-ticker relaunch");
                    return;
                }
            }
        }
        if let (Some(dev), Some(symbol)) = (&pool.dev_wallet, &pool.symbol) {
            self.dev_last_ticker.insert(dev.clone(), symbol.to_lowercase());
        }

        if now - pool.created_at > adm.token_max_age {
            self.log_reject(&pool.mint, "pool older than token_max_age");
            return;
        }

        if pool.initial_mcap < adm.min_initial_mcap
            || pool.initial_mcap > adm.max_initial_liquidity_sol
        {
            self.log_reject(&pool.mint, "initial mcap out of bounds");
            return;
        }

        if self.states.contains_key(&pool.mint) {
            return;
        }

        let dev_first_token = match &pool.dev_wallet {
            Some(dev) => {
                let count = self.dev_token_count.entry(dev.clone()).or_insert(0);
                let first = *count == 0;
                *count += 1;
                first
            }
            None => false,
        };

        let mut state = TokenState::new(
            pool.symbol.clone(),
            pool.dev_wallet.clone(),
            now,
            pool.initial_mcap,
            dev_first_token,
            self.cfg.engine.tps_window_ms,
        );

        state.no_buy_timer = Some(self.spawn_no_buy_timer(pool.mint.clone()));

        if adm.enable_tax_bundler_filter {
            self.spawn_risk_probe(pool.mint.clone(), pool.signature.clone());
        } else {
            state.risk_checked = true;
        }

        info!(
            mint = %pool.mint,
            symbol = pool.symbol.as_deref().unwrap_or("?"),
            mcap = pool.initial_mcap,
            "Tracking new token"
        );
        self.states.insert(pool.mint.clone(), state);
        self.send_track_request(TrackRequest::Track(pool.mint));
    }

    fn on_risk_checked(&mut self, mint: &str, report: RiskReport) {
        // The token may have been dropped while the probe ran
        let Some(state) = self.states.get_mut(mint) else {
            debug!(mint = %mint, "Risk result for untracked token; discarding");
            return;
        };

        state.transfer_fee_bps = report.fee_bps;
        state.is_bundler = report.bundler;
        state.risk_checked = true;

        let adm = &self.cfg.admission;
        let fee_rejected = report
            .fee_bps
            .map_or(false, |fee| fee > adm.max_transfer_fee_bps);
        let bundler_rejected = report.bundler && !adm.allow_bundler;

        if fee_rejected {
            self.untrack(mint, "transfer fee above limit");
        } else if bundler_rejected {
            self.untrack(mint, "bundler-created mint");
        }
    }

    fn on_dev_probe(&mut self, mint: &str, exited: bool) {
        let Some(state) = self.states.get_mut(mint) else {
            return;
        };
        state.dev_probe_inflight = false;
        if exited && !state.dev_sold {
            state.dev_sold = true;
            debug!(mint = %mint, "Creator has fully exited");
        }
    }

    fn on_no_buy_timeout(&mut self, mint: &str) {
        let Some(state) = self.states.get(mint) else {
            return;
        };
        if !state.has_bought {
            self.untrack(mint, "no entry before timeout");
        }
    }

    // ---- price pipeline ----

    fn on_price(&mut self, price: PriceEvent) {
        let Some(mut state) = self.states.remove(&price.mint) else {
            return;
        };
        match self.price_pipeline(&mut state, &price) {
            Disposition::Keep => {
                self.states.insert(price.mint.clone(), state);
            }
            Disposition::Untracked => {
                drop(state);
                self.send_track_request(TrackRequest::Untrack(price.mint));
            }
        }
    }

    fn price_pipeline(&mut self, st: &mut TokenState, ev: &PriceEvent) -> Disposition {
        let eng = self.cfg.engine.clone();
        let entry_cfg = self.cfg.entry.clone();
        let exit_cfg = self.cfg.exit.clone();
        let token_max_age = self.cfg.admission.token_max_age;
        let skip_dev_first = self.cfg.admission.skip_dev_first_token;
        let pure_ml = self.cfg.ml.pure_ml;

        // First sight of the curve size
        if st.initial_tokens.is_none() && ev.tokens_curve > 0.0 {
            st.initial_tokens = Some(ev.tokens_curve);
        }

        // Liquidity floor. Only pre-entry: a live position settles through
        // the rug branch so the PnL books stay consistent.
        if !st.has_bought && ev.liquidity < eng.min_runtime_mcap_sol {
            self.log_reject(&ev.mint, "liquidity below runtime floor");
            return Disposition::Untracked;
        }
        st.liquidity = ev.liquidity;
        st.peak_liquidity = st.peak_liquidity.max(ev.liquidity);

        // Creator sell spotted: confirm on-chain, one probe at a time
        if !st.dev_sold {
            if let Some(dev) = st.dev_wallet.clone() {
                if ev.wallet == dev
                    && ev.side == Side::Sell
                    && !st.dev_probe_inflight
                    && ev.timestamp >= st.next_dev_check
                {
                    st.dev_probe_inflight = true;
                    st.next_dev_check = ev.timestamp + DEV_PROBE_INTERVAL_SEC;
                    self.spawn_dev_probe(ev.mint.clone(), dev);
                }
            }
        }

        // Rolling aggregates and indicators
        st.volume_sol += ev.sol;
        let ts_ms = ev.timestamp * 1_000;
        st.window.record(ts_ms, ev.sol, &ev.wallet);
        let dt_eff = eng.tps_window_ms as f64 / 1.0_f64.max(st.window.trade_count() as f64);
        st.ema.update(ev.price, dt_eff, eng.ema_short_ms, eng.ema_long_ms);
        st.atr.update(ev.price, eng.atr_window_sec);

        let metrics = st.window.metrics();

        let feats = FeatureVector::compute(&FeatureInputs {
            price: ev.price,
            liquidity: ev.liquidity,
            tps: metrics.tps,
            lowest_price: st.lowest_price,
            unique_wallets: metrics.unique_wallets,
            ema_gap: st.ema.gap(ev.price),
            atr: st.atr.value(),
            age_sec: st.age_sec(ev.timestamp),
            peak_since_entry: st.peak_since_entry,
            entry_price: st.entry_price,
        });

        // Pre-entry gates, short-circuit in order
        if !st.risk_checked {
            return Disposition::Keep;
        }
        if skip_dev_first && st.dev_first_token {
            self.log_reject(&ev.mint, "creator's first token");
            return Disposition::Untracked;
        }
        if entry_cfg.require_dev_sold && !st.dev_sold {
            return Disposition::Keep;
        }

        // Model-gated entry. The entry event itself never evaluates exits.
        if !st.has_bought {
            let buy_score = self.models.buy().map(|m| m.predict(feats.as_slice()));
            if let Some(score) = buy_score {
                let fired = score >= self.models.threshold_buy;
                self.record_prediction(ev, "buy", score, self.models.threshold_buy, fired);
                if fired {
                    self.open_position(st, ev, feats);
                    return Disposition::Keep;
                }
            }
        }

        if self.journal.features_enabled() {
            self.journal.record_features(&feature_record(st, ev, &feats));
        }

        // Rug: liquidity collapse from its peak while holding
        if st.has_bought {
            let rug_floor = st.peak_liquidity * (1.0 - exit_cfg.rug_liquidity_drop_pct);
            if ev.liquidity < rug_floor {
                warn!(
                    mint = %ev.mint,
                    liquidity = ev.liquidity,
                    peak = st.peak_liquidity,
                    "Liquidity collapse; exiting"
                );
                return self.close_position(st, ev, SellReason::Sl);
            }
        }

        st.highest_price = st.highest_price.max(ev.price);
        st.lowest_price = st.lowest_price.min(ev.price);

        // Heuristic entry
        if !st.has_bought && !pure_ml {
            if st.age_sec(ev.timestamp) > token_max_age {
                self.log_reject(&ev.mint, "stale without entry");
                return Disposition::Untracked;
            }
            if ev.liquidity < entry_cfg.min_liquidity_sol
                || st.volume_sol < entry_cfg.min_volume_sol
            {
                return Disposition::Keep;
            }
            if let Some(dev) = &st.dev_wallet {
                if self
                    .dev_blacklist
                    .get(dev)
                    .is_some_and(|expiry| *expiry > ev.timestamp)
                {
                    return Disposition::Keep;
                }
            }
            if metrics.tps < entry_cfg.min_tps
                || metrics.unique_wallets < entry_cfg.min_unique_wallets
                || metrics.avg_sol > entry_cfg.max_avg_sol_per_tx
            {
                return Disposition::Keep;
            }

            let rise = ev.price / st.lowest_price - 1.0;
            if rise >= entry_cfg.exceptional_momentum_pct {
                st.is_exceptional = true;
                self.open_position(st, ev, feats);
                return Disposition::Keep;
            }
        }

        // Model-gated exit
        if st.has_bought {
            let sell_score = self.models.sell().map(|m| m.predict(feats.as_slice()));
            if let Some(score) = sell_score {
                let fired = score >= self.models.threshold_sell;
                self.record_prediction(ev, "sell", score, self.models.threshold_sell, fired);
                if fired {
                    return self.close_position(st, ev, SellReason::Tp);
                }
            }
        }

        // Curve nearly depleted: exit before the migration halt
        if st.has_bought {
            if let Some(initial) = st.initial_tokens {
                if initial > 0.0 {
                    let fill = 1.0 - ev.tokens_curve / initial;
                    if fill >= exit_cfg.migrate_fill_pct {
                        info!(mint = %ev.mint, fill, "Curve nearly depleted; exiting");
                        return self.close_position(st, ev, SellReason::Tp);
                    }
                }
            }
        }

        // Adaptive exit
        if st.has_bought && !pure_ml {
            let Some(entry_price) = st.entry_price else {
                return Disposition::Keep;
            };
            let peak = st
                .peak_since_entry
                .map_or(ev.price, |peak| peak.max(ev.price));
            st.peak_since_entry = Some(peak);

            let pnl = ev.price / entry_price - 1.0;
            if let Some(tp) = exit_cfg.take_profit {
                if pnl >= tp {
                    return self.close_position(st, ev, SellReason::Tp);
                }
            }

            let extra_trail = ((metrics.tps / entry_cfg.min_tps - 1.0) * exit_cfg.tps_trail_scale)
                .clamp(0.0, 0.3);
            let gain_pct = peak / entry_price - 1.0;
            let gain_trail = (0.1 + gain_pct * 0.1).min(0.5);
            let dyn_trail = exit_cfg.base_trail_dd
                + extra_trail
                + gain_trail
                + if st.is_exceptional { 0.1 } else { 0.0 };
            let abs_trail = st.atr.value().unwrap_or(0.0) * exit_cfg.atr_mult;
            let allowed_drop = abs_trail.max(peak * dyn_trail);

            let ema_crossed_down =
                matches!((st.ema.short, st.ema.long), (Some(s), Some(l)) if s < l);

            if gain_pct < exit_cfg.disable_ema_tps_gain_pct && ema_crossed_down {
                debug!(mint = %ev.mint, "EMA cross-down before gains; exiting");
                return self.close_position(st, ev, SellReason::Sl);
            } else if gain_pct < 0.3 && metrics.tps < exit_cfg.exit_tps(entry_cfg.min_tps) {
                debug!(mint = %ev.mint, tps = metrics.tps, "Momentum collapse; exiting");
                return self.close_position(st, ev, SellReason::Sl);
            } else if ev.price <= peak - allowed_drop {
                debug!(
                    mint = %ev.mint,
                    peak,
                    allowed_drop,
                    "Trailing stop hit; exiting"
                );
                return self.close_position(st, ev, SellReason::Sl);
            }
        }

        Disposition::Keep
    }

    // ---- position lifecycle ----

    fn open_position(&mut self, st: &mut TokenState, ev: &PriceEvent, feats: FeatureVector) {
        let size = self.cfg.entry.trade_size_sol;
        st.entry_price = Some(ev.price);
        st.entry_sol = Some(size);
        st.entry_features = Some(feats);
        st.peak_since_entry = Some(ev.price);
        st.has_bought = true;
        st.cancel_no_buy_timer();
        self.pnl.open(size);

        if let Some(dev) = &st.dev_wallet {
            self.dev_blacklist
                .insert(dev.clone(), ev.timestamp + self.cfg.entry.dev_blacklist_sec);
        }

        info!(
            mint = %ev.mint,
            symbol = st.symbol.as_deref().unwrap_or("?"),
            price = ev.price,
            size_sol = size,
            "BUY"
        );
        self.send_signal(TradeSignal {
            mint: ev.mint.clone(),
            action: TradeAction::Buy,
            reason: None,
            symbol: st.symbol.clone(),
            price: Some(ev.price),
            time: Some(ev.timestamp),
        });
    }

    fn close_position(
        &mut self,
        st: &mut TokenState,
        ev: &PriceEvent,
        reason: SellReason,
    ) -> Disposition {
        let (Some(entry_price), Some(entry_sol)) = (st.entry_price, st.entry_sol) else {
            warn!(mint = %ev.mint, "Sell without an open position; dropping token");
            return Disposition::Untracked;
        };

        let pnl_sol = self.pnl.settle(entry_sol, entry_price, ev.price);
        info!(
            mint = %ev.mint,
            symbol = st.symbol.as_deref().unwrap_or("?"),
            reason = ?reason,
            exit_price = ev.price,
            pnl_sol,
            profit_sol = self.pnl.profit_sol,
            "SELL"
        );

        self.send_signal(TradeSignal {
            mint: ev.mint.clone(),
            action: TradeAction::Sell,
            reason: Some(reason),
            symbol: st.symbol.clone(),
            price: Some(ev.price),
            time: Some(ev.timestamp),
        });
        let _ = self.channels.pnl_tx.send(self.pnl.profit_sol);

        Disposition::Untracked
    }

    // ---- plumbing ----

    fn spawn_no_buy_timer(&self, mint: String) -> tokio::task::JoinHandle<()> {
        let timeout = Duration::from_secs(self.cfg.admission.no_trade_timeout_sec);
        let tx = self.channels.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(EngineEvent::NoBuyTimeout { mint }).await;
        })
    }

    fn spawn_risk_probe(&self, mint: String, create_tx: Option<String>) {
        let risk = self.risk.clone();
        let tx = self.channels.self_tx.clone();
        tokio::spawn(async move {
            let report = risk.assess(&mint, create_tx.as_deref()).await;
            let _ = tx.send(EngineEvent::RiskChecked { mint, report }).await;
        });
    }

    fn spawn_dev_probe(&self, mint: String, dev_wallet: String) {
        let probe = self.dev_probe.clone();
        let tx = self.channels.self_tx.clone();
        tokio::spawn(async move {
            let exited = probe.has_exited(&mint, &dev_wallet).await;
            let _ = tx.send(EngineEvent::DevProbe { mint, exited }).await;
        });
    }

    fn untrack(&mut self, mint: &str, reason: &str) {
        if self.states.remove(mint).is_some() {
            self.log_reject(mint, reason);
            self.send_track_request(TrackRequest::Untrack(mint.to_string()));
        }
    }

    fn send_signal(&self, signal: TradeSignal) {
        let _ = self.channels.signal_tx.send(signal);
    }

    fn send_track_request(&self, request: TrackRequest) {
        if let Some(tx) = &self.channels.track_tx {
            let _ = tx.send(request);
        }
    }

    fn record_prediction(
        &self,
        ev: &PriceEvent,
        model: &'static str,
        score: f64,
        threshold: f64,
        fired: bool,
    ) {
        if self.journal.predictions_enabled() {
            self.journal.record_prediction(&PredictionRecord {
                ts: ev.timestamp,
                mint: ev.mint.clone(),
                model,
                score,
                threshold,
                fired,
            });
        }
    }

    fn log_reject(&self, mint: &str, reason: &str) {
        if self.cfg.engine.debug_filters {
            info!(mint = %mint, reason, "Dropping token");
        } else {
            debug!(mint = %mint, reason, "Dropping token");
        }
    }
}

fn feature_record(st: &TokenState, ev: &PriceEvent, feats: &FeatureVector) -> FeatureRecord {
    let f = feats.as_slice();
    FeatureRecord {
        ts: ev.timestamp,
        mint: ev.mint.clone(),
        ln_price: f[0],
        ln_liquidity: f[1],
        tps_norm: f[2],
        rise_from_low: f[3],
        unique_wallets_norm: f[4],
        ema_gap: f[5],
        atr_ratio: f[6],
        age_min_norm: f[7],
        drawdown: f[8],
        rise_from_entry: f[9],
        has_bought: st.has_bought,
        fee_bps: st.transfer_fee_bps,
        bundler: st.is_bundler,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChain;
    use crate::ml::GbmModel;

    struct Harness {
        engine: StrategyEngine,
        self_rx: mpsc::Receiver<EngineEvent>,
        signal_rx: broadcast::Receiver<TradeSignal>,
        pnl_rx: broadcast::Receiver<f64>,
        track_rx: mpsc::UnboundedReceiver<TrackRequest>,
        base: i64,
    }

    impl Harness {
        fn new(cfg: Config) -> Self {
            Self::with_chain(cfg, MockChain::default())
        }

        fn with_chain(cfg: Config, chain: MockChain) -> Self {
            let chain = Arc::new(chain);
            let (self_tx, self_rx) = mpsc::channel(256);
            let (signal_tx, signal_rx) = broadcast::channel(256);
            let (pnl_tx, pnl_rx) = broadcast::channel(256);
            let (track_tx, track_rx) = mpsc::unbounded_channel();

            let risk = Arc::new(RiskAssessor::new(
                chain.clone(),
                cfg.admission.bundler_programs.clone(),
            ));
            let dev_probe = Arc::new(DevExitProbe::new(chain));

            let engine = StrategyEngine::new(
                cfg,
                risk,
                dev_probe,
                ModelSet::disabled(),
                FeatureStore::disabled(),
                EngineChannels {
                    self_tx,
                    signal_tx,
                    pnl_tx,
                    track_tx: Some(track_tx),
                },
            );

            Self {
                engine,
                self_rx,
                signal_rx,
                pnl_rx,
                track_rx,
                base: chrono::Utc::now().timestamp(),
            }
        }

        fn pool(&mut self, mint: &str, mcap: f64, dev: &str, symbol: &str) {
            let pool = PoolEvent {
                mint: mint.to_string(),
                created_at: self.base,
                initial_mcap: mcap,
                symbol: Some(symbol.to_string()),
                dev_wallet: Some(dev.to_string()),
                signature: Some("createsig".to_string()),
            };
            self.engine.handle(EngineEvent::Pool(pool));
        }

        fn price(&mut self, mint: &str, t: i64, price: f64, liquidity: f64, wallet: &str) {
            self.price_full(mint, t, price, liquidity, 0.1, wallet, Side::Buy, 1_000_000.0);
        }

        #[allow(clippy::too_many_arguments)]
        fn price_full(
            &mut self,
            mint: &str,
            t: i64,
            price: f64,
            liquidity: f64,
            sol: f64,
            wallet: &str,
            side: Side,
            tokens_curve: f64,
        ) {
            let ev = PriceEvent {
                mint: mint.to_string(),
                price,
                liquidity,
                sol,
                wallet: wallet.to_string(),
                tokens_curve,
                side,
                timestamp: self.base + t,
            };
            self.engine.handle(EngineEvent::Price(ev));
        }

        /// Drive a burst dense enough to clear the TPS gate, ending below
        /// the exceptional-momentum trigger.
        fn burst(&mut self, mint: &str, t: i64, liquidity: f64) {
            for i in 0..22 {
                let price = 1.0 + 1.8 * (i as f64 / 21.0); // 1.0 -> 2.8
                let wallet = format!("w{}", i);
                self.price(mint, t, price, liquidity, &wallet);
            }
        }

        /// Keep the tape busy at a constant price (holds TPS up without
        /// moving the extrema).
        fn hold_burst(&mut self, mint: &str, t: i64, price: f64) {
            for i in 0..22 {
                let wallet = format!("h{}", i);
                self.price(mint, t, price, 10.0, &wallet);
            }
        }

        fn signals(&mut self) -> Vec<TradeSignal> {
            let mut out = Vec::new();
            while let Ok(signal) = self.signal_rx.try_recv() {
                out.push(signal);
            }
            out
        }

        fn last_pnl(&mut self) -> Option<f64> {
            let mut last = None;
            while let Ok(p) = self.pnl_rx.try_recv() {
                last = Some(p);
            }
            last
        }

        fn track_requests(&mut self) -> Vec<TrackRequest> {
            let mut out = Vec::new();
            while let Ok(req) = self.track_rx.try_recv() {
                out.push(req);
            }
            out
        }
    }

    /// Defaults relaxed so the heuristic scenarios can drive entries with
    /// toy numbers: risk probe off, dev-sold gate off, runtime floor off.
    fn scenario_config() -> Config {
        let mut cfg = Config::default();
        cfg.admission.enable_tax_bundler_filter = false;
        cfg.entry.require_dev_sold = false;
        cfg.engine.min_runtime_mcap_sol = 0.0;
        cfg.exit.take_profit = Some(0.9);
        cfg
    }

    /// Run a full S1-style entry: admit with a pre-seeded dev, then a
    /// momentum burst and the +250% breakout trade.
    fn drive_buy(h: &mut Harness, mint: &str) {
        h.engine.dev_token_count.insert("devD".to_string(), 1);
        h.pool(mint, 10.0, "devD", "AAA");
        h.price(mint, 5, 1.0, 10.0, "w_first");
        h.burst(mint, 8, 10.0);
        h.price(mint, 9, 3.5, 10.0, "w_breakout");
    }

    #[tokio::test]
    async fn test_admission_creates_state() {
        let mut h = Harness::new(scenario_config());
        h.pool("mintA", 10.0, "dev1", "AAA");

        assert!(h.engine.is_tracked("mintA"));
        let st = h.engine.states.get("mintA").unwrap();
        assert_eq!(st.liquidity, 10.0);
        assert_eq!(st.peak_liquidity, 10.0);
        assert!(st.lowest_price.is_infinite());
        assert_eq!(st.highest_price, 0.0);
        assert!(!st.has_bought);
        assert!(st.risk_checked); // filter disabled in scenario config
        assert!(st.dev_first_token);
        assert_eq!(
            h.track_requests(),
            vec![TrackRequest::Track("mintA".to_string())]
        );
    }

    #[tokio::test]
    async fn test_admission_rejects_stale_pool() {
        let mut h = Harness::new(scenario_config());
        let pool = PoolEvent {
            mint: "old".to_string(),
            created_at: h.base - 700,
            initial_mcap: 10.0,
            symbol: None,
            dev_wallet: None,
            signature: None,
        };
        h.engine.handle(EngineEvent::Pool(pool));
        assert!(!h.engine.is_tracked("old"));
    }

    #[tokio::test]
    async fn test_admission_rejects_mcap_bounds() {
        let mut cfg = scenario_config();
        cfg.admission.min_initial_mcap = 5.0;
        cfg.admission.max_initial_liquidity_sol = 100.0;
        let mut h = Harness::new(cfg);

        h.pool("low", 1.0, "dev1", "LOW");
        assert!(!h.engine.is_tracked("low"));

        h.pool("high", 200.0, "dev1", "HIGH");
        assert!(!h.engine.is_tracked("high"));

        h.pool("ok", 50.0, "dev1", "OK");
        assert!(h.engine.is_tracked("ok"));
    }

    #[tokio::test]
    async fn test_admission_idempotent() {
        let mut h = Harness::new(scenario_config());
        h.pool("mintA", 10.0, "dev1", "AAA");
        h.pool("mintA", 99.0, "dev1", "AAA");

        let st = h.engine.states.get("mintA").unwrap();
        assert_eq!(st.liquidity, 10.0); // second event ignored
        assert_eq!(h.engine.dev_token_count["dev1"], 1); // dedup precedes counting
    }

    #[tokio::test]
    async fn test_same_ticker_relaunch_rejected() {
        let mut cfg = scenario_config();
        cfg.admission.skip_dev_same_ticker = true;
        let mut h = Harness::new(cfg);

        h.pool("first", 10.0, "dev1", "AAA");
        assert!(h.engine.is_tracked("first"));

        h.pool("relaunch", 10.0, "dev1", "aaa");
        assert!(!h.engine.is_tracked("relaunch"));

        h.pool("fresh", 10.0, "dev1", "BBB");
        assert!(h.engine.is_tracked("fresh"));
    }

    #[tokio::test]
    async fn test_risk_rejection_by_fee() {
        let mut cfg = scenario_config();
        cfg.admission.enable_tax_bundler_filter = true;
        let mut h = Harness::new(cfg);

        h.pool("taxed", 10.0, "dev1", "TAX");
        h.engine.handle(EngineEvent::RiskChecked {
            mint: "taxed".to_string(),
            report: RiskReport {
                fee_bps: Some(100),
                bundler: false,
            },
        });

        assert!(!h.engine.is_tracked("taxed"));
        assert!(h.signals().is_empty());
    }

    #[tokio::test]
    async fn test_risk_bundler_rejected_unless_allowed() {
        let mut cfg = scenario_config();
        cfg.admission.enable_tax_bundler_filter = true;
        let mut h = Harness::new(cfg);

        h.pool("bundled", 10.0, "dev1", "BND");
        h.engine.handle(EngineEvent::RiskChecked {
            mint: "bundled".to_string(),
            report: RiskReport {
                fee_bps: Some(0),
                bundler: true,
            },
        });
        assert!(!h.engine.is_tracked("bundled"));

        let mut cfg = scenario_config();
        cfg.admission.enable_tax_bundler_filter = true;
        cfg.admission.allow_bundler = true;
        let mut h = Harness::new(cfg);
        h.pool("bundled2", 10.0, "dev1", "BND");
        h.engine.handle(EngineEvent::RiskChecked {
            mint: "bundled2".to_string(),
            report: RiskReport {
                fee_bps: Some(0),
                bundler: true,
            },
        });
        assert!(h.engine.is_tracked("bundled2"));
    }

    #[tokio::test]
    async fn test_risk_failure_is_fail_open() {
        let mut cfg = scenario_config();
        cfg.admission.enable_tax_bundler_filter = true;
        let mut h = Harness::new(cfg);

        h.pool("unknown", 10.0, "dev1", "UNK");
        h.engine.handle(EngineEvent::RiskChecked {
            mint: "unknown".to_string(),
            report: RiskReport {
                fee_bps: None,
                bundler: false,
            },
        });

        assert!(h.engine.is_tracked("unknown"));
        assert!(h.engine.states.get("unknown").unwrap().risk_checked);
    }

    #[tokio::test]
    async fn test_risk_result_after_untrack_discarded() {
        let mut cfg = scenario_config();
        cfg.admission.enable_tax_bundler_filter = true;
        let mut h = Harness::new(cfg);

        h.pool("gone", 10.0, "dev1", "GON");
        h.engine.untrack("gone", "test");
        h.engine.handle(EngineEvent::RiskChecked {
            mint: "gone".to_string(),
            report: RiskReport::default(),
        });
        assert!(!h.engine.is_tracked("gone"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_buy_timeout_untracks() {
        let mut h = Harness::new(scenario_config());
        h.pool("quiet", 10.0, "dev1", "QT");
        assert!(h.engine.is_tracked("quiet"));

        // Paused clock advances once the test awaits; the 60s timer fires
        let event = h.self_rx.recv().await.unwrap();
        assert!(matches!(event, EngineEvent::NoBuyTimeout { ref mint } if mint == "quiet"));
        h.engine.handle(event);

        assert!(!h.engine.is_tracked("quiet"));
        assert!(h.signals().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stray_timeout_after_buy_is_ignored() {
        let mut h = Harness::new(scenario_config());
        drive_buy(&mut h, "mintS");
        assert!(h.engine.states.get("mintS").unwrap().has_bought);

        h.engine.handle(EngineEvent::NoBuyTimeout {
            mint: "mintS".to_string(),
        });
        assert!(h.engine.is_tracked("mintS"));
    }

    #[tokio::test]
    async fn test_s1_heuristic_buy_then_take_profit() {
        let mut h = Harness::new(scenario_config());
        drive_buy(&mut h, "mintS1");

        let signals = h.signals();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].action, TradeAction::Buy);
        assert_eq!(signals[0].price, Some(3.5));

        let st = h.engine.states.get("mintS1").unwrap();
        assert!(st.has_bought);
        assert!(st.is_exceptional);
        assert_eq!(st.entry_price, Some(3.5));
        assert_eq!(st.entry_sol, Some(0.5));

        // pnl = 6.65 / 3.5 - 1 = 0.9 >= take_profit
        h.price("mintS1", 20, 6.65, 10.0, "w_exit");

        let signals = h.signals();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].action, TradeAction::Sell);
        assert_eq!(signals[0].reason, Some(SellReason::Tp));
        assert!(!h.engine.is_tracked("mintS1"));
        assert!((h.last_pnl().unwrap() - 0.45).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_s2_rug_liquidity_collapse() {
        let mut h = Harness::new(scenario_config());
        drive_buy(&mut h, "mintS2");
        h.signals(); // drain the BUY

        // peak liquidity 10; 5.9 < 10 * 0.6 triggers the rug branch at the
        // trade's own price
        h.price("mintS2", 15, 2.8, 5.9, "w_rug");

        let signals = h.signals();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].action, TradeAction::Sell);
        assert_eq!(signals[0].reason, Some(SellReason::Sl));
        assert_eq!(signals[0].price, Some(2.8));
        assert!(!h.engine.is_tracked("mintS2"));

        let expected = 0.5 * (2.8 / 3.5 - 1.0);
        assert!((h.last_pnl().unwrap() - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_s5_migration_fill_exit() {
        let mut h = Harness::new(scenario_config());
        drive_buy(&mut h, "mintS5");
        h.signals();

        // initial_tokens was recorded as 1_000_000 on the first price event;
        // 20_000 left = 98% filled
        h.price_full(
            "mintS5",
            15,
            4.0,
            10.0,
            0.1,
            "w_mig",
            Side::Buy,
            20_000.0,
        );

        let signals = h.signals();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].action, TradeAction::Sell);
        assert_eq!(signals[0].reason, Some(SellReason::Tp));
        assert!(!h.engine.is_tracked("mintS5"));
    }

    #[tokio::test]
    async fn test_s6_pure_ml_replaces_heuristics() {
        let buy_model = GbmModel::from_json(
            r#"{"num_trees": 1, "tree_info": [{"tree_structure": {"leaf_value": 1.4}}]}"#,
        )
        .unwrap();
        let sell_model = GbmModel::from_json(
            r#"{"num_trees": 1, "tree_info": [{"tree_structure": {"leaf_value": 2.2}}]}"#,
        )
        .unwrap();

        let mut cfg = scenario_config();
        cfg.ml.lgbm_enabled = true;
        cfg.ml.pure_ml = true;
        let mut h = Harness::new(cfg);
        h.engine.models = ModelSet::from_models(Some(buy_model), Some(sell_model), 0.5, 0.5);

        h.engine.dev_token_count.insert("devD".to_string(), 1);
        h.pool("mintS6", 10.0, "devD", "MLX");

        // No burst, no momentum: the model alone drives the entry
        h.price("mintS6", 1, 1.0, 10.0, "w1");
        let signals = h.signals();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].action, TradeAction::Buy);

        // Next trade scores above the sell threshold
        h.price("mintS6", 2, 1.1, 10.0, "w2");
        let signals = h.signals();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].action, TradeAction::Sell);
        assert_eq!(signals[0].reason, Some(SellReason::Tp));
        assert!(!h.engine.is_tracked("mintS6"));
    }

    #[tokio::test]
    async fn test_heuristic_gates_block_quiet_tokens() {
        let mut h = Harness::new(scenario_config());
        h.engine.dev_token_count.insert("devD".to_string(), 1);
        h.pool("quiet", 10.0, "devD", "QT");

        // A lone +300% trade without the TPS backdrop must not enter
        h.price("quiet", 5, 1.0, 10.0, "w1");
        h.price("quiet", 6, 4.0, 10.0, "w2");

        assert!(h.signals().is_empty());
        assert!(h.engine.is_tracked("quiet"));
    }

    #[tokio::test]
    async fn test_whale_average_blocks_entry() {
        let mut h = Harness::new(scenario_config());
        h.engine.dev_token_count.insert("devD".to_string(), 1);
        h.pool("whale", 10.0, "devD", "WHL");

        h.price("whale", 5, 1.0, 10.0, "w_first");
        // Dense burst but each trade is 5 SOL: avg > max_avg_sol_per_tx
        for i in 0..22 {
            let price = 1.0 + 2.5 * (i as f64 / 21.0);
            h.price_full("whale", 8, price, 10.0, 5.0, &format!("w{}", i), Side::Buy, 1_000_000.0);
        }

        assert!(h.signals().is_empty());
    }

    #[tokio::test]
    async fn test_dev_blacklist_blocks_next_launch() {
        let mut h = Harness::new(scenario_config());
        drive_buy(&mut h, "first");
        h.signals();

        // Same dev launches again inside the cooldown
        h.pool("second", 10.0, "devD", "BBB");
        h.price("second", 10, 1.0, 10.0, "w_first");
        h.burst("second", 13, 10.0);
        h.price("second", 14, 3.5, 10.0, "w_breakout");

        assert!(h.signals().is_empty());
        assert!(h.engine.is_tracked("second"));
    }

    #[tokio::test]
    async fn test_liquidity_floor_untracks_only_pre_entry() {
        let mut cfg = scenario_config();
        cfg.engine.min_runtime_mcap_sol = 30.0;
        let mut h = Harness::new(cfg);
        h.engine.dev_token_count.insert("devD".to_string(), 1);

        h.pool("thin", 50.0, "devD", "THN");
        h.price("thin", 1, 1.0, 10.0, "w1");
        assert!(!h.engine.is_tracked("thin"));
        assert!(h.signals().is_empty());

        // With a live position the floor no longer untracks: dipping below
        // it (but above the rug threshold) keeps the position open
        let mut cfg = scenario_config();
        cfg.engine.min_runtime_mcap_sol = 8.0;
        let mut h = Harness::new(cfg);
        drive_buy(&mut h, "held");
        h.signals();

        h.price("held", 10, 3.5, 7.0, "w_dip"); // 7 < floor 8, above rug 6
        assert!(h.engine.is_tracked("held"));
        assert!(h.signals().is_empty());
    }

    #[tokio::test]
    async fn test_dev_first_token_untracked_on_price() {
        let mut h = Harness::new(scenario_config());
        h.pool("debut", 10.0, "newdev", "NEW");
        assert!(h.engine.is_tracked("debut"));

        h.price("debut", 1, 1.0, 10.0, "w1");
        assert!(!h.engine.is_tracked("debut"));
    }

    #[tokio::test]
    async fn test_dev_sell_probe_flow_and_gate() {
        let mut cfg = scenario_config();
        cfg.entry.require_dev_sold = true;
        let chain = MockChain {
            balances: vec![0.0],
            ..Default::default()
        };
        let mut h = Harness::with_chain(cfg, chain);
        h.engine.dev_token_count.insert("devD".to_string(), 1);
        h.pool("gated", 10.0, "devD", "GTD");

        // Entry-quality momentum, but the dev has not sold yet
        h.price("gated", 5, 1.0, 10.0, "w_first");
        h.burst("gated", 8, 10.0);
        h.price("gated", 9, 3.5, 10.0, "w_breakout");
        assert!(h.signals().is_empty());

        // Dev sell shows up on the tape; the probe confirms a full exit
        h.price_full("gated", 10, 3.4, 10.0, -0.5, "devD", Side::Sell, 1_000_000.0);
        assert!(h.engine.states.get("gated").unwrap().dev_probe_inflight);

        let event = h.self_rx.recv().await.unwrap();
        assert!(matches!(event, EngineEvent::DevProbe { exited: true, .. }));
        h.engine.handle(event);
        assert!(h.engine.states.get("gated").unwrap().dev_sold);

        // A second dev sell inside the 15s spacing schedules nothing
        h.price_full("gated", 11, 3.4, 10.0, -0.5, "devD", Side::Sell, 1_000_000.0);
        assert!(!h.engine.states.get("gated").unwrap().dev_probe_inflight);

        // Momentum still present: now the entry goes through
        h.burst("gated", 12, 10.0);
        h.price("gated", 13, 3.6, 10.0, "w_late");
        let signals = h.signals();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].action, TradeAction::Buy);
    }

    #[tokio::test]
    async fn test_trailing_stop_exit() {
        let mut cfg = scenario_config();
        cfg.exit.take_profit = None;
        let mut h = Harness::new(cfg);
        drive_buy(&mut h, "trail");
        h.signals();

        // Double from entry on a busy tape; gain >= 30% disables the
        // weak-signal exits, leaving only the trail
        h.hold_burst("trail", 11, 7.0);
        assert!(h.engine.is_tracked("trail"));
        let st = h.engine.states.get("trail").unwrap();
        assert_eq!(st.peak_since_entry, Some(7.0));
        assert!(h.signals().is_empty());

        // Collapse far below any trail allowance
        h.price("trail", 12, 1.0, 10.0, "w_down");

        let signals = h.signals();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].action, TradeAction::Sell);
        assert_eq!(signals[0].reason, Some(SellReason::Sl));
        assert!(!h.engine.is_tracked("trail"));
    }

    #[tokio::test]
    async fn test_momentum_collapse_exit() {
        let mut cfg = scenario_config();
        cfg.exit.take_profit = None;
        let mut h = Harness::new(cfg);
        drive_buy(&mut h, "fade");
        h.signals();

        // One lonely trade 30s later: window TPS is far below exit_tps and
        // the position never gained 30%
        h.price("fade", 40, 3.55, 10.0, "w_lone");

        let signals = h.signals();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].reason, Some(SellReason::Sl));
    }

    #[tokio::test]
    async fn test_extrema_are_monotonic() {
        let mut h = Harness::new(scenario_config());
        h.engine.dev_token_count.insert("devD".to_string(), 1);
        h.pool("extrema", 10.0, "devD", "EXT");

        let mut prev_high = 0.0;
        let mut prev_low = f64::INFINITY;
        for (t, price) in [(1, 2.0), (2, 1.0), (3, 3.0), (4, 0.5), (5, 0.9)] {
            h.price("extrema", t, price, 10.0, "w1");
            let st = h.engine.states.get("extrema").unwrap();
            assert!(st.highest_price >= prev_high);
            assert!(st.lowest_price <= prev_low);
            prev_high = st.highest_price;
            prev_low = st.lowest_price;
        }
    }

    #[tokio::test]
    async fn test_price_for_unknown_mint_ignored() {
        let mut h = Harness::new(scenario_config());
        h.price("ghost", 1, 1.0, 10.0, "w1");
        assert!(h.signals().is_empty());
        assert!(h.track_requests().is_empty());
    }

    #[tokio::test]
    async fn test_at_most_one_buy_one_sell() {
        let mut h = Harness::new(scenario_config());
        drive_buy(&mut h, "once");

        // Continued qualifying momentum must not re-enter
        h.hold_burst("once", 10, 3.6);

        let buys = h
            .signals()
            .iter()
            .filter(|s| s.action == TradeAction::Buy)
            .count();
        assert_eq!(buys, 1);

        // Exit, then replay the exit trigger: the token is gone
        h.price("once", 20, 6.65, 10.0, "w_exit");
        assert_eq!(h.signals().len(), 1);
        h.price("once", 21, 6.65, 10.0, "w_exit2");
        assert!(h.signals().is_empty());
    }
}
