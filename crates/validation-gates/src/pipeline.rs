use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use decision_core::cache::TtlCache;
use decision_core::config::ModeConfig;
use decision_core::ports::MarketDataPort;
use decision_core::types::{
    Candle, Direction, GateResult, RejectionTracker, TrendDirection, TrendHealth,
};
use indicators::{detect_trend, last_ema, vwap};

use crate::confluence::{check_entry_confluence, ConfluenceResult};
use crate::counter_trend::validate_counter_trend;
use crate::divergence::detect_divergence;

const VWAP_TOLERANCE_PERCENT: f64 = 0.2;
const TREND_HISTORY_BARS: usize = 100;

/// Everything one gate run needs about the evaluation in flight
pub struct GateContext<'a> {
    pub symbol: &'a str,
    pub direction: Direction,
    pub current_price: f64,
    /// Analysis-timeframe candles, ascending
    pub candles: &'a [Candle],
    pub config: &'a ModeConfig,
    /// Trend health captured when the symbol was scanned, if any
    pub scan_trend: Option<&'a TrendHealth>,
    /// Trend health on the mode's trend timeframe at decision time
    pub decision_trend: &'a TrendHealth,
    /// Fused signal strength, 0-100
    pub strength: f64,
}

/// Result of a full pipeline run. `penalty` multiplies into technical
/// confidence downstream; a failed confluence result replaces it entirely.
pub struct GateOutcome {
    pub tracker: RejectionTracker,
    pub penalty: f64,
    pub confluence: Option<ConfluenceResult>,
    pub passed: bool,
}

/// The ordered veto-gate pipeline. Gates run cheapest first and a hard veto
/// stops evaluation, keeping every finding recorded so far. Gates that need
/// market data fail open so API trouble never blocks by itself.
pub struct GatePipeline {
    market: Arc<dyn MarketDataPort>,
    higher_tf_cache: TtlCache<TrendDirection>,
    reference_cache: TtlCache<TrendDirection>,
    reference_symbol: String,
    reference_timeframe: String,
}

impl GatePipeline {
    pub fn new(
        market: Arc<dyn MarketDataPort>,
        reference_symbol: impl Into<String>,
        reference_timeframe: impl Into<String>,
        trend_cache_ttl_secs: i64,
    ) -> Self {
        Self {
            market,
            higher_tf_cache: TtlCache::new(trend_cache_ttl_secs),
            reference_cache: TtlCache::new(trend_cache_ttl_secs),
            reference_symbol: reference_symbol.into(),
            reference_timeframe: reference_timeframe.into(),
        }
    }

    pub fn clear_caches(&self) {
        self.higher_tf_cache.clear();
        self.reference_cache.clear();
    }

    /// Re-prime the reference-asset trend cache. Used by the background
    /// refresh task.
    pub async fn refresh_reference_trend(&self) {
        let key = format!("{}:{}", self.reference_symbol, self.reference_timeframe);
        match self
            .market
            .get_candles(
                &self.reference_symbol,
                &self.reference_timeframe,
                TREND_HISTORY_BARS,
            )
            .await
        {
            Ok(candles) if candles.len() >= 50 => {
                let trend = detect_trend(&candles);
                self.reference_cache.insert(key, trend);
                debug!(trend = trend.as_str(), "reference trend refreshed");
            }
            Ok(candles) => {
                debug!(bars = candles.len(), "reference trend refresh skipped, short history");
            }
            Err(err) => {
                warn!(error = %err, "reference trend refresh failed");
            }
        }
    }

    pub async fn run(&self, ctx: &GateContext<'_>) -> GateOutcome {
        let mut tracker = RejectionTracker::default();
        let mut penalty = 1.0;
        let mut confluence = None;

        // 1. Price vs EMA, instant
        if ctx.config.gates.price_vs_ema {
            tracker.record(self.check_price_vs_ema(ctx));
            if tracker.has_hard_veto() {
                return finish(ctx, tracker, penalty, confluence);
            }
        }

        // 2. VWAP band, instant
        if ctx.config.gates.vwap_band {
            tracker.record(self.check_vwap_band(ctx));
            if tracker.has_hard_veto() {
                return finish(ctx, tracker, penalty, confluence);
            }
        }

        // 3. Higher-timeframe trend, may fetch
        if ctx.config.gates.higher_timeframe_trend {
            tracker.record(self.check_higher_tf(ctx).await);
            if tracker.has_hard_veto() {
                return finish(ctx, tracker, penalty, confluence);
            }
        }

        // 4. Reference-asset trend, may fetch
        if ctx.config.gates.reference_trend {
            tracker.record(self.check_reference_trend(ctx).await);
            if tracker.has_hard_veto() {
                return finish(ctx, tracker, penalty, confluence);
            }
        }

        // 5. ADX strength
        if ctx.config.gates.adx_strength {
            let (result, gate_penalty) = self.check_adx_strength(ctx);
            penalty *= gate_penalty;
            tracker.record(result);
            if tracker.has_hard_veto() {
                return finish(ctx, tracker, penalty, confluence);
            }
        }

        // 6. Scan-time vs decision-time trend divergence
        if ctx.config.gates.timeframe_divergence {
            if let Some(result) = self.check_divergence(ctx) {
                tracker.record(result);
                if tracker.has_hard_veto() {
                    return finish(ctx, tracker, penalty, confluence);
                }
            }
        }

        // 7. Entry confluence, five checks
        if ctx.config.gates.entry_confluence {
            let result = check_entry_confluence(ctx.candles, ctx.direction, ctx.config);
            let detail = json!({
                "score": result.score,
                "adx": result.adx_valid,
                "vwap": result.vwap_valid,
                "volume": result.volume_valid,
                "pivot": result.pivot_valid,
                "ema": result.ema_valid,
            });
            if result.passed {
                tracker.record(
                    GateResult::pass(
                        "entry_confluence",
                        format!(
                            "{}/5 confirmations (need {})",
                            result.score, ctx.config.required_confluence
                        ),
                    )
                    .with_detail(detail),
                );
            } else {
                tracker.record(
                    GateResult::soft_fail(
                        "entry_confluence",
                        format!(
                            "{}/5 confirmations, need {}",
                            result.score, ctx.config.required_confluence
                        ),
                    )
                    .with_detail(detail),
                );
            }
            confluence = Some(result);
        }

        // 8. Counter-trend validation, only when fighting the trend timeframe
        if ctx.config.gates.counter_trend {
            tracker.record(self.check_counter_trend(ctx));
        }

        finish(ctx, tracker, penalty, confluence)
    }

    fn check_price_vs_ema(&self, ctx: &GateContext<'_>) -> GateResult {
        let ema20 = last_ema(ctx.candles, 20);
        if ema20 <= 0.0 {
            return GateResult::pass("price_vs_ema", "EMA not available, skipped");
        }

        match ctx.direction {
            Direction::Long if ctx.current_price < ema20 => GateResult::veto(
                "price_vs_ema",
                format!(
                    "Price {:.4} below EMA20 ({:.4}) for long entry",
                    ctx.current_price, ema20
                ),
            ),
            Direction::Short if ctx.current_price > ema20 => GateResult::veto(
                "price_vs_ema",
                format!(
                    "Price {:.4} above EMA20 ({:.4}) for short entry",
                    ctx.current_price, ema20
                ),
            ),
            _ => GateResult::pass(
                "price_vs_ema",
                format!("Price {:.4} vs EMA20 {:.4} ok", ctx.current_price, ema20),
            ),
        }
    }

    fn check_vwap_band(&self, ctx: &GateContext<'_>) -> GateResult {
        let vwap_val = vwap(ctx.candles, 20);
        if vwap_val <= 0.0 {
            return GateResult::pass("vwap_band", "VWAP not available, skipped");
        }

        let tolerance = vwap_val * VWAP_TOLERANCE_PERCENT / 100.0;
        match ctx.direction {
            Direction::Long if ctx.current_price < vwap_val - tolerance => GateResult::veto(
                "vwap_band",
                format!(
                    "Price {:.4} below VWAP ({:.4}, tolerance {:.2}%) for long entry",
                    ctx.current_price, vwap_val, VWAP_TOLERANCE_PERCENT
                ),
            ),
            Direction::Short if ctx.current_price > vwap_val + tolerance => GateResult::veto(
                "vwap_band",
                format!(
                    "Price {:.4} above VWAP ({:.4}, tolerance {:.2}%) for short entry",
                    ctx.current_price, vwap_val, VWAP_TOLERANCE_PERCENT
                ),
            ),
            _ => GateResult::pass(
                "vwap_band",
                format!("Price {:.4} within VWAP band ({:.4})", ctx.current_price, vwap_val),
            ),
        }
    }

    async fn check_higher_tf(&self, ctx: &GateContext<'_>) -> GateResult {
        let timeframe = &ctx.config.trend_timeframe;
        let key = format!("{}:{}", ctx.symbol, timeframe);

        let trend = match self.higher_tf_cache.get(&key) {
            Some(trend) => trend,
            None => {
                match self
                    .market
                    .get_candles(ctx.symbol, timeframe, TREND_HISTORY_BARS)
                    .await
                {
                    Ok(candles) if candles.len() >= 50 => {
                        let trend = detect_trend(&candles);
                        self.higher_tf_cache.insert(key, trend);
                        trend
                    }
                    Ok(candles) => {
                        return GateResult::pass(
                            "higher_timeframe_trend",
                            format!("Insufficient {} history ({} bars), skipped", timeframe, candles.len()),
                        );
                    }
                    Err(err) => {
                        warn!(symbol = ctx.symbol, error = %err, "higher TF fetch failed, not blocking");
                        return GateResult::pass(
                            "higher_timeframe_trend",
                            "Trend fetch failed, not blocking",
                        );
                    }
                }
            }
        };

        evaluate_trend_alignment("higher_timeframe_trend", timeframe, trend, ctx.direction)
    }

    async fn check_reference_trend(&self, ctx: &GateContext<'_>) -> GateResult {
        let base = self.reference_symbol.trim_end_matches("USDT");
        if !base.is_empty() && ctx.symbol.starts_with(base) {
            return GateResult::pass(
                "reference_trend",
                format!("{} bypasses the reference check", ctx.symbol),
            );
        }

        let key = format!("{}:{}", self.reference_symbol, self.reference_timeframe);
        let trend = match self.reference_cache.get(&key) {
            Some(trend) => trend,
            None => {
                match self
                    .market
                    .get_candles(
                        &self.reference_symbol,
                        &self.reference_timeframe,
                        TREND_HISTORY_BARS,
                    )
                    .await
                {
                    Ok(candles) if candles.len() >= 50 => {
                        let trend = detect_trend(&candles);
                        self.reference_cache.insert(key, trend);
                        trend
                    }
                    Ok(_) => TrendDirection::Neutral,
                    Err(err) => {
                        warn!(symbol = ctx.symbol, error = %err, "reference trend fetch failed, not blocking");
                        return GateResult::pass(
                            "reference_trend",
                            "Reference trend fetch failed, not blocking",
                        );
                    }
                }
            }
        };

        match (ctx.direction, trend) {
            (Direction::Long, TrendDirection::Bearish) => GateResult::veto(
                "reference_trend",
                format!(
                    "{} bearish on {}, blocking altcoin long",
                    self.reference_symbol, self.reference_timeframe
                ),
            ),
            (Direction::Short, TrendDirection::Bullish) => GateResult::veto(
                "reference_trend",
                format!(
                    "{} bullish on {}, blocking altcoin short",
                    self.reference_symbol, self.reference_timeframe
                ),
            ),
            _ => GateResult::pass(
                "reference_trend",
                format!(
                    "{} trend {} compatible with {}",
                    self.reference_symbol,
                    trend.as_str(),
                    ctx.direction.as_str()
                ),
            ),
        }
    }

    /// Primary: ADX at or above the mode threshold. Alternative: either DI at
    /// the floor passes with a 0.95 penalty. Both failing is a hard veto and
    /// records the 0.90 penalty that applied.
    fn check_adx_strength(&self, ctx: &GateContext<'_>) -> (GateResult, f64) {
        let adx = ctx.decision_trend.adx;
        let plus_di = ctx.decision_trend.plus_di;
        let minus_di = ctx.decision_trend.minus_di;
        let threshold = ctx.config.min_adx;

        if adx >= threshold {
            return (
                GateResult::pass(
                    "adx_strength",
                    format!("ADX {:.1} at or above {:.1}", adx, threshold),
                )
                .with_detail(json!({ "penalty": 1.0 })),
                1.0,
            );
        }

        if plus_di >= ctx.config.di_floor || minus_di >= ctx.config.di_floor {
            return (
                GateResult::pass(
                    "adx_strength",
                    format!(
                        "ADX {:.1} below {:.1} but DI strong (+DI {:.1}, -DI {:.1}), 5% penalty",
                        adx, threshold, plus_di, minus_di
                    ),
                )
                .with_detail(json!({ "penalty": 0.95 })),
                0.95,
            );
        }

        (
            GateResult::veto(
                "adx_strength",
                format!(
                    "ADX {:.1} below {:.1} and no directional strength (+DI {:.1}, -DI {:.1})",
                    adx, threshold, plus_di, minus_di
                ),
            )
            .with_detail(json!({ "penalty": 0.90 })),
            0.90,
        )
    }

    fn check_divergence(&self, ctx: &GateContext<'_>) -> Option<GateResult> {
        let scan = ctx.scan_trend?;
        let div = detect_divergence(scan, ctx.decision_trend, ctx.config.block_on_divergence);

        let detail = json!({ "severity": div.severity.as_str() });
        let result = if div.should_block {
            GateResult::veto("timeframe_divergence", div.reason).with_detail(detail)
        } else if div.detected {
            GateResult::pass(
                "timeframe_divergence",
                format!("{} divergence, not blocking: {}", div.severity.as_str(), div.reason),
            )
            .with_detail(detail)
        } else {
            GateResult::pass("timeframe_divergence", "Timeframes agree").with_detail(detail)
        };

        Some(result)
    }

    fn check_counter_trend(&self, ctx: &GateContext<'_>) -> GateResult {
        let against_trend = matches!(
            (ctx.direction, ctx.decision_trend.direction),
            (Direction::Long, TrendDirection::Bearish)
                | (Direction::Short, TrendDirection::Bullish)
        );
        if !against_trend {
            return GateResult::pass("counter_trend", "Entry aligns with the trend timeframe");
        }

        match validate_counter_trend(ctx.candles, ctx.direction, ctx.strength, ctx.config) {
            None => GateResult::pass(
                "counter_trend",
                "Reversal evidence supports the counter-trend entry",
            ),
            Some(reason) => GateResult::veto("counter_trend", reason),
        }
    }
}

fn evaluate_trend_alignment(
    gate: &str,
    timeframe: &str,
    trend: TrendDirection,
    direction: Direction,
) -> GateResult {
    match (direction, trend) {
        (Direction::Long, TrendDirection::Bearish) => GateResult::veto(
            gate,
            format!("{} trend bearish, blocking long entry", timeframe),
        ),
        (Direction::Short, TrendDirection::Bullish) => GateResult::veto(
            gate,
            format!("{} trend bullish, blocking short entry", timeframe),
        ),
        _ => GateResult::pass(
            gate,
            format!(
                "{} trend {} aligns with {}",
                timeframe,
                trend.as_str(),
                direction.as_str()
            ),
        ),
    }
}

fn finish(
    ctx: &GateContext<'_>,
    tracker: RejectionTracker,
    penalty: f64,
    confluence: Option<ConfluenceResult>,
) -> GateOutcome {
    let passed = !tracker.has_hard_veto();
    if passed {
        info!(
            symbol = ctx.symbol,
            direction = ctx.direction.as_str(),
            gates = tracker.results.len(),
            "all gates passed"
        );
    } else if let Some(veto) = tracker.first_veto() {
        info!(
            symbol = ctx.symbol,
            gate = %veto.gate,
            reason = %veto.reason,
            "gate pipeline vetoed entry"
        );
    }

    GateOutcome {
        tracker,
        penalty,
        confluence,
        passed,
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Utc;
    use decision_core::error::DecisionError;
    use decision_core::types::{Ticker24h, TradingMode};

    use super::*;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            open_time: Utc::now(),
            open,
            high,
            low,
            close,
            volume: 1_000_000.0,
        }
    }

    fn uptrend(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 100.0 + i as f64;
                candle(base, base + 1.5, base - 0.5, base + 1.0)
            })
            .collect()
    }

    struct StubMarket {
        candles: Vec<Candle>,
        fail: bool,
    }

    #[async_trait]
    impl MarketDataPort for StubMarket {
        async fn get_candles(
            &self,
            _symbol: &str,
            _timeframe: &str,
            _limit: usize,
        ) -> Result<Vec<Candle>, DecisionError> {
            if self.fail {
                Err(DecisionError::MarketData("stub failure".to_string()))
            } else {
                Ok(self.candles.clone())
            }
        }

        async fn get_24h_snapshot(&self, _symbol: &str) -> Result<Ticker24h, DecisionError> {
            Err(DecisionError::MarketData("not used".to_string()))
        }

        async fn get_all_snapshots(&self) -> Result<Vec<Ticker24h>, DecisionError> {
            Ok(vec![])
        }
    }

    fn pipeline(market: StubMarket) -> GatePipeline {
        GatePipeline::new(Arc::new(market), "BTCUSDT", "15m", 300)
    }

    fn trend_health(direction: TrendDirection, adx: f64, plus_di: f64, minus_di: f64) -> TrendHealth {
        TrendHealth {
            timeframe: "15m".to_string(),
            direction,
            adx,
            plus_di,
            minus_di,
        }
    }

    #[tokio::test]
    async fn price_below_ema_vetoes_long_immediately() {
        let candles = uptrend(80);
        let pipeline = pipeline(StubMarket {
            candles: candles.clone(),
            fail: false,
        });
        let config = ModeConfig::default_for(TradingMode::Scalp);
        let decision = trend_health(TrendDirection::Bullish, 30.0, 30.0, 10.0);

        let ctx = GateContext {
            symbol: "ETHUSDT",
            direction: Direction::Long,
            current_price: 50.0, // far below every EMA
            candles: &candles,
            config: &config,
            scan_trend: None,
            decision_trend: &decision,
            strength: 70.0,
        };

        let outcome = pipeline.run(&ctx).await;
        assert!(!outcome.passed);
        assert_eq!(outcome.tracker.results.len(), 1);
        assert_eq!(outcome.tracker.first_veto().unwrap().gate, "price_vs_ema");
    }

    #[tokio::test]
    async fn weak_adx_without_di_strength_vetoes() {
        let candles = uptrend(80);
        let price = candles.last().unwrap().close * 1.01;
        let pipeline = pipeline(StubMarket {
            candles: candles.clone(),
            fail: false,
        });
        let mut config = ModeConfig::default_for(TradingMode::Scalp);
        config.min_adx = 20.0;
        // ADX 15 with both DI under the 25 floor
        let decision = trend_health(TrendDirection::Bullish, 15.0, 18.0, 12.0);

        let ctx = GateContext {
            symbol: "ETHUSDT",
            direction: Direction::Long,
            current_price: price,
            candles: &candles,
            config: &config,
            scan_trend: None,
            decision_trend: &decision,
            strength: 70.0,
        };

        let outcome = pipeline.run(&ctx).await;
        assert!(!outcome.passed);
        let veto = outcome.tracker.first_veto().unwrap();
        assert_eq!(veto.gate, "adx_strength");
        assert_eq!(veto.detail["penalty"], 0.90);
        // Earlier soft results stay recorded
        assert!(outcome.tracker.results.len() > 1);
    }

    #[tokio::test]
    async fn strong_di_passes_adx_gate_with_penalty() {
        let candles = uptrend(80);
        let price = candles.last().unwrap().close * 1.01;
        let pipeline = pipeline(StubMarket {
            candles: candles.clone(),
            fail: false,
        });
        let mut config = ModeConfig::default_for(TradingMode::Scalp);
        config.min_adx = 20.0;
        let decision = trend_health(TrendDirection::Bullish, 15.0, 30.0, 10.0);

        let ctx = GateContext {
            symbol: "ETHUSDT",
            direction: Direction::Long,
            current_price: price,
            candles: &candles,
            config: &config,
            scan_trend: None,
            decision_trend: &decision,
            strength: 70.0,
        };

        let outcome = pipeline.run(&ctx).await;
        assert!(outcome.passed);
        assert!((outcome.penalty - 0.95).abs() < 1e-9);
    }

    #[tokio::test]
    async fn market_data_failure_fails_open() {
        let candles = uptrend(80);
        let price = candles.last().unwrap().close * 1.01;
        let pipeline = pipeline(StubMarket {
            candles: vec![],
            fail: true,
        });
        let config = ModeConfig::default_for(TradingMode::Scalp);
        let decision = trend_health(TrendDirection::Bullish, 30.0, 30.0, 10.0);

        let ctx = GateContext {
            symbol: "ETHUSDT",
            direction: Direction::Long,
            current_price: price,
            candles: &candles,
            config: &config,
            scan_trend: None,
            decision_trend: &decision,
            strength: 70.0,
        };

        let outcome = pipeline.run(&ctx).await;
        // The trend gates must not veto on fetch errors
        assert!(outcome
            .tracker
            .results
            .iter()
            .filter(|r| r.gate == "higher_timeframe_trend" || r.gate == "reference_trend")
            .all(|r| r.passed));
    }

    #[tokio::test]
    async fn severe_divergence_blocks_when_configured() {
        let candles = uptrend(80);
        let price = candles.last().unwrap().close * 1.01;
        let pipeline = pipeline(StubMarket {
            candles: candles.clone(),
            fail: false,
        });
        let mut config = ModeConfig::default_for(TradingMode::Scalp);
        config.block_on_divergence = true;
        let scan = TrendHealth {
            timeframe: "5m".to_string(),
            direction: TrendDirection::Bearish,
            adx: 28.0,
            plus_di: 10.0,
            minus_di: 30.0,
        };
        let decision = trend_health(TrendDirection::Bullish, 30.0, 30.0, 10.0);

        let ctx = GateContext {
            symbol: "ETHUSDT",
            direction: Direction::Long,
            current_price: price,
            candles: &candles,
            config: &config,
            scan_trend: Some(&scan),
            decision_trend: &decision,
            strength: 70.0,
        };

        let outcome = pipeline.run(&ctx).await;
        assert!(!outcome.passed);
        assert_eq!(
            outcome.tracker.first_veto().unwrap().gate,
            "timeframe_divergence"
        );
    }

    #[tokio::test]
    async fn aligned_uptrend_passes_all_gates() {
        let candles = uptrend(80);
        let price = candles.last().unwrap().close * 1.01;
        let pipeline = pipeline(StubMarket {
            candles: candles.clone(),
            fail: false,
        });
        let config = ModeConfig::default_for(TradingMode::Scalp);
        let decision = trend_health(TrendDirection::Bullish, 30.0, 30.0, 10.0);

        let ctx = GateContext {
            symbol: "ETHUSDT",
            direction: Direction::Long,
            current_price: price,
            candles: &candles,
            config: &config,
            scan_trend: None,
            decision_trend: &decision,
            strength: 70.0,
        };

        let outcome = pipeline.run(&ctx).await;
        assert!(outcome.passed, "reasons: {:?}", outcome.tracker.reasons());
        assert!((outcome.penalty - 1.0).abs() < 1e-9);
    }
}
