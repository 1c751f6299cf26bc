use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::{info, warn};

use decision_core::config::{EngineSettings, ModeConfig};
use decision_core::error::DecisionError;
use decision_core::ports::{ConfigProvider, MarketDataPort};
use decision_core::types::{
    AdvisoryAssessment, Candle, DecisionReport, Direction, GateResult, Recommendation,
    RejectionTracker, ScanStatus, SignalSet, Ticker24h, TradePlan, TradingMode, TrendHealth,
};
use indicators::{atr_percent, trend_health};
use risk_sizer::{fuse_confidence, AdaptiveRiskSizer};
use signal_aggregator::{fuse, SignalAggregator};
use validation_gates::{GateContext, GatePipeline};

/// Bars fetched for the analysis timeframe per evaluation
const ANALYSIS_HISTORY_BARS: usize = 200;
/// Bars fetched for the trend timeframe per evaluation
const TREND_HISTORY_BARS: usize = 100;
/// Minimum history for indicator work; fewer bars is an insufficient-data scan
const MIN_ANALYSIS_BARS: usize = 50;
/// 24h range beyond this percent of price reads as untradeable chop
const MAX_RANGE_PERCENT: f64 = 10.0;

/// Orchestrates one full evaluation per (symbol, mode) request: scan, signal
/// collection, gate pipeline, confidence fusion, sizing, verdict. Owns no
/// mutable shared state beyond its caches and the recent-decisions buffer.
pub struct DecisionEngine {
    market: Arc<dyn MarketDataPort>,
    config: Arc<dyn ConfigProvider>,
    aggregator: SignalAggregator,
    gates: GatePipeline,
    settings: EngineSettings,
    // Dedicated lock so a slow evaluation never blocks report readers
    recent: RwLock<VecDeque<DecisionReport>>,
}

impl DecisionEngine {
    pub fn new(
        market: Arc<dyn MarketDataPort>,
        config: Arc<dyn ConfigProvider>,
        aggregator: SignalAggregator,
    ) -> Self {
        let settings = config.settings();
        let gates = GatePipeline::new(
            market.clone(),
            settings.reference_symbol.clone(),
            settings.reference_trend_timeframe.clone(),
            settings.trend_cache_ttl_secs,
        );
        Self {
            market,
            config,
            aggregator,
            gates,
            settings,
            recent: RwLock::new(VecDeque::new()),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Re-prime the reference-asset trend cache. Called by [`crate::RefreshTask`].
    pub async fn refresh_reference_trend(&self) {
        self.gates.refresh_reference_trend().await;
    }

    /// Snapshot of the recent-decisions ring buffer, newest last. Clones out
    /// under the lock and releases before returning.
    pub fn recent_decisions(&self) -> Vec<DecisionReport> {
        match self.recent.read() {
            Ok(buffer) => buffer.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    /// Run one full evaluation. Market-data failure on the base candle fetch
    /// is the only hard error; everything else resolves to a report.
    pub async fn evaluate(
        &self,
        symbol: &str,
        mode: TradingMode,
    ) -> Result<DecisionReport, DecisionError> {
        let config = self.config.mode_config(mode);
        config.validate()?;

        // Scan: no decision is possible without price history
        let candles = self
            .market
            .get_candles(symbol, &config.analysis_timeframe, ANALYSIS_HISTORY_BARS)
            .await?;

        if candles.len() < MIN_ANALYSIS_BARS {
            let mut tracker = RejectionTracker::default();
            tracker.record(GateResult::soft_fail(
                "scan",
                format!(
                    "{} bars on {}, need {}",
                    candles.len(),
                    config.analysis_timeframe,
                    MIN_ANALYSIS_BARS
                ),
            ));
            return Ok(self.finish(symbol, mode, ScanStatus::InsufficientData, None, tracker));
        }

        let price = match candles.last() {
            Some(c) => c.close,
            None => {
                return Err(DecisionError::MarketData(format!(
                    "empty candle response for {}",
                    symbol
                )))
            }
        };

        // Liquidity check from the 24h snapshot; the snapshot itself is an
        // optional enrichment and fails open
        if let Some(finding) = self.check_liquidity(symbol, mode).await {
            let mut tracker = RejectionTracker::default();
            tracker.record(finding);
            return Ok(self.finish(symbol, mode, ScanStatus::Avoid, None, tracker));
        }

        let scan_trend = trend_health(&candles, &config.analysis_timeframe);
        let decision_trend = self.decision_trend(symbol, &config, &scan_trend).await;

        // Signals
        let (signals, advisory) = self
            .aggregator
            .collect(symbol, price, &candles, mode)
            .await;
        let fused_signals = fuse(
            symbol,
            mode,
            signals,
            config.min_confidence,
            config.required_agreement,
        );
        if !fused_signals.approved {
            let mut tracker = RejectionTracker::default();
            tracker.record(GateResult::soft_fail("signal_fusion", fused_signals.reason));
            return Ok(self.report(
                symbol,
                mode,
                ScanStatus::Tradeable,
                fused_signals.set,
                tracker,
                0.0,
                advisory,
                0.0,
                Direction::Neutral,
                Recommendation::Skip,
                false,
                None,
            ));
        }
        let set = fused_signals.set;

        // Gates
        let ctx = GateContext {
            symbol,
            direction: set.direction,
            current_price: price,
            candles: &candles,
            config: &config,
            scan_trend: Some(&scan_trend),
            decision_trend: &decision_trend,
            strength: set.strength,
        };
        let outcome = self.gates.run(&ctx).await;
        if !outcome.passed {
            let direction = set.direction;
            return Ok(self.report(
                symbol,
                mode,
                ScanStatus::Tradeable,
                set,
                outcome.tracker,
                0.0,
                advisory,
                0.0,
                direction,
                Recommendation::Skip,
                false,
                None,
            ));
        }

        // Fusion: gate penalty scales the technical score; a failed confluence
        // replaces it with the 0-5 score mapped onto 0-100
        let mut technical = set.strength * outcome.penalty;
        if let Some(confluence) = &outcome.confluence {
            if !confluence.passed {
                technical = technical.min(confluence.score as f64 * 20.0);
            }
        }
        let fused = fuse_confidence(
            technical,
            set.direction,
            advisory.as_ref(),
            config.advisory_confidence_weight,
        );

        let mut tracker = outcome.tracker;
        if !fused.direction.is_directional() {
            tracker.record(GateResult::soft_fail(
                "confidence_fusion",
                "no directional consensus after fusion",
            ));
            let direction = fused.direction;
            return Ok(self.report(
                symbol,
                mode,
                ScanStatus::Tradeable,
                set,
                tracker,
                technical,
                advisory,
                fused.confidence,
                direction,
                Recommendation::Skip,
                fused.agree,
                None,
            ));
        }

        // Verdict + sizing
        let recommendation = threshold_verdict(fused.confidence, &config);
        let plan = if recommendation == Recommendation::Skip {
            tracker.record(GateResult::soft_fail(
                "confidence_threshold",
                format!(
                    "confidence {:.1} below minimum {:.1}",
                    fused.confidence, config.min_confidence
                ),
            ));
            None
        } else {
            let volatility = atr_percent(&candles, 14);
            Some(AdaptiveRiskSizer::size(
                price,
                fused.direction,
                fused.confidence,
                volatility,
                &config,
                advisory.as_ref(),
            )?)
        };

        Ok(self.report(
            symbol,
            mode,
            ScanStatus::Tradeable,
            set,
            tracker,
            technical,
            advisory,
            fused.confidence,
            fused.direction,
            recommendation,
            fused.agree,
            plan,
        ))
    }

    /// Quote-volume tier plus a 24h range sanity check. `None` means tradeable.
    async fn check_liquidity(&self, symbol: &str, mode: TradingMode) -> Option<GateResult> {
        let snapshot = match self.market.get_24h_snapshot(symbol).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(symbol, error = %err, "24h snapshot unavailable, skipping liquidity check");
                return None;
            }
        };

        let min_volume = match mode {
            TradingMode::UltraFast | TradingMode::Scalp => self.settings.min_quote_volume_scalp,
            TradingMode::Swing | TradingMode::Position => self.settings.min_quote_volume_swing,
        };
        if snapshot.quote_volume < min_volume {
            return Some(GateResult::veto(
                "liquidity",
                format!(
                    "24h quote volume {:.0} below the {:.0} floor for {}",
                    snapshot.quote_volume,
                    min_volume,
                    mode.name()
                ),
            ));
        }

        if let Some(range) = range_percent(&snapshot) {
            if range > MAX_RANGE_PERCENT {
                return Some(GateResult::veto(
                    "liquidity",
                    format!("24h range {:.1}% exceeds {:.1}%", range, MAX_RANGE_PERCENT),
                ));
            }
        }

        None
    }

    /// Trend health on the mode's trend timeframe. Falls back to the scan
    /// observation when the fetch fails or history is short.
    async fn decision_trend(
        &self,
        symbol: &str,
        config: &ModeConfig,
        scan_trend: &TrendHealth,
    ) -> TrendHealth {
        match self
            .market
            .get_candles(symbol, &config.trend_timeframe, TREND_HISTORY_BARS)
            .await
        {
            Ok(candles) if candles.len() >= MIN_ANALYSIS_BARS => {
                trend_health(&candles, &config.trend_timeframe)
            }
            Ok(candles) => {
                warn!(
                    symbol,
                    bars = candles.len(),
                    timeframe = %config.trend_timeframe,
                    "short trend history, using scan-time trend"
                );
                scan_trend.clone()
            }
            Err(err) => {
                warn!(symbol, error = %err, "trend fetch failed, using scan-time trend");
                scan_trend.clone()
            }
        }
    }

    /// Report for evaluations that stop before signal collection
    fn finish(
        &self,
        symbol: &str,
        mode: TradingMode,
        status: ScanStatus,
        advisory: Option<AdvisoryAssessment>,
        tracker: RejectionTracker,
    ) -> DecisionReport {
        let set = SignalSet {
            symbol: symbol.to_string(),
            mode,
            signals: Vec::new(),
            direction: Direction::Neutral,
            strength: 0.0,
            agreeing: 0,
        };
        self.report(
            symbol,
            mode,
            status,
            set,
            tracker,
            0.0,
            advisory,
            0.0,
            Direction::Neutral,
            Recommendation::Skip,
            false,
            None,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn report(
        &self,
        symbol: &str,
        mode: TradingMode,
        scan_status: ScanStatus,
        signal_set: SignalSet,
        rejections: RejectionTracker,
        technical_confidence: f64,
        advisory: Option<AdvisoryAssessment>,
        confidence: f64,
        direction: Direction,
        recommendation: Recommendation,
        advisory_agrees: bool,
        plan: Option<TradePlan>,
    ) -> DecisionReport {
        let summary = match recommendation {
            Recommendation::Execute => format!(
                "EXECUTE {} at {:.1} confidence",
                direction.as_str(),
                confidence
            ),
            Recommendation::Wait => format!(
                "WAIT: {} confidence {:.1} below execute threshold",
                direction.as_str(),
                confidence
            ),
            Recommendation::Skip => {
                let reasons = rejections.reasons();
                if reasons.is_empty() {
                    "SKIP".to_string()
                } else {
                    format!("SKIP: {}", reasons.join("; "))
                }
            }
        };

        info!(
            symbol,
            mode = mode.name(),
            recommendation = ?recommendation,
            confidence = format!("{:.1}", confidence),
            direction = direction.as_str(),
            "evaluation complete"
        );

        let report = DecisionReport {
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            scan_status,
            mode,
            signal_set,
            rejections,
            technical_confidence,
            advisory,
            confidence,
            direction,
            recommendation,
            advisory_agrees,
            plan,
            summary,
        };
        self.push_recent(report.clone());
        report
    }

    fn push_recent(&self, report: DecisionReport) {
        let mut buffer = match self.recent.write() {
            Ok(buffer) => buffer,
            Err(poisoned) => poisoned.into_inner(),
        };
        if buffer.len() >= self.settings.recent_decisions_capacity {
            buffer.pop_front();
        }
        buffer.push_back(report);
    }
}

/// Maps fused confidence to the three-way verdict for the mode's thresholds.
fn threshold_verdict(confidence: f64, config: &ModeConfig) -> Recommendation {
    if confidence < config.min_confidence {
        Recommendation::Skip
    } else if confidence < config.execute_threshold {
        Recommendation::Wait
    } else {
        Recommendation::Execute
    }
}

fn range_percent(snapshot: &Ticker24h) -> Option<f64> {
    if snapshot.last_price <= 0.0 || snapshot.high_price < snapshot.low_price {
        return None;
    }
    Some((snapshot.high_price - snapshot.low_price) / snapshot.last_price * 100.0)
}
