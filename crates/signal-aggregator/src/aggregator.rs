use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use decision_core::cache::TtlCache;
use decision_core::ports::{AdvisoryPort, MlPredictorPort, SentimentPort};
use decision_core::types::{
    AdvisoryAssessment, Candle, Direction, Signal, SignalSet, SignalSource, TradingMode,
};
use indicators::{best_recent_pattern, ema, macd, rsi};

use crate::weights::StyleWeights;

/// Result of weighted fusion across the collected signals
#[derive(Debug, Clone)]
pub struct FusedSignals {
    pub set: SignalSet,
    pub approved: bool,
    pub reason: String,
}

/// Collects directional signals from every configured source and fuses them
/// into one weighted verdict. Sources are optional; a missing or failing
/// source contributes nothing.
pub struct SignalAggregator {
    ml: Option<Arc<dyn MlPredictorPort>>,
    advisory: Option<Arc<dyn AdvisoryPort>>,
    sentiment: Option<Arc<dyn SentimentPort>>,
    advisory_cache: TtlCache<AdvisoryAssessment>,
    call_timeout: Duration,
}

impl SignalAggregator {
    pub fn new(advisory_cache_ttl_secs: i64, call_timeout_secs: u64) -> Self {
        Self {
            ml: None,
            advisory: None,
            sentiment: None,
            advisory_cache: TtlCache::new(advisory_cache_ttl_secs),
            call_timeout: Duration::from_secs(call_timeout_secs),
        }
    }

    pub fn with_ml(mut self, ml: Arc<dyn MlPredictorPort>) -> Self {
        self.ml = Some(ml);
        self
    }

    pub fn with_advisory(mut self, advisory: Arc<dyn AdvisoryPort>) -> Self {
        self.advisory = Some(advisory);
        self
    }

    pub fn with_sentiment(mut self, sentiment: Arc<dyn SentimentPort>) -> Self {
        self.sentiment = Some(sentiment);
        self
    }

    pub fn cached_advisory(&self, symbol: &str) -> Option<AdvisoryAssessment> {
        self.advisory_cache.get(symbol)
    }

    pub fn invalidate_advisory(&self, symbol: &str) {
        self.advisory_cache.invalidate(symbol);
    }

    /// Collect signals from all sources for one evaluation. The two pure
    /// analyzers run inline; the three external sources run concurrently,
    /// each under the call deadline.
    pub async fn collect(
        &self,
        symbol: &str,
        current_price: f64,
        candles: &[Candle],
        mode: TradingMode,
    ) -> (Vec<Signal>, Option<AdvisoryAssessment>) {
        let weights = StyleWeights::for_mode(mode);
        let mut signals = Vec::new();

        if let Some(signal) = self.technical_signal(current_price, candles, &weights) {
            signals.push(signal);
        }
        if let Some(signal) = self.pattern_signal(candles, &weights) {
            signals.push(signal);
        }

        let (ml_signal, advisory_result, sentiment_signal) = futures_util::future::join3(
            self.ml_signal(symbol, current_price, candles, &weights),
            self.advisory_signal(symbol, mode, candles, &weights),
            self.sentiment_signal(symbol, &weights),
        )
        .await;

        if let Some(signal) = ml_signal {
            signals.push(signal);
        }
        let (advisory_signal, assessment) = advisory_result;
        if let Some(signal) = advisory_signal {
            signals.push(signal);
        }
        if let Some(signal) = sentiment_signal {
            signals.push(signal);
        }

        self.log_signals(symbol, &signals);

        (signals, assessment)
    }

    /// EMA + RSI + MACD score system. Two points for strong alignment, one
    /// for weak; the larger side sets the direction.
    fn technical_signal(
        &self,
        current_price: f64,
        candles: &[Candle],
        weights: &StyleWeights,
    ) -> Option<Signal> {
        if candles.len() < 50 {
            return None;
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let ema20 = *ema(&closes, 20).last()?;
        let ema50 = *ema(&closes, 50).last()?;
        let rsi_val = *rsi(&closes, 14).last()?;
        let macd_result = macd(&closes, 12, 26, 9);

        let mut bullish = 0u32;
        let mut bearish = 0u32;
        let mut reasons = Vec::new();

        if current_price > ema20 && ema20 > ema50 {
            bullish += 2;
            reasons.push("Price > EMA20 > EMA50".to_string());
        } else if current_price < ema20 && ema20 < ema50 {
            bearish += 2;
            reasons.push("Price < EMA20 < EMA50".to_string());
        } else if current_price > ema20 {
            bullish += 1;
            reasons.push("Price > EMA20".to_string());
        } else if current_price < ema20 {
            bearish += 1;
            reasons.push("Price < EMA20".to_string());
        }

        if rsi_val < 30.0 {
            bullish += 2;
            reasons.push(format!("RSI oversold ({:.1})", rsi_val));
        } else if rsi_val > 70.0 {
            bearish += 2;
            reasons.push(format!("RSI overbought ({:.1})", rsi_val));
        } else if rsi_val < 45.0 {
            bullish += 1;
            reasons.push(format!("RSI bullish zone ({:.1})", rsi_val));
        } else if rsi_val > 55.0 {
            bearish += 1;
            reasons.push(format!("RSI bearish zone ({:.1})", rsi_val));
        }

        if let (Some(&macd_last), Some(&signal_last), Some(&hist_last)) = (
            macd_result.macd_line.last(),
            macd_result.signal_line.last(),
            macd_result.histogram.last(),
        ) {
            if hist_last > 0.0 && macd_last > signal_last {
                bullish += 1;
                reasons.push("MACD bullish crossover".to_string());
            } else if hist_last < 0.0 && macd_last < signal_last {
                bearish += 1;
                reasons.push("MACD bearish crossover".to_string());
            }
        }

        let total = bullish + bearish;
        let (direction, confidence) = if total == 0 || bullish == bearish {
            (Direction::Neutral, 0.5)
        } else if bullish > bearish {
            (
                Direction::Long,
                0.5 + (bullish - bearish) as f64 / (total + 2) as f64 * 0.4,
            )
        } else {
            (
                Direction::Short,
                0.5 + (bearish - bullish) as f64 / (total + 2) as f64 * 0.4,
            )
        };

        let mut reason = String::from("Technical: ");
        reason.push_str(&reasons.iter().take(3).cloned().collect::<Vec<_>>().join(", "));

        Some(Signal {
            source: SignalSource::Technical,
            direction,
            confidence,
            weight: weights.technical,
            reason,
        })
    }

    /// Strongest candlestick pattern formed on the latest bars
    fn pattern_signal(&self, candles: &[Candle], weights: &StyleWeights) -> Option<Signal> {
        if candles.len() < 3 {
            return None;
        }

        let pattern = best_recent_pattern(candles)?;
        let direction = if pattern.bullish {
            Direction::Long
        } else {
            Direction::Short
        };

        Some(Signal {
            source: SignalSource::PatternScanner,
            direction,
            confidence: 0.5 + pattern.strength * 0.4,
            weight: weights.pattern_scanner,
            reason: format!(
                "Pattern: {} ({:.0}% strength)",
                pattern.pattern.as_str(),
                pattern.strength * 100.0
            ),
        })
    }

    async fn ml_signal(
        &self,
        symbol: &str,
        current_price: f64,
        candles: &[Candle],
        weights: &StyleWeights,
    ) -> Option<Signal> {
        let ml = self.ml.as_ref()?;

        let prediction = match timeout(
            self.call_timeout,
            ml.predict(symbol, candles, current_price),
        )
        .await
        {
            Ok(Ok(prediction)) => prediction,
            Ok(Err(err)) => {
                debug!(symbol, error = %err, "ML prediction failed");
                return None;
            }
            Err(_) => {
                warn!(symbol, "ML prediction timed out");
                return None;
            }
        };

        let direction = if prediction.confidence > 0.5 {
            prediction.direction
        } else {
            Direction::Neutral
        };

        Some(Signal {
            source: SignalSource::MlPredictor,
            direction,
            confidence: prediction.confidence,
            weight: weights.ml_predictor,
            reason: format!(
                "ML predicted: {} ({:.1}%)",
                prediction.direction.as_str(),
                prediction.predicted_move * 100.0
            ),
        })
    }

    /// Advisory responses are cached per symbol; within the TTL the cached
    /// assessment is reused without another call.
    async fn advisory_signal(
        &self,
        symbol: &str,
        mode: TradingMode,
        candles: &[Candle],
        weights: &StyleWeights,
    ) -> (Option<Signal>, Option<AdvisoryAssessment>) {
        let advisory = match self.advisory.as_ref() {
            Some(advisory) if advisory.is_enabled() && advisory.is_configured() => advisory,
            _ => return (None, None),
        };

        let assessment = match self.advisory_cache.get(symbol) {
            Some(cached) => {
                debug!(symbol, "using cached advisory assessment");
                cached
            }
            None => {
                let timeframe = match mode {
                    TradingMode::UltraFast | TradingMode::Scalp => "1m",
                    TradingMode::Swing => "15m",
                    TradingMode::Position => "1h",
                };
                match timeout(
                    self.call_timeout,
                    advisory.analyze_market(symbol, timeframe, candles),
                )
                .await
                {
                    Ok(Ok(assessment)) => {
                        self.advisory_cache.insert(symbol, assessment.clone());
                        assessment
                    }
                    Ok(Err(err)) => {
                        debug!(symbol, error = %err, "advisory analysis failed");
                        return (None, None);
                    }
                    Err(_) => {
                        warn!(symbol, "advisory analysis timed out");
                        return (None, None);
                    }
                }
            }
        };

        let direction = if assessment.confidence >= 0.5 {
            assessment.direction
        } else {
            Direction::Neutral
        };

        let signal = Signal {
            source: SignalSource::Advisory,
            direction,
            confidence: assessment.confidence,
            weight: weights.advisory,
            reason: assessment.reasoning.clone(),
        };

        (Some(signal), Some(assessment))
    }

    async fn sentiment_signal(&self, symbol: &str, weights: &StyleWeights) -> Option<Signal> {
        let sentiment = match self.sentiment.as_ref() {
            Some(sentiment) if sentiment.is_enabled() => sentiment,
            _ => return None,
        };

        let score = match timeout(self.call_timeout, sentiment.get_sentiment(symbol)).await {
            Ok(Ok(score)) => score,
            Ok(Err(err)) => {
                debug!(symbol, error = %err, "sentiment unavailable");
                return None;
            }
            Err(_) => {
                warn!(symbol, "sentiment fetch timed out");
                return None;
            }
        };

        let (direction, confidence) = if score.overall > 0.3 {
            (Direction::Long, score.overall)
        } else if score.overall < -0.3 {
            (Direction::Short, -score.overall)
        } else {
            (Direction::Neutral, 0.5)
        };

        Some(Signal {
            source: SignalSource::Sentiment,
            direction,
            confidence,
            weight: weights.sentiment,
            reason: format!("Fear/Greed: {} ({})", score.fear_greed_index, score.label),
        })
    }

    fn log_signals(&self, symbol: &str, signals: &[Signal]) {
        if signals.is_empty() {
            warn!(symbol, "no signals collected");
            return;
        }

        let long = signals
            .iter()
            .filter(|s| s.direction == Direction::Long)
            .count();
        let short = signals
            .iter()
            .filter(|s| s.direction == Direction::Short)
            .count();
        let avg: f64 =
            signals.iter().map(|s| s.confidence).sum::<f64>() / signals.len() as f64;

        info!(
            symbol,
            total = signals.len(),
            long,
            short,
            avg_confidence = format!("{:.2}", avg),
            "signal collection complete"
        );

        for signal in signals {
            debug!(
                symbol,
                source = signal.source.as_str(),
                direction = signal.direction.as_str(),
                confidence = format!("{:.2}", signal.confidence),
                reason = %signal.reason,
                "signal detail"
            );
        }
    }
}

/// Weight-normalized fusion: each directional signal contributes
/// `confidence x weight` to its side, the larger side wins, and the winning
/// side's score becomes the set strength (0-100). When `required_agreement`
/// is nonzero at least that many signals must agree with the winner.
pub fn fuse(
    symbol: &str,
    mode: TradingMode,
    signals: Vec<Signal>,
    min_strength: f64,
    required_agreement: usize,
) -> FusedSignals {
    if signals.is_empty() {
        return FusedSignals {
            set: SignalSet {
                symbol: symbol.to_string(),
                mode,
                signals,
                direction: Direction::Neutral,
                strength: 0.0,
                agreeing: 0,
            },
            approved: false,
            reason: "No signals available".to_string(),
        };
    }

    let mut long_score = 0.0;
    let mut short_score = 0.0;
    let mut total_weight = 0.0;
    let mut long_count = 0usize;
    let mut short_count = 0usize;

    for signal in &signals {
        total_weight += signal.weight;
        match signal.direction {
            Direction::Long => {
                long_score += signal.confidence * signal.weight;
                long_count += 1;
            }
            Direction::Short => {
                short_score += signal.confidence * signal.weight;
                short_count += 1;
            }
            Direction::Neutral => {}
        }
    }

    if total_weight > 0.0 {
        long_score /= total_weight;
        short_score /= total_weight;
    }

    let (direction, strength, agreeing) = if long_score > short_score && long_count > 0 {
        (Direction::Long, long_score * 100.0, long_count)
    } else if short_score > long_score && short_count > 0 {
        (Direction::Short, short_score * 100.0, short_count)
    } else {
        (Direction::Neutral, 0.0, 0)
    };

    let (approved, reason) = if direction == Direction::Neutral {
        (false, "No directional consensus".to_string())
    } else if required_agreement > 0 && agreeing < required_agreement {
        (
            false,
            format!(
                "Insufficient agreement: {} signals, need {}",
                agreeing, required_agreement
            ),
        )
    } else if strength < min_strength {
        (
            false,
            format!("Strength {:.1} below minimum {:.1}", strength, min_strength),
        )
    } else {
        (true, String::new())
    };

    FusedSignals {
        set: SignalSet {
            symbol: symbol.to_string(),
            mode,
            signals,
            direction,
            strength,
            agreeing,
        },
        approved,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use decision_core::error::DecisionError;
    use decision_core::ports::AdvisoryPort;

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
                let base = 100.0 + i as f64 * 0.5;
                candle(base, base + 1.0, base - 0.5, base + 0.4)
            })
            .collect()
    }

    fn signal(source: SignalSource, direction: Direction, confidence: f64, weight: f64) -> Signal {
        Signal {
            source,
            direction,
            confidence,
            weight,
            reason: String::new(),
        }
    }

    struct CountingAdvisory {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AdvisoryPort for CountingAdvisory {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String, DecisionError> {
            Ok(String::new())
        }

        async fn analyze_market(
            &self,
            _symbol: &str,
            _timeframe: &str,
            _candles: &[Candle],
        ) -> Result<AdvisoryAssessment, DecisionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AdvisoryAssessment {
                direction: Direction::Long,
                confidence: 0.8,
                reasoning: "strong uptrend".to_string(),
                risk_level: "medium".to_string(),
                stop_loss: None,
                take_profit: None,
            })
        }

        fn is_configured(&self) -> bool {
            true
        }

        fn is_enabled(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn collects_technical_signal_on_uptrend() {
        let aggregator = SignalAggregator::new(300, 5);
        let candles = uptrend(60);
        let price = candles.last().unwrap().close * 1.01;

        let (signals, assessment) = aggregator
            .collect("BTCUSDT", price, &candles, TradingMode::Scalp)
            .await;

        assert!(assessment.is_none());
        let technical = signals
            .iter()
            .find(|s| s.source == SignalSource::Technical)
            .unwrap();
        assert_eq!(technical.direction, Direction::Long);
        assert!(technical.confidence > 0.5);
        assert_eq!(
            technical.weight,
            StyleWeights::for_mode(TradingMode::Scalp).technical
        );
    }

    #[tokio::test]
    async fn advisory_responses_are_cached() {
        let advisory = Arc::new(CountingAdvisory {
            calls: AtomicUsize::new(0),
        });
        let aggregator = SignalAggregator::new(300, 5).with_advisory(advisory.clone());
        let candles = uptrend(60);
        let price = candles.last().unwrap().close;

        aggregator
            .collect("ETHUSDT", price, &candles, TradingMode::Swing)
            .await;
        let (signals, assessment) = aggregator
            .collect("ETHUSDT", price, &candles, TradingMode::Swing)
            .await;

        assert_eq!(advisory.calls.load(Ordering::SeqCst), 1);
        assert!(assessment.is_some());
        assert!(signals
            .iter()
            .any(|s| s.source == SignalSource::Advisory && s.direction == Direction::Long));
    }

    #[test]
    fn fuse_empty_is_not_approved() {
        let fused = fuse("BTCUSDT", TradingMode::Scalp, vec![], 50.0, 0);
        assert!(!fused.approved);
        assert_eq!(fused.set.direction, Direction::Neutral);
        assert_eq!(fused.set.strength, 0.0);
    }

    #[test]
    fn fuse_weighted_majority_wins() {
        let signals = vec![
            signal(SignalSource::Technical, Direction::Long, 0.8, 0.25),
            signal(SignalSource::MlPredictor, Direction::Long, 0.7, 0.30),
            signal(SignalSource::Sentiment, Direction::Short, 0.6, 0.05),
        ];

        let fused = fuse("BTCUSDT", TradingMode::Scalp, signals, 30.0, 2);
        assert!(fused.approved);
        assert_eq!(fused.set.direction, Direction::Long);
        assert_eq!(fused.set.agreeing, 2);
        assert!(fused.set.strength > 30.0);
        assert!(fused.set.strength <= 100.0);
    }

    #[test]
    fn fuse_enforces_required_agreement() {
        let signals = vec![signal(
            SignalSource::Technical,
            Direction::Long,
            0.9,
            0.25,
        )];

        let fused = fuse("BTCUSDT", TradingMode::Swing, signals, 10.0, 2);
        assert!(!fused.approved);
        assert!(fused.reason.contains("Insufficient agreement"));
        // The fused direction is still reported for diagnostics
        assert_eq!(fused.set.direction, Direction::Long);
    }

    #[test]
    fn fuse_neutral_signals_carry_no_weight() {
        let signals = vec![
            signal(SignalSource::Technical, Direction::Neutral, 0.9, 0.25),
            signal(SignalSource::Sentiment, Direction::Neutral, 0.9, 0.05),
        ];

        let fused = fuse("BTCUSDT", TradingMode::Scalp, signals, 10.0, 0);
        assert!(!fused.approved);
        assert_eq!(fused.set.direction, Direction::Neutral);
    }
}
