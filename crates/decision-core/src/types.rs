use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar for one timeframe, ordered ascending by open time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// 24-hour ticker snapshot for one instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker24h {
    pub symbol: String,
    pub last_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub price_change_percent: f64,
}

/// Directional bias of a signal or decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
    Neutral,
}

impl Direction {
    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
            Direction::Neutral => Direction::Neutral,
        }
    }

    pub fn is_directional(&self) -> bool {
        !matches!(self, Direction::Neutral)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
            Direction::Neutral => "neutral",
        }
    }
}

/// Trading style / horizon. Each mode carries its own configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    UltraFast,
    Scalp,
    Swing,
    Position,
}

impl TradingMode {
    pub fn all() -> [TradingMode; 4] {
        [
            TradingMode::UltraFast,
            TradingMode::Scalp,
            TradingMode::Swing,
            TradingMode::Position,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            TradingMode::UltraFast => "ultra_fast",
            TradingMode::Scalp => "scalp",
            TradingMode::Swing => "swing",
            TradingMode::Position => "position",
        }
    }
}

/// Origin of a trading signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Technical,
    MlPredictor,
    Advisory,
    Sentiment,
    PatternScanner,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::Technical => "technical",
            SignalSource::MlPredictor => "ml_predictor",
            SignalSource::Advisory => "advisory",
            SignalSource::Sentiment => "sentiment",
            SignalSource::PatternScanner => "pattern_scanner",
        }
    }
}

/// One directional signal from a single analyzer. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub source: SignalSource,
    pub direction: Direction,
    /// 0.0 to 1.0
    pub confidence: f64,
    /// Style-specific fusion weight assigned at collection time
    pub weight: f64,
    pub reason: String,
}

/// All signals collected for one (symbol, mode) evaluation plus fused aggregates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSet {
    pub symbol: String,
    pub mode: TradingMode,
    pub signals: Vec<Signal>,
    pub direction: Direction,
    /// Fused strength score, 0-100
    pub strength: f64,
    /// Count of signals agreeing with the fused direction
    pub agreeing: usize,
}

/// Outcome of a single validation gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResult {
    pub gate: String,
    pub passed: bool,
    /// A failed gate with hard_veto stops the pipeline; soft findings accumulate
    pub hard_veto: bool,
    pub reason: String,
    #[serde(default)]
    pub detail: serde_json::Value,
}

impl GateResult {
    pub fn pass(gate: &str, reason: impl Into<String>) -> Self {
        Self {
            gate: gate.to_string(),
            passed: true,
            hard_veto: false,
            reason: reason.into(),
            detail: serde_json::Value::Null,
        }
    }

    pub fn veto(gate: &str, reason: impl Into<String>) -> Self {
        Self {
            gate: gate.to_string(),
            passed: false,
            hard_veto: true,
            reason: reason.into(),
            detail: serde_json::Value::Null,
        }
    }

    pub fn soft_fail(gate: &str, reason: impl Into<String>) -> Self {
        Self {
            gate: gate.to_string(),
            passed: false,
            hard_veto: false,
            reason: reason.into(),
            detail: serde_json::Value::Null,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Ordered record of every gate finding for one evaluation.
/// Soft findings are preserved even when a later gate hard-vetoes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RejectionTracker {
    pub results: Vec<GateResult>,
}

impl RejectionTracker {
    pub fn record(&mut self, result: GateResult) {
        self.results.push(result);
    }

    pub fn has_hard_veto(&self) -> bool {
        self.results.iter().any(|r| !r.passed && r.hard_veto)
    }

    pub fn first_veto(&self) -> Option<&GateResult> {
        self.results.iter().find(|r| !r.passed && r.hard_veto)
    }

    /// One human-readable string per failed gate or condition
    pub fn reasons(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| format!("{}: {}", r.gate, r.reason))
            .collect()
    }
}

/// Final verdict for one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Execute,
    Wait,
    Skip,
}

/// Outcome of the pre-signal market scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Tradeable,
    Avoid,
    InsufficientData,
}

/// Higher-level trend classification used by gates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Bullish,
    Bearish,
    Neutral,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Bullish => "bullish",
            TrendDirection::Bearish => "bearish",
            TrendDirection::Neutral => "neutral",
        }
    }
}

/// Trend direction plus strength observed on one timeframe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendHealth {
    pub timeframe: String,
    pub direction: TrendDirection,
    /// ADX value, 0-100
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
}

/// One take-profit rung of the ladder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TakeProfitLevel {
    pub level: u8,
    pub price: f64,
    /// Portion of the position closed at this level, percent
    pub allocation_percent: f64,
    /// Gain from entry at this level, percent
    pub gain_percent: f64,
}

/// Concrete trade parameters attached to an Execute/Wait report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradePlan {
    pub entry_low: f64,
    pub entry_high: f64,
    pub position_usd: f64,
    pub leverage: u32,
    pub stop_loss_price: f64,
    pub stop_loss_percent: f64,
    pub take_profits: Vec<TakeProfitLevel>,
    pub risk_reward: f64,
}

/// Structured recommendation from the external advisory service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisoryAssessment {
    pub direction: Direction,
    /// 0.0 to 1.0
    pub confidence: f64,
    pub reasoning: String,
    pub risk_level: String,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub take_profit: Option<f64>,
}

/// Prediction from the external ML service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlPrediction {
    pub direction: Direction,
    pub confidence: f64,
    /// Expected move as a fraction of price
    pub predicted_move: f64,
}

/// Market sentiment reading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentScore {
    /// -1.0 (extreme fear) to +1.0 (extreme greed)
    pub overall: f64,
    pub fear_greed_index: i32,
    pub label: String,
}

/// The aggregate output of one decision evaluation. Immutable after return;
/// supports lossless serde round-trips for persistence by callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionReport {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub scan_status: ScanStatus,
    pub mode: TradingMode,
    pub signal_set: SignalSet,
    pub rejections: RejectionTracker,
    /// Technical confidence before advisory fusion, 0-100
    pub technical_confidence: f64,
    #[serde(default)]
    pub advisory: Option<AdvisoryAssessment>,
    /// Final fused confidence, 0-100
    pub confidence: f64,
    pub direction: Direction,
    pub recommendation: Recommendation,
    pub advisory_agrees: bool,
    #[serde(default)]
    pub plan: Option<TradePlan>,
    /// Free-form operator-facing summary of why this verdict
    pub summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_preserves_soft_findings_on_veto() {
        let mut tracker = RejectionTracker::default();
        tracker.record(GateResult::pass("price_vs_ema", "price above EMA"));
        tracker.record(GateResult::soft_fail("vwap_band", "price below band"));
        tracker.record(GateResult::veto("adx_strength", "ADX 12.0 below 20.0"));

        assert!(tracker.has_hard_veto());
        assert_eq!(tracker.results.len(), 3);
        assert_eq!(tracker.first_veto().unwrap().gate, "adx_strength");
        let reasons = tracker.reasons();
        assert_eq!(reasons.len(), 2);
        assert!(reasons[0].starts_with("vwap_band"));
    }

    #[test]
    fn report_serde_round_trip() {
        let report = DecisionReport {
            symbol: "BTCUSDT".to_string(),
            timestamp: Utc::now(),
            scan_status: ScanStatus::Tradeable,
            mode: TradingMode::Scalp,
            signal_set: SignalSet {
                symbol: "BTCUSDT".to_string(),
                mode: TradingMode::Scalp,
                signals: vec![Signal {
                    source: SignalSource::Technical,
                    direction: Direction::Long,
                    confidence: 0.7,
                    weight: 0.25,
                    reason: "Price > EMA20 > EMA50".to_string(),
                }],
                direction: Direction::Long,
                strength: 70.0,
                agreeing: 1,
            },
            rejections: RejectionTracker::default(),
            technical_confidence: 70.0,
            advisory: None,
            confidence: 70.0,
            direction: Direction::Long,
            recommendation: Recommendation::Execute,
            advisory_agrees: false,
            plan: None,
            summary: "executable".to_string(),
        };

        let json = serde_json::to_string(&report).unwrap();
        let back: DecisionReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.recommendation, Recommendation::Execute);
        assert_eq!(back.signal_set.signals.len(), 1);
        assert_eq!(back.direction, Direction::Long);
    }
}
