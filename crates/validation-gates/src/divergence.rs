use decision_core::types::{TrendDirection, TrendHealth};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DivergenceSeverity {
    None,
    Minor,
    Moderate,
    Severe,
}

impl DivergenceSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            DivergenceSeverity::None => "none",
            DivergenceSeverity::Minor => "minor",
            DivergenceSeverity::Moderate => "moderate",
            DivergenceSeverity::Severe => "severe",
        }
    }
}

/// Disagreement between the trend captured at scan time and the trend at
/// decision time
#[derive(Debug, Clone)]
pub struct TrendDivergence {
    pub detected: bool,
    pub severity: DivergenceSeverity,
    pub should_block: bool,
    pub reason: String,
}

/// Compare scan-time and decision-time trend health. Opposite directions are
/// severe, trending vs neutral moderate, same direction with an ADX gap over
/// 15 minor. Minor divergence never blocks.
pub fn detect_divergence(
    scan: &TrendHealth,
    decision: &TrendHealth,
    block_on_divergence: bool,
) -> TrendDivergence {
    if scan.timeframe == decision.timeframe {
        return TrendDivergence {
            detected: false,
            severity: DivergenceSeverity::None,
            should_block: false,
            reason: String::new(),
        };
    }

    let opposite = matches!(
        (scan.direction, decision.direction),
        (TrendDirection::Bullish, TrendDirection::Bearish)
            | (TrendDirection::Bearish, TrendDirection::Bullish)
    );
    if opposite {
        return TrendDivergence {
            detected: true,
            severity: DivergenceSeverity::Severe,
            should_block: block_on_divergence,
            reason: format!(
                "Opposite trends: {} shows {} but {} shows {}",
                scan.timeframe,
                scan.direction.as_str(),
                decision.timeframe,
                decision.direction.as_str()
            ),
        };
    }

    let one_neutral = (scan.direction != TrendDirection::Neutral
        && decision.direction == TrendDirection::Neutral)
        || (scan.direction == TrendDirection::Neutral
            && decision.direction != TrendDirection::Neutral);
    if one_neutral {
        return TrendDivergence {
            detected: true,
            severity: DivergenceSeverity::Moderate,
            should_block: block_on_divergence,
            reason: format!(
                "Trend mismatch: {} is {} but {} is {}",
                scan.timeframe,
                scan.direction.as_str(),
                decision.timeframe,
                decision.direction.as_str()
            ),
        };
    }

    if scan.direction == decision.direction && scan.direction != TrendDirection::Neutral {
        let adx_diff = (scan.adx - decision.adx).abs();
        if adx_diff > 15.0 {
            return TrendDivergence {
                detected: true,
                severity: DivergenceSeverity::Minor,
                should_block: false,
                reason: format!(
                    "Same trend direction but ADX differs: {} ({:.1}) vs {} ({:.1})",
                    scan.timeframe, scan.adx, decision.timeframe, decision.adx
                ),
            };
        }
    }

    TrendDivergence {
        detected: false,
        severity: DivergenceSeverity::None,
        should_block: false,
        reason: String::new(),
    }
}
