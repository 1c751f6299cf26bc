use decision_core::types::{Candle, Direction};

use crate::indicators::swing_points;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandlestickPattern {
    Doji,
    Hammer,
    ShootingStar,
    BullishEngulfing,
    BearishEngulfing,
    StructureBreak,
}

impl CandlestickPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandlestickPattern::Doji => "doji",
            CandlestickPattern::Hammer => "hammer",
            CandlestickPattern::ShootingStar => "shooting_star",
            CandlestickPattern::BullishEngulfing => "bullish_engulfing",
            CandlestickPattern::BearishEngulfing => "bearish_engulfing",
            CandlestickPattern::StructureBreak => "structure_break",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PatternMatch {
    pub pattern: CandlestickPattern,
    /// 0.0 to 1.0
    pub strength: f64,
    pub bullish: bool,
}

pub fn is_doji(candle: &Candle) -> bool {
    let body = (candle.close - candle.open).abs();
    let range = candle.high - candle.low;
    range > 0.0 && body / range < 0.1
}

/// Hammer: small body, long lower shadow, little upper shadow
pub fn detect_hammer(candle: &Candle) -> Option<PatternMatch> {
    let body = (candle.close - candle.open).abs();
    let range = candle.high - candle.low;
    let lower_shadow = candle.open.min(candle.close) - candle.low;
    let upper_shadow = candle.high - candle.open.max(candle.close);

    if range == 0.0 || body == 0.0 {
        return None;
    }

    if body / range < 0.3 && lower_shadow > 2.0 * body && upper_shadow < body * 0.5 {
        let strength = (lower_shadow / body).min(5.0) / 5.0;
        return Some(PatternMatch {
            pattern: CandlestickPattern::Hammer,
            strength,
            bullish: true,
        });
    }

    None
}

/// Shooting star: small body, long upper shadow, little lower shadow
pub fn detect_shooting_star(candle: &Candle) -> Option<PatternMatch> {
    let body = (candle.close - candle.open).abs();
    let range = candle.high - candle.low;
    let lower_shadow = candle.open.min(candle.close) - candle.low;
    let upper_shadow = candle.high - candle.open.max(candle.close);

    if range == 0.0 || body == 0.0 {
        return None;
    }

    if body / range < 0.3 && upper_shadow > 2.0 * body && lower_shadow < body * 0.5 {
        let strength = (upper_shadow / body).min(5.0) / 5.0;
        return Some(PatternMatch {
            pattern: CandlestickPattern::ShootingStar,
            strength,
            bullish: false,
        });
    }

    None
}

/// Engulfing: current body fully engulfs the previous opposite-color body
pub fn detect_engulfing(candles: &[Candle]) -> Option<PatternMatch> {
    if candles.len() < 2 {
        return None;
    }

    let prev = &candles[candles.len() - 2];
    let curr = &candles[candles.len() - 1];

    let prev_bullish = prev.close > prev.open;
    let curr_bullish = curr.close > curr.open;

    let prev_body = (prev.close - prev.open).abs();
    let curr_body = (curr.close - curr.open).abs();
    if prev_body == 0.0 || curr_body <= prev_body {
        return None;
    }

    if !prev_bullish && curr_bullish && curr.open <= prev.close && curr.close >= prev.open {
        return Some(PatternMatch {
            pattern: CandlestickPattern::BullishEngulfing,
            strength: (curr_body / prev_body).min(3.0) / 3.0,
            bullish: true,
        });
    }
    if prev_bullish && !curr_bullish && curr.open >= prev.close && curr.close <= prev.open {
        return Some(PatternMatch {
            pattern: CandlestickPattern::BearishEngulfing,
            strength: (curr_body / prev_body).min(3.0) / 3.0,
            bullish: false,
        });
    }

    None
}

/// Structure break: close beyond the most recent confirmed swing extreme.
/// A close above the last swing high is bullish, below the last swing low
/// bearish.
pub fn detect_structure_break(candles: &[Candle], lookback: usize) -> Option<PatternMatch> {
    let swings = swing_points(candles, lookback);
    let close = candles.last()?.close;

    if let Some(&last_high) = swings.highs.last() {
        if close > last_high && last_high > 0.0 {
            let strength = ((close - last_high) / last_high * 100.0).min(1.0).max(0.3);
            return Some(PatternMatch {
                pattern: CandlestickPattern::StructureBreak,
                strength,
                bullish: true,
            });
        }
    }
    if let Some(&last_low) = swings.lows.last() {
        if close < last_low && last_low > 0.0 {
            let strength = ((last_low - close) / last_low * 100.0).min(1.0).max(0.3);
            return Some(PatternMatch {
                pattern: CandlestickPattern::StructureBreak,
                strength,
                bullish: false,
            });
        }
    }

    None
}

/// Strongest pattern formed on the most recent candles
pub fn best_recent_pattern(candles: &[Candle]) -> Option<PatternMatch> {
    if candles.is_empty() {
        return None;
    }

    let last = &candles[candles.len() - 1];
    let mut candidates = Vec::new();

    if let Some(m) = detect_hammer(last) {
        candidates.push(m);
    }
    if let Some(m) = detect_shooting_star(last) {
        candidates.push(m);
    }
    if let Some(m) = detect_engulfing(candles) {
        candidates.push(m);
    }
    if let Some(m) = detect_structure_break(candles, 30) {
        candidates.push(m);
    }

    candidates
        .into_iter()
        .max_by(|a, b| a.strength.total_cmp(&b.strength))
}

/// Whether any recent pattern argues for a reversal into `direction`
pub fn has_reversal_pattern(candles: &[Candle], direction: Direction) -> Option<PatternMatch> {
    let pattern = best_recent_pattern(candles)?;
    let matches = match direction {
        Direction::Long => pattern.bullish,
        Direction::Short => !pattern.bullish,
        Direction::Neutral => false,
    };
    if matches {
        Some(pattern)
    } else {
        None
    }
}
