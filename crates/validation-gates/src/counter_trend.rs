use decision_core::config::ModeConfig;
use decision_core::types::{Candle, Direction};
use indicators::{adx, atr, rsi, swing_points};

/// Why a counter-trend entry was rejected, or None when acceptable
pub fn validate_counter_trend(
    candles: &[Candle],
    direction: Direction,
    confidence: f64,
    config: &ModeConfig,
) -> Option<String> {
    if !config.allow_counter_trend {
        return Some("Counter-trend trading disabled".to_string());
    }
    if confidence < config.counter_trend_min_confidence {
        return Some(format!(
            "Confidence {:.1} below counter-trend minimum {:.1}",
            confidence, config.counter_trend_min_confidence
        ));
    }
    if candles.len() < 50 {
        return Some("Insufficient history for reversal validation".to_string());
    }

    if config.counter_trend_require_reversal_pattern && !has_structure_reversal(candles, direction)
    {
        return Some("No reversal structure in recent swings".to_string());
    }

    if config.counter_trend_require_adx_weakening {
        if candles.len() < 35 {
            return Some("Insufficient history for ADX trend check".to_string());
        }
        let current = adx(candles, 14).latest().map(|(a, _, _)| a).unwrap_or(0.0);
        let previous = adx(&candles[..candles.len() - 5], 14)
            .latest()
            .map(|(a, _, _)| a)
            .unwrap_or(0.0);
        if current >= previous {
            return Some(format!(
                "Trend still strengthening (ADX {:.1} >= {:.1} five bars ago)",
                current, previous
            ));
        }
    }

    if config.counter_trend_require_rsi_extreme {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let rsi_val = rsi(&closes, 14).last().copied().unwrap_or(50.0);
        match direction {
            Direction::Long if rsi_val > 30.0 => {
                return Some(format!("RSI {:.1} not oversold for long bounce", rsi_val));
            }
            Direction::Short if rsi_val < 70.0 => {
                return Some(format!("RSI {:.1} not overbought for short bounce", rsi_val));
            }
            _ => {}
        }
    }

    // Reversals are never taken in extreme volatility
    let current_atr = atr(candles, 14).last().copied().unwrap_or(0.0);
    let avg_atr = average_atr(candles, 50);
    if avg_atr > 0.0 && current_atr > avg_atr * 2.0 {
        return Some(format!(
            "Volatility too high for reversal (ATR {:.4} > 2x avg {:.4})",
            current_atr, avg_atr
        ));
    }

    None
}

/// Swing-structure reversal evidence. A long bounce wants a fresh lower low
/// or the start of higher highs and higher lows; a short fade the mirror.
fn has_structure_reversal(candles: &[Candle], direction: Direction) -> bool {
    let swings = swing_points(candles, candles.len().min(50));
    if swings.highs.len() < 2 || swings.lows.len() < 2 {
        return false;
    }

    let last_high = swings.highs[swings.highs.len() - 1];
    let prev_high = swings.highs[swings.highs.len() - 2];
    let last_low = swings.lows[swings.lows.len() - 1];
    let prev_low = swings.lows[swings.lows.len() - 2];

    match direction {
        Direction::Long => {
            (last_high > prev_high && last_low > prev_low) || last_low < prev_low
        }
        Direction::Short => {
            (last_high < prev_high && last_low < prev_low) || last_high > prev_high
        }
        Direction::Neutral => false,
    }
}

fn average_atr(candles: &[Candle], period: usize) -> f64 {
    let period = period.min(candles.len());
    if period == 0 {
        return 0.0;
    }

    let mut sum = 0.0;
    let mut count = 0usize;
    for i in candles.len() - period..candles.len() {
        if let Some(&v) = atr(&candles[..i + 1], 14).last() {
            sum += v;
            count += 1;
        }
    }

    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
