use decision_core::config::ModeConfig;
use decision_core::types::{Candle, Direction};
use indicators::{adx, ema, pivot_points, pivot_zone, volume_spike, vwap, PivotZone};

/// Outcome of the five-check entry confluence scan
#[derive(Debug, Clone)]
pub struct ConfluenceResult {
    pub score: u8,
    pub passed: bool,
    pub adx_valid: bool,
    pub vwap_valid: bool,
    pub volume_valid: bool,
    pub pivot_valid: bool,
    pub ema_valid: bool,
    pub details: Vec<String>,
}

/// Check entry confluence: ADX with DI alignment, price vs VWAP, volume
/// spike, pivot zone, and EMA 20/50 stack. Passes when at least
/// `required_confluence` checks confirm the direction.
pub fn check_entry_confluence(
    candles: &[Candle],
    direction: Direction,
    config: &ModeConfig,
) -> ConfluenceResult {
    let mut result = ConfluenceResult {
        score: 0,
        passed: false,
        adx_valid: false,
        vwap_valid: false,
        volume_valid: false,
        pivot_valid: false,
        ema_valid: false,
        details: Vec::new(),
    };

    if candles.len() < 50 || !direction.is_directional() {
        result
            .details
            .push("Insufficient candles for confluence check".to_string());
        return result;
    }

    let current_price = candles[candles.len() - 1].close;
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    // 1. ADX strength with DI alignment
    let adx_result = adx(candles, 14);
    if let Some((adx_val, plus_di, minus_di)) = adx_result.latest() {
        let adx_strong = adx_val >= config.min_adx;
        let di_aligned = match direction {
            Direction::Long => plus_di > minus_di,
            Direction::Short => minus_di > plus_di,
            Direction::Neutral => false,
        };
        if adx_strong && di_aligned {
            result.adx_valid = true;
            result.score += 1;
            result.details.push(format!(
                "ADX={:.1} (>{:.0}), +DI={:.1}, -DI={:.1}",
                adx_val, config.min_adx, plus_di, minus_di
            ));
        } else {
            result.details.push(format!(
                "ADX={:.1} (need >{:.0}), +DI={:.1}, -DI={:.1}",
                adx_val, config.min_adx, plus_di, minus_di
            ));
        }
    }

    // 2. Price vs VWAP
    let vwap_val = vwap(candles, 20);
    if vwap_val > 0.0 {
        let aligned = match direction {
            Direction::Long => current_price > vwap_val,
            Direction::Short => current_price < vwap_val,
            Direction::Neutral => false,
        };
        let pct = (current_price - vwap_val) / vwap_val * 100.0;
        if aligned {
            result.vwap_valid = true;
            result.score += 1;
            result
                .details
                .push(format!("VWAP={:.4}, price {:.2}% away", vwap_val, pct));
        } else {
            result.details.push(format!(
                "VWAP={:.4}, price on wrong side ({:.2}%)",
                vwap_val, pct
            ));
        }
    }

    // 3. Volume spike
    let (spike, ratio) = volume_spike(candles, 1.0, 20);
    if spike {
        result.volume_valid = true;
        result.score += 1;
        result
            .details
            .push(format!("Volume {:.2}x average", ratio));
    } else {
        result
            .details
            .push(format!("Volume {:.2}x average, no spike", ratio));
    }

    // 4. Pivot zone alignment
    if let Some(pivots) = pivot_points(candles) {
        let (zone, nearest) = pivot_zone(current_price, &pivots, 0.5);
        let aligned = match direction {
            Direction::Long => matches!(
                zone,
                PivotZone::NearSupport | PivotZone::AtPivot | PivotZone::AbovePivot
            ),
            Direction::Short => matches!(
                zone,
                PivotZone::NearResistance | PivotZone::AtPivot | PivotZone::BelowPivot
            ),
            Direction::Neutral => false,
        };
        if aligned {
            result.pivot_valid = true;
            result.score += 1;
            result.details.push(format!(
                "Pivot zone={}, nearest={:.4}",
                zone.as_str(),
                nearest
            ));
        } else {
            result.details.push(format!(
                "Pivot zone={} does not favor {} entry",
                zone.as_str(),
                direction.as_str()
            ));
        }
    }

    // 5. EMA 20/50 stack with price confirmation
    let ema20 = ema(&closes, 20).last().copied().unwrap_or(0.0);
    let ema50 = ema(&closes, 50).last().copied().unwrap_or(0.0);
    if ema20 > 0.0 && ema50 > 0.0 {
        let aligned = match direction {
            Direction::Long => ema20 > ema50 && current_price > ema20,
            Direction::Short => ema20 < ema50 && current_price < ema20,
            Direction::Neutral => false,
        };
        if aligned {
            result.ema_valid = true;
            result.score += 1;
            result
                .details
                .push(format!("EMA20={:.4}, EMA50={:.4} aligned", ema20, ema50));
        } else {
            result.details.push(format!(
                "EMA20={:.4}, EMA50={:.4} misaligned for {}",
                ema20,
                ema50,
                direction.as_str()
            ));
        }
    }

    result.passed = (result.score as usize) >= config.required_confluence;
    result
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use decision_core::types::TradingMode;

    use super::*;

    fn candle(open: f64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle {
            open_time: Utc::now(),
            open,
            high,
            low,
            close,
            volume,
        }
    }

    fn strong_uptrend(n: usize) -> Vec<Candle> {
        let mut candles: Vec<Candle> = (0..n)
            .map(|i| {
                let base = 100.0 + i as f64;
                candle(base, base + 1.5, base - 0.5, base + 1.0, 1_000_000.0)
            })
            .collect();
        // Latest bar prints a volume spike
        if let Some(last) = candles.last_mut() {
            last.volume = 2_500_000.0;
        }
        candles
    }

    #[test]
    fn strong_uptrend_confirms_long_entry() {
        let mut config = ModeConfig::default_for(TradingMode::Scalp);
        config.min_adx = 20.0;
        let candles = strong_uptrend(80);

        let result = check_entry_confluence(&candles, Direction::Long, &config);

        assert!(result.passed, "score was {}: {:?}", result.score, result.details);
        assert!(result.adx_valid);
        assert!(result.ema_valid);
        assert!(result.volume_valid);
    }

    #[test]
    fn uptrend_rejects_short_entry() {
        let config = ModeConfig::default_for(TradingMode::Scalp);
        let candles = strong_uptrend(80);

        let result = check_entry_confluence(&candles, Direction::Short, &config);

        assert!(!result.passed);
        assert!(!result.ema_valid);
        assert!(!result.vwap_valid);
    }

    #[test]
    fn short_history_scores_zero() {
        let config = ModeConfig::default_for(TradingMode::Scalp);
        let candles = strong_uptrend(30);

        let result = check_entry_confluence(&candles, Direction::Long, &config);

        assert_eq!(result.score, 0);
        assert!(!result.passed);
    }

    #[test]
    fn neutral_direction_never_passes() {
        let config = ModeConfig::default_for(TradingMode::Scalp);
        let candles = strong_uptrend(80);

        let result = check_entry_confluence(&candles, Direction::Neutral, &config);
        assert!(!result.passed);
    }
}
