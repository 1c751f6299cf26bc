use decision_core::config::ModeConfig;
use decision_core::error::DecisionError;
use decision_core::types::{AdvisoryAssessment, Direction, TakeProfitLevel, TradePlan};
use tracing::debug;

const ENTRY_BAND_PERCENT: f64 = 0.1;

/// Builds concrete trade parameters from volatility and the advisory
/// assessment. Stop and target distances derive from ATR, blended with the
/// advisory's suggested prices when present, then clamped to the mode bounds.
pub struct AdaptiveRiskSizer;

impl AdaptiveRiskSizer {
    /// `confidence` scales position size between the mode's base and max.
    /// `atr_percent` is the latest ATR as a percent of price.
    pub fn size(
        price: f64,
        direction: Direction,
        confidence: f64,
        atr_percent: f64,
        config: &ModeConfig,
        advisory: Option<&AdvisoryAssessment>,
    ) -> Result<TradePlan, DecisionError> {
        if price <= 0.0 {
            return Err(DecisionError::Calculation(format!(
                "cannot size a position at price {}",
                price
            )));
        }
        if !direction.is_directional() {
            return Err(DecisionError::Calculation(
                "cannot size a neutral position".to_string(),
            ));
        }

        let atr_sl = atr_percent * config.sl_atr_multiplier;
        let atr_tp = atr_percent * config.tp_atr_multiplier;

        // Advisory prices become percent distances; values on the wrong side
        // of entry are discarded
        let advisory_sl = advisory
            .and_then(|a| a.stop_loss)
            .map(|sl| percent_distance(price, sl, direction, true))
            .filter(|&pct| pct > 0.0);
        let advisory_tp = advisory
            .and_then(|a| a.take_profit)
            .map(|tp| percent_distance(price, tp, direction, false))
            .filter(|&pct| pct > 0.0);

        let w = config.advisory_blend_weight;
        let sl_percent = match advisory_sl {
            Some(adv) => adv * w + atr_sl * (1.0 - w),
            None => atr_sl,
        }
        .clamp(config.min_sl_percent, config.max_sl_percent);
        let tp_percent = match advisory_tp {
            Some(adv) => adv * w + atr_tp * (1.0 - w),
            None => atr_tp,
        }
        .clamp(config.min_tp_percent, config.max_tp_percent);

        debug!(
            atr_sl = format!("{:.2}", atr_sl),
            atr_tp = format!("{:.2}", atr_tp),
            sl_percent = format!("{:.2}", sl_percent),
            tp_percent = format!("{:.2}", tp_percent),
            "adaptive SL/TP computed"
        );

        let scale = if config.min_confidence < 100.0 {
            ((confidence - config.min_confidence) / (100.0 - config.min_confidence))
                .clamp(0.0, 1.0)
        } else {
            0.0
        };
        let position_usd =
            config.base_size_usd + (config.max_size_usd - config.base_size_usd) * scale;

        let sign = match direction {
            Direction::Long => 1.0,
            _ => -1.0,
        };

        let stop_loss_price = price * (1.0 - sign * sl_percent / 100.0);

        // Four rungs at 25/50/75/100% of the target distance
        let take_profits = config
            .tp_allocations
            .iter()
            .enumerate()
            .map(|(i, &allocation)| {
                let fraction = (i + 1) as f64 * 0.25;
                let gain = tp_percent * fraction;
                TakeProfitLevel {
                    level: (i + 1) as u8,
                    price: price * (1.0 + sign * gain / 100.0),
                    allocation_percent: allocation,
                    gain_percent: gain,
                }
            })
            .collect();

        let band = price * ENTRY_BAND_PERCENT / 100.0;

        Ok(TradePlan {
            entry_low: price - band,
            entry_high: price + band,
            position_usd,
            leverage: config.leverage,
            stop_loss_price,
            stop_loss_percent: sl_percent,
            take_profits,
            risk_reward: if sl_percent > 0.0 {
                tp_percent / sl_percent
            } else {
                0.0
            },
        })
    }
}

/// Distance from entry to a protective or target price, in percent. Returns a
/// non-positive value when the price sits on the wrong side of entry.
fn percent_distance(price: f64, level: f64, direction: Direction, is_stop: bool) -> f64 {
    let raw = match (direction, is_stop) {
        (Direction::Long, true) => price - level,
        (Direction::Long, false) => level - price,
        (Direction::Short, true) => level - price,
        (Direction::Short, false) => price - level,
        (Direction::Neutral, _) => 0.0,
    };
    raw / price * 100.0
}

#[cfg(test)]
mod tests {
    use decision_core::types::TradingMode;

    use super::*;

    fn advisory(stop_loss: Option<f64>, take_profit: Option<f64>) -> AdvisoryAssessment {
        AdvisoryAssessment {
            direction: Direction::Long,
            confidence: 0.8,
            reasoning: String::new(),
            risk_level: "medium".to_string(),
            stop_loss,
            take_profit,
        }
    }

    #[test]
    fn ladder_allocations_sum_to_100() {
        let config = ModeConfig::default_for(TradingMode::Scalp);
        let plan =
            AdaptiveRiskSizer::size(100.0, Direction::Long, 75.0, 1.0, &config, None).unwrap();

        assert_eq!(plan.take_profits.len(), 4);
        let total: f64 = plan.take_profits.iter().map(|tp| tp.allocation_percent).sum();
        assert!((total - 100.0).abs() < 0.1);
    }

    #[test]
    fn long_prices_are_direction_aware() {
        let config = ModeConfig::default_for(TradingMode::Scalp);
        let plan =
            AdaptiveRiskSizer::size(100.0, Direction::Long, 75.0, 1.0, &config, None).unwrap();

        assert!(plan.stop_loss_price < 100.0);
        for tp in &plan.take_profits {
            assert!(tp.price > 100.0);
        }
        // Rungs rise monotonically
        for pair in plan.take_profits.windows(2) {
            assert!(pair[1].price > pair[0].price);
        }
    }

    #[test]
    fn short_prices_are_mirrored() {
        let config = ModeConfig::default_for(TradingMode::Scalp);
        let plan =
            AdaptiveRiskSizer::size(100.0, Direction::Short, 75.0, 1.0, &config, None).unwrap();

        assert!(plan.stop_loss_price > 100.0);
        for tp in &plan.take_profits {
            assert!(tp.price < 100.0);
        }
    }

    #[test]
    fn stops_clamp_to_mode_bounds() {
        let config = ModeConfig::default_for(TradingMode::Scalp);
        // Enormous volatility would put the raw stop far outside the bounds
        let plan =
            AdaptiveRiskSizer::size(100.0, Direction::Long, 75.0, 50.0, &config, None).unwrap();

        assert!(plan.stop_loss_percent <= config.max_sl_percent + 1e-9);

        // Tiny volatility clamps up to the floor
        let plan =
            AdaptiveRiskSizer::size(100.0, Direction::Long, 75.0, 0.01, &config, None).unwrap();
        assert!(plan.stop_loss_percent >= config.min_sl_percent - 1e-9);
    }

    #[test]
    fn advisory_stop_blends_at_configured_weight() {
        let mut config = ModeConfig::default_for(TradingMode::Scalp);
        config.min_sl_percent = 0.1;
        config.max_sl_percent = 10.0;
        config.advisory_blend_weight = 0.70;
        config.sl_atr_multiplier = 1.0;

        // ATR stop 1.0%, advisory stop at 98.0 = 2.0%
        let adv = advisory(Some(98.0), None);
        let plan =
            AdaptiveRiskSizer::size(100.0, Direction::Long, 75.0, 1.0, &config, Some(&adv))
                .unwrap();

        // 2.0 * 0.7 + 1.0 * 0.3 = 1.7
        assert!((plan.stop_loss_percent - 1.7).abs() < 1e-9);
    }

    #[test]
    fn wrong_side_advisory_stop_is_discarded() {
        let mut config = ModeConfig::default_for(TradingMode::Scalp);
        config.sl_atr_multiplier = 1.0;
        config.min_sl_percent = 0.1;
        config.max_sl_percent = 10.0;

        // Advisory "stop" above entry for a long is nonsense, fall back to ATR
        let adv = advisory(Some(105.0), None);
        let plan =
            AdaptiveRiskSizer::size(100.0, Direction::Long, 75.0, 1.0, &config, Some(&adv))
                .unwrap();

        assert!((plan.stop_loss_percent - 1.0).abs() < 1e-9);
    }

    #[test]
    fn position_scales_with_confidence() {
        let config = ModeConfig::default_for(TradingMode::Scalp);
        let low =
            AdaptiveRiskSizer::size(100.0, Direction::Long, config.min_confidence, 1.0, &config, None)
                .unwrap();
        let high =
            AdaptiveRiskSizer::size(100.0, Direction::Long, 100.0, 1.0, &config, None).unwrap();

        assert!((low.position_usd - config.base_size_usd).abs() < 1e-9);
        assert!((high.position_usd - config.max_size_usd).abs() < 1e-9);
    }

    #[test]
    fn neutral_direction_is_an_error() {
        let config = ModeConfig::default_for(TradingMode::Scalp);
        let err =
            AdaptiveRiskSizer::size(100.0, Direction::Neutral, 75.0, 1.0, &config, None)
                .unwrap_err();
        assert!(matches!(err, DecisionError::Calculation(_)));
    }

    #[test]
    fn risk_reward_matches_full_target() {
        let mut config = ModeConfig::default_for(TradingMode::Scalp);
        config.min_sl_percent = 0.1;
        config.max_sl_percent = 10.0;
        config.min_tp_percent = 0.1;
        config.max_tp_percent = 10.0;
        config.sl_atr_multiplier = 1.0;
        config.tp_atr_multiplier = 2.0;

        let plan =
            AdaptiveRiskSizer::size(100.0, Direction::Long, 75.0, 1.0, &config, None).unwrap();
        assert!((plan.risk_reward - 2.0).abs() < 1e-9);
    }
}
