use decision_core::error::DecisionError;
use serde::{Deserialize, Serialize};

/// One take-profit rung: trigger distance from entry and the share of the
/// remaining position to sell there.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TpLevelConfig {
    pub profit_percent: f64,
    pub sell_percent: f64,
}

/// Tuning for the scalp re-entry machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReentryConfig {
    /// Three rungs, ascending by profit distance
    pub tp_levels: [TpLevelConfig; 3],
    /// Fraction of the sold quantity to re-acquire at breakeven
    pub reentry_percent: f64,
    /// Band around the breakeven target that counts as "returned"
    pub price_buffer_percent: f64,
    /// Re-buy order attempts before the cycle is abandoned
    pub max_attempts: u32,
    /// Seconds a cycle may wait for its re-buy before failing
    pub timeout_secs: u64,
    /// Trailing distance from the runner's peak
    pub final_trailing_percent: f64,
    /// Share of the position the runner keeps after the final TP
    pub runner_hold_percent: f64,
    /// Share of total profit the dynamic stop protects
    pub dynamic_sl_protect_percent: f64,
    /// Share of total profit the dynamic stop may give back
    pub dynamic_sl_max_loss_percent: f64,
    /// Cycle cap per position
    pub max_cycles: u32,
    /// Protective stop distance applied after a completed re-buy
    pub stop_loss_percent: f64,
}

impl Default for ReentryConfig {
    fn default() -> Self {
        ReentryConfig {
            tp_levels: [
                TpLevelConfig {
                    profit_percent: 0.3,
                    sell_percent: 30.0,
                },
                TpLevelConfig {
                    profit_percent: 0.6,
                    sell_percent: 50.0,
                },
                TpLevelConfig {
                    profit_percent: 1.0,
                    sell_percent: 80.0,
                },
            ],
            reentry_percent: 80.0,
            price_buffer_percent: 0.05,
            max_attempts: 3,
            timeout_secs: 300,
            final_trailing_percent: 5.0,
            runner_hold_percent: 20.0,
            dynamic_sl_protect_percent: 60.0,
            dynamic_sl_max_loss_percent: 40.0,
            max_cycles: 10,
            stop_loss_percent: 1.5,
        }
    }
}

impl ReentryConfig {
    pub fn validate(&self) -> Result<(), DecisionError> {
        let mut prev = 0.0;
        for (i, level) in self.tp_levels.iter().enumerate() {
            if level.profit_percent <= prev {
                return Err(DecisionError::InvalidConfig(format!(
                    "TP{} profit {:.2}% must exceed the previous rung",
                    i + 1,
                    level.profit_percent
                )));
            }
            if level.sell_percent <= 0.0 || level.sell_percent > 100.0 {
                return Err(DecisionError::InvalidConfig(format!(
                    "TP{} sell percent {:.2} out of range (0, 100]",
                    i + 1,
                    level.sell_percent
                )));
            }
            prev = level.profit_percent;
        }
        if self.reentry_percent <= 0.0 || self.reentry_percent > 100.0 {
            return Err(DecisionError::InvalidConfig(format!(
                "reentry percent {:.2} out of range (0, 100]",
                self.reentry_percent
            )));
        }
        if self.price_buffer_percent <= 0.0 {
            return Err(DecisionError::InvalidConfig(
                "price buffer must be positive".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(DecisionError::InvalidConfig(
                "at least one re-buy attempt is required".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(DecisionError::InvalidConfig(
                "re-entry timeout must be positive".to_string(),
            ));
        }
        if self.final_trailing_percent <= 0.0 || self.final_trailing_percent >= 100.0 {
            return Err(DecisionError::InvalidConfig(format!(
                "trailing percent {:.2} out of range (0, 100)",
                self.final_trailing_percent
            )));
        }
        if self.runner_hold_percent <= 0.0 || self.runner_hold_percent >= 100.0 {
            return Err(DecisionError::InvalidConfig(format!(
                "runner hold percent {:.2} out of range (0, 100)",
                self.runner_hold_percent
            )));
        }
        let final_split = self.tp_levels[2].sell_percent + self.runner_hold_percent;
        if (final_split - 100.0).abs() > 0.1 {
            return Err(DecisionError::InvalidConfig(format!(
                "final TP sell + runner hold must split 100%, got {:.2}",
                final_split
            )));
        }
        let split = self.dynamic_sl_protect_percent + self.dynamic_sl_max_loss_percent;
        if (split - 100.0).abs() > 0.1 {
            return Err(DecisionError::InvalidConfig(format!(
                "dynamic SL protect + max loss must split 100%, got {:.2}",
                split
            )));
        }
        if self.max_cycles == 0 {
            return Err(DecisionError::InvalidConfig(
                "max cycles must be positive".to_string(),
            ));
        }
        if self.stop_loss_percent <= 0.0 {
            return Err(DecisionError::InvalidConfig(
                "stop loss percent must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
