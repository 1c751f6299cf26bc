use serde::{Deserialize, Serialize};

use crate::error::DecisionError;
use crate::types::TradingMode;

/// Multi-timeframe consensus settings for one mode.
/// Weights across the three timeframes must sum to 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MtfConsensusConfig {
    pub primary_timeframe: String,
    pub primary_weight: f64,
    pub secondary_timeframe: String,
    pub secondary_weight: f64,
    pub tertiary_timeframe: String,
    pub tertiary_weight: f64,
    /// Minimum count of aligned timeframes required
    pub min_consensus: usize,
    /// Minimum weighted strength (0-100) required
    pub min_weighted_strength: f64,
}

impl MtfConsensusConfig {
    pub fn weight_sum(&self) -> f64 {
        self.primary_weight + self.secondary_weight + self.tertiary_weight
    }
}

/// Circuit-breaker limits for one mode. Validated here, enforced by callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerLimits {
    pub max_trades_per_minute: u32,
    pub max_trades_per_hour: u32,
    pub max_trades_per_day: u32,
    pub max_consecutive_losses: u32,
    pub cooldown_minutes: u32,
}

/// Per-gate enable flags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateToggles {
    pub price_vs_ema: bool,
    pub vwap_band: bool,
    pub higher_timeframe_trend: bool,
    pub reference_trend: bool,
    pub adx_strength: bool,
    pub timeframe_divergence: bool,
    pub entry_confluence: bool,
    pub counter_trend: bool,
}

impl Default for GateToggles {
    fn default() -> Self {
        Self {
            price_vs_ema: true,
            vwap_band: true,
            higher_timeframe_trend: true,
            reference_trend: true,
            adx_strength: true,
            timeframe_divergence: true,
            entry_confluence: true,
            counter_trend: true,
        }
    }
}

/// Normalized configuration for one trading mode. One flat value object with
/// explicit fields; `validate` runs once at load time so use sites never
/// re-check shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeConfig {
    pub mode: TradingMode,

    // Timeframes
    pub trend_timeframe: String,
    pub entry_timeframe: String,
    pub analysis_timeframe: String,

    // Confidence thresholds, 0-100
    pub min_confidence: f64,
    pub wait_threshold: f64,
    pub execute_threshold: f64,

    // Sizing
    pub base_size_usd: f64,
    pub max_size_usd: f64,
    pub leverage: u32,
    pub max_positions: u32,

    // SL/TP shaping
    pub sl_atr_multiplier: f64,
    pub tp_atr_multiplier: f64,
    pub min_sl_percent: f64,
    pub max_sl_percent: f64,
    pub min_tp_percent: f64,
    pub max_tp_percent: f64,
    /// Weight given to advisory-suggested SL/TP when blending with the
    /// ATR-derived value (remainder goes to ATR)
    pub advisory_blend_weight: f64,
    /// Portion of the position closed at each of the four TP rungs; must sum to 100
    pub tp_allocations: [f64; 4],

    // Gate thresholds
    pub min_adx: f64,
    /// Secondary floor: +DI or -DI at/above this passes the strength gate with a penalty
    pub di_floor: f64,
    /// Confirmations required of the five confluence checks
    pub required_confluence: usize,
    pub block_on_divergence: bool,
    pub allow_counter_trend: bool,
    pub counter_trend_min_confidence: f64,
    pub counter_trend_require_reversal_pattern: bool,
    pub counter_trend_require_adx_weakening: bool,
    pub counter_trend_require_rsi_extreme: bool,

    // Fusion
    pub advisory_confidence_weight: f64,
    pub required_agreement: usize,

    pub gates: GateToggles,
    pub mtf: MtfConsensusConfig,
    pub circuit_breaker: CircuitBreakerLimits,
}

impl ModeConfig {
    /// Documented fallback defaults, used only when no stored configuration exists.
    pub fn default_for(mode: TradingMode) -> Self {
        let (trend_tf, entry_tf, analysis_tf) = match mode {
            TradingMode::UltraFast => ("5m", "1m", "1m"),
            TradingMode::Scalp => ("15m", "1m", "5m"),
            TradingMode::Swing => ("4h", "15m", "1h"),
            TradingMode::Position => ("1d", "1h", "4h"),
        };
        let min_adx = match mode {
            TradingMode::UltraFast => 15.0,
            TradingMode::Scalp => 20.0,
            TradingMode::Swing => 25.0,
            TradingMode::Position => 30.0,
        };
        let (sl_mult, tp_mult) = match mode {
            TradingMode::UltraFast => (0.3, 0.5),
            TradingMode::Scalp => (0.5, 1.0),
            TradingMode::Swing => (1.5, 3.0),
            TradingMode::Position => (2.0, 4.0),
        };
        let (leverage, base_usd, max_usd) = match mode {
            TradingMode::UltraFast => (10, 50.0, 200.0),
            TradingMode::Scalp => (10, 100.0, 500.0),
            TradingMode::Swing => (5, 200.0, 1000.0),
            TradingMode::Position => (3, 500.0, 2500.0),
        };

        Self {
            mode,
            trend_timeframe: trend_tf.to_string(),
            entry_timeframe: entry_tf.to_string(),
            analysis_timeframe: analysis_tf.to_string(),
            min_confidence: 50.0,
            wait_threshold: 50.0,
            execute_threshold: 65.0,
            base_size_usd: base_usd,
            max_size_usd: max_usd,
            leverage,
            max_positions: 3,
            sl_atr_multiplier: sl_mult,
            tp_atr_multiplier: tp_mult,
            min_sl_percent: 0.3,
            max_sl_percent: 3.0,
            min_tp_percent: 0.5,
            max_tp_percent: 5.0,
            advisory_blend_weight: 0.70,
            tp_allocations: [25.0, 25.0, 25.0, 25.0],
            min_adx,
            di_floor: 25.0,
            required_confluence: 3,
            block_on_divergence: true,
            allow_counter_trend: true,
            counter_trend_min_confidence: 50.0,
            counter_trend_require_reversal_pattern: true,
            // The ADX and RSI extras reject too many workable reversals to be
            // on by default; opt in per mode.
            counter_trend_require_adx_weakening: false,
            counter_trend_require_rsi_extreme: false,
            advisory_confidence_weight: 0.35,
            required_agreement: match mode {
                TradingMode::UltraFast | TradingMode::Scalp => 1,
                TradingMode::Swing => 2,
                TradingMode::Position => 2,
            },
            gates: GateToggles::default(),
            mtf: MtfConsensusConfig {
                primary_timeframe: trend_tf.to_string(),
                primary_weight: 0.5,
                secondary_timeframe: analysis_tf.to_string(),
                secondary_weight: 0.3,
                tertiary_timeframe: entry_tf.to_string(),
                tertiary_weight: 0.2,
                min_consensus: 2,
                min_weighted_strength: 40.0,
            },
            circuit_breaker: CircuitBreakerLimits {
                max_trades_per_minute: 2,
                max_trades_per_hour: 10,
                max_trades_per_day: 40,
                max_consecutive_losses: 3,
                cooldown_minutes: 30,
            },
        }
    }

    /// Rejects malformed configuration before any decision runs. Invalid
    /// values are never clamped into a "close enough" substitute.
    pub fn validate(&self) -> Result<(), DecisionError> {
        let alloc_sum: f64 = self.tp_allocations.iter().sum();
        if (alloc_sum - 100.0).abs() > 0.1 {
            return Err(DecisionError::InvalidConfig(format!(
                "take-profit allocations sum to {:.2}, expected 100",
                alloc_sum
            )));
        }
        if self.tp_allocations.iter().any(|&a| a < 0.0) {
            return Err(DecisionError::InvalidConfig(
                "take-profit allocations must be non-negative".to_string(),
            ));
        }
        if self.wait_threshold > self.execute_threshold {
            return Err(DecisionError::InvalidConfig(format!(
                "wait threshold {:.1} exceeds execute threshold {:.1}",
                self.wait_threshold, self.execute_threshold
            )));
        }
        for (name, v) in [
            ("min_confidence", self.min_confidence),
            ("wait_threshold", self.wait_threshold),
            ("execute_threshold", self.execute_threshold),
        ] {
            if !(0.0..=100.0).contains(&v) {
                return Err(DecisionError::InvalidConfig(format!(
                    "{} {:.1} outside 0-100",
                    name, v
                )));
            }
        }
        if self.min_sl_percent > self.max_sl_percent || self.min_tp_percent > self.max_tp_percent {
            return Err(DecisionError::InvalidConfig(
                "SL/TP bounds inverted".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.advisory_blend_weight)
            || !(0.0..=1.0).contains(&self.advisory_confidence_weight)
        {
            return Err(DecisionError::InvalidConfig(
                "advisory weights must be within 0-1".to_string(),
            ));
        }
        if self.leverage == 0 {
            return Err(DecisionError::InvalidConfig(
                "leverage must be at least 1".to_string(),
            ));
        }
        if self.base_size_usd <= 0.0 || self.max_size_usd < self.base_size_usd {
            return Err(DecisionError::InvalidConfig(
                "position size bounds invalid".to_string(),
            ));
        }
        let mtf_sum = self.mtf.weight_sum();
        if (mtf_sum - 1.0).abs() > 1e-9 {
            return Err(DecisionError::InvalidConfig(format!(
                "multi-timeframe weights sum to {:.6}, expected 1",
                mtf_sum
            )));
        }
        Ok(())
    }
}

/// Global settings shared across modes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Market's dominant instrument used by the reference-trend gate
    pub reference_symbol: String,
    pub reference_trend_timeframe: String,
    /// TTL in seconds for the trend caches
    pub trend_cache_ttl_secs: i64,
    /// TTL in seconds for cached advisory responses
    pub advisory_cache_ttl_secs: i64,
    /// Deadline applied to each analyzer / external call
    pub analyzer_timeout_secs: u64,
    /// Capacity of the recent-decisions ring buffer
    pub recent_decisions_capacity: usize,
    /// Minimum 24h quote volume (USD) for scalp-grade liquidity
    pub min_quote_volume_scalp: f64,
    /// Minimum 24h quote volume (USD) for swing-grade liquidity
    pub min_quote_volume_swing: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            reference_symbol: "BTCUSDT".to_string(),
            reference_trend_timeframe: "15m".to_string(),
            trend_cache_ttl_secs: 300,
            advisory_cache_ttl_secs: 300,
            analyzer_timeout_secs: 10,
            recent_decisions_capacity: 100,
            min_quote_volume_scalp: 5_000_000.0,
            min_quote_volume_swing: 1_000_000.0,
        }
    }
}
