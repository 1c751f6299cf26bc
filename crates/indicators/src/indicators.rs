use decision_core::types::{Candle, TrendDirection, TrendHealth};
use serde::{Deserialize, Serialize};

/// Simple Moving Average
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }

    let mut result = Vec::with_capacity(data.len() - period + 1);
    for i in period - 1..data.len() {
        let sum: f64 = data[i + 1 - period..=i].iter().sum();
        result.push(sum / period as f64);
    }
    result
}

/// Exponential Moving Average
pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.is_empty() {
        return vec![];
    }

    let multiplier = 2.0 / (period as f64 + 1.0);

    // Seed with SMA of the first period
    if data.len() < period {
        return vec![data.iter().sum::<f64>() / data.len() as f64];
    }

    let mut result = Vec::with_capacity(data.len());
    let seed: f64 = data[..period].iter().sum::<f64>() / period as f64;
    result.push(seed);

    for i in 1..data.len() {
        let ema_val = (data[i] - result[i - 1]) * multiplier + result[i - 1];
        result.push(ema_val);
    }

    result
}

/// Latest EMA of the close series, 0.0 when not computable
pub fn last_ema(candles: &[Candle], period: usize) -> f64 {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    ema(&closes, period).last().copied().unwrap_or(0.0)
}

/// Relative Strength Index
pub fn rsi(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period + 1 {
        return vec![];
    }

    let mut gains = Vec::new();
    let mut losses = Vec::new();

    for i in 1..data.len() {
        let change = data[i] - data[i - 1];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(change.abs());
        }
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;

    let mut rsi_values = Vec::with_capacity(data.len() - period);

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;

        let rs = if avg_loss == 0.0 {
            100.0
        } else {
            avg_gain / avg_loss
        };

        rsi_values.push(100.0 - (100.0 / (1.0 + rs)));
    }

    rsi_values
}

/// MACD (Moving Average Convergence Divergence)
pub struct MacdResult {
    pub macd_line: Vec<f64>,
    pub signal_line: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd(
    data: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> MacdResult {
    if fast_period == 0 || slow_period == 0 || signal_period == 0 || slow_period < fast_period {
        return MacdResult {
            macd_line: vec![],
            signal_line: vec![],
            histogram: vec![],
        };
    }

    let ema_fast = ema(data, fast_period);
    let ema_slow = ema(data, slow_period);

    let offset = slow_period - fast_period;
    let mut macd_line = Vec::new();

    for i in offset..ema_fast.len() {
        macd_line.push(ema_fast[i] - ema_slow[i - offset]);
    }

    let signal_line = ema(&macd_line, signal_period);

    let mut histogram = Vec::new();
    let hist_offset = macd_line.len().saturating_sub(signal_line.len());
    for i in 0..signal_line.len() {
        histogram.push(macd_line[i + hist_offset] - signal_line[i]);
    }

    MacdResult {
        macd_line,
        signal_line,
        histogram,
    }
}

/// Bollinger Bands
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn bollinger_bands(data: &[f64], period: usize, std_dev: f64) -> BollingerBands {
    if period == 0 || data.len() < period {
        return BollingerBands {
            upper: vec![],
            middle: vec![],
            lower: vec![],
        };
    }

    let middle = sma(data, period);
    let mut upper = Vec::with_capacity(middle.len());
    let mut lower = Vec::with_capacity(middle.len());

    for i in period - 1..data.len() {
        let slice = &data[i + 1 - period..=i];
        let mean = middle[i + 1 - period];
        let variance: f64 =
            slice.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
        let std = variance.sqrt();

        upper.push(mean + std_dev * std);
        lower.push(mean - std_dev * std);
    }

    BollingerBands {
        upper,
        middle,
        lower,
    }
}

/// Average True Range
pub fn atr(candles: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || candles.len() < period + 1 {
        return vec![];
    }

    let mut true_ranges = Vec::new();

    for i in 1..candles.len() {
        let high_low = candles[i].high - candles[i].low;
        let high_close = (candles[i].high - candles[i - 1].close).abs();
        let low_close = (candles[i].low - candles[i - 1].close).abs();

        true_ranges.push(high_low.max(high_close).max(low_close));
    }

    let mut atr_values = Vec::new();
    let mut atr = true_ranges[..period].iter().sum::<f64>() / period as f64;
    atr_values.push(atr);

    for i in period..true_ranges.len() {
        atr = (atr * (period - 1) as f64 + true_ranges[i]) / period as f64;
        atr_values.push(atr);
    }

    atr_values
}

/// Latest ATR as a percent of the latest close, 0.0 when not computable
pub fn atr_percent(candles: &[Candle], period: usize) -> f64 {
    let last_atr = match atr(candles, period).last() {
        Some(&v) => v,
        None => return 0.0,
    };
    match candles.last() {
        Some(c) if c.close > 0.0 => last_atr / c.close * 100.0,
        _ => 0.0,
    }
}

/// Average Directional Index with Wilder's smoothing
pub struct AdxResult {
    pub adx: Vec<f64>,
    pub plus_di: Vec<f64>,
    pub minus_di: Vec<f64>,
}

impl AdxResult {
    pub fn latest(&self) -> Option<(f64, f64, f64)> {
        Some((
            *self.adx.last()?,
            *self.plus_di.last()?,
            *self.minus_di.last()?,
        ))
    }
}

pub fn adx(candles: &[Candle], period: usize) -> AdxResult {
    if period == 0 || candles.len() < period * 2 + 1 {
        return AdxResult {
            adx: vec![],
            plus_di: vec![],
            minus_di: vec![],
        };
    }

    let mut plus_dm = Vec::with_capacity(candles.len() - 1);
    let mut minus_dm = Vec::with_capacity(candles.len() - 1);
    let mut true_range = Vec::with_capacity(candles.len() - 1);

    for i in 1..candles.len() {
        let up_move = candles[i].high - candles[i - 1].high;
        let down_move = candles[i - 1].low - candles[i].low;

        plus_dm.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dm.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });

        let hl = candles[i].high - candles[i].low;
        let hc = (candles[i].high - candles[i - 1].close).abs();
        let lc = (candles[i].low - candles[i - 1].close).abs();
        true_range.push(hl.max(hc).max(lc));
    }

    let mut smoothed_plus_dm = plus_dm[..period].iter().sum::<f64>();
    let mut smoothed_minus_dm = minus_dm[..period].iter().sum::<f64>();
    let mut smoothed_tr = true_range[..period].iter().sum::<f64>();

    let mut plus_di_values = Vec::new();
    let mut minus_di_values = Vec::new();
    let mut dx_values = Vec::new();

    for i in period..plus_dm.len() {
        smoothed_plus_dm = smoothed_plus_dm - smoothed_plus_dm / period as f64 + plus_dm[i];
        smoothed_minus_dm = smoothed_minus_dm - smoothed_minus_dm / period as f64 + minus_dm[i];
        smoothed_tr = smoothed_tr - smoothed_tr / period as f64 + true_range[i];

        let pdi = if smoothed_tr > 0.0 {
            100.0 * smoothed_plus_dm / smoothed_tr
        } else {
            0.0
        };
        let mdi = if smoothed_tr > 0.0 {
            100.0 * smoothed_minus_dm / smoothed_tr
        } else {
            0.0
        };

        plus_di_values.push(pdi);
        minus_di_values.push(mdi);

        let di_sum = pdi + mdi;
        dx_values.push(if di_sum > 0.0 {
            100.0 * (pdi - mdi).abs() / di_sum
        } else {
            0.0
        });
    }

    if dx_values.len() < period {
        return AdxResult {
            adx: vec![],
            plus_di: plus_di_values,
            minus_di: minus_di_values,
        };
    }

    let mut adx_values = Vec::new();
    let mut adx_val = dx_values[..period].iter().sum::<f64>() / period as f64;
    adx_values.push(adx_val);

    for i in period..dx_values.len() {
        adx_val = (adx_val * (period - 1) as f64 + dx_values[i]) / period as f64;
        adx_values.push(adx_val);
    }

    AdxResult {
        adx: adx_values,
        plus_di: plus_di_values,
        minus_di: minus_di_values,
    }
}

/// Volume-Weighted Average Price over the trailing `period` candles.
/// Returns 0.0 when no volume traded.
pub fn vwap(candles: &[Candle], period: usize) -> f64 {
    if candles.is_empty() || period == 0 {
        return 0.0;
    }

    let start = candles.len().saturating_sub(period);
    let mut cumulative_tpv = 0.0;
    let mut cumulative_volume = 0.0;

    for candle in &candles[start..] {
        let typical_price = (candle.high + candle.low + candle.close) / 3.0;
        cumulative_tpv += typical_price * candle.volume;
        cumulative_volume += candle.volume;
    }

    if cumulative_volume > 0.0 {
        cumulative_tpv / cumulative_volume
    } else {
        0.0
    }
}

/// Classic floor pivots derived from the previous completed candle
#[derive(Debug, Clone, Copy)]
pub struct PivotPoints {
    pub pp: f64,
    pub r1: f64,
    pub r2: f64,
    pub s1: f64,
    pub s2: f64,
}

pub fn pivot_points(candles: &[Candle]) -> Option<PivotPoints> {
    if candles.len() < 2 {
        return None;
    }

    let prev = &candles[candles.len() - 2];
    let pp = (prev.high + prev.low + prev.close) / 3.0;

    Some(PivotPoints {
        pp,
        r1: 2.0 * pp - prev.low,
        r2: pp + (prev.high - prev.low),
        s1: 2.0 * pp - prev.high,
        s2: pp - (prev.high - prev.low),
    })
}

/// Where price sits relative to the pivot grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PivotZone {
    NearSupport,
    NearResistance,
    AtPivot,
    AbovePivot,
    BelowPivot,
}

impl PivotZone {
    pub fn as_str(&self) -> &'static str {
        match self {
            PivotZone::NearSupport => "near_support",
            PivotZone::NearResistance => "near_resistance",
            PivotZone::AtPivot => "at_pivot",
            PivotZone::AbovePivot => "above_pivot",
            PivotZone::BelowPivot => "below_pivot",
        }
    }
}

/// Classify price against the pivot grid. `threshold_pct` is the proximity
/// band as a percent of price.
pub fn pivot_zone(price: f64, pivots: &PivotPoints, threshold_pct: f64) -> (PivotZone, f64) {
    let threshold = price * threshold_pct / 100.0;

    let levels = [
        ("S2", pivots.s2),
        ("S1", pivots.s1),
        ("PP", pivots.pp),
        ("R1", pivots.r1),
        ("R2", pivots.r2),
    ];

    let mut nearest_name = "PP";
    let mut nearest_level = pivots.pp;
    let mut nearest_dist = f64::MAX;

    for (name, level) in levels {
        let dist = (price - level).abs();
        if dist < nearest_dist {
            nearest_dist = dist;
            nearest_name = name;
            nearest_level = level;
        }
    }

    if nearest_dist <= threshold {
        let zone = match nearest_name {
            "S1" | "S2" => PivotZone::NearSupport,
            "R1" | "R2" => PivotZone::NearResistance,
            _ => PivotZone::AtPivot,
        };
        return (zone, nearest_level);
    }

    if price > pivots.pp {
        (PivotZone::AbovePivot, pivots.pp)
    } else {
        (PivotZone::BelowPivot, pivots.pp)
    }
}

/// Latest volume against the trailing average (excluding the latest candle).
/// Returns (spike, ratio).
pub fn volume_spike(candles: &[Candle], multiplier: f64, avg_period: usize) -> (bool, f64) {
    if candles.len() < avg_period + 1 || avg_period == 0 {
        return (false, 0.0);
    }

    let end = candles.len() - 1;
    let start = end - avg_period;
    let avg_vol: f64 =
        candles[start..end].iter().map(|c| c.volume).sum::<f64>() / avg_period as f64;

    if avg_vol == 0.0 {
        return (false, 0.0);
    }

    let ratio = candles[end].volume / avg_vol;
    (ratio >= multiplier, ratio)
}

/// Swing highs and lows with 2-bar confirmation on both sides
pub struct SwingPoints {
    pub highs: Vec<f64>,
    pub lows: Vec<f64>,
}

pub fn swing_points(candles: &[Candle], lookback: usize) -> SwingPoints {
    if candles.len() < lookback || lookback < 5 {
        return SwingPoints {
            highs: vec![],
            lows: vec![],
        };
    }

    let recent = &candles[candles.len() - lookback..];
    let mut highs = Vec::new();
    let mut lows = Vec::new();

    for i in 2..recent.len() - 2 {
        if recent[i].high > recent[i - 1].high
            && recent[i].high > recent[i - 2].high
            && recent[i].high > recent[i + 1].high
            && recent[i].high > recent[i + 2].high
        {
            highs.push(recent[i].high);
        }
        if recent[i].low < recent[i - 1].low
            && recent[i].low < recent[i - 2].low
            && recent[i].low < recent[i + 1].low
            && recent[i].low < recent[i + 2].low
        {
            lows.push(recent[i].low);
        }
    }

    SwingPoints { highs, lows }
}

/// EMA-20/50 crossover trend with price confirmation
pub fn detect_trend(candles: &[Candle]) -> TrendDirection {
    if candles.len() < 50 {
        return TrendDirection::Neutral;
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let ema20 = match ema(&closes, 20).last() {
        Some(&v) => v,
        None => return TrendDirection::Neutral,
    };
    let ema50 = match ema(&closes, 50).last() {
        Some(&v) => v,
        None => return TrendDirection::Neutral,
    };
    let price = closes[closes.len() - 1];

    if ema20 > ema50 && price > ema20 {
        TrendDirection::Bullish
    } else if ema20 < ema50 && price < ema20 {
        TrendDirection::Bearish
    } else {
        TrendDirection::Neutral
    }
}

/// Trend direction plus ADX strength for one timeframe's candles
pub fn trend_health(candles: &[Candle], timeframe: &str) -> TrendHealth {
    let direction = detect_trend(candles);
    let adx_result = adx(candles, 14);
    let (adx_val, plus_di, minus_di) = adx_result.latest().unwrap_or((0.0, 0.0, 0.0));

    TrendHealth {
        timeframe: timeframe.to_string(),
        direction,
        adx: adx_val,
        plus_di,
        minus_di,
    }
}
