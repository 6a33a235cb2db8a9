//! Technical indicators over kline closes, in exact decimal arithmetic

use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::common::types::Kline;

const RSI_PERIOD: usize = 14;
const BB_PERIOD: usize = 20;
const BB_WIDTH: Decimal = Decimal::TWO;
const OUTPUT_DP: u32 = 8;

/// Oversold threshold used when auditing "oversold" claims
pub const RSI_OVERSOLD: Decimal = dec!(30);
/// Overbought threshold used when auditing "overbought" claims
pub const RSI_OVERBOUGHT: Decimal = dec!(70);

/// Indicator snapshot for one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Indicators {
    /// RSI(14), Wilder smoothing
    pub rsi: Decimal,
    pub bb_upper: Decimal,
    pub bb_middle: Decimal,
    pub bb_lower: Decimal,
    pub sma_20: Decimal,
    pub ema_12: Decimal,
    pub ema_26: Decimal,
}

impl Indicators {
    /// Compute every indicator, or `None` when history is too short
    pub fn from_closes(closes: &[Decimal]) -> Option<Self> {
        let (bb_upper, bb_middle, bb_lower) = bollinger(closes, BB_PERIOD, BB_WIDTH)?;
        Some(Self {
            rsi: rsi(closes, RSI_PERIOD)?.round_dp(2),
            bb_upper: bb_upper.round_dp(OUTPUT_DP),
            bb_middle: bb_middle.round_dp(OUTPUT_DP),
            bb_lower: bb_lower.round_dp(OUTPUT_DP),
            sma_20: sma(closes, 20)?.round_dp(OUTPUT_DP),
            ema_12: ema(closes, 12)?.round_dp(OUTPUT_DP),
            ema_26: ema(closes, 26)?.round_dp(OUTPUT_DP),
        })
    }

    pub fn is_oversold(&self) -> bool {
        self.rsi < RSI_OVERSOLD
    }

    pub fn is_overbought(&self) -> bool {
        self.rsi > RSI_OVERBOUGHT
    }
}

/// Statistics over a kline window (96 hourly candles by default)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WindowStats {
    pub change_pct: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub average: Decimal,
}

impl WindowStats {
    pub fn from_klines(klines: &[Kline]) -> Option<Self> {
        let first = klines.first()?;
        let last = klines.last()?;
        let high = klines.iter().map(|k| k.high).max()?;
        let low = klines.iter().map(|k| k.low).min()?;
        let average = klines.iter().map(|k| k.close).sum::<Decimal>() / Decimal::from(klines.len());
        let change_pct = if first.open.is_zero() {
            Decimal::ZERO
        } else {
            (last.close - first.open) / first.open * Decimal::ONE_HUNDRED
        };
        Some(Self {
            change_pct: change_pct.round_dp(2),
            high,
            low,
            average: average.round_dp(OUTPUT_DP),
        })
    }
}

/// Simple moving average of the last `period` values
pub fn sma(values: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().sum::<Decimal>() / Decimal::from(period))
}

/// Exponential moving average seeded with the SMA of the first `period` values
pub fn ema(values: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || values.len() < period {
        return None;
    }
    let k = Decimal::TWO / Decimal::from(period + 1);
    let seed = values[..period].iter().sum::<Decimal>() / Decimal::from(period);
    Some(
        values[period..]
            .iter()
            .fold(seed, |prev, v| (*v - prev) * k + prev),
    )
}

/// Relative strength index with Wilder smoothing
pub fn rsi(values: &[Decimal], period: usize) -> Option<Decimal> {
    if period == 0 || values.len() < period + 1 {
        return None;
    }
    let changes: Vec<Decimal> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let p = Decimal::from(period);

    let mut avg_gain = changes[..period]
        .iter()
        .filter(|c| c.is_sign_positive())
        .sum::<Decimal>()
        / p;
    let mut avg_loss = changes[..period]
        .iter()
        .filter(|c| c.is_sign_negative())
        .map(|c| c.abs())
        .sum::<Decimal>()
        / p;

    for change in &changes[period..] {
        let gain = (*change).max(Decimal::ZERO);
        let loss = (-*change).max(Decimal::ZERO);
        avg_gain = (avg_gain * (p - Decimal::ONE) + gain) / p;
        avg_loss = (avg_loss * (p - Decimal::ONE) + loss) / p;
    }

    if avg_loss.is_zero() {
        if avg_gain.is_zero() {
            return Some(Decimal::from(50));
        }
        return Some(Decimal::ONE_HUNDRED);
    }
    let rs = avg_gain / avg_loss;
    Some(Decimal::ONE_HUNDRED - Decimal::ONE_HUNDRED / (Decimal::ONE + rs))
}

/// Bollinger bands: (upper, middle, lower) with population standard deviation
pub fn bollinger(values: &[Decimal], period: usize, width: Decimal) -> Option<(Decimal, Decimal, Decimal)> {
    let middle = sma(values, period)?;
    let window = &values[values.len() - period..];
    let variance = window
        .iter()
        .map(|v| (*v - middle) * (*v - middle))
        .sum::<Decimal>()
        / Decimal::from(period);
    let std_dev = variance.sqrt()?;
    Some((middle + width * std_dev, middle, middle - width * std_dev))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[i64]) -> Vec<Decimal> {
        values.iter().map(|v| Decimal::from(*v)).collect()
    }

    #[test]
    fn test_sma() {
        assert_eq!(sma(&series(&[1, 2, 3, 4, 5]), 5), Some(dec!(3)));
        assert_eq!(sma(&series(&[1, 2, 3, 4, 5]), 2), Some(dec!(4.5)));
        assert_eq!(sma(&series(&[1, 2]), 3), None);
    }

    #[test]
    fn test_ema_of_constant_series() {
        let flat = vec![dec!(100); 40];
        assert_eq!(ema(&flat, 12), Some(dec!(100)));
    }

    #[test]
    fn test_rsi_extremes() {
        let rising: Vec<Decimal> = (1..=30).map(Decimal::from).collect();
        assert_eq!(rsi(&rising, 14), Some(dec!(100)));

        let falling: Vec<Decimal> = (1..=30).rev().map(Decimal::from).collect();
        assert_eq!(rsi(&falling, 14), Some(Decimal::ZERO));

        let flat = vec![dec!(5); 30];
        assert_eq!(rsi(&flat, 14), Some(dec!(50)));
    }

    #[test]
    fn test_bollinger_of_constant_series_collapses() {
        let flat = vec![dec!(0.5); 25];
        let (upper, middle, lower) = bollinger(&flat, 20, dec!(2)).unwrap();
        assert_eq!(upper, middle);
        assert_eq!(lower, middle);
    }

    #[test]
    fn test_bollinger_known_values() {
        // population std dev of 2,4,4,4,5,5,7,9 is 2
        let values = series(&[2, 4, 4, 4, 5, 5, 7, 9]);
        let (upper, middle, lower) = bollinger(&values, 8, dec!(2)).unwrap();
        assert_eq!(middle, dec!(5));
        assert!((upper - dec!(9)).abs() < dec!(0.000001));
        assert!((lower - dec!(1)).abs() < dec!(0.000001));
    }

    #[test]
    fn test_indicators_need_history() {
        let short = vec![dec!(1); 10];
        assert!(Indicators::from_closes(&short).is_none());

        let long: Vec<Decimal> = (1..=96).map(|i| Decimal::from(100 + (i % 7))).collect();
        let indicators = Indicators::from_closes(&long).unwrap();
        assert!(indicators.rsi >= Decimal::ZERO && indicators.rsi <= dec!(100));
        assert!(indicators.bb_lower <= indicators.bb_middle);
        assert!(indicators.bb_middle <= indicators.bb_upper);
    }
}
