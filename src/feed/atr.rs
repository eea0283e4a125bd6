//! Average True Range

use rust_decimal::Decimal;

use crate::common::errors::{BotError, Result};
use crate::common::types::Candle;

/// True range of a candle given the previous close
pub fn true_range(candle: &Candle, prev_close: Option<Decimal>) -> Decimal {
    let range = candle.high - candle.low;
    match prev_close {
        Some(prev) => range
            .max((candle.high - prev).abs())
            .max((candle.low - prev).abs()),
        None => range,
    }
}

/// Simple mean of the last `period` true ranges
///
/// Candles must be ordered oldest first. The first candle only seeds the
/// previous close when more than `period` candles are supplied.
pub fn average_true_range(candles: &[Candle], period: usize) -> Result<Decimal> {
    if period == 0 {
        return Err(BotError::Configuration("ATR period must be positive".into()));
    }
    if candles.len() < period {
        return Err(BotError::StaleData(format!(
            "need {} candles for ATR, got {}",
            period,
            candles.len()
        )));
    }

    let start = candles.len() - period;
    let mut total = Decimal::ZERO;
    for i in start..candles.len() {
        let prev_close = if i > 0 { Some(candles[i - 1].close) } else { None };
        total += true_range(&candles[i], prev_close);
    }

    let atr = total / Decimal::from(period as u64);
    if atr <= Decimal::ZERO {
        return Err(BotError::StaleData("ATR computed as zero".into()));
    }
    Ok(atr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Candle {
        Candle { open, high, low, close }
    }

    #[test]
    fn test_true_range_uses_gap_from_previous_close() {
        let c = candle(dec!(105), dec!(110), dec!(104), dec!(108));
        assert_eq!(true_range(&c, None), dec!(6));
        assert_eq!(true_range(&c, Some(dec!(100))), dec!(10));
        assert_eq!(true_range(&c, Some(dec!(115))), dec!(11));
    }

    #[test]
    fn test_average_true_range() {
        let candles = vec![
            candle(dec!(100), dec!(101), dec!(99), dec!(100)),
            candle(dec!(100), dec!(102), dec!(99), dec!(101)),
            candle(dec!(101), dec!(104), dec!(100), dec!(103)),
        ];
        // TRs with previous close: 3, 4
        assert_eq!(average_true_range(&candles, 2).unwrap(), dec!(3.5));
    }

    #[test]
    fn test_atr_insufficient_data() {
        let candles = vec![candle(dec!(1), dec!(2), dec!(1), dec!(1))];
        assert!(matches!(
            average_true_range(&candles, 14),
            Err(BotError::StaleData(_))
        ));
    }

    #[test]
    fn test_atr_flat_market_is_stale() {
        let flat = candle(dec!(5), dec!(5), dec!(5), dec!(5));
        assert!(average_true_range(&[flat, flat, flat], 2).is_err());
    }
}
