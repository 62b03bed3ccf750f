//! Instrument specification as reported by the venue.

use crate::{Price, Size};
use serde::{Deserialize, Serialize};

/// Venue-side parameters for a tradable symbol.
///
/// Read through the broker gateway once per placement; never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub symbol: String,

    /// Smallest price increment ("point").
    pub point: Price,

    /// Quoted decimal digits.
    pub digits: u32,

    /// Volume granularity.
    pub volume_step: Size,

    pub volume_min: Size,
    pub volume_max: Size,

    /// Minimum distance, in points, between a stop order and the market.
    pub min_stop_points: u32,
}

impl InstrumentSpec {
    /// Convert a pip distance into a price offset.
    ///
    /// `pips * pip_multiplier * point`
    #[inline]
    pub fn pip_offset(&self, pips: rust_decimal::Decimal, pip_multiplier: u32) -> Price {
        self.point * (pips * rust_decimal::Decimal::from(pip_multiplier))
    }

    /// Minimum stop distance as a price offset.
    #[inline]
    pub fn min_stop_distance(&self) -> Price {
        self.point * rust_decimal::Decimal::from(self.min_stop_points)
    }

    /// Normalize a requested volume against this instrument's constraints.
    pub fn normalize_lot(&self, requested: Size) -> Size {
        normalize_lot(requested, self.volume_step, self.volume_min, self.volume_max)
    }
}

/// Round `requested` UP to the next multiple of `step`, then clamp to
/// `[min, max]`.
///
/// Rounding up never reduces the protective scale-up of the cascade.
/// A non-positive step skips the stepping and only clamps.
pub fn normalize_lot(requested: Size, step: Size, min: Size, max: Size) -> Size {
    let stepped = requested.ceil_to_step(step);
    let normalized = Size(stepped.0.round_dp(8).normalize());
    normalized.max(min).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn eurusd() -> InstrumentSpec {
        InstrumentSpec {
            symbol: "EURUSDc".to_string(),
            point: Price(dec!(0.00001)),
            digits: 5,
            volume_step: Size(dec!(0.01)),
            volume_min: Size(dec!(0.01)),
            volume_max: Size(dec!(100)),
            min_stop_points: 0,
        }
    }

    #[test]
    fn test_normalize_rounds_up_to_step() {
        let spec = eurusd();
        assert_eq!(spec.normalize_lot(Size(dec!(0.021))), Size(dec!(0.03)));
        assert_eq!(spec.normalize_lot(Size(dec!(0.025))), Size(dec!(0.03)));
        assert_eq!(spec.normalize_lot(Size(dec!(0.075))), Size(dec!(0.08)));
    }

    #[test]
    fn test_normalize_clamps_to_bounds() {
        let spec = eurusd();
        assert_eq!(spec.normalize_lot(Size(dec!(0.001))), Size(dec!(0.01)));
        assert_eq!(spec.normalize_lot(Size(dec!(250))), Size(dec!(100)));
    }

    #[test]
    fn test_normalize_invariant_over_range() {
        let spec = eurusd();
        let mut requested = dec!(0.001);
        while requested < dec!(5) {
            let lot = spec.normalize_lot(Size(requested));
            assert!(lot.0 >= requested);
            assert!((lot.0 / dec!(0.01)).fract().is_zero());
            assert!(lot >= spec.volume_min && lot <= spec.volume_max);
            requested += dec!(0.0037);
        }
    }

    #[test]
    fn test_pip_offset() {
        let spec = eurusd();
        assert_eq!(spec.pip_offset(dec!(9.5), 10), Price(dec!(0.00095)));
    }
}
