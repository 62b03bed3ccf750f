//! Auto-restart decision.
//!
//! After a cycle resolves, a new one may start immediately. The direction
//! leans toward the operator's favored side: one uniform draw in `[0, 1)`,
//! below `favored_probability` keeps the favored side, otherwise the
//! opposite side is taken.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use trap_core::OrderSide;

/// Probability of restarting in the favored direction.
pub const FAVORED_PROBABILITY: f64 = 0.75;

/// Why a restart was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartSkip {
    Disabled,
    /// Keeps the last L0 direction for later.
    OutsideTradingHours,
    /// Clears the last L0 direction.
    NoFavoredDirection,
    NoPriorDirection,
}

impl RestartSkip {
    /// Whether the last L0 direction should be forgotten.
    pub fn clears_last_direction(&self) -> bool {
        matches!(self, Self::NoFavoredDirection | Self::NoPriorDirection)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    Start(OrderSide),
    Skip(RestartSkip),
}

/// Restart policy with its own random source.
#[derive(Debug)]
pub struct RestartPolicy {
    enabled: bool,
    favored_probability: f64,
    rng: Mutex<StdRng>,
}

impl RestartPolicy {
    /// Create a policy seeded from OS entropy.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            favored_probability: FAVORED_PROBABILITY,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Create a policy with a deterministic random source.
    pub fn seeded(enabled: bool, seed: u64) -> Self {
        Self {
            enabled,
            favored_probability: FAVORED_PROBABILITY,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Map a uniform sample onto a side.
    #[must_use]
    pub fn side_for_sample(&self, favored: OrderSide, sample: f64) -> OrderSide {
        if sample < self.favored_probability {
            favored
        } else {
            favored.opposite()
        }
    }

    /// Draw a side leaning toward `favored`.
    pub fn choose_side(&self, favored: OrderSide) -> OrderSide {
        let sample: f64 = self.rng.lock().gen();
        self.side_for_sample(favored, sample)
    }

    /// Decide whether and how to restart.
    pub fn evaluate(
        &self,
        in_trading_hours: bool,
        last_l0_side: Option<OrderSide>,
        favored_side: Option<OrderSide>,
    ) -> RestartDecision {
        if !self.enabled {
            return RestartDecision::Skip(RestartSkip::Disabled);
        }
        if !in_trading_hours {
            return RestartDecision::Skip(RestartSkip::OutsideTradingHours);
        }
        match (last_l0_side, favored_side) {
            (None, _) => RestartDecision::Skip(RestartSkip::NoPriorDirection),
            (Some(_), None) => RestartDecision::Skip(RestartSkip::NoFavoredDirection),
            (Some(_), Some(favored)) => RestartDecision::Start(self.choose_side(favored)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_boundary() {
        let policy = RestartPolicy::seeded(true, 1);
        assert_eq!(policy.side_for_sample(OrderSide::Buy, 0.0), OrderSide::Buy);
        assert_eq!(policy.side_for_sample(OrderSide::Buy, 0.7499), OrderSide::Buy);
        assert_eq!(policy.side_for_sample(OrderSide::Buy, 0.75), OrderSide::Sell);
        assert_eq!(policy.side_for_sample(OrderSide::Sell, 0.99), OrderSide::Buy);
    }

    #[test]
    fn test_favored_frequency_converges() {
        let policy = RestartPolicy::seeded(true, 42);
        let samples = 100_000;
        let favored = (0..samples)
            .filter(|_| policy.choose_side(OrderSide::Sell) == OrderSide::Sell)
            .count();
        let ratio = favored as f64 / samples as f64;
        assert!((ratio - 0.75).abs() <= 0.01, "ratio = {ratio}");
    }

    #[test]
    fn test_skip_reasons() {
        let policy = RestartPolicy::seeded(true, 7);
        assert_eq!(
            policy.evaluate(false, Some(OrderSide::Buy), Some(OrderSide::Buy)),
            RestartDecision::Skip(RestartSkip::OutsideTradingHours)
        );
        assert_eq!(
            policy.evaluate(true, Some(OrderSide::Buy), None),
            RestartDecision::Skip(RestartSkip::NoFavoredDirection)
        );
        assert_eq!(
            policy.evaluate(true, None, Some(OrderSide::Buy)),
            RestartDecision::Skip(RestartSkip::NoPriorDirection)
        );
        assert!(matches!(
            policy.evaluate(true, Some(OrderSide::Sell), Some(OrderSide::Buy)),
            RestartDecision::Start(_)
        ));
    }

    #[test]
    fn test_disabled_policy_never_starts() {
        let policy = RestartPolicy::seeded(false, 7);
        assert_eq!(
            policy.evaluate(true, Some(OrderSide::Buy), Some(OrderSide::Buy)),
            RestartDecision::Skip(RestartSkip::Disabled)
        );
    }

    #[test]
    fn test_outside_hours_keeps_direction() {
        assert!(!RestartSkip::OutsideTradingHours.clears_last_direction());
        assert!(RestartSkip::NoFavoredDirection.clears_last_direction());
    }
}
