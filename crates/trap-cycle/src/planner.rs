//! Cascade planner.
//!
//! Pure placement arithmetic for the next trap. Levels alternate sides:
//! odd levels sit one trigger distance against L0, even levels sit on the
//! L0 price itself.

use rust_decimal::Decimal;
use trap_core::{InstrumentSpec, OrderSide, Price, Quote, Size, SymbolConfig};

use crate::store::LevelBasis;

/// Next pending stop order to place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingPlan {
    pub level: u32,
    pub side: OrderSide,
    pub volume: Size,
    pub trigger_price: Price,
}

/// Stop-loss and take-profit for an entry. Zero means not set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectiveLevels {
    pub stop_loss: Price,
    pub take_profit: Price,
}

/// Placement rules for one symbol on one instrument.
#[derive(Debug, Clone, Copy)]
pub struct CascadePlanner<'a> {
    config: &'a SymbolConfig,
    spec: &'a InstrumentSpec,
}

impl<'a> CascadePlanner<'a> {
    pub fn new(config: &'a SymbolConfig, spec: &'a InstrumentSpec) -> Self {
        Self { config, spec }
    }

    fn offset(&self, pips: Decimal) -> Price {
        self.spec.pip_offset(pips, self.config.pip_multiplier)
    }

    /// Trigger distance as a price offset.
    pub fn trigger_offset(&self) -> Price {
        self.offset(self.config.trigger_distance_pips)
    }

    /// Trigger price for `level` given the L0 anchor.
    ///
    /// Odd levels move away from L0's favour: below a BUY L0, above a SELL L0.
    pub fn level_price(&self, level: u32, l0_price: Price, l0_side: OrderSide) -> Price {
        let price = if level % 2 == 1 {
            match l0_side {
                OrderSide::Buy => l0_price - self.trigger_offset(),
                OrderSide::Sell => l0_price + self.trigger_offset(),
            }
        } else {
            l0_price
        };
        price.round_to_digits(self.spec.digits)
    }

    /// Volume of the level after one sized `previous`.
    pub fn next_lot(&self, previous: Size) -> Size {
        self.spec
            .normalize_lot(previous * self.config.lot_multiplier)
    }

    /// Initial L0 volume.
    pub fn initial_lot(&self) -> Size {
        self.spec.normalize_lot(self.config.initial_lot)
    }

    /// Plan the pending order that becomes `level` once filled.
    pub fn plan_next(
        &self,
        level: u32,
        l0_price: Price,
        l0_side: OrderSide,
        basis: LevelBasis,
    ) -> PendingPlan {
        PendingPlan {
            level,
            side: basis.side.opposite(),
            volume: self.next_lot(basis.volume),
            trigger_price: self.level_price(level, l0_price, l0_side),
        }
    }

    /// Push a stop price outward until it honours the venue's minimum
    /// distance from the current quote.
    pub fn enforce_stop_distance(&self, side: OrderSide, price: Price, quote: &Quote) -> Price {
        let min_distance = self.spec.min_stop_distance();
        let adjusted = match side {
            OrderSide::Buy => {
                let required = quote.ask + min_distance;
                if price < required {
                    required + self.spec.point
                } else {
                    price
                }
            }
            OrderSide::Sell => {
                let required = quote.bid - min_distance;
                if price > required {
                    required - self.spec.point
                } else {
                    price
                }
            }
        };
        adjusted.round_to_digits(self.spec.digits)
    }

    /// SL/TP measured from the entry actually used for the level.
    pub fn protective_levels(&self, side: OrderSide, entry: Price) -> ProtectiveLevels {
        let sl_offset = self.offset(self.config.stop_loss_pips);
        let tp_offset = self.offset(self.config.take_profit_pips);
        let (stop_loss, take_profit) = match side {
            OrderSide::Buy => (entry - sl_offset, entry + tp_offset),
            OrderSide::Sell => (entry + sl_offset, entry - tp_offset),
        };
        ProtectiveLevels {
            stop_loss: if self.config.stop_loss_pips > Decimal::ZERO {
                stop_loss.round_to_digits(self.spec.digits)
            } else {
                Price::ZERO
            },
            take_profit: if self.config.take_profit_pips > Decimal::ZERO {
                take_profit.round_to_digits(self.spec.digits)
            } else {
                Price::ZERO
            },
        }
    }
}
