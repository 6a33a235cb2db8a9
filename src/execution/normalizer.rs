//! Exchange-legal price and quantity construction
//!
//! Pure functions only. Prices are rounded to the nearest tick, quantities
//! are floored to the step and only raised to the exchange minimums when
//! the caller's notional budget allows it.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::types::SymbolFilters;

/// A price/quantity pair the exchange will accept
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedOrder {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl NormalizedOrder {
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }
}

/// Why no legal order exists for an action
///
/// Recorded per action; a rejection never aborts sibling actions.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("symbol filters are unusable: {0}")]
    InvalidFilters(String),

    #[error("price {0} is not positive")]
    NonPositivePrice(Decimal),

    #[error("quantity {0} is not positive")]
    NonPositiveQuantity(Decimal),

    #[error("quantity {quantity} floors to zero at step {step_size}")]
    BelowStep { quantity: Decimal, step_size: Decimal },

    #[error("min_qty {min_qty} needs notional {required}, above budget {max_notional}")]
    MinQtyOverBudget {
        min_qty: Decimal,
        required: Decimal,
        max_notional: Decimal,
    },

    #[error("min_notional {min_notional} needs notional {required}, above budget {max_notional}")]
    MinNotionalOverBudget {
        min_notional: Decimal,
        required: Decimal,
        max_notional: Decimal,
    },

    #[error("quantity {quantity} exceeds max_qty {max_qty}")]
    AboveMaxQty { quantity: Decimal, max_qty: Decimal },
}

/// Round to the nearest multiple of `step`, halves away from zero
pub fn round_to_step(value: Decimal, step: Decimal) -> Decimal {
    (value / step).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero) * step
}

/// Largest multiple of `step` not above `value`
pub fn floor_to_step(value: Decimal, step: Decimal) -> Decimal {
    (value / step).floor() * step
}

/// Smallest multiple of `step` not below `value`
pub fn ceil_to_step(value: Decimal, step: Decimal) -> Decimal {
    (value / step).ceil() * step
}

/// Truncate a quote amount to `precision` decimal places
pub fn floor_quote_amount(amount: Decimal, precision: u32) -> Decimal {
    amount.round_dp_with_strategy(precision, RoundingStrategy::ToZero)
}

/// Round a price to the tick and clamp it into `[min_price, max_price]`
///
/// Clamped prices are re-aligned to the tick inside the band.
pub fn normalize_price(raw_price: Decimal, filters: &SymbolFilters) -> Decimal {
    let tick = filters.tick_size;
    let mut price = round_to_step(raw_price, tick);
    if filters.min_price > Decimal::ZERO && price < filters.min_price {
        price = ceil_to_step(filters.min_price, tick);
    }
    if filters.max_price > Decimal::ZERO && price > filters.max_price {
        price = floor_to_step(filters.max_price, tick);
    }
    price
}

/// Build an exchange-legal order
///
/// # Arguments
/// * `raw_price` - Intended price
/// * `raw_quantity` - Intended base quantity
/// * `filters` - Trading rules of the pair
/// * `max_notional` - Largest notional the caller accepts after raising to minimums
pub fn normalize(
    raw_price: Decimal,
    raw_quantity: Decimal,
    filters: &SymbolFilters,
    max_notional: Decimal,
) -> Result<NormalizedOrder, RejectReason> {
    if filters.tick_size <= Decimal::ZERO {
        return Err(RejectReason::InvalidFilters(format!("tick_size {}", filters.tick_size)));
    }
    if filters.step_size <= Decimal::ZERO {
        return Err(RejectReason::InvalidFilters(format!("step_size {}", filters.step_size)));
    }
    if raw_price <= Decimal::ZERO {
        return Err(RejectReason::NonPositivePrice(raw_price));
    }
    if raw_quantity <= Decimal::ZERO {
        return Err(RejectReason::NonPositiveQuantity(raw_quantity));
    }

    let price = normalize_price(raw_price, filters);
    if price <= Decimal::ZERO {
        return Err(RejectReason::NonPositivePrice(price));
    }

    let step = filters.step_size;
    let mut quantity = floor_to_step(raw_quantity, step);

    if quantity < filters.min_qty {
        let raised = ceil_to_step(filters.min_qty, step);
        let required = raised * price;
        if required > max_notional {
            return Err(RejectReason::MinQtyOverBudget {
                min_qty: filters.min_qty,
                required,
                max_notional,
            });
        }
        quantity = raised;
    }

    if quantity.is_zero() {
        return Err(RejectReason::BelowStep {
            quantity: raw_quantity,
            step_size: step,
        });
    }

    if filters.min_notional > Decimal::ZERO && quantity * price < filters.min_notional {
        let raised = ceil_to_step(filters.min_notional / price, step);
        let required = raised * price;
        if required > max_notional {
            return Err(RejectReason::MinNotionalOverBudget {
                min_notional: filters.min_notional,
                required,
                max_notional,
            });
        }
        quantity = raised;
    }

    if filters.max_qty > Decimal::ZERO && quantity > filters.max_qty {
        return Err(RejectReason::AboveMaxQty {
            quantity,
            max_qty: filters.max_qty,
        });
    }

    Ok(NormalizedOrder { price, quantity })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn btc_filters() -> SymbolFilters {
        SymbolFilters {
            tick_size: dec!(0.01),
            min_price: dec!(0.01),
            max_price: dec!(1000000),
            step_size: dec!(0.00001),
            min_qty: dec!(0.00001),
            max_qty: dec!(9000),
            min_notional: dec!(5),
        }
    }

    #[test]
    fn test_price_rounds_to_nearest_tick() {
        assert_eq!(normalize_price(dec!(89517.3456), &btc_filters()), dec!(89517.35));
        assert_eq!(normalize_price(dec!(89517.3449), &btc_filters()), dec!(89517.34));
        assert_eq!(normalize_price(dec!(89517.345), &btc_filters()), dec!(89517.35));
    }

    #[test]
    fn test_price_clamps_into_band() {
        let filters = SymbolFilters {
            min_price: dec!(1.005),
            max_price: dec!(2.005),
            ..btc_filters()
        };
        assert_eq!(normalize_price(dec!(0.5), &filters), dec!(1.01));
        assert_eq!(normalize_price(dec!(7), &filters), dec!(2.00));
    }

    #[test]
    fn test_quantity_floors_to_step() {
        let order = normalize(dec!(90000), dec!(0.0022229), &btc_filters(), dec!(201)).unwrap();
        assert_eq!(order.quantity, dec!(0.00222));
        assert!(order.quantity <= dec!(0.0022229));
    }

    #[test]
    fn test_min_qty_raise_within_budget() {
        let filters = SymbolFilters {
            min_qty: dec!(0.0001),
            min_notional: Decimal::ZERO,
            ..btc_filters()
        };
        // 0.00009 at 90000 is 8.1; min_qty needs 9, budget 9.5 allows it
        let order = normalize(dec!(90000), dec!(0.00009), &filters, dec!(9.5)).unwrap();
        assert_eq!(order.quantity, dec!(0.0001));
    }

    #[test]
    fn test_min_qty_out_of_budget_is_rejected() {
        let filters = SymbolFilters {
            min_qty: dec!(0.0001),
            ..btc_filters()
        };
        let intended = dec!(0.000043) * dec!(90000);
        let result = normalize(dec!(90000), dec!(0.000043), &filters, intended * dec!(1.01));
        assert!(matches!(result, Err(RejectReason::MinQtyOverBudget { .. })));
    }

    #[test]
    fn test_min_notional_raise_and_reject() {
        let filters = SymbolFilters {
            tick_size: dec!(0.0001),
            step_size: dec!(0.1),
            min_qty: dec!(0.1),
            min_notional: dec!(5),
            ..btc_filters()
        };
        // 9.9 ADA at 0.5 is 4.95, one more step reaches 5.00
        let order = normalize(dec!(0.5), dec!(9.9), &filters, dec!(5.05)).unwrap();
        assert_eq!(order.quantity, dec!(10.0));

        let rejected = normalize(dec!(0.5), dec!(9.9), &filters, dec!(4.99));
        assert!(matches!(rejected, Err(RejectReason::MinNotionalOverBudget { .. })));
    }

    #[test]
    fn test_above_max_qty_is_rejected() {
        let filters = SymbolFilters {
            max_qty: dec!(1),
            ..btc_filters()
        };
        let result = normalize(dec!(10), dec!(2), &filters, dec!(100));
        assert!(matches!(result, Err(RejectReason::AboveMaxQty { .. })));
    }

    #[test]
    fn test_invalid_inputs() {
        let zero_tick = SymbolFilters {
            tick_size: Decimal::ZERO,
            ..btc_filters()
        };
        assert!(matches!(
            normalize(dec!(1), dec!(1), &zero_tick, dec!(10)),
            Err(RejectReason::InvalidFilters(_))
        ));
        assert!(matches!(
            normalize(dec!(-1), dec!(1), &btc_filters(), dec!(10)),
            Err(RejectReason::NonPositivePrice(_))
        ));
        assert!(matches!(
            normalize(dec!(1), Decimal::ZERO, &btc_filters(), dec!(10)),
            Err(RejectReason::NonPositiveQuantity(_))
        ));
    }

    #[test]
    fn test_floor_quote_amount() {
        assert_eq!(floor_quote_amount(dec!(123.4567), 2), dec!(123.45));
        assert_eq!(floor_quote_amount(dec!(10), 2), dec!(10));
    }
}
