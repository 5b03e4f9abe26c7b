//! Decimal money and position math
//!
//! Pure functions used for sizing, stop-loss/take-profit placement and
//! profit accounting. Everything is `rust_decimal` so cents never drift.
//! Rounding is half away from zero throughout.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use super::types::Direction;

const HUNDRED: Decimal = dec!(100);

fn round_dp(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// Round an order quantity to a lot precision tiered by magnitude
///
/// - `> 10` to whole units (15.7 -> 16)
/// - `(1, 10]` to one decimal (1.92 -> 1.9)
/// - `(0.1, 1]` to two decimals (0.567 -> 0.57)
/// - `<= 0.1` to six decimals (0.0123456789 -> 0.012346)
pub fn round_quantity(amount: Decimal) -> Decimal {
    if amount > dec!(10) {
        round_dp(amount, 0)
    } else if amount > Decimal::ONE {
        round_dp(amount, 1)
    } else if amount > dec!(0.1) {
        round_dp(amount, 2)
    } else {
        round_dp(amount, 6)
    }
}

/// Quantity purchasable for `cost` at `price`, lot-rounded
///
/// Returns `None` for a non-positive price.
pub fn amount_for_cost(price: Decimal, cost: Decimal) -> Option<Decimal> {
    if price <= Decimal::ZERO {
        return None;
    }
    cost.checked_div(price).map(round_quantity)
}

/// `percent` percent of `source`
pub fn percent_of(source: Decimal, percent: Decimal) -> Decimal {
    source * percent / HUNDRED
}

/// Relative change from `prev` to `current` in percent
///
/// Returns `None` when `prev` is zero.
pub fn change_in_percent(prev: Decimal, current: Decimal) -> Option<Decimal> {
    if prev.is_zero() {
        return None;
    }
    (current - prev).checked_div(prev).map(|ratio| ratio * HUNDRED)
}

/// Stop-loss trigger `percent` away from `price`, on the losing side
pub fn stop_loss_price(price: Decimal, percent: Decimal, direction: Direction) -> Decimal {
    let offset = percent_of(price, percent);
    match direction {
        Direction::Long => price - offset,
        Direction::Short => price + offset,
    }
}

/// Take-profit trigger `percent` away from `price`, on the winning side
pub fn take_profit_price(price: Decimal, percent: Decimal, direction: Direction) -> Decimal {
    let offset = percent_of(price, percent);
    match direction {
        Direction::Long => price + offset,
        Direction::Short => price - offset,
    }
}

/// Take-profit placed at `ratio` times the stop-loss distance
pub fn take_profit_by_ratio(
    open_price: Decimal,
    stop_loss: Decimal,
    direction: Direction,
    ratio: Decimal,
) -> Option<Decimal> {
    let stop_loss_percent = change_in_percent(open_price, stop_loss)?.abs();
    Some(take_profit_price(open_price, stop_loss_percent * ratio, direction))
}

/// Unleveraged profit of a position in percent
pub fn profit_percent(
    open_price: Decimal,
    current_price: Decimal,
    direction: Direction,
) -> Option<Decimal> {
    change_in_percent(open_price, current_price).map(|change| change * direction.sign())
}

/// Profit in percent of posted margin
pub fn profit_percent_with_leverage(
    open_price: Decimal,
    current_price: Decimal,
    direction: Direction,
    leverage: u32,
) -> Option<Decimal> {
    profit_percent(open_price, current_price, direction).map(|p| p * Decimal::from(leverage))
}

/// Whole cents of a dollar amount
pub fn to_cents(amount: Decimal) -> i64 {
    let cents = round_dp(amount * HUNDRED, 0);
    i64::try_from(cents).unwrap_or(if cents.is_sign_negative() { i64::MIN } else { i64::MAX })
}

/// Cents rendered as dollars, e.g. `$97.90`
pub fn cents_to_usd(cents: i64) -> String {
    let dollars = Decimal::new(cents, 2);
    if dollars.is_sign_negative() {
        format!("-${:.2}", dollars.abs())
    } else {
        format!("${:.2}", dollars)
    }
}

/// Two-decimal rounding used for stored percentages
pub fn round2(value: Decimal) -> Decimal {
    round_dp(value, 2)
}
