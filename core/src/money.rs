//! Fixed-point monetary model.
//!
//! Currency is an integer count of micros, share quantity an integer count
//! of units. Products are taken in i128 and narrowed back with a check, so
//! an out-of-range result is an `Overflow` error and never wraps.

use crate::{
    error::{SimError, SimResult},
    types::{Micros, Units},
};
use serde::{Deserialize, Serialize};

pub const MICROS_PER_STONKY: i64 = 1_000_000;
pub const UNITS_PER_SHARE: i64 = 10_000;

pub const STARTER_BALANCE_MICROS: Micros = 25_000 * MICROS_PER_STONKY;
pub const BUSINESS_UNLOCK_MICROS: Micros = 250_000 * MICROS_PER_STONKY;
pub const MIN_DEBT_LIMIT_MICROS: Micros = 5_000 * MICROS_PER_STONKY;
pub const MAX_DEBT_LIMIT_MICROS: Micros = 100_000 * MICROS_PER_STONKY;

pub const ORDER_FEE_BPS: i64 = 15;
pub const DEBT_LIMIT_BPS_OF_PEAK: i64 = 3_500;

/// Largest quantity (and its cost) a wallet can buy at a given price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AffordableBuy {
    pub units: Units,
    pub notional_micros: Micros,
    pub fee_micros: Micros,
}

impl AffordableBuy {
    pub fn total_micros(&self) -> Micros {
        self.notional_micros + self.fee_micros
    }
}

pub fn stonky(amount: i64) -> Micros {
    amount * MICROS_PER_STONKY
}

pub fn micros_to_stonky(micros: Micros) -> f64 {
    micros as f64 / MICROS_PER_STONKY as f64
}

pub fn units_to_shares(units: Units) -> f64 {
    units as f64 / UNITS_PER_SHARE as f64
}

/// Convert a display amount to micros, rounding to the nearest micro.
pub fn stonky_to_micros(amount: f64) -> SimResult<Micros> {
    round_to_i64(amount * MICROS_PER_STONKY as f64, "currency")
}

/// Convert a display share count to units. Zero and negative counts are rejected.
pub fn shares_to_units(shares: f64) -> SimResult<Units> {
    if !shares.is_finite() || shares <= 0.0 {
        return Err(SimError::Invalid("quantity must be positive".into()));
    }
    let units = round_to_i64(shares * UNITS_PER_SHARE as f64, "quantity")?;
    if units <= 0 {
        return Err(SimError::Invalid("quantity must be at least 0.0001 shares".into()));
    }
    Ok(units)
}

/// Round a float to the nearest integer, half away from zero.
pub fn round_to_i64(value: f64, what: &'static str) -> SimResult<i64> {
    let rounded = value.round();
    if !rounded.is_finite() || rounded < i64::MIN as f64 || rounded >= i64::MAX as f64 {
        return Err(SimError::Overflow { what });
    }
    Ok(rounded as i64)
}

pub fn narrow(value: i128, what: &'static str) -> SimResult<i64> {
    i64::try_from(value).map_err(|_| SimError::Overflow { what })
}

/// Integer division rounding half away from zero.
pub fn div_round(numerator: i128, denominator: i128) -> i128 {
    let q = numerator / denominator;
    let r = numerator % denominator;
    if r.abs() * 2 >= denominator.abs() {
        if (numerator < 0) != (denominator < 0) {
            q - 1
        } else {
            q + 1
        }
    } else {
        q
    }
}

/// Integer division rounding toward positive infinity (for positive divisors).
pub fn div_ceil(numerator: i128, denominator: i128) -> i128 {
    let q = numerator / denominator;
    if numerator % denominator > 0 {
        q + 1
    } else {
        q
    }
}

/// `amount × bps / 10_000`, rounded half away from zero.
pub fn bps_of(amount: Micros, bps: i64) -> SimResult<Micros> {
    narrow(div_round(amount as i128 * bps as i128, 10_000), "basis-point amount")
}

pub fn notional(price: Micros, quantity: Units) -> SimResult<Micros> {
    narrow(
        price as i128 * quantity as i128 / UNITS_PER_SHARE as i128,
        "notional",
    )
}

pub fn order_fee(notional: Micros) -> SimResult<Micros> {
    bps_of(notional, ORDER_FEE_BPS)
}

/// Price per share that `total` micros buys for `quantity` units.
pub fn divide_micros(total: Micros, quantity: Units) -> SimResult<Micros> {
    if quantity <= 0 {
        return Err(SimError::Invalid("quantity must be positive".into()));
    }
    narrow(
        total as i128 * UNITS_PER_SHARE as i128 / quantity as i128,
        "average price",
    )
}

/// Notional-weighted average cost after adding `add_units` at `add_price`.
/// Floors at one micro so an open position always has a positive basis.
pub fn weighted_average_price(
    held_units: Units,
    held_avg: Micros,
    add_units: Units,
    add_price: Micros,
) -> SimResult<Micros> {
    let total_cost = notional(held_avg, held_units)? as i128 + notional(add_price, add_units)? as i128;
    let total_units = held_units as i128 + add_units as i128;
    if total_units <= 0 {
        return Err(SimError::Invalid("quantity must be positive".into()));
    }
    let avg = narrow(total_cost * UNITS_PER_SHARE as i128 / total_units, "average price")?;
    Ok(avg.max(1))
}

/// How far below zero a wallet may go, sized from its best-ever net worth.
pub fn debt_limit_from_peak(peak_net_worth: Micros) -> Micros {
    let scaled = div_round(
        peak_net_worth as i128 * DEBT_LIMIT_BPS_OF_PEAK as i128,
        10_000,
    );
    scaled.clamp(MIN_DEBT_LIMIT_MICROS as i128, MAX_DEBT_LIMIT_MICROS as i128) as i64
}

/// Binary search for the largest quantity whose notional plus fee fits
/// within `balance + debt_limit`. The fee is rounded, so the bound has no
/// closed form that is exact at the boundary.
pub fn max_affordable_buy(
    price: Micros,
    balance: Micros,
    debt_limit: Micros,
) -> SimResult<AffordableBuy> {
    let budget = balance as i128 + debt_limit as i128;
    if budget <= 0 || price <= 0 {
        return Ok(AffordableBuy::default());
    }

    let cost = |units: i64| -> SimResult<Option<(Micros, Micros)>> {
        let n = match notional(price, units) {
            Ok(n) => n,
            Err(SimError::Overflow { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let f = order_fee(n)?;
        Ok(Some((n, f)))
    };

    let mut lo: i64 = 0;
    // notional(q) <= budget holds only for q < (budget + 1) * UNITS / price.
    let mut hi: i64 = ((budget + 1) * UNITS_PER_SHARE as i128 / price as i128).min(i64::MAX as i128) as i64;
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        let fits = match cost(mid)? {
            Some((n, f)) => n as i128 + f as i128 <= budget,
            None => false,
        };
        if fits {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }

    match cost(lo)? {
        Some((notional_micros, fee_micros)) => Ok(AffordableBuy {
            units: lo,
            notional_micros,
            fee_micros,
        }),
        None => Err(SimError::Overflow { what: "notional" }),
    }
}

pub fn is_valid_symbol(symbol: &str) -> bool {
    symbol.len() == 6 && symbol.bytes().all(|b| b.is_ascii_uppercase())
}

/// Trim and uppercase caller input, then require exactly six letters.
pub fn normalize_symbol(raw: &str) -> SimResult<String> {
    let symbol = raw.trim().to_ascii_uppercase();
    if !is_valid_symbol(&symbol) {
        return Err(SimError::InvalidSymbol);
    }
    Ok(symbol)
}
