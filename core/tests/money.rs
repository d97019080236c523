//! Fixed-point arithmetic: notional, fees, debt ceiling and the
//! affordable-buy search.

use proptest::prelude::*;
use stanks_core::{
    money::{self, MAX_DEBT_LIMIT_MICROS, MIN_DEBT_LIMIT_MICROS, UNITS_PER_SHARE},
    SimError,
};

#[test]
fn notional_overflow_is_an_error() {
    let err = money::notional(i64::MAX, i64::MAX).unwrap_err();
    assert!(matches!(err, SimError::Overflow { .. }));
}

#[test]
fn fee_is_fifteen_bps_rounded_half_away() {
    assert_eq!(money::order_fee(1_000_000).unwrap(), 1_500);
    // 0.15% of 1_000 micros is 1.5, rounds to 2.
    assert_eq!(money::order_fee(1_000).unwrap(), 2);
    assert_eq!(money::order_fee(999).unwrap(), 1);
    assert_eq!(money::order_fee(0).unwrap(), 0);
}

#[test]
fn debt_ceiling_anchors() {
    assert_eq!(money::debt_limit_from_peak(0), MIN_DEBT_LIMIT_MICROS);
    assert_eq!(money::debt_limit_from_peak(money::stonky(10_000)), MIN_DEBT_LIMIT_MICROS);
    assert_eq!(money::debt_limit_from_peak(money::stonky(25_000)), money::stonky(8_750));
    assert_eq!(money::debt_limit_from_peak(money::stonky(1_000_000)), MAX_DEBT_LIMIT_MICROS);
    assert_eq!(money::debt_limit_from_peak(-money::stonky(50_000)), MIN_DEBT_LIMIT_MICROS);
}

#[test]
fn symbol_validation() {
    assert!(money::is_valid_symbol("NIMBUS"));
    assert!(!money::is_valid_symbol("abc123"));
    assert!(!money::is_valid_symbol("ABC12"));
    assert!(!money::is_valid_symbol("TOOLONG7"));
    assert!(!money::is_valid_symbol("nimbus"));
    assert_eq!(money::normalize_symbol("  nimbus ").unwrap(), "NIMBUS");
    assert!(matches!(money::normalize_symbol("ABC12"), Err(SimError::InvalidSymbol)));
}

#[test]
fn starter_wallet_buying_at_840() {
    let price = money::stonky(840);
    let balance = money::STARTER_BALANCE_MICROS;
    let debt = money::debt_limit_from_peak(balance);
    let max = money::max_affordable_buy(price, balance, debt).unwrap();

    assert!(max.units > 0);
    assert!(max.total_micros() <= balance + debt);

    let next = money::notional(price, max.units + 1).unwrap();
    let next_fee = money::order_fee(next).unwrap();
    assert!(next + next_fee > balance + debt);
}

#[test]
fn nothing_affordable_without_budget() {
    let max = money::max_affordable_buy(money::stonky(100), -money::stonky(5_000), money::stonky(5_000)).unwrap();
    assert_eq!(max.units, 0);
    assert_eq!(max.total_micros(), 0);
}

#[test]
fn share_conversion_rejects_non_positive() {
    assert!(money::shares_to_units(0.0).is_err());
    assert!(money::shares_to_units(-1.0).is_err());
    assert!(money::shares_to_units(0.00001).is_err());
    assert_eq!(money::shares_to_units(1.5).unwrap(), 15_000);
}

#[test]
fn weighted_average_cost() {
    // 1 share at 100 plus 1 share at 200 averages 150.
    let avg = money::weighted_average_price(
        UNITS_PER_SHARE,
        money::stonky(100),
        UNITS_PER_SHARE,
        money::stonky(200),
    )
    .unwrap();
    assert_eq!(avg, money::stonky(150));
}

proptest! {
    #[test]
    fn notional_matches_wide_product(price in 1i64..=2_000_000_000_000_000, qty in 1i64..=1_000_000_000) {
        let expected = price as i128 * qty as i128 / UNITS_PER_SHARE as i128;
        match money::notional(price, qty) {
            Ok(n) => prop_assert_eq!(n as i128, expected),
            Err(SimError::Overflow { .. }) => prop_assert!(expected > i64::MAX as i128),
            Err(e) => prop_assert!(false, "unexpected error {e}"),
        }
    }

    #[test]
    fn debt_ceiling_is_monotonic_and_clamped(a in -1_000_000_000_000i64..1_000_000_000_000_000, b in -1_000_000_000_000i64..1_000_000_000_000_000) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let l = money::debt_limit_from_peak(lo);
        let h = money::debt_limit_from_peak(hi);
        prop_assert!(l <= h);
        prop_assert!((MIN_DEBT_LIMIT_MICROS..=MAX_DEBT_LIMIT_MICROS).contains(&l));
        prop_assert!((MIN_DEBT_LIMIT_MICROS..=MAX_DEBT_LIMIT_MICROS).contains(&h));
    }

    #[test]
    fn max_affordable_buy_is_boundary_exact(
        price in 10_000i64..=5_000_000_000,
        balance in -5_000_000_000i64..=500_000_000_000,
        peak in 0i64..=500_000_000_000,
    ) {
        let debt = money::debt_limit_from_peak(peak);
        let budget = balance as i128 + debt as i128;
        let max = money::max_affordable_buy(price, balance, debt).unwrap();

        prop_assert!(max.units >= 0);
        prop_assert!((max.total_micros() as i128) <= budget.max(0));

        let next = money::notional(price, max.units + 1).unwrap();
        let fee = money::order_fee(next).unwrap();
        prop_assert!(next as i128 + fee as i128 > budget);
    }
}
