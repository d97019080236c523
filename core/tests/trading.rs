mod common;

use common::{assert_ledger_balanced, world, World};
use stanks_core::{
    money::{self, UNITS_PER_SHARE},
    store::{Isolation, NewStock},
    trading::OrderRequest,
    types::Side,
    SimError,
};

fn list_stock(w: &mut World, symbol: &str, price: i64, listed: bool) {
    let tx = w.service.store_mut().begin(Isolation::Serializable).expect("begin");
    let id = tx
        .insert_stock(&NewStock {
            season_id: w.season,
            symbol,
            display_name: symbol,
            price_micros: money::stonky(price),
            listed_public: listed,
            created_by_user_id: None,
            business_id: None,
        })
        .expect("insert stock");
    tx.append_price_point(id, money::stonky(price)).expect("price point");
    tx.commit().expect("commit");
}

#[test]
fn buy_then_sell_round_trip_charges_fees() {
    let mut w = world();
    w.player("alice");

    let buy = OrderRequest::new("NIMBUS", Side::Buy, 10 * UNITS_PER_SHARE, "o-1");
    let receipt = w.service.place_order(&w.ctx, w.season, "alice", &buy).unwrap();
    assert_eq!(receipt.price_micros, money::stonky(95));
    assert_eq!(receipt.notional_micros, money::stonky(950));
    assert_eq!(receipt.fee_micros, 1_425_000);
    assert_eq!(
        receipt.balance_micros,
        money::STARTER_BALANCE_MICROS - money::stonky(950) - 1_425_000
    );

    let sell = OrderRequest::new("NIMBUS", Side::Sell, 10 * UNITS_PER_SHARE, "o-2");
    let receipt = w.service.place_order(&w.ctx, w.season, "alice", &sell).unwrap();
    assert_eq!(receipt.balance_micros, money::STARTER_BALANCE_MICROS - 2 * 1_425_000);

    let dash = w.service.dashboard(w.season, "alice").unwrap();
    assert!(dash.positions.is_empty(), "position row must be deleted at zero");
    assert_eq!(dash.recent_orders.len(), 2);
    assert_ledger_balanced(&mut w);
}

#[test]
fn accumulating_buys_average_their_cost() {
    let mut w = world();
    w.player("bob");
    let req = OrderRequest::new("COBOLT", Side::Buy, 2 * UNITS_PER_SHARE, "a");
    w.service.place_order(&w.ctx, w.season, "bob", &req).unwrap();
    let req = OrderRequest::new("COBOLT", Side::Buy, 3 * UNITS_PER_SHARE, "b");
    w.service.place_order(&w.ctx, w.season, "bob", &req).unwrap();

    let dash = w.service.dashboard(w.season, "bob").unwrap();
    assert_eq!(dash.positions.len(), 1);
    let pos = &dash.positions[0];
    assert_eq!(pos.quantity_units, 5 * UNITS_PER_SHARE);
    assert_eq!(pos.avg_price_micros, money::stonky(130));
    assert_eq!(pos.market_value_micros, money::stonky(650));
}

#[test]
fn one_unit_past_the_maximum_is_refused() {
    let mut w = world();
    w.player("carol");
    list_stock(&mut w, "PRICEY", 840, true);

    let balance = money::STARTER_BALANCE_MICROS;
    let expected = money::max_affordable_buy(
        money::stonky(840),
        balance,
        money::debt_limit_from_peak(balance),
    )
    .unwrap();

    let too_many = OrderRequest::new("PRICEY", Side::Buy, expected.units + 1, "too-many");
    let err = w.service.place_order(&w.ctx, w.season, "carol", &too_many).unwrap_err();
    match err {
        SimError::InsufficientFunds { max_buy: Some(max) } => assert_eq!(max, expected),
        other => panic!("expected InsufficientFunds with max buy, got {other:?}"),
    }
    assert_eq!(w.balance("carol"), balance, "failed order must not touch the wallet");

    let exact = OrderRequest::new("PRICEY", Side::Buy, expected.units, "exact");
    let receipt = w.service.place_order(&w.ctx, w.season, "carol", &exact).unwrap();
    assert!(receipt.balance_micros < 0);
    assert!(receipt.balance_micros >= -money::debt_limit_from_peak(balance));
    assert_ledger_balanced(&mut w);
}

#[test]
fn selling_more_than_held_fails() {
    let mut w = world();
    w.player("dave");
    let buy = OrderRequest::new("VECTRA", Side::Buy, UNITS_PER_SHARE, "buy");
    w.service.place_order(&w.ctx, w.season, "dave", &buy).unwrap();

    let sell = OrderRequest::new("VECTRA", Side::Sell, 2 * UNITS_PER_SHARE, "sell");
    let err = w.service.place_order(&w.ctx, w.season, "dave", &sell).unwrap_err();
    assert!(matches!(err, SimError::InsufficientShares));

    let none = OrderRequest::new("ORBITZ", Side::Sell, UNITS_PER_SHARE, "sell-none");
    let err = w.service.place_order(&w.ctx, w.season, "dave", &none).unwrap_err();
    assert!(matches!(err, SimError::InsufficientShares));
}

#[test]
fn unknown_and_unlisted_stocks_are_rejected() {
    let mut w = world();
    w.player("erin");
    list_stock(&mut w, "HIDDEN", 50, false);

    let req = OrderRequest::new("NOSUCH", Side::Buy, UNITS_PER_SHARE, "k1");
    let err = w.service.place_order(&w.ctx, w.season, "erin", &req).unwrap_err();
    assert!(matches!(err, SimError::StockNotFound));

    let req = OrderRequest::new("HIDDEN", Side::Buy, UNITS_PER_SHARE, "k2");
    let err = w.service.place_order(&w.ctx, w.season, "erin", &req).unwrap_err();
    assert!(matches!(err, SimError::Invalid(_)));
}

#[test]
fn validation_errors_leave_no_trace() {
    let mut w = world();
    w.player("fay");

    let bad = OrderRequest::new("ABC12", Side::Buy, UNITS_PER_SHARE, "bad");
    assert!(matches!(
        w.service.place_order(&w.ctx, w.season, "fay", &bad),
        Err(SimError::InvalidSymbol)
    ));
    let no_key = OrderRequest::new("NIMBUS", Side::Buy, UNITS_PER_SHARE, "  ");
    assert!(matches!(
        w.service.place_order(&w.ctx, w.season, "fay", &no_key),
        Err(SimError::Invalid(_))
    ));

    // The rejected key was never claimed.
    let good = OrderRequest::new("NIMBUS", Side::Buy, UNITS_PER_SHARE, "bad");
    w.service.place_order(&w.ctx, w.season, "fay", &good).unwrap();
}

#[test]
fn peak_net_worth_only_rises() {
    let mut w = world();
    w.player("gus");
    let start = w.service.wallet(w.season, "gus").unwrap().peak_net_worth_micros;
    assert_eq!(start, money::STARTER_BALANCE_MICROS);

    let buy = OrderRequest::new("LUMINA", Side::Buy, 50 * UNITS_PER_SHARE, "buy");
    w.service.place_order(&w.ctx, w.season, "gus", &buy).unwrap();
    let after = w.service.wallet(w.season, "gus").unwrap().peak_net_worth_micros;
    assert_eq!(after, start, "fees lower net worth; the peak must hold");
}

#[test]
fn leaderboard_ranks_by_net_worth() {
    let mut w = world();
    w.player("low");
    w.player("high");
    w.grant("high", money::stonky(1_000));

    let board = w.service.leaderboard(w.season, 10).unwrap();
    assert_eq!(board.len(), 2);
    assert_eq!(board[0].user_id, "high");
    assert_eq!(board[0].rank, 1);
    assert_eq!(board[1].user_id, "low");
}
