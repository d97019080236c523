//! Replaying a key executes the side effect once and leaves state unchanged.

mod common;

use common::world;
use stanks_core::{
    money::{self, UNITS_PER_SHARE},
    trading::OrderRequest,
    types::{Side, Strategy, UpgradeKind, Visibility},
    SimError,
};

#[test]
fn replayed_order_fills_once() {
    let mut w = world();
    w.player("alice");
    let req = OrderRequest::new("NIMBUS", Side::Buy, 3 * UNITS_PER_SHARE, "same-key");

    let first = w.service.place_order(&w.ctx, w.season, "alice", &req).unwrap();
    let after_first = w.balance("alice");
    let err = w.service.place_order(&w.ctx, w.season, "alice", &req).unwrap_err();

    assert!(matches!(err, SimError::DuplicateIdempotency));
    assert_eq!(w.balance("alice"), after_first);
    assert_eq!(first.balance_micros, after_first);
    let dash = w.service.dashboard(w.season, "alice").unwrap();
    assert_eq!(dash.positions[0].quantity_units, 3 * UNITS_PER_SHARE);
    assert_eq!(dash.recent_orders.len(), 1);
}

#[test]
fn keys_are_scoped_per_player() {
    let mut w = world();
    w.player("alice");
    w.player("bob");
    let req = OrderRequest::new("NIMBUS", Side::Buy, UNITS_PER_SHARE, "shared");
    w.service.place_order(&w.ctx, w.season, "alice", &req).unwrap();
    w.service.place_order(&w.ctx, w.season, "bob", &req).unwrap();
}

#[test]
fn a_failed_mutation_releases_its_key() {
    let mut w = world();
    w.player("carol");
    let sell = OrderRequest::new("NIMBUS", Side::Sell, UNITS_PER_SHARE, "retry-me");
    assert!(matches!(
        w.service.place_order(&w.ctx, w.season, "carol", &sell),
        Err(SimError::InsufficientShares)
    ));

    let buy = OrderRequest::new("NIMBUS", Side::Buy, UNITS_PER_SHARE, "retry-me");
    w.service.place_order(&w.ctx, w.season, "carol", &buy).unwrap();
}

#[test]
fn business_mutations_claim_keys() {
    let mut w = world();
    w.tycoon("dora");
    let actor = w.actor("dora");
    let biz = w
        .service
        .create_business(&w.ctx, actor, "Dora Labs", Visibility::Private, "create")
        .unwrap();
    assert!(matches!(
        w.service.create_business(&w.ctx, actor, "Dora Labs Two", Visibility::Private, "create"),
        Err(SimError::DuplicateIdempotency)
    ));

    let up = w
        .service
        .buy_upgrade(&w.ctx, actor, biz, UpgradeKind::Marketing, "upgrade")
        .unwrap();
    let balance = w.balance("dora");
    assert!(matches!(
        w.service.buy_upgrade(&w.ctx, actor, biz, UpgradeKind::Marketing, "upgrade"),
        Err(SimError::DuplicateIdempotency)
    ));
    assert_eq!(w.balance("dora"), balance);
    let state = w.service.business_state(actor, biz).unwrap();
    assert_eq!(state.business.marketing_level, up.level);

    w.service
        .set_strategy(&w.ctx, actor, biz, Strategy::Aggressive, "strategy")
        .unwrap();
    assert!(matches!(
        w.service.set_strategy(&w.ctx, actor, biz, Strategy::Defensive, "strategy"),
        Err(SimError::DuplicateIdempotency)
    ));
    let state = w.service.business_state(actor, biz).unwrap();
    assert_eq!(state.business.strategy, Strategy::Aggressive);
}

#[test]
fn replayed_loan_draws_once() {
    let mut w = world();
    w.tycoon("ezra");
    let biz = w.open_business("ezra", "Ezra Freight", Visibility::Private);
    let actor = w.actor("ezra");

    w.service
        .take_loan(&w.ctx, actor, biz, money::stonky(2_000), "loan")
        .unwrap();
    assert!(matches!(
        w.service.take_loan(&w.ctx, actor, biz, money::stonky(2_000), "loan"),
        Err(SimError::DuplicateIdempotency)
    ));
    assert_eq!(w.service.list_loans(actor, biz).unwrap().len(), 1);
}
