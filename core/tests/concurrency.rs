//! Several connections on one database file, as the worker and request
//! handlers run in production.

use stanks_core::{
    config::{RetryPolicy, SimConfig},
    context::{CallContext, CancelHandle},
    money::{self, UNITS_PER_SHARE},
    store::{Isolation, SimStore},
    trading::OrderRequest,
    types::{SeasonId, Side},
    GameService, SimError,
};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

struct TempDb(PathBuf);

impl TempDb {
    fn new() -> Self {
        Self(std::env::temp_dir().join(format!("stanks-test-{}.db", uuid::Uuid::new_v4())))
    }

    fn config(&self) -> SimConfig {
        SimConfig {
            db_path: self.0.to_string_lossy().into_owned(),
            busy_timeout_ms: 5_000,
            retry: RetryPolicy {
                max_attempts: 20,
                initial_delay_ms: 2,
                max_delay_ms: 50,
            },
            ..SimConfig::default_test()
        }
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut path = self.0.clone().into_os_string();
            path.push(suffix);
            let _ = std::fs::remove_file(path);
        }
    }
}

fn open(db: &TempDb) -> (GameService, SeasonId) {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut service = GameService::open(db.config()).unwrap();
    let ctx = CallContext::background();
    let season = service.ensure_active_season(&ctx).unwrap().id;
    service.seed_defaults(&ctx, season).unwrap();
    (service, season)
}

#[test]
fn concurrent_buys_on_one_wallet_lose_nothing() {
    let db = TempDb::new();
    let (mut service, season) = open(&db);
    service
        .ensure_player(&CallContext::background(), season, "shared", "shared")
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let mut svc = service.fork().unwrap();
            thread::spawn(move || {
                let ctx = CallContext::background();
                for i in 0..5 {
                    let req = OrderRequest::new("NIMBUS", Side::Buy, UNITS_PER_SHARE, &format!("t{t}-o{i}"));
                    svc.place_order(&ctx, season, "shared", &req).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let per_share = money::stonky(95) + 142_500;
    let wallet = service.wallet(season, "shared").unwrap();
    assert_eq!(wallet.balance_micros, money::STARTER_BALANCE_MICROS - 20 * per_share);
    assert_eq!(service.ledger_balance(season, "shared").unwrap(), wallet.balance_micros);
    let dash = service.dashboard(season, "shared").unwrap();
    assert_eq!(dash.positions[0].quantity_units, 20 * UNITS_PER_SHARE);
}

#[test]
fn racing_replays_fill_exactly_once() {
    let db = TempDb::new();
    let (mut service, season) = open(&db);
    service
        .ensure_player(&CallContext::background(), season, "racer", "racer")
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let mut svc = service.fork().unwrap();
            thread::spawn(move || {
                let req = OrderRequest::new("ZENITH", Side::Buy, 2 * UNITS_PER_SHARE, "one-key");
                svc.place_order(&CallContext::background(), season, "racer", &req)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, SimError::DuplicateIdempotency)));
    let dash = service.dashboard(season, "racer").unwrap();
    assert_eq!(dash.positions[0].quantity_units, 2 * UNITS_PER_SHARE);
}

#[test]
fn cancelled_calls_do_no_work() {
    let db = TempDb::new();
    let (mut service, season) = open(&db);
    let background = CallContext::background();
    service.ensure_player(&background, season, "idle", "idle").unwrap();

    let handle = CancelHandle::new();
    let ctx = CallContext::background().with_cancel(handle.clone());
    handle.cancel();
    let req = OrderRequest::new("NIMBUS", Side::Buy, UNITS_PER_SHARE, "cancelled");
    assert!(matches!(
        service.place_order(&ctx, season, "idle", &req),
        Err(SimError::Cancelled)
    ));

    let expired = CallContext::background().with_timeout(Duration::ZERO);
    assert!(matches!(
        service.place_order(&expired, season, "idle", &req),
        Err(SimError::DeadlineExceeded)
    ));

    assert_eq!(service.wallet(season, "idle").unwrap().balance_micros, money::STARTER_BALANCE_MICROS);
    service.place_order(&background, season, "idle", &req).unwrap();
}

#[test]
fn a_reopened_file_keeps_its_state() {
    let db = TempDb::new();
    {
        let (mut service, season) = open(&db);
        service.ensure_player(&CallContext::background(), season, "keeper", "keeper").unwrap();
    }
    let (mut service, season) = open(&db);
    let report = service.seed_defaults(&CallContext::background(), season).unwrap();
    assert_eq!(report.stocks_added, 0);
    assert_eq!(
        service.wallet(season, "keeper").unwrap().balance_micros,
        money::STARTER_BALANCE_MICROS
    );
}

#[test]
fn a_held_write_lock_exhausts_the_retry_budget() {
    let db = TempDb::new();
    let config = SimConfig {
        busy_timeout_ms: 1,
        retry: RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 2,
        },
        ..db.config()
    };
    let _ = env_logger::builder().is_test(true).try_init();
    let ctx = CallContext::background();
    let mut service = GameService::open(config).unwrap();
    let season = service.ensure_active_season(&ctx).unwrap().id;
    service.seed_defaults(&ctx, season).unwrap();
    service.ensure_player(&ctx, season, "blocked", "blocked").unwrap();

    let mut other = SimStore::open(&db.0.to_string_lossy()).unwrap();
    let lock = other.begin(Isolation::Serializable).unwrap();
    let req = OrderRequest::new("NIMBUS", Side::Buy, UNITS_PER_SHARE, "held");
    assert!(matches!(
        service.place_order(&ctx, season, "blocked", &req),
        Err(SimError::TransactionConflict)
    ));
    drop(lock);

    assert_eq!(service.wallet(season, "blocked").unwrap().balance_micros, money::STARTER_BALANCE_MICROS);
    service.place_order(&ctx, season, "blocked", &req).unwrap();
    let dash = service.dashboard(season, "blocked").unwrap();
    assert_eq!(dash.positions[0].quantity_units, UNITS_PER_SHARE);
}

#[test]
fn only_busy_and_locked_count_as_conflicts() {
    let failure = |code| SimError::Database(rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None));
    assert!(failure(rusqlite::ffi::SQLITE_BUSY).is_serialization_conflict());
    assert!(failure(rusqlite::ffi::SQLITE_LOCKED).is_serialization_conflict());
    assert!(!failure(rusqlite::ffi::SQLITE_CONSTRAINT).is_serialization_conflict());
    assert!(!SimError::TransactionConflict.is_serialization_conflict());
    assert!(!SimError::Cancelled.is_serialization_conflict());
}
