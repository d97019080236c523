#![allow(dead_code)]

use stanks_core::{
    config::SimConfig,
    context::CallContext,
    engine::{TickParams, TickSummary},
    ledger::{self, LedgerAction, Posting},
    money,
    rng::{EntropySource, SharedRng},
    store::{Isolation, LoanRow, SimStore},
    types::{Actor, BusinessId, Micros, SeasonId, Visibility},
    GameService,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Replays a fixed list of draws, then repeats the fallback forever.
pub struct ScriptedRng {
    draws: Mutex<Vec<f64>>,
    fallback: f64,
    used: AtomicUsize,
}

impl ScriptedRng {
    pub fn new(draws: &[f64], fallback: f64) -> Self {
        let mut queued = draws.to_vec();
        queued.reverse();
        Self {
            draws: Mutex::new(queued),
            fallback,
            used: AtomicUsize::new(0),
        }
    }

    /// Every draw returns `value`.
    pub fn constant(value: f64) -> Self {
        Self::new(&[], value)
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::SeqCst)
    }
}

impl EntropySource for ScriptedRng {
    fn next_f64(&self) -> f64 {
        self.used.fetch_add(1, Ordering::SeqCst);
        let mut draws = self.draws.lock().expect("scripted rng lock");
        draws.pop().unwrap_or(self.fallback)
    }
}

pub struct World {
    pub service: GameService,
    pub season: SeasonId,
    pub ctx: CallContext,
}

impl World {
    pub fn actor<'a>(&self, user: &'a str) -> Actor<'a> {
        Actor::new(self.season, user)
    }

    pub fn tick(&mut self) -> TickSummary {
        let params = TickParams::from_config(self.season, self.service.config());
        self.service.run_tick(&self.ctx, &params).expect("tick")
    }

    pub fn balance(&mut self, user: &str) -> Micros {
        self.service.wallet(self.season, user).expect("wallet").balance_micros
    }

    /// Register a player with the starter balance.
    pub fn player(&mut self, user: &str) {
        self.service
            .ensure_player(&self.ctx, self.season, user, user)
            .expect("ensure player");
    }

    /// Credit `amount` through a balanced grant pair so the ledger stays whole.
    pub fn grant(&mut self, user: &str, amount: Micros) {
        post(&mut self.service, self.season, user, LedgerAction::StarterGrant, amount);
    }

    /// Debit `amount` as a standalone business loss.
    pub fn drain(&mut self, user: &str, amount: Micros) {
        post(&mut self.service, self.season, user, LedgerAction::BusinessLoss, amount);
    }

    /// A player rich enough to unlock businesses.
    pub fn tycoon(&mut self, user: &str) {
        self.player(user);
        self.grant(user, money::stonky(300_000));
    }

    /// Every loan row of a business, read straight from the store so it
    /// works after the business is gone.
    pub fn loan_rows(&mut self, business_id: BusinessId) -> Vec<LoanRow> {
        let tx = self
            .service
            .store_mut()
            .begin(Isolation::ReadCommitted)
            .expect("begin");
        let rows = tx.loans_for_business(business_id).expect("loans");
        tx.commit().expect("commit");
        rows
    }

    pub fn open_business(&mut self, user: &str, name: &str, visibility: Visibility) -> BusinessId {
        let key = format!("biz-{user}-{name}");
        self.service
            .create_business(&self.ctx, self.actor(user), name, visibility, &key)
            .expect("create business")
    }
}

fn post(service: &mut GameService, season: SeasonId, user: &str, action: LedgerAction, amount: Micros) {
    let tx = service
        .store_mut()
        .begin(Isolation::Serializable)
        .expect("begin");
    let posting = Posting::new(season, user, action, amount);
    ledger::post_wallet_change(&tx, &posting).expect("post");
    tx.refresh_peak_net_worth(user, season).expect("peak");
    tx.commit().expect("commit");
}

pub fn world_with(rng: Arc<dyn EntropySource>, config: SimConfig) -> World {
    let store = SimStore::in_memory().expect("in-memory store");
    let mut service = GameService::new(store, rng, config).expect("service");
    let ctx = CallContext::background();
    let season = service.ensure_active_season(&ctx).expect("season").id;
    service.seed_defaults(&ctx, season).expect("seed");
    World { service, season, ctx }
}

/// A seeded world with the default stock universe and hiring pool.
pub fn world() -> World {
    let _ = env_logger::builder().is_test(true).try_init();
    world_with(Arc::new(SharedRng::seeded(42)), SimConfig::default_test())
}

pub fn scripted_world(rng: ScriptedRng) -> World {
    world_with(Arc::new(rng), SimConfig::default_test())
}

/// Wallet balance must equal the ledger sum for every wallet in the season.
pub fn assert_ledger_balanced(world: &mut World) {
    let wallets = {
        let tx = world
            .service
            .store_mut()
            .begin(Isolation::ReadCommitted)
            .expect("begin");
        tx.wallets_in_season(world.season).expect("wallets")
    };
    for w in wallets {
        let sum = world
            .service
            .ledger_balance(world.season, &w.user_id)
            .expect("ledger sum");
        assert_eq!(
            w.balance_micros, sum,
            "wallet {} balance {} != ledger sum {}",
            w.user_id, w.balance_micros, sum
        );
    }
}
