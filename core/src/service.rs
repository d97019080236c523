//! Player-facing entry points.
//!
//! `GameService` is what the API layer and the worker hold. Every keyed
//! mutation validates its input before a transaction opens, then runs
//! under the serializable retry coordinator. Reads run in a deferred
//! transaction and take no key.

use crate::{
    business::{self, HireReceipt, MachineryReceipt, ReserveReceipt, SaleReceipt, StockListing, TrainingReceipt, UpgradeReceipt},
    candidates::CandidatePool,
    config::SimConfig,
    context::CallContext,
    engine::{SimEngine, TickParams, TickSummary},
    error::{SimError, SimResult},
    event::EventLogEntry,
    ledger::{self, LedgerAction, Posting},
    loans::{self, LoanReceipt, RepaymentReceipt},
    money,
    retry::run_serializable,
    rng::{EntropySource, SharedRng},
    social,
    store::{
        BusinessRow, CandidateRow, EmployeeRow, Isolation, LeaderboardRow, LedgerRow, LoanRow, MachineryRow,
        NewStock, OrderRow, PricePoint, SaleRecord, SeasonRow, SimStore, StockRow, Tx, WalletRow,
    },
    trading::{self, OrderReceipt, OrderRequest},
    types::{Actor, BusinessId, MachineType, Micros, Regime, SeasonId, Strategy, Units, UpgradeKind, Visibility},
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_SEASON_NAME: &str = "Season 1";
pub const DEFAULT_SEASON_DAYS: i64 = 90;
pub const PRICE_HISTORY_LIMIT: usize = 64;
const DASHBOARD_ORDER_LIMIT: usize = 20;

/// The default stock universe: symbol, display name, price in display units.
pub const DEFAULT_STOCKS: [(&str, &str, i64); 20] = [
    ("COBOLT", "Cobalt Dynamics", 130),
    ("NIMBUS", "Nimbus Labs", 95),
    ("RUSTIC", "Rustic Systems", 115),
    ("PYLONS", "Pylon Networks", 80),
    ("JAVOLT", "Javolt Cloud", 105),
    ("SWIFTR", "Swiftr Mobile", 150),
    ("KOTLIN", "Kotlin Forge", 90),
    ("NODEON", "Nodeon Runtime", 120),
    ("RUBYIX", "Rubyix Core", 70),
    ("ELIXIR", "Elixir Ops", 125),
    ("QUARKX", "Quarkx Compute", 135),
    ("VECTRA", "Vectra AI", 165),
    ("DATUMX", "Datumx Data", 85),
    ("CYBRON", "Cybron Secure", 140),
    ("FUSION", "Fusion Grid", 110),
    ("NEBULA", "Nebula Energy", 92),
    ("ORBITZ", "Orbitz Space", 180),
    ("ZENITH", "Zenith Retail", 75),
    ("ARCANE", "Arcane Finance", 145),
    ("LUMINA", "Lumina Health", 102),
];

// ── Read models ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct PositionView {
    pub symbol: String,
    pub quantity_units: Units,
    pub avg_price_micros: Micros,
    pub current_price_micros: Micros,
    pub market_value_micros: Micros,
    pub unrealized_micros: Micros,
}

#[derive(Debug, Clone, Serialize)]
pub struct BusinessSummary {
    pub business: BusinessRow,
    pub employee_count: usize,
    /// Base plus employee revenue, before multipliers.
    pub revenue_per_tick_micros: Micros,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub season_id: SeasonId,
    pub balance_micros: Micros,
    pub net_worth_micros: Micros,
    pub peak_net_worth_micros: Micros,
    pub debt_limit_micros: Micros,
    pub regime: Option<Regime>,
    pub positions: Vec<PositionView>,
    pub businesses: Vec<BusinessSummary>,
    pub recent_orders: Vec<OrderRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StockDetail {
    pub stock: StockRow,
    /// Newest first.
    pub series: Vec<PricePoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BusinessState {
    pub business: BusinessRow,
    pub employees: Vec<EmployeeRow>,
    pub machinery: Vec<MachineryRow>,
    pub loans: Vec<LoanRow>,
    pub operating_value_micros: Micros,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SeedReport {
    pub stocks_added: usize,
    pub candidates_added: usize,
}

pub struct GameService {
    engine: SimEngine,
    config: SimConfig,
    rng: Arc<dyn EntropySource>,
}

impl GameService {
    /// Wrap an open store, applying migrations.
    pub fn new(store: SimStore, rng: Arc<dyn EntropySource>, config: SimConfig) -> SimResult<Self> {
        store.migrate()?;
        let engine = SimEngine::build(store, Arc::clone(&rng), &config);
        Ok(Self { engine, config, rng })
    }

    /// Open the configured database file with a configured entropy source.
    pub fn open(config: SimConfig) -> SimResult<Self> {
        let store = SimStore::open_with_timeout(&config.db_path, Duration::from_millis(config.busy_timeout_ms))?;
        let rng: Arc<dyn EntropySource> = Arc::new(SharedRng::from_config(config.rng_seed));
        Self::new(store, rng, config)
    }

    /// A second handle on the same database with its own connection,
    /// sharing this service's entropy source.
    pub fn fork(&self) -> SimResult<Self> {
        let store = self.engine.store().reopen()?;
        Self::new(store, Arc::clone(&self.rng), self.config.clone())
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Raw store access for maintenance jobs and test fixtures.
    pub fn store_mut(&mut self) -> &mut SimStore {
        self.engine.store_mut()
    }

    fn mutate<T, F>(&mut self, ctx: &CallContext, mut body: F) -> SimResult<T>
    where
        F: FnMut(&Tx<'_>, &SimConfig, &dyn EntropySource) -> SimResult<T>,
    {
        let Self { engine, config, rng } = self;
        let config: &SimConfig = config;
        let rng: &dyn EntropySource = rng.as_ref();
        run_serializable(engine.store_mut(), ctx, &config.retry, |tx| body(tx, config, rng))
    }

    fn read<T, F>(&mut self, body: F) -> SimResult<T>
    where
        F: FnOnce(&Tx<'_>) -> SimResult<T>,
    {
        let tx = self.engine.store_mut().begin(Isolation::ReadCommitted)?;
        let value = body(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    // ── Seasons and seeding ────────────────────────────────────

    pub fn active_season(&mut self) -> SimResult<Option<SeasonRow>> {
        self.read(|tx| tx.active_season())
    }

    /// The active season, creating the first one when none exists.
    pub fn ensure_active_season(&mut self, ctx: &CallContext) -> SimResult<SeasonRow> {
        self.mutate(ctx, |tx, _, _| match tx.active_season()? {
            Some(season) => Ok(season),
            None => {
                let season = tx.insert_season(DEFAULT_SEASON_NAME, chrono::Duration::days(DEFAULT_SEASON_DAYS))?;
                log::info!("created season {} '{}'", season.id, season.name);
                Ok(season)
            }
        })
    }

    /// Seed the default stock universe and hiring pool into an empty season.
    pub fn seed_defaults(&mut self, ctx: &CallContext, season_id: SeasonId) -> SimResult<SeedReport> {
        self.mutate(ctx, |tx, config, _| {
            let mut report = SeedReport::default();
            if tx.stock_count(season_id)? == 0 {
                for (symbol, name, price) in DEFAULT_STOCKS {
                    let price = money::stonky(price);
                    let id = tx.insert_stock(&NewStock {
                        season_id,
                        symbol,
                        display_name: name,
                        price_micros: price,
                        listed_public: true,
                        created_by_user_id: None,
                        business_id: None,
                    })?;
                    tx.append_price_point(id, price)?;
                    report.stocks_added += 1;
                }
            }
            if tx.candidate_count(season_id)? == 0 {
                for candidate in CandidatePool::generate(config.business.candidate_pool_size) {
                    tx.insert_candidate(season_id, &candidate)?;
                    report.candidates_added += 1;
                }
            }
            Ok(report)
        })
    }

    /// Register the player and give them a starter wallet for the season.
    pub fn ensure_player(
        &mut self,
        ctx: &CallContext,
        season_id: SeasonId,
        user_id: &str,
        username: &str,
    ) -> SimResult<WalletRow> {
        if user_id.trim().is_empty() {
            return Err(SimError::Invalid("user id is required".into()));
        }
        self.mutate(ctx, |tx, _, _| {
            let invite_code = social::ensure_invite_code(tx, user_id)?;
            tx.upsert_player(user_id, username, &invite_code)?;
            if tx.insert_wallet_if_missing(user_id, season_id, 0)? {
                let grant = Posting::new(season_id, user_id, LedgerAction::StarterGrant, money::STARTER_BALANCE_MICROS);
                ledger::post_wallet_change(tx, &grant)?;
                tx.refresh_peak_net_worth(user_id, season_id)?;
            }
            tx.lock_wallet(user_id, season_id)
        })
    }

    // ── Friends ────────────────────────────────────────────────

    /// Follow the player who owns `invite_code`. Returns false when already following.
    pub fn add_friend(&mut self, ctx: &CallContext, user_id: &str, invite_code: &str) -> SimResult<bool> {
        social::normalize_invite_code(invite_code)?;
        self.mutate(ctx, |tx, _, _| social::follow(tx, user_id, invite_code))
    }

    pub fn remove_friend(&mut self, ctx: &CallContext, user_id: &str, invite_code: &str) -> SimResult<bool> {
        social::normalize_invite_code(invite_code)?;
        self.mutate(ctx, |tx, _, _| social::unfollow(tx, user_id, invite_code))
    }

    // ── Trading ────────────────────────────────────────────────

    pub fn place_order(
        &mut self,
        ctx: &CallContext,
        season_id: SeasonId,
        user_id: &str,
        req: &OrderRequest,
    ) -> SimResult<OrderReceipt> {
        business::require_key(&req.idempotency_key)?;
        let order = trading::validate_order(req)?;
        self.mutate(ctx, |tx, _, _| {
            trading::execute_order(tx, season_id, user_id, &order, &req.idempotency_key)
        })
    }

    // ── Businesses ─────────────────────────────────────────────

    pub fn create_business(
        &mut self,
        ctx: &CallContext,
        actor: Actor<'_>,
        name: &str,
        visibility: Visibility,
        key: &str,
    ) -> SimResult<BusinessId> {
        business::require_key(key)?;
        let name = business::validate_entity_name(name)?;
        self.mutate(ctx, |tx, config, _| {
            business::create_business(tx, actor, &name, visibility, key, &config.business)
        })
    }

    pub fn set_visibility(
        &mut self,
        ctx: &CallContext,
        actor: Actor<'_>,
        business_id: BusinessId,
        visibility: Visibility,
    ) -> SimResult<()> {
        self.mutate(ctx, |tx, _, _| business::set_visibility(tx, actor, business_id, visibility))
    }

    pub fn set_strategy(
        &mut self,
        ctx: &CallContext,
        actor: Actor<'_>,
        business_id: BusinessId,
        strategy: Strategy,
        key: &str,
    ) -> SimResult<()> {
        business::require_key(key)?;
        self.mutate(ctx, |tx, _, _| business::set_strategy(tx, actor, business_id, strategy, key))
    }

    pub fn hire_employee(
        &mut self,
        ctx: &CallContext,
        actor: Actor<'_>,
        business_id: BusinessId,
        candidate_id: i64,
        key: &str,
    ) -> SimResult<HireReceipt> {
        business::require_key(key)?;
        self.mutate(ctx, |tx, _, _| business::hire_employee(tx, actor, business_id, candidate_id, key))
    }

    pub fn train_employee(
        &mut self,
        ctx: &CallContext,
        actor: Actor<'_>,
        business_id: BusinessId,
        employee_id: i64,
        key: &str,
    ) -> SimResult<TrainingReceipt> {
        business::require_key(key)?;
        self.mutate(ctx, |tx, config, _| {
            business::train_employee(tx, actor, business_id, employee_id, key, &config.business)
        })
    }

    pub fn buy_machinery(
        &mut self,
        ctx: &CallContext,
        actor: Actor<'_>,
        business_id: BusinessId,
        machine_type: MachineType,
        key: &str,
    ) -> SimResult<MachineryReceipt> {
        business::require_key(key)?;
        self.mutate(ctx, |tx, config, _| {
            business::buy_machinery(tx, actor, business_id, machine_type, key, &config.business)
        })
    }

    pub fn buy_upgrade(
        &mut self,
        ctx: &CallContext,
        actor: Actor<'_>,
        business_id: BusinessId,
        kind: UpgradeKind,
        key: &str,
    ) -> SimResult<UpgradeReceipt> {
        business::require_key(key)?;
        self.mutate(ctx, |tx, config, _| {
            business::buy_upgrade(tx, actor, business_id, kind, key, &config.business)
        })
    }

    pub fn reserve_deposit(
        &mut self,
        ctx: &CallContext,
        actor: Actor<'_>,
        business_id: BusinessId,
        amount: Micros,
        key: &str,
    ) -> SimResult<ReserveReceipt> {
        business::require_key(key)?;
        business::require_positive(amount, "amount")?;
        self.mutate(ctx, |tx, _, _| business::reserve_deposit(tx, actor, business_id, amount, key))
    }

    pub fn reserve_withdraw(
        &mut self,
        ctx: &CallContext,
        actor: Actor<'_>,
        business_id: BusinessId,
        amount: Micros,
        key: &str,
    ) -> SimResult<ReserveReceipt> {
        business::require_key(key)?;
        business::require_positive(amount, "amount")?;
        self.mutate(ctx, |tx, _, _| business::reserve_withdraw(tx, actor, business_id, amount, key))
    }

    pub fn sell_business(
        &mut self,
        ctx: &CallContext,
        actor: Actor<'_>,
        business_id: BusinessId,
        key: &str,
    ) -> SimResult<SaleReceipt> {
        business::require_key(key)?;
        self.mutate(ctx, |tx, config, rng| {
            business::sell_business(tx, actor, business_id, key, &config.business, rng)
        })
    }

    // ── Loans ──────────────────────────────────────────────────

    pub fn take_loan(
        &mut self,
        ctx: &CallContext,
        actor: Actor<'_>,
        business_id: BusinessId,
        amount: Micros,
        key: &str,
    ) -> SimResult<LoanReceipt> {
        business::require_key(key)?;
        business::require_positive(amount, "amount")?;
        self.mutate(ctx, |tx, config, rng| {
            loans::take_loan(tx, actor, business_id, amount, key, &config.loans, rng)
        })
    }

    pub fn repay_loan(
        &mut self,
        ctx: &CallContext,
        actor: Actor<'_>,
        business_id: BusinessId,
        amount: Micros,
        key: &str,
    ) -> SimResult<RepaymentReceipt> {
        business::require_key(key)?;
        business::require_positive(amount, "amount")?;
        self.mutate(ctx, |tx, _, _| loans::repay_loan(tx, actor, business_id, amount, key))
    }

    // ── Player-created stocks ──────────────────────────────────

    pub fn create_custom_stock(
        &mut self,
        ctx: &CallContext,
        actor: Actor<'_>,
        business_id: BusinessId,
        symbol: &str,
        display_name: &str,
        key: &str,
    ) -> SimResult<StockListing> {
        business::require_key(key)?;
        let symbol = money::normalize_symbol(symbol)?;
        let display_name = business::validate_entity_name(display_name)?;
        self.mutate(ctx, |tx, _, _| {
            business::create_custom_stock(tx, actor, business_id, &symbol, &display_name, key)
        })
    }

    pub fn ipo_stock(
        &mut self,
        ctx: &CallContext,
        actor: Actor<'_>,
        symbol: &str,
        price: Micros,
        key: &str,
    ) -> SimResult<StockListing> {
        business::require_key(key)?;
        let symbol = money::normalize_symbol(symbol)?;
        business::require_positive(price, "price")?;
        self.mutate(ctx, |tx, _, _| business::ipo_stock(tx, actor, &symbol, price, key))
    }

    pub fn business_ipo(
        &mut self,
        ctx: &CallContext,
        actor: Actor<'_>,
        business_id: BusinessId,
        symbol: &str,
        price: Micros,
        key: &str,
    ) -> SimResult<StockListing> {
        business::require_key(key)?;
        let symbol = money::normalize_symbol(symbol)?;
        business::require_positive(price, "price")?;
        self.mutate(ctx, |tx, _, _| {
            business::business_ipo(tx, actor, business_id, &symbol, price, key)
        })
    }

    // ── Tick ───────────────────────────────────────────────────

    pub fn run_tick(&mut self, ctx: &CallContext, params: &TickParams) -> SimResult<TickSummary> {
        self.engine.run_tick(ctx, params)
    }

    // ── Reads ──────────────────────────────────────────────────

    pub fn dashboard(&mut self, season_id: SeasonId, user_id: &str) -> SimResult<Dashboard> {
        self.read(|tx| {
            let wallet = tx.lock_wallet(user_id, season_id)?;
            let mut positions = Vec::new();
            let mut holdings: i128 = 0;
            for h in tx.holdings(user_id, season_id)? {
                let market_value = money::notional(h.current_price_micros, h.quantity_units)?;
                let cost_value = money::notional(h.avg_price_micros, h.quantity_units)?;
                holdings += market_value as i128;
                positions.push(PositionView {
                    symbol: h.symbol,
                    quantity_units: h.quantity_units,
                    avg_price_micros: h.avg_price_micros,
                    current_price_micros: h.current_price_micros,
                    market_value_micros: market_value,
                    unrealized_micros: market_value - cost_value,
                });
            }
            let mut businesses = Vec::new();
            for b in tx.businesses_for_owner(season_id, user_id)? {
                let employees = tx.employees(b.id)?;
                let revenue = b.base_revenue_micros
                    + employees.iter().map(|e| e.revenue_per_tick_micros).sum::<Micros>();
                businesses.push(BusinessSummary {
                    employee_count: employees.len(),
                    revenue_per_tick_micros: revenue,
                    business: b,
                });
            }
            Ok(Dashboard {
                season_id,
                balance_micros: wallet.balance_micros,
                net_worth_micros: money::narrow(wallet.balance_micros as i128 + holdings, "net worth")?,
                peak_net_worth_micros: wallet.peak_net_worth_micros,
                debt_limit_micros: money::debt_limit_from_peak(wallet.peak_net_worth_micros),
                regime: tx.market_regime(season_id)?,
                positions,
                businesses,
                recent_orders: tx.orders(user_id, season_id, DASHBOARD_ORDER_LIMIT)?,
            })
        })
    }

    pub fn list_stocks(&mut self, season_id: SeasonId, include_unlisted: bool) -> SimResult<Vec<StockRow>> {
        self.read(|tx| tx.stocks(season_id, include_unlisted))
    }

    pub fn stock_detail(&mut self, season_id: SeasonId, symbol: &str) -> SimResult<StockDetail> {
        let symbol = money::normalize_symbol(symbol)?;
        self.read(|tx| {
            let stock = tx
                .lock_stock_by_symbol(season_id, &symbol)?
                .ok_or(SimError::StockNotFound)?;
            let series = tx.price_history(stock.id, PRICE_HISTORY_LIMIT)?;
            Ok(StockDetail { stock, series })
        })
    }

    pub fn leaderboard(&mut self, season_id: SeasonId, limit: usize) -> SimResult<Vec<LeaderboardRow>> {
        self.read(|tx| tx.leaderboard(season_id, limit))
    }

    /// The viewer and the players they follow.
    pub fn friends_leaderboard(&mut self, season_id: SeasonId, user_id: &str, limit: usize) -> SimResult<Vec<LeaderboardRow>> {
        self.read(|tx| tx.friends_leaderboard(season_id, user_id, limit))
    }

    pub fn invite_code(&mut self, user_id: &str) -> SimResult<String> {
        self.read(|tx| tx.player_invite_code(user_id)?.ok_or(SimError::NotFound { entity: "player" }))
    }

    pub fn followees(&mut self, user_id: &str) -> SimResult<Vec<String>> {
        self.read(|tx| tx.followees(user_id))
    }

    /// The player's ledger rows, newest first.
    pub fn ledger(&mut self, season_id: SeasonId, user_id: &str, limit: usize) -> SimResult<Vec<LedgerRow>> {
        self.read(|tx| tx.ledger_entries(user_id, season_id, limit))
    }

    pub fn business_state(&mut self, actor: Actor<'_>, business_id: BusinessId) -> SimResult<BusinessState> {
        self.read(|tx| {
            let business = business::owned_business(tx, actor, business_id)?;
            let (operating, _) = business::operating_value(tx, &business)?;
            Ok(BusinessState {
                employees: tx.employees(business_id)?,
                machinery: tx.machinery(business_id)?,
                loans: tx.loans_for_business(business_id)?,
                operating_value_micros: operating,
                business,
            })
        })
    }

    pub fn list_candidates(&mut self, season_id: SeasonId) -> SimResult<Vec<CandidateRow>> {
        self.read(|tx| tx.candidates(season_id))
    }

    pub fn list_employees(&mut self, actor: Actor<'_>, business_id: BusinessId) -> SimResult<Vec<EmployeeRow>> {
        self.read(|tx| {
            business::owned_business(tx, actor, business_id)?;
            tx.employees(business_id)
        })
    }

    pub fn list_machinery(&mut self, actor: Actor<'_>, business_id: BusinessId) -> SimResult<Vec<MachineryRow>> {
        self.read(|tx| {
            business::owned_business(tx, actor, business_id)?;
            tx.machinery(business_id)
        })
    }

    pub fn list_loans(&mut self, actor: Actor<'_>, business_id: BusinessId) -> SimResult<Vec<LoanRow>> {
        self.read(|tx| {
            business::owned_business(tx, actor, business_id)?;
            tx.loans_for_business(business_id)
        })
    }

    /// Sale and liquidation records for a business the actor owned.
    pub fn sale_history(&mut self, actor: Actor<'_>, business_id: BusinessId) -> SimResult<Vec<SaleRecord>> {
        self.read(|tx| {
            Ok(tx
                .sale_history(business_id)?
                .into_iter()
                .filter(|s| s.season_id == actor.season_id && s.owner_user_id == actor.user_id)
                .collect())
        })
    }

    pub fn wallet(&mut self, season_id: SeasonId, user_id: &str) -> SimResult<WalletRow> {
        self.read(|tx| tx.lock_wallet(user_id, season_id))
    }

    /// Sum of the player's wallet-side ledger legs; equals the balance.
    pub fn ledger_balance(&mut self, season_id: SeasonId, user_id: &str) -> SimResult<Micros> {
        self.read(|tx| tx.wallet_ledger_sum(user_id, season_id))
    }

    /// The season's tick event log, oldest first.
    pub fn events(&mut self, season_id: SeasonId) -> SimResult<Vec<EventLogEntry>> {
        self.read(|tx| tx.events_for_season(season_id))
    }
}
