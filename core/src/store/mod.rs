//! SQLite persistence layer.
//!
//! RULE: Only store/ talks to the database.
//! Everything else opens a `Tx` and calls its methods; no SQL outside this module.
//!
//! Methods named `lock_*` are the lock-then-read points of a mutation. Under
//! `Isolation::Serializable` the write lock is held from `BEGIN IMMEDIATE`,
//! so every row they return stays stable until commit.

mod business;
mod event;
mod idempotency;
mod ledger;
mod loan;
mod position;
mod season;
mod stock;
mod wallet;

pub use business::BusinessTickUpdate;
pub use stock::NewStock;

use crate::{
    error::SimResult,
    types::{
        BusinessId, LoanStatus, MachineType, Micros, Regime, SeasonId, Side, StockId, Strategy,
        Units, UpgradeKind, UserId, Visibility,
    },
};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use serde::Serialize;
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(250);

/// How strictly a transaction isolates itself from concurrent writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    /// Takes the database write lock up front (`BEGIN IMMEDIATE`).
    Serializable,
    /// Deferred: locks are taken by the first statement that needs them.
    ReadCommitted,
}

pub struct SimStore {
    conn: Connection,
    path: Option<String>, // None for a private :memory: database
    busy_timeout: Duration,
}

impl SimStore {
    pub fn open(path: &str) -> SimResult<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open_with_timeout(path: &str, busy_timeout: Duration) -> SimResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.query_row("PRAGMA journal_mode=WAL", [], |r| r.get::<_, String>(0));
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(busy_timeout)?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
            busy_timeout,
        })
    }

    /// Open a private in-memory database (used in tests).
    pub fn in_memory() -> SimResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: None,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        })
    }

    /// Open a named in-memory database that other connections in this
    /// process can join through `reopen`.
    pub fn in_memory_shared(name: &str) -> SimResult<Self> {
        Self::open(&format!("file:{name}?mode=memory&cache=shared"))
    }

    /// Open a new connection to the same database.
    /// A private in-memory database cannot be shared, so it gets a fresh one.
    pub fn reopen(&self) -> SimResult<Self> {
        match &self.path {
            Some(p) => Self::open_with_timeout(p, self.busy_timeout),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order. Safe to run on an existing database.
    pub fn migrate(&self) -> SimResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/002_market.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/003_business.sql"))?;
        Ok(())
    }

    pub fn begin(&mut self, isolation: Isolation) -> SimResult<Tx<'_>> {
        let behavior = match isolation {
            Isolation::Serializable => TransactionBehavior::Immediate,
            Isolation::ReadCommitted => TransactionBehavior::Deferred,
        };
        let tx = self.conn.transaction_with_behavior(behavior)?;
        Ok(Tx {
            tx,
            now_ms: Utc::now().timestamp_millis(),
        })
    }
}

/// An open transaction. Dropping it without `commit` rolls back.
pub struct Tx<'c> {
    tx: Transaction<'c>,
    now_ms: i64,
}

impl Tx<'_> {
    pub fn commit(self) -> SimResult<()> {
        self.tx.commit()?;
        Ok(())
    }

    /// Wall-clock time captured when the transaction opened, in Unix millis.
    /// Every row written by one transaction carries the same timestamp.
    pub fn now_ms(&self) -> i64 {
        self.now_ms
    }
}

pub(crate) fn to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

// ── Enum columns ───────────────────────────────────────────────────

macro_rules! text_column {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl ToSql for $ty {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    Ok(ToSqlOutput::from(self.as_str()))
                }
            }

            impl FromSql for $ty {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    value
                        .as_str()?
                        .parse()
                        .map_err(|e| FromSqlError::Other(Box::new(e)))
                }
            }
        )+
    };
}

text_column!(Side, Visibility, Strategy, Regime, LoanStatus, MachineType, UpgradeKind);

// ── Row types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SeasonRow {
    pub id: SeasonId,
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletRow {
    pub user_id: UserId,
    pub season_id: SeasonId,
    pub balance_micros: Micros,
    pub peak_net_worth_micros: Micros,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardRow {
    pub rank: usize,
    pub user_id: UserId,
    pub username: String,
    pub invite_code: String,
    pub balance_micros: Micros,
    pub net_worth_micros: Micros,
}

#[derive(Debug, Clone, Serialize)]
pub struct StockRow {
    pub id: StockId,
    pub season_id: SeasonId,
    pub symbol: String,
    pub display_name: String,
    pub current_price_micros: Micros,
    pub anchor_price_micros: Micros,
    pub listed_public: bool,
    pub created_by_user_id: Option<UserId>,
    pub business_id: Option<BusinessId>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PricePoint {
    pub tick_at: DateTime<Utc>,
    pub price_micros: Micros,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionRow {
    pub quantity_units: Units,
    pub avg_price_micros: Micros,
}

/// A position joined with its stock, for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct HoldingRow {
    pub stock_id: StockId,
    pub symbol: String,
    pub quantity_units: Units,
    pub avg_price_micros: Micros,
    pub current_price_micros: Micros,
}

#[derive(Debug, Clone)]
pub struct NewOrder<'a> {
    pub user_id: &'a str,
    pub season_id: SeasonId,
    pub stock_id: StockId,
    pub side: Side,
    pub quantity_units: Units,
    pub price_micros: Micros,
    pub notional_micros: Micros,
    pub fee_micros: Micros,
    pub idempotency_key: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderRow {
    pub id: i64,
    pub stock_id: StockId,
    pub side: Side,
    pub quantity_units: Units,
    pub price_micros: Micros,
    pub notional_micros: Micros,
    pub fee_micros: Micros,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLedgerEntry<'a> {
    pub season_id: SeasonId,
    pub user_id: &'a str,
    pub tx_group_id: &'a str,
    pub account: &'a str,
    pub delta_micros: Micros,
    pub metadata: &'a serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerRow {
    pub id: i64,
    pub tx_group_id: String,
    pub account: String,
    pub delta_micros: Micros,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BusinessRow {
    pub id: BusinessId,
    pub season_id: SeasonId,
    pub owner_user_id: UserId,
    pub name: String,
    pub visibility: Visibility,
    pub is_listed: bool,
    pub strategy: Strategy,
    pub marketing_level: i64,
    pub rd_level: i64,
    pub automation_level: i64,
    pub compliance_level: i64,
    pub brand_bps: i64,
    pub operational_health_bps: i64,
    pub cash_reserve_micros: Micros,
    pub base_revenue_micros: Micros,
    pub last_event: String,
}

impl BusinessRow {
    pub fn level(&self, kind: UpgradeKind) -> i64 {
        match kind {
            UpgradeKind::Marketing => self.marketing_level,
            UpgradeKind::Rd => self.rd_level,
            UpgradeKind::Automation => self.automation_level,
            UpgradeKind::Compliance => self.compliance_level,
        }
    }

    pub fn total_upgrade_levels(&self) -> i64 {
        self.marketing_level + self.rd_level + self.automation_level + self.compliance_level
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateRow {
    pub id: i64,
    pub full_name: String,
    pub role: String,
    pub trait_name: String,
    pub hire_cost_micros: Micros,
    pub revenue_per_tick_micros: Micros,
    pub risk_bps: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmployeeRow {
    pub id: i64,
    pub business_id: BusinessId,
    pub full_name: String,
    pub role: String,
    pub trait_name: String,
    pub revenue_per_tick_micros: Micros,
    pub risk_bps: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MachineryRow {
    pub id: i64,
    pub business_id: BusinessId,
    pub machine_type: MachineType,
    pub level: i64,
    pub output_bonus_micros: Micros,
    pub upkeep_micros: Micros,
    pub reliability_bps: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoanRow {
    pub id: i64,
    pub business_id: BusinessId,
    pub owner_user_id: UserId,
    pub principal_micros: Micros,
    pub outstanding_micros: Micros,
    pub interest_bps: i64,
    pub missed_ticks: i64,
    pub status: LoanStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaleRecord {
    pub business_id: BusinessId,
    pub season_id: SeasonId,
    pub owner_user_id: UserId,
    pub business_name: String,
    pub valuation_micros: Micros,
    pub loan_payoff_micros: Micros,
    pub payout_micros: Micros,
    pub adjustment_factor: f64,
    pub reason: String,
}
