//! Tick events.
//!
//! RULE: Subsystems report what they did ONLY through events.
//! The engine persists every event to `event_log` inside the tick transaction
//! and folds them into the `TickSummary`.

use crate::types::{BusinessId, Micros, Regime, SeasonId, UserId};
use serde::{Deserialize, Serialize};

/// Every event emitted during a tick.
/// Variants are only ever appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    // ── Market ─────────────────────────────────────
    RegimeChanged {
        season_id: SeasonId,
        from: Regime,
        to: Regime,
    },
    MarketMoved {
        season_id: SeasonId,
        regime: Regime,
        stocks_moved: usize,
    },

    // ── Business economy ───────────────────────────
    BusinessEvent {
        business_id: BusinessId,
        owner_user_id: UserId,
        kind: BusinessEventKind,
    },
    BusinessResultsPosted {
        season_id: SeasonId,
        businesses: usize,
        players_credited: usize,
        players_debited: usize,
        net_micros: Micros,
    },

    // ── Loan delinquency ───────────────────────────
    LoanPaymentCollected {
        business_id: BusinessId,
        owner_user_id: UserId,
        amount_micros: Micros,
    },
    LoanPaymentMissed {
        business_id: BusinessId,
        owner_user_id: UserId,
        missed_ticks: i64,
        late_fee_micros: Micros,
    },
    MachineryRepossessed {
        business_id: BusinessId,
        owner_user_id: UserId,
        machines: usize,
    },
    BusinessLiquidated {
        business_id: BusinessId,
        owner_user_id: UserId,
        name: String,
    },

    // ── Debt interest ──────────────────────────────
    DebtInterestCharged {
        season_id: SeasonId,
        wallets: usize,
        total_micros: Micros,
    },

    // ── Engine ─────────────────────────────────────
    TickCompleted {
        season_id: SeasonId,
        tick_at: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessEventKind {
    ViralBreakout,
    PrCrisis,
    Burnout,
    Poached,
}

impl BusinessEventKind {
    /// Tag written to `business.last_event`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ViralBreakout => "viral_breakout",
            Self::PrCrisis => "pr_crisis",
            Self::Burnout => "burnout",
            Self::Poached => "poached",
        }
    }
}

impl SimEvent {
    /// Stable name for the event_type column.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RegimeChanged { .. } => "regime_changed",
            Self::MarketMoved { .. } => "market_moved",
            Self::BusinessEvent { .. } => "business_event",
            Self::BusinessResultsPosted { .. } => "business_results_posted",
            Self::LoanPaymentCollected { .. } => "loan_payment_collected",
            Self::LoanPaymentMissed { .. } => "loan_payment_missed",
            Self::MachineryRepossessed { .. } => "machinery_repossessed",
            Self::BusinessLiquidated { .. } => "business_liquidated",
            Self::DebtInterestCharged { .. } => "debt_interest_charged",
            Self::TickCompleted { .. } => "tick_completed",
        }
    }
}

/// A persisted event log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub season_id: SeasonId,
    pub tick_at: i64,
    pub subsystem: String,
    pub event_type: String,
    pub payload: String, // JSON-serialized SimEvent
}

impl EventLogEntry {
    pub fn event(&self) -> serde_json::Result<SimEvent> {
        serde_json::from_str(&self.payload)
    }
}
