//! The tick engine.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Market subsystem       (regime switch, price evolution)
//!   2. Economy subsystem      (business revenue, events, reserve, loan interest)
//!   3. Delinquency subsystem  (loan autopay, late fees, repossession, liquidation)
//!   4. Interest subsystem     (debt interest on negative wallets)
//!
//! RULES:
//!   - One tick is one `ReadCommitted` transaction. Any error rolls it all back.
//!   - Subsystems execute in registration order and only talk through the store.
//!   - All randomness flows through the shared entropy source.
//!   - Every event is recorded in the event log before commit.

use crate::{
    config::{BusinessTuning, LoanTuning, SimConfig, VolatilityProfile},
    context::CallContext,
    delinquency_subsystem::DelinquencySubsystem,
    economy_subsystem::EconomySubsystem,
    error::SimResult,
    event::{EventLogEntry, SimEvent},
    interest_subsystem::InterestSubsystem,
    market_subsystem::MarketSubsystem,
    rng::EntropySource,
    store::{Isolation, SimStore, Tx},
    subsystem::{TickContext, TickSubsystem},
    types::{Micros, Regime, SeasonId},
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// What the scheduler passes for one tick.
#[derive(Debug, Clone)]
pub struct TickParams {
    pub season_id: SeasonId,
    pub tick_interval: Duration,
    pub interest_apr: f64,
    pub volatility: VolatilityProfile,
}

impl TickParams {
    pub fn from_config(season_id: SeasonId, config: &SimConfig) -> Self {
        Self {
            season_id,
            tick_interval: config.tick_interval(),
            interest_apr: config.interest_apr,
            volatility: config.volatility,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TickSummary {
    pub season_id: SeasonId,
    pub tick_at: i64,
    pub regime: Option<Regime>,
    pub regime_changed: bool,
    pub stocks_moved: usize,
    pub businesses: usize,
    pub players_credited: usize,
    pub players_debited: usize,
    pub business_net_micros: Micros,
    pub business_events: usize,
    pub loan_payments: usize,
    pub delinquencies: usize,
    pub repossessions: usize,
    pub liquidations: usize,
    pub interest_wallets: usize,
    pub interest_micros: Micros,
}

impl TickSummary {
    fn record(&mut self, event: &SimEvent) {
        match event {
            SimEvent::RegimeChanged { .. } => self.regime_changed = true,
            SimEvent::MarketMoved { regime, stocks_moved, .. } => {
                self.regime = Some(*regime);
                self.stocks_moved = *stocks_moved;
            }
            SimEvent::BusinessEvent { .. } => self.business_events += 1,
            SimEvent::BusinessResultsPosted {
                businesses,
                players_credited,
                players_debited,
                net_micros,
                ..
            } => {
                self.businesses = *businesses;
                self.players_credited = *players_credited;
                self.players_debited = *players_debited;
                self.business_net_micros = *net_micros;
            }
            SimEvent::LoanPaymentCollected { .. } => self.loan_payments += 1,
            SimEvent::LoanPaymentMissed { .. } => self.delinquencies += 1,
            SimEvent::MachineryRepossessed { .. } => self.repossessions += 1,
            SimEvent::BusinessLiquidated { .. } => self.liquidations += 1,
            SimEvent::DebtInterestCharged { wallets, total_micros, .. } => {
                self.interest_wallets = *wallets;
                self.interest_micros = *total_micros;
            }
            SimEvent::TickCompleted { .. } => {}
        }
    }
}

pub struct SimEngine {
    store: SimStore,
    rng: Arc<dyn EntropySource>,
    business: BusinessTuning,
    loans: LoanTuning,
    subsystems: Vec<Box<dyn TickSubsystem>>,
}

impl SimEngine {
    pub fn new(store: SimStore, rng: Arc<dyn EntropySource>, business: BusinessTuning, loans: LoanTuning) -> Self {
        Self {
            store,
            rng,
            business,
            loans,
            subsystems: Vec::new(),
        }
    }

    /// Build a fully wired engine with all subsystems registered.
    pub fn build(store: SimStore, rng: Arc<dyn EntropySource>, config: &SimConfig) -> Self {
        let mut engine = SimEngine::new(store, rng, config.business.clone(), config.loans.clone());
        engine.register(Box::new(MarketSubsystem));
        engine.register(Box::new(EconomySubsystem));
        engine.register(Box::new(DelinquencySubsystem));
        engine.register(Box::new(InterestSubsystem));
        engine
    }

    /// Register a subsystem. Call in the documented execution order.
    pub fn register(&mut self, subsystem: Box<dyn TickSubsystem>) {
        self.subsystems.push(subsystem);
    }

    pub fn store(&self) -> &SimStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SimStore {
        &mut self.store
    }

    pub fn rng(&self) -> &Arc<dyn EntropySource> {
        &self.rng
    }

    /// Advance one season by one tick.
    pub fn run_tick(&mut self, ctx: &CallContext, params: &TickParams) -> SimResult<TickSummary> {
        ctx.check()?;
        let tx = self.store.begin(Isolation::ReadCommitted)?;
        let tick = TickContext {
            season_id: params.season_id,
            tick_at: tx.now_ms(),
            tick_secs: params.tick_interval.as_secs().max(1),
            interest_apr: params.interest_apr,
            dynamics: params.volatility.dynamics(),
            business: self.business.clone(),
            loans: self.loans.clone(),
        };

        let mut summary = TickSummary {
            season_id: tick.season_id,
            tick_at: tick.tick_at,
            ..TickSummary::default()
        };
        for subsystem in &mut self.subsystems {
            let events = subsystem.update(&tx, &tick, self.rng.as_ref())?;
            for event in &events {
                append_event(&tx, &tick, subsystem.name(), event)?;
                summary.record(event);
            }
        }

        for wallet in tx.wallets_in_season(tick.season_id)? {
            tx.refresh_peak_net_worth(&wallet.user_id, tick.season_id)?;
        }

        let done = SimEvent::TickCompleted {
            season_id: tick.season_id,
            tick_at: tick.tick_at,
        };
        append_event(&tx, &tick, "engine", &done)?;
        tx.commit()?;

        log::info!(
            "tick season={} regime={} stocks={} businesses={} delinquent={} liquidated={}",
            summary.season_id,
            summary.regime.map(|r| r.as_str()).unwrap_or("-"),
            summary.stocks_moved,
            summary.businesses,
            summary.delinquencies,
            summary.liquidations
        );
        Ok(summary)
    }
}

fn append_event(tx: &Tx<'_>, tick: &TickContext, subsystem: &str, event: &SimEvent) -> SimResult<()> {
    tx.append_event(&EventLogEntry {
        id: None,
        season_id: tick.season_id,
        tick_at: tick.tick_at,
        subsystem: subsystem.to_string(),
        event_type: event.event_type().to_string(),
        payload: serde_json::to_string(event)?,
    })
}
