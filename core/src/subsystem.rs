//! Tick subsystem trait.
//!
//! RULE: Every tick subsystem implements TickSubsystem.
//! The engine calls update() on each registered subsystem
//! in registration order, inside one tick transaction.
//! Execution order is fixed and documented in engine.rs.

use crate::{
    config::{BusinessTuning, LoanTuning, MarketDynamics},
    error::SimResult,
    event::SimEvent,
    rng::EntropySource,
    store::Tx,
    types::SeasonId,
};

/// Everything a subsystem needs to know about the tick being run.
#[derive(Debug, Clone)]
pub struct TickContext {
    pub season_id: SeasonId,
    /// Wall-clock time of the tick in Unix milliseconds.
    pub tick_at: i64,
    pub tick_secs: u64,
    pub interest_apr: f64,
    pub dynamics: MarketDynamics,
    pub business: BusinessTuning,
    pub loans: LoanTuning,
}

impl TickContext {
    /// How many ticks of this length fit in a 365-day year.
    pub fn ticks_per_year(&self) -> f64 {
        (365.0 * 86_400.0) / self.tick_secs.max(1) as f64
    }

    /// Length of a tick as a fraction of a day.
    pub fn day_fraction(&self) -> f64 {
        self.tick_secs as f64 / 86_400.0
    }
}

/// The contract every tick subsystem must fulfill.
pub trait TickSubsystem: Send {
    /// Unique stable name, written to `event_log.subsystem`.
    fn name(&self) -> &'static str;

    /// Called once per tick by the engine.
    ///
    /// - `tx`:  the tick transaction; all writes go through it
    /// - `ctx`: season, tick length and tuning for this tick
    /// - `rng`: the shared entropy source
    ///
    /// Returns the events this subsystem produced.
    fn update(
        &mut self,
        tx: &Tx<'_>,
        ctx: &TickContext,
        rng: &dyn EntropySource,
    ) -> SimResult<Vec<SimEvent>>;
}
