mod common;

use stanks_core::{
    config::SimConfig,
    context::{CallContext, CancelHandle},
    engine::{SimEngine, TickParams},
    error::{SimError, SimResult},
    event::SimEvent,
    rng::{EntropySource, SharedRng},
    store::{SimStore, Tx},
    subsystem::{TickContext, TickSubsystem},
    GameService,
};
use std::sync::Arc;

struct Failing;

impl TickSubsystem for Failing {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn update(&mut self, _tx: &Tx<'_>, _ctx: &TickContext, _rng: &dyn EntropySource) -> SimResult<Vec<SimEvent>> {
        Err(SimError::Invalid("boom".into()))
    }
}

fn shared_name() -> String {
    format!("engine-{}", uuid::Uuid::new_v4())
}

#[test]
fn a_failing_subsystem_rolls_the_whole_tick_back() {
    let name = shared_name();
    let config = SimConfig::default_test();
    let rng: Arc<dyn EntropySource> = Arc::new(SharedRng::seeded(7));
    let ctx = CallContext::background();

    let mut service = GameService::new(SimStore::in_memory_shared(&name).unwrap(), Arc::clone(&rng), config.clone()).unwrap();
    let season = service.ensure_active_season(&ctx).unwrap().id;
    service.seed_defaults(&ctx, season).unwrap();
    service.ensure_player(&ctx, season, "watcher", "watcher").unwrap();
    let before: Vec<_> = service
        .list_stocks(season, true)
        .unwrap()
        .into_iter()
        .map(|s| s.current_price_micros)
        .collect();

    let mut engine = SimEngine::build(SimStore::in_memory_shared(&name).unwrap(), rng, &config);
    engine.register(Box::new(Failing));
    let err = engine
        .run_tick(&ctx, &TickParams::from_config(season, &config))
        .unwrap_err();
    assert!(matches!(err, SimError::Invalid(_)));

    let after: Vec<_> = service
        .list_stocks(season, true)
        .unwrap()
        .into_iter()
        .map(|s| s.current_price_micros)
        .collect();
    assert_eq!(before, after);
    assert!(service.events(season).unwrap().is_empty());
    assert_eq!(service.stock_detail(season, "NIMBUS").unwrap().series.len(), 1);
}

#[test]
fn a_cancelled_tick_never_starts() {
    let mut w = common::world();
    let handle = CancelHandle::new();
    handle.cancel();
    let ctx = CallContext::background().with_cancel(handle);
    let params = TickParams::from_config(w.season, w.service.config());
    assert!(matches!(w.service.run_tick(&ctx, &params), Err(SimError::Cancelled)));
    assert!(w.service.events(w.season).unwrap().is_empty());
}

#[test]
fn every_tick_ends_with_a_completion_event() {
    let mut w = common::world();
    for _ in 0..3 {
        w.tick();
    }
    let events = w.service.events(w.season).unwrap();
    let completed: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == "tick_completed")
        .collect();
    assert_eq!(completed.len(), 3);
    assert!(events.windows(2).all(|p| p[0].tick_at <= p[1].tick_at));
    assert!(events.iter().all(|e| e.event().is_ok()));
}
