use crate::{
    config::MarketDynamics,
    error::SimResult,
    event::SimEvent,
    rng::EntropySource,
    store::Tx,
    subsystem::{TickContext, TickSubsystem},
    types::{Micros, Regime},
};

/// Map a uniform draw onto [-1, 1).
pub fn normalish(u: f64) -> f64 {
    u + u - 1.0
}

/// Shock of magnitude `base × (0.35 + 2.8 m²)`, negative when `sign < 0.5`.
pub fn signed_shock(magnitude: f64, sign: f64, base: f64) -> f64 {
    let mag = base * (0.35 + 2.8 * magnitude * magnitude);
    if sign < 0.5 {
        -mag
    } else {
        mag
    }
}

/// Pull toward the anchor, proportional to the relative gap.
pub fn mean_reversion(price: Micros, anchor: Micros, strength: f64) -> f64 {
    if anchor <= 0 {
        return 0.0;
    }
    strength * ((anchor - price) as f64 / anchor as f64)
}

/// Apply a log-return. Only the downside is bounded; the result is at least 1.
pub fn evolve_price(price: Micros, ret: f64, max_drop_per_tick: f64) -> Micros {
    if price <= 0 {
        return 1;
    }
    let ret = ret.max(-max_drop_per_tick);
    // `as` saturates on overflow and maps NaN to 0.
    let next = (price as f64 * ret.exp()).round() as i64;
    next.max(1)
}

fn clamp_price(price: Micros, d: &MarketDynamics) -> Micros {
    price.clamp(d.min_price_micros, d.max_price_micros)
}

fn shock(rng: &dyn EntropySource, base: f64) -> f64 {
    let magnitude = rng.next_f64();
    let sign = rng.next_f64();
    signed_shock(magnitude, sign, base)
}

/// Roll the regime for this tick. Returns the regime to use.
pub fn roll_regime(current: Regime, d: &MarketDynamics, rng: &dyn EntropySource) -> Regime {
    if rng.chance(d.regime_switch_probability) {
        Regime::from_draw(rng.next_f64())
    } else {
        current
    }
}

/// Next (price, anchor) for one stock.
pub fn step_stock(
    price: Micros,
    anchor: Micros,
    regime: Regime,
    d: &MarketDynamics,
    rng: &dyn EntropySource,
) -> (Micros, Micros) {
    let mut anchor_ret = d.anchor_drift_weight * regime.drift() + d.anchor_noise_scale * normalish(rng.next_f64());
    if rng.chance(d.shock_probability * d.anchor_shock_probability_factor) {
        anchor_ret += shock(rng, d.shock_scale * d.anchor_shock_scale_factor);
    }
    let next_anchor = clamp_price(evolve_price(anchor, anchor_ret, d.max_drop_per_tick), d);

    let mut ret = regime.drift() + d.noise_scale * normalish(rng.next_f64()) + mean_reversion(price, anchor, d.mean_reversion);
    if rng.chance(d.shock_probability) {
        ret += shock(rng, d.shock_scale);
    }
    if rng.chance(d.extreme_shock_probability) {
        ret += shock(rng, d.extreme_shock_scale);
    }
    let next = clamp_price(evolve_price(price, ret, d.max_drop_per_tick), d);
    (next, next_anchor)
}

/// Regime switching and per-stock price evolution.
pub struct MarketSubsystem;

impl TickSubsystem for MarketSubsystem {
    fn name(&self) -> &'static str {
        "market"
    }

    fn update(
        &mut self,
        tx: &Tx<'_>,
        ctx: &TickContext,
        rng: &dyn EntropySource,
    ) -> SimResult<Vec<SimEvent>> {
        let d = &ctx.dynamics;
        let mut events = Vec::new();

        let current = tx.lock_market_regime(ctx.season_id)?;
        let regime = roll_regime(current, d, rng);
        if regime != current {
            tx.set_market_regime(ctx.season_id, regime)?;
            events.push(SimEvent::RegimeChanged {
                season_id: ctx.season_id,
                from: current,
                to: regime,
            });
        }

        let stocks = tx.stocks(ctx.season_id, true)?;
        for stock in &stocks {
            let (next, next_anchor) =
                step_stock(stock.current_price_micros, stock.anchor_price_micros, regime, d, rng);
            tx.set_stock_prices(stock.id, next, next_anchor)?;
            tx.append_price_point(stock.id, next)?;
        }

        log::debug!(
            "season={} market: regime={regime} stocks={}",
            ctx.season_id,
            stocks.len()
        );
        events.push(SimEvent::MarketMoved {
            season_id: ctx.season_id,
            regime,
            stocks_moved: stocks.len(),
        });
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downside_is_clamped_upside_is_not() {
        let floor = (1_000_000f64 * (-2.0f64).exp()).round() as i64;
        assert_eq!(evolve_price(1_000_000, -50.0, 2.0), floor);
        assert!(evolve_price(1_000_000, 5.0, 2.0) > 100_000_000);
    }

    #[test]
    fn evolve_never_returns_zero() {
        assert_eq!(evolve_price(0, 0.0, 2.0), 1);
        assert_eq!(evolve_price(1, -2.0, 2.0), 1);
    }

    #[test]
    fn shock_sign_follows_draw() {
        assert!(signed_shock(0.0, 0.1, 0.14) < 0.0);
        assert!((signed_shock(1.0, 0.9, 0.1) - 0.315).abs() < 1e-12);
    }

    #[test]
    fn mean_reversion_pulls_toward_anchor() {
        assert!(mean_reversion(90, 100, 0.018) > 0.0);
        assert!(mean_reversion(110, 100, 0.018) < 0.0);
        assert_eq!(mean_reversion(10, 0, 0.018), 0.0);
    }
}
