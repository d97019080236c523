//! stanks-worker: the market tick scheduler.
//!
//! Usage:
//!   stanks-worker --db stanks.db
//!   stanks-worker --config worker.json --tick-secs 60 --volatility wild
//!   stanks-worker --db run.db --seed 12345 --ticks 288 --tick-secs 1
//!   stanks-worker --run-once

use anyhow::{Context, Result};
use stanks_core::{
    config::{SimConfig, VolatilityProfile},
    context::CallContext,
    engine::{TickParams, TickSummary},
    money,
    GameService,
};
use std::env;
use std::thread;

const SUMMARY_LEADERS: usize = 10;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let config = build_config(&args)?;
    let ticks: Option<u64> = flag_value(&args, "--ticks").and_then(|v| v.parse().ok());
    let run_once = args.iter().any(|a| a == "--run-once");

    println!("stanks-worker");
    println!("  db:         {}", config.db_path);
    println!("  tick:       {}s", config.tick_interval_secs);
    println!("  volatility: {}", config.volatility.as_str());
    println!("  apr:        {}", config.interest_apr);
    println!();

    let mut service = GameService::open(config.clone())
        .with_context(|| format!("cannot open database {}", config.db_path))?;
    let ctx = CallContext::background();

    let season = service.ensure_active_season(&ctx)?;
    if config.seed_defaults {
        let report = service.seed_defaults(&ctx, season.id)?;
        if report.stocks_added > 0 || report.candidates_added > 0 {
            log::info!(
                "seeded season {}: {} stocks, {} candidates",
                season.id,
                report.stocks_added,
                report.candidates_added
            );
        }
    }

    if run_once {
        let summary = tick_active_season(&mut service, &ctx, &config)?;
        print_tick(&summary);
        return Ok(());
    }

    let mut completed = 0u64;
    loop {
        if ticks.is_some_and(|n| completed >= n) {
            break;
        }
        thread::sleep(config.tick_interval());
        match tick_active_season(&mut service, &ctx, &config) {
            Ok(summary) => {
                completed += 1;
                log::debug!("tick {completed}: {}", serde_json::to_string(&summary)?);
            }
            Err(e) => log::error!("market tick failed: {e:#}"),
        }
    }

    print_summary(&mut service, completed)?;
    Ok(())
}

fn build_config(args: &[String]) -> Result<SimConfig> {
    let mut config = SimConfig::from_sources(flag_value(args, "--config"))?;
    if let Some(db) = flag_value(args, "--db") {
        config.db_path = db.to_string();
    }
    config.tick_interval_secs = parse_arg(args, "--tick-secs", config.tick_interval_secs).max(1);
    if let Some(name) = flag_value(args, "--volatility") {
        config.volatility = VolatilityProfile::parse(name);
    }
    if let Some(seed) = flag_value(args, "--seed").and_then(|v| v.parse().ok()) {
        config.rng_seed = Some(seed);
    }
    Ok(config)
}

/// Resolve the active season and run one tick for it.
fn tick_active_season(service: &mut GameService, ctx: &CallContext, config: &SimConfig) -> Result<TickSummary> {
    let season = service
        .active_season()?
        .context("no active season")?;
    let params = TickParams::from_config(season.id, config);
    Ok(service.run_tick(ctx, &params)?)
}

fn print_tick(summary: &TickSummary) {
    let at = chrono::DateTime::from_timestamp_millis(summary.tick_at)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| summary.tick_at.to_string());
    println!(
        "tick {at} season={} regime={} stocks={} businesses={} delinquent={} liquidated={}",
        summary.season_id,
        summary.regime.map(|r| r.as_str()).unwrap_or("-"),
        summary.stocks_moved,
        summary.businesses,
        summary.delinquencies,
        summary.liquidations,
    );
}

fn print_summary(service: &mut GameService, ticks: u64) -> Result<()> {
    let Some(season) = service.active_season()? else {
        return Ok(());
    };
    println!("=== {} after {ticks} ticks ===", season.name);
    for row in service.leaderboard(season.id, SUMMARY_LEADERS)? {
        println!(
            "  {:>2}. {:<20} [{}] net worth {:>14.2}",
            row.rank,
            row.username,
            row.invite_code,
            money::micros_to_stonky(row.net_worth_micros)
        );
    }
    for stock in service.list_stocks(season.id, false)? {
        println!(
            "  {:<6} {:>12.2}",
            stock.symbol,
            money::micros_to_stonky(stock.current_price_micros)
        );
    }
    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
