//! Runtime configuration.
//!
//! Layers, lowest precedence first: built-in defaults, an optional JSON
//! file, `STANKS_*` environment variables, then worker CLI flags (applied
//! by the worker itself). In tests, use `SimConfig::default_test()`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolatilityProfile {
    Calm,
    #[serde(alias = "mor")]
    Moderate,
    Wild,
}

impl VolatilityProfile {
    /// Lenient parse used for env and CLI input. Unknown names fall back to moderate.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "calm" => Self::Calm,
            "wild" => Self::Wild,
            _ => Self::Moderate,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calm => "calm",
            Self::Moderate => "moderate",
            Self::Wild => "wild",
        }
    }

    pub fn dynamics(&self) -> MarketDynamics {
        let base = MarketDynamics::default();
        match self {
            Self::Calm => MarketDynamics {
                noise_scale: 0.020,
                shock_probability: 0.05,
                shock_scale: 0.09,
                extreme_shock_probability: 0.008,
                extreme_shock_scale: 0.22,
                mean_reversion: 0.030,
                anchor_noise_scale: 0.012,
                regime_switch_probability: 0.04,
                max_drop_per_tick: 1.20,
                ..base
            },
            Self::Moderate => base,
            Self::Wild => MarketDynamics {
                noise_scale: 0.060,
                shock_probability: 0.18,
                shock_scale: 0.20,
                extreme_shock_probability: 0.050,
                extreme_shock_scale: 0.60,
                mean_reversion: 0.010,
                anchor_noise_scale: 0.038,
                regime_switch_probability: 0.11,
                max_drop_per_tick: 2.60,
                ..base
            },
        }
    }
}

/// Tuning bundle for one volatility profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketDynamics {
    pub noise_scale: f64,
    pub shock_probability: f64,
    pub shock_scale: f64,
    pub extreme_shock_probability: f64,
    pub extreme_shock_scale: f64,
    pub mean_reversion: f64,
    pub anchor_noise_scale: f64,
    pub regime_switch_probability: f64,
    /// Most negative log-return a single tick may apply.
    pub max_drop_per_tick: f64,
    pub anchor_drift_weight: f64,
    pub anchor_shock_probability_factor: f64,
    pub anchor_shock_scale_factor: f64,
    pub min_price_micros: i64,
    pub max_price_micros: i64,
}

impl Default for MarketDynamics {
    fn default() -> Self {
        Self {
            noise_scale: 0.038,
            shock_probability: 0.11,
            shock_scale: 0.14,
            extreme_shock_probability: 0.020,
            extreme_shock_scale: 0.35,
            mean_reversion: 0.018,
            anchor_noise_scale: 0.022,
            regime_switch_probability: 0.07,
            max_drop_per_tick: 2.00,
            anchor_drift_weight: 0.30,
            anchor_shock_probability_factor: 0.20,
            anchor_shock_scale_factor: 0.40,
            min_price_micros: 10_000,
            max_price_micros: 2_000_000_000_000_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_delay_ms: 75,
            max_delay_ms: 1_200,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (0-based): doubles, then holds at the cap.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let mut delay = self.initial_delay_ms;
        for _ in 0..attempt {
            if delay >= self.max_delay_ms {
                break;
            }
            delay = delay.saturating_mul(2);
        }
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessTuning {
    pub base_revenue_micros: i64,
    pub candidate_pool_size: usize,

    pub score_min_bps: i64,
    pub score_max_bps: i64,
    pub natural_brand_bps: i64,
    pub natural_health_bps: i64,

    pub marketing_boost_per_level: f64,
    pub rd_boost_per_level: f64,
    pub automation_output_per_level: f64,
    pub automation_upkeep_cut_per_level: f64,
    pub automation_upkeep_cut_cap: f64,

    pub full_efficiency_headcount: usize,
    pub efficiency_step: f64,
    pub efficiency_floor: f64,

    pub public_multiplier: f64,
    pub listed_multiplier: f64,
    pub aggressive_multiplier: f64,
    pub defensive_multiplier: f64,

    pub risk_penalty_weight: f64,
    pub compliance_shield_per_level: f64,
    pub compliance_shield_cap: f64,
    pub aggressive_risk_multiplier: f64,
    pub defensive_risk_multiplier: f64,

    pub upgrade_burn_per_level_micros: i64,

    pub viral_base_probability: f64,
    pub viral_per_marketing_level: f64,
    pub viral_probability_cap: f64,
    pub viral_revenue_bonus: f64,
    pub viral_brand_bps: i64,
    pub viral_health_bps: i64,
    pub crisis_base_probability: f64,
    pub crisis_risk_weight: f64,
    pub crisis_revenue_cut: f64,
    pub crisis_brand_bps: i64,
    pub crisis_health_bps: i64,
    pub drift_toward_natural_bps: i64,
    pub loss_brand_decay_bps: i64,
    pub loss_health_decay_bps: i64,

    pub burnout_probability: f64,
    pub burnout_revenue_factor: f64,
    pub burnout_risk_bps: i64,
    pub poach_brand_threshold_bps: i64,
    pub poach_probability: f64,

    /// Reserve yield per tick, in parts per 100,000.
    pub reserve_yield_base: i64,
    pub reserve_yield_per_rd_level: i64,

    pub machinery_level_cost_step: f64,
    pub machinery_output_growth: f64,
    pub machinery_upkeep_growth: f64,
    pub machinery_reliability_step_bps: i64,
    pub machinery_reliability_floor_bps: i64,

    pub training_cost_factor: f64,
    pub training_revenue_factor: f64,
    pub training_risk_bps: i64,
    pub risk_cap_bps: i64,

    pub upgrade_base_cost: i64,
    pub upgrade_cost_per_level: i64,
    pub upgrade_cost_growth: f64,

    pub sale_multiple_base: i64,
    /// Headcount that adds one to the sale multiple.
    pub sale_employees_per_multiple: i64,
    pub sale_factor_min: f64,
    pub sale_factor_spread: f64,
}

impl Default for BusinessTuning {
    fn default() -> Self {
        Self {
            base_revenue_micros: 18_000_000,
            candidate_pool_size: 24,
            score_min_bps: 1_000,
            score_max_bps: 10_000,
            natural_brand_bps: 8_000,
            natural_health_bps: 9_000,
            marketing_boost_per_level: 0.06,
            rd_boost_per_level: 0.04,
            automation_output_per_level: 0.08,
            automation_upkeep_cut_per_level: 0.05,
            automation_upkeep_cut_cap: 0.50,
            full_efficiency_headcount: 12,
            efficiency_step: 0.03,
            efficiency_floor: 0.55,
            public_multiplier: 1.03,
            listed_multiplier: 1.04,
            aggressive_multiplier: 1.12,
            defensive_multiplier: 0.92,
            risk_penalty_weight: 0.30,
            compliance_shield_per_level: 0.08,
            compliance_shield_cap: 0.40,
            aggressive_risk_multiplier: 1.35,
            defensive_risk_multiplier: 0.75,
            upgrade_burn_per_level_micros: 2_000_000,
            viral_base_probability: 0.02,
            viral_per_marketing_level: 0.01,
            viral_probability_cap: 0.12,
            viral_revenue_bonus: 0.35,
            viral_brand_bps: 400,
            viral_health_bps: 150,
            crisis_base_probability: 0.015,
            crisis_risk_weight: 0.10,
            crisis_revenue_cut: 0.25,
            crisis_brand_bps: 600,
            crisis_health_bps: 400,
            drift_toward_natural_bps: 50,
            loss_brand_decay_bps: 25,
            loss_health_decay_bps: 50,
            burnout_probability: 0.04,
            burnout_revenue_factor: 0.85,
            burnout_risk_bps: 150,
            poach_brand_threshold_bps: 3_500,
            poach_probability: 0.05,
            reserve_yield_base: 5,
            reserve_yield_per_rd_level: 2,
            machinery_level_cost_step: 0.25,
            machinery_output_growth: 1.22,
            machinery_upkeep_growth: 1.18,
            machinery_reliability_step_bps: 40,
            machinery_reliability_floor_bps: 7_000,
            training_cost_factor: 1.8,
            training_revenue_factor: 1.15,
            training_risk_bps: 120,
            risk_cap_bps: 10_000,
            upgrade_base_cost: 900,
            upgrade_cost_per_level: 350,
            upgrade_cost_growth: 0.12,
            sale_multiple_base: 14,
            sale_employees_per_multiple: 3,
            sale_factor_min: 0.82,
            sale_factor_spread: 0.40,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoanTuning {
    /// Total open outstanding may not exceed this share of net worth.
    pub max_bps_of_net_worth: i64,
    pub min_interest_bps: i64,
    pub interest_spread_bps: f64,
    pub autopay_bps: i64,
    pub autopay_min_micros: i64,
    pub late_fee_bps: i64,
    pub late_fee_min_micros: i64,
    pub repossess_after_missed: i64,
    pub liquidate_after_missed: i64,
    pub repossess_revenue_factor: f64,
    pub repossess_risk_bps: i64,
    /// Ceiling for employee risk after a repossession.
    pub risk_cap_bps: i64,
}

impl Default for LoanTuning {
    fn default() -> Self {
        Self {
            max_bps_of_net_worth: 4_500,
            min_interest_bps: 65,
            interest_spread_bps: 95.0,
            autopay_bps: 200,
            autopay_min_micros: 25_000_000,
            late_fee_bps: 100,
            late_fee_min_micros: 10_000_000,
            repossess_after_missed: 5,
            liquidate_after_missed: 9,
            repossess_revenue_factor: 0.80,
            repossess_risk_bps: 200,
            risk_cap_bps: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub db_path: String,
    pub tick_interval_secs: u64,
    /// Annualised interest charged on negative wallet balances.
    pub interest_apr: f64,
    pub volatility: VolatilityProfile,
    pub seed_defaults: bool,
    pub rng_seed: Option<u64>,
    pub busy_timeout_ms: u64,
    pub retry: RetryPolicy,
    pub business: BusinessTuning,
    pub loans: LoanTuning,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            db_path: "stanks.db".into(),
            tick_interval_secs: 300,
            interest_apr: 0.18,
            volatility: VolatilityProfile::Moderate,
            seed_defaults: true,
            rng_seed: None,
            busy_timeout_ms: 250,
            retry: RetryPolicy::default(),
            business: BusinessTuning::default(),
            loans: LoanTuning::default(),
        }
    }
}

impl SimConfig {
    /// Load a JSON config file. Missing fields keep their defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: SimConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        Ok(config)
    }

    /// Defaults, then the optional file, then the process environment.
    pub fn from_sources(path: Option<&str>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay environment values. Malformed values keep the previous layer.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("STANKS_DB_PATH").filter(|p| !p.trim().is_empty()) {
            self.db_path = path.trim().to_string();
        }
        if let Some(secs) = lookup("STANKS_MARKET_TICK_EVERY").and_then(|v| parse_secs(&v)) {
            self.tick_interval_secs = secs;
        }
        if let Some(apr) = lookup("STANKS_INTEREST_APR").and_then(|v| v.trim().parse::<f64>().ok()) {
            if apr.is_finite() && apr >= 0.0 {
                self.interest_apr = apr;
            }
        }
        if let Some(name) = lookup("STANKS_MARKET_VOLATILITY").or_else(|| lookup("VOLATILITY")) {
            self.volatility = VolatilityProfile::parse(&name);
        }
        if let Some(flag) = lookup("STANKS_STARTUP_SEED_STOCKS").and_then(|v| parse_bool(&v)) {
            self.seed_defaults = flag;
        }
        if let Some(seed) = lookup("STANKS_RNG_SEED").and_then(|v| v.trim().parse::<u64>().ok()) {
            self.rng_seed = Some(seed);
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    /// Default test config. Deterministic seed, in-memory database, short backoff.
    pub fn default_test() -> Self {
        Self {
            db_path: ":memory:".into(),
            rng_seed: Some(42),
            seed_defaults: true,
            busy_timeout_ms: 50,
            retry: RetryPolicy {
                max_attempts: 8,
                initial_delay_ms: 5,
                max_delay_ms: 40,
            },
            ..Self::default()
        }
    }
}

/// Seconds, optionally suffixed with `s` or `m`.
fn parse_secs(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let (digits, scale) = if let Some(d) = raw.strip_suffix('m') {
        (d, 60)
    } else if let Some(d) = raw.strip_suffix('s') {
        (d, 1)
    } else {
        (raw, 1)
    };
    digits.parse::<u64>().ok().filter(|n| *n > 0).map(|n| n * scale)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn env_overrides_defaults() {
        let mut cfg = SimConfig::default();
        cfg.apply_env(env(&[
            ("STANKS_MARKET_TICK_EVERY", "2m"),
            ("STANKS_INTEREST_APR", "0.25"),
            ("VOLATILITY", "wild"),
            ("STANKS_STARTUP_SEED_STOCKS", "false"),
            ("STANKS_RNG_SEED", "11"),
        ]));
        assert_eq!(cfg.tick_interval_secs, 120);
        assert!((cfg.interest_apr - 0.25).abs() < 1e-12);
        assert_eq!(cfg.volatility, VolatilityProfile::Wild);
        assert!(!cfg.seed_defaults);
        assert_eq!(cfg.rng_seed, Some(11));
    }

    #[test]
    fn malformed_env_keeps_previous_layer() {
        let mut cfg = SimConfig::default();
        cfg.apply_env(env(&[
            ("STANKS_MARKET_TICK_EVERY", "soon"),
            ("STANKS_INTEREST_APR", "-1"),
            ("STANKS_STARTUP_SEED_STOCKS", "maybe"),
        ]));
        assert_eq!(cfg.tick_interval_secs, 300);
        assert!((cfg.interest_apr - 0.18).abs() < 1e-12);
        assert!(cfg.seed_defaults);
    }

    #[test]
    fn volatility_names_are_lenient() {
        assert_eq!(VolatilityProfile::parse("CALM"), VolatilityProfile::Calm);
        assert_eq!(VolatilityProfile::parse("mor"), VolatilityProfile::Moderate);
        assert_eq!(VolatilityProfile::parse("chaotic"), VolatilityProfile::Moderate);
    }

    #[test]
    fn retry_delay_doubles_up_to_cap() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..7).map(|a| policy.delay_for(a).as_millis() as u64).collect();
        assert_eq!(delays, vec![75, 150, 300, 600, 1_200, 1_200, 1_200]);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: SimConfig = serde_json::from_str(r#"{"volatility":"mor","tick_interval_secs":60}"#).unwrap();
        assert_eq!(cfg.volatility, VolatilityProfile::Moderate);
        assert_eq!(cfg.tick_interval_secs, 60);
        assert_eq!(cfg.retry.max_attempts, 8);
    }
}
