//! Business economy: per-tick revenue, random business events, reserve
//! shielding and loan interest, settled to owner wallets.
//!
//! The per-business arithmetic lives in `project_business_tick`, a pure
//! function of the business's rows, its tuning and one uniform draw. The
//! subsystem loads rows, runs the projection, writes the results back and
//! then posts one ledger entry per owner.

use crate::{
    config::BusinessTuning,
    error::{SimError, SimResult},
    event::{BusinessEventKind, SimEvent},
    ledger::{self, LedgerAction, Posting},
    money,
    rng::EntropySource,
    store::{BusinessRow, BusinessTickUpdate, EmployeeRow, LoanRow, MachineryRow, Tx},
    subsystem::{TickContext, TickSubsystem},
    types::{Micros, Strategy, Visibility},
};
use serde_json::json;
use std::collections::BTreeMap;

const BPS: f64 = 10_000.0;
const RESERVE_YIELD_DENOMINATOR: i128 = 100_000;

/// Rows the projection reads for one business.
#[derive(Debug, Clone, Copy)]
pub struct BusinessSnapshot<'a> {
    pub business: &'a BusinessRow,
    /// In hiring order.
    pub employees: &'a [EmployeeRow],
    pub machinery: &'a [MachineryRow],
    /// Open loans, oldest first.
    pub open_loans: &'a [LoanRow],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanInterest {
    pub loan_id: i64,
    pub due_micros: Micros,
    pub paid_micros: Micros,
}

impl LoanInterest {
    pub fn capitalised_micros(&self) -> Micros {
        self.due_micros - self.paid_micros
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickProjection {
    pub gross_micros: Micros,
    pub risk_penalty_micros: Micros,
    pub upgrade_burn_micros: Micros,
    pub event: Option<BusinessEventKind>,
    pub loan_interest: Vec<LoanInterest>,
    pub reserve_yield_micros: Micros,
    /// What the owner's wallet receives (negative: what it pays).
    pub wallet_delta_micros: Micros,
    pub cash_reserve_micros: Micros,
    pub brand_bps: i64,
    pub operational_health_bps: i64,
}

/// Efficiency of the `index`-th employee in hiring order.
pub fn headcount_efficiency(index: usize, t: &BusinessTuning) -> f64 {
    if index < t.full_efficiency_headcount {
        return 1.0;
    }
    let beyond = (index + 1 - t.full_efficiency_headcount) as f64;
    (1.0 - t.efficiency_step * beyond).max(t.efficiency_floor)
}

fn strategy_multiplier(strategy: Strategy, t: &BusinessTuning) -> f64 {
    match strategy {
        Strategy::Aggressive => t.aggressive_multiplier,
        Strategy::Balanced => 1.0,
        Strategy::Defensive => t.defensive_multiplier,
    }
}

fn strategy_risk_multiplier(strategy: Strategy, t: &BusinessTuning) -> f64 {
    match strategy {
        Strategy::Aggressive => t.aggressive_risk_multiplier,
        Strategy::Balanced => 1.0,
        Strategy::Defensive => t.defensive_risk_multiplier,
    }
}

/// Mean employee risk in bps, 0 with no staff.
pub fn average_risk_bps(employees: &[EmployeeRow]) -> f64 {
    if employees.is_empty() {
        return 0.0;
    }
    employees.iter().map(|e| e.risk_bps as f64).sum::<f64>() / employees.len() as f64
}

/// Gross revenue before risk, burn, interest and events.
pub fn gross_revenue(s: &BusinessSnapshot<'_>, t: &BusinessTuning) -> f64 {
    let b = s.business;
    let employee_revenue: f64 = s
        .employees
        .iter()
        .enumerate()
        .map(|(i, e)| e.revenue_per_tick_micros as f64 * headcount_efficiency(i, t))
        .sum();
    let output: f64 = s.machinery.iter().map(|m| m.output_bonus_micros as f64).sum();
    let upkeep: f64 = s.machinery.iter().map(|m| m.upkeep_micros as f64).sum();

    let automation_boost = 1.0 + t.automation_output_per_level * b.automation_level as f64;
    let upkeep_cut = (t.automation_upkeep_cut_per_level * b.automation_level as f64).min(t.automation_upkeep_cut_cap);
    let core = b.base_revenue_micros as f64 + employee_revenue + output * automation_boost - upkeep * (1.0 - upkeep_cut);

    let mut gross = core
        * (1.0 + t.marketing_boost_per_level * b.marketing_level as f64)
        * (1.0 + t.rd_boost_per_level * b.rd_level as f64)
        * (b.brand_bps as f64 / BPS)
        * (b.operational_health_bps as f64 / BPS);
    if b.visibility == Visibility::Public {
        gross *= t.public_multiplier;
    }
    if b.is_listed {
        gross *= t.listed_multiplier;
    }
    gross * strategy_multiplier(b.strategy, t)
}

/// Pick at most one event from a single draw: viral first, then crisis.
pub fn roll_event(s: &BusinessSnapshot<'_>, t: &BusinessTuning, u: f64) -> Option<BusinessEventKind> {
    let viral = (t.viral_base_probability + t.viral_per_marketing_level * s.business.marketing_level as f64)
        .min(t.viral_probability_cap);
    let crisis = t.crisis_base_probability + t.crisis_risk_weight * average_risk_bps(s.employees) / BPS;
    if u < viral {
        Some(BusinessEventKind::ViralBreakout)
    } else if u < viral + crisis {
        Some(BusinessEventKind::PrCrisis)
    } else {
        None
    }
}

fn clamp_score(bps: i64, t: &BusinessTuning) -> i64 {
    bps.clamp(t.score_min_bps, t.score_max_bps)
}

fn drift_toward(current: i64, natural: i64, step: i64) -> i64 {
    if current < natural {
        (current + step).min(natural)
    } else if current > natural {
        (current - step).max(natural)
    } else {
        current
    }
}

pub fn project_business_tick(
    s: &BusinessSnapshot<'_>,
    t: &BusinessTuning,
    day_fraction: f64,
    event_draw: f64,
) -> SimResult<TickProjection> {
    let b = s.business;
    let gross = gross_revenue(s, t);

    let shield = 1.0 - (t.compliance_shield_per_level * b.compliance_level as f64).min(t.compliance_shield_cap);
    let risk_penalty = gross.max(0.0)
        * (average_risk_bps(s.employees) / BPS)
        * t.risk_penalty_weight
        * shield
        * strategy_risk_multiplier(b.strategy, t);

    let event = roll_event(s, t, event_draw);
    let event_adjustment = match event {
        Some(BusinessEventKind::ViralBreakout) => gross.max(0.0) * t.viral_revenue_bonus,
        Some(BusinessEventKind::PrCrisis) => -gross.max(0.0) * t.crisis_revenue_cut,
        _ => 0.0,
    };

    let gross_micros = money::round_to_i64(gross, "gross revenue")?;
    let risk_penalty_micros = money::round_to_i64(risk_penalty, "risk penalty")?;
    let event_micros = money::round_to_i64(event_adjustment, "event adjustment")?;
    let upgrade_burn_micros = money::narrow(
        t.upgrade_burn_per_level_micros as i128 * b.total_upgrade_levels() as i128,
        "upgrade burn",
    )?;

    let pre_interest = money::narrow(
        gross_micros as i128 - risk_penalty_micros as i128 - upgrade_burn_micros as i128 + event_micros as i128,
        "business result",
    )?;

    // Interest is paid from a positive pre-interest result, oldest loan first.
    let mut available = pre_interest.max(0);
    let mut loan_interest = Vec::with_capacity(s.open_loans.len());
    let mut interest_paid: Micros = 0;
    for loan in s.open_loans {
        let due = (loan.outstanding_micros as f64 * loan.interest_bps as f64 / BPS * day_fraction).ceil();
        let due = money::round_to_i64(due.max(0.0), "loan interest")?;
        let paid = due.min(available);
        available -= paid;
        interest_paid += paid;
        loan_interest.push(LoanInterest {
            loan_id: loan.id,
            due_micros: due,
            paid_micros: paid,
        });
    }
    let reserve_yield_micros = money::narrow(
        b.cash_reserve_micros as i128 * (t.reserve_yield_base + t.reserve_yield_per_rd_level * b.rd_level) as i128
            / RESERVE_YIELD_DENOMINATOR,
        "reserve yield",
    )?;
    let result = pre_interest
        .checked_sub(interest_paid)
        .and_then(|r| r.checked_add(reserve_yield_micros))
        .ok_or(SimError::Overflow { what: "business result" })?;

    // The yield is part of the result; the reserve only shields a loss.
    let reserve = b.cash_reserve_micros;
    let (wallet_delta_micros, cash_reserve_micros) = if result >= 0 {
        (result, reserve)
    } else {
        let covered = (-result).min(reserve);
        (result + covered, reserve - covered)
    };

    let (brand, health) = match event {
        Some(BusinessEventKind::ViralBreakout) => (
            b.brand_bps + t.viral_brand_bps,
            b.operational_health_bps + t.viral_health_bps,
        ),
        Some(BusinessEventKind::PrCrisis) => (
            b.brand_bps - t.crisis_brand_bps,
            b.operational_health_bps - t.crisis_health_bps,
        ),
        _ if result >= 0 => (
            drift_toward(b.brand_bps, t.natural_brand_bps, t.drift_toward_natural_bps),
            drift_toward(b.operational_health_bps, t.natural_health_bps, t.drift_toward_natural_bps),
        ),
        _ => (
            b.brand_bps - t.loss_brand_decay_bps,
            b.operational_health_bps - t.loss_health_decay_bps,
        ),
    };

    Ok(TickProjection {
        gross_micros,
        risk_penalty_micros,
        upgrade_burn_micros,
        event,
        loan_interest,
        reserve_yield_micros,
        wallet_delta_micros,
        cash_reserve_micros,
        brand_bps: clamp_score(brand, t),
        operational_health_bps: clamp_score(health, t),
    })
}

/// A staff change rolled after the projection, effective next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaffChange {
    /// Employee at this hiring index loses output and gains risk.
    Burnout { index: usize },
    /// Employee at this hiring index leaves.
    Poached { index: usize },
}

/// Burnout hits aggressive businesses only; poaching hits weak brands.
/// Both indices are drawn against the headcount before either applies.
pub fn roll_staff_changes(
    strategy: Strategy,
    brand_bps: i64,
    headcount: usize,
    t: &BusinessTuning,
    rng: &dyn EntropySource,
) -> Vec<StaffChange> {
    let mut changes = Vec::new();
    if headcount == 0 {
        return changes;
    }
    if strategy == Strategy::Aggressive && rng.chance(t.burnout_probability) {
        changes.push(StaffChange::Burnout { index: rng.below(headcount) });
    }
    if brand_bps < t.poach_brand_threshold_bps && rng.chance(t.poach_probability) {
        changes.push(StaffChange::Poached { index: rng.below(headcount) });
    }
    changes
}

/// Revenue and risk of an employee after burning out.
pub fn burned_out(e: &EmployeeRow, t: &BusinessTuning) -> SimResult<(Micros, i64)> {
    let revenue = money::round_to_i64(e.revenue_per_tick_micros as f64 * t.burnout_revenue_factor, "employee revenue")?;
    Ok((revenue, (e.risk_bps + t.burnout_risk_bps).min(t.risk_cap_bps)))
}

/// Per-tick business settlement for a whole season.
pub struct EconomySubsystem;

impl EconomySubsystem {
    fn apply_staff_changes(
        tx: &Tx<'_>,
        business: &BusinessRow,
        employees: &[EmployeeRow],
        changes: &[StaffChange],
        t: &BusinessTuning,
        events: &mut Vec<SimEvent>,
    ) -> SimResult<()> {
        for change in changes {
            let kind = match *change {
                StaffChange::Burnout { index } => {
                    let Some(e) = employees.get(index) else { continue };
                    let (revenue, risk) = burned_out(e, t)?;
                    tx.set_employee_stats(e.id, revenue, risk)?;
                    BusinessEventKind::Burnout
                }
                StaffChange::Poached { index } => {
                    let Some(e) = employees.get(index) else { continue };
                    tx.delete_employee(e.id)?;
                    BusinessEventKind::Poached
                }
            };
            events.push(SimEvent::BusinessEvent {
                business_id: business.id,
                owner_user_id: business.owner_user_id.clone(),
                kind,
            });
        }
        Ok(())
    }
}

impl TickSubsystem for EconomySubsystem {
    fn name(&self) -> &'static str {
        "economy"
    }

    fn update(
        &mut self,
        tx: &Tx<'_>,
        ctx: &TickContext,
        rng: &dyn EntropySource,
    ) -> SimResult<Vec<SimEvent>> {
        let t = &ctx.business;
        let mut events = Vec::new();
        let mut per_owner: BTreeMap<String, i128> = BTreeMap::new();

        let businesses = tx.businesses_in_season(ctx.season_id)?;
        for business in &businesses {
            let employees = tx.employees(business.id)?;
            let machinery = tx.machinery(business.id)?;
            let open_loans = tx.open_loans(business.id)?;
            let snapshot = BusinessSnapshot {
                business,
                employees: &employees,
                machinery: &machinery,
                open_loans: &open_loans,
            };
            let p = project_business_tick(&snapshot, t, ctx.day_fraction(), rng.next_f64())?;

            for (loan, interest) in open_loans.iter().zip(&p.loan_interest) {
                let unpaid = interest.capitalised_micros();
                if unpaid > 0 {
                    let outstanding = loan
                        .outstanding_micros
                        .checked_add(unpaid)
                        .ok_or(SimError::Overflow { what: "loan outstanding" })?;
                    tx.update_loan(loan.id, outstanding, loan.missed_ticks, loan.status)?;
                }
            }

            let last_event = p.event.map(|k| k.as_str()).unwrap_or("");
            tx.apply_business_tick(
                business.id,
                &BusinessTickUpdate {
                    brand_bps: p.brand_bps,
                    operational_health_bps: p.operational_health_bps,
                    cash_reserve_micros: p.cash_reserve_micros,
                    last_event,
                },
            )?;
            if let Some(kind) = p.event {
                events.push(SimEvent::BusinessEvent {
                    business_id: business.id,
                    owner_user_id: business.owner_user_id.clone(),
                    kind,
                });
            }
            let changes = roll_staff_changes(business.strategy, p.brand_bps, employees.len(), t, rng);
            Self::apply_staff_changes(tx, business, &employees, &changes, t, &mut events)?;

            *per_owner.entry(business.owner_user_id.clone()).or_default() += p.wallet_delta_micros as i128;
        }

        let mut credited = 0;
        let mut debited = 0;
        let mut net: i128 = 0;
        for (owner, delta) in &per_owner {
            let delta = money::narrow(*delta, "business result")?;
            net += delta as i128;
            let (action, amount) = match delta {
                d if d > 0 => {
                    credited += 1;
                    (LedgerAction::BusinessRevenue, d)
                }
                d if d < 0 => {
                    debited += 1;
                    (LedgerAction::BusinessLoss, -d)
                }
                _ => continue,
            };
            let posting = Posting::new(ctx.season_id, owner, action, amount)
                .with_context(json!({ "tick_at": ctx.tick_at }));
            ledger::post_wallet_change(tx, &posting)?;
        }

        log::debug!(
            "season={} economy: businesses={} credited={credited} debited={debited} net={net}",
            ctx.season_id,
            businesses.len()
        );
        events.push(SimEvent::BusinessResultsPosted {
            season_id: ctx.season_id,
            businesses: businesses.len(),
            players_credited: credited,
            players_debited: debited,
            net_micros: money::narrow(net, "business result")?,
        });
        Ok(events)
    }
}
