//! Player-driven business operations.
//!
//! Every keyed operation claims its idempotency key first, then locks the
//! business and checks ownership before touching money.

use crate::{
    config::BusinessTuning,
    error::{SimError, SimResult},
    ledger::{self, LedgerAction, Posting},
    loans, money,
    rng::EntropySource,
    store::{BusinessRow, MachineryRow, NewStock, SaleRecord, Tx},
    types::{
        Actor, BusinessId, LoanStatus, MachineType, Micros, StockId, Strategy, UpgradeKind,
        Visibility,
    },
};
use serde::Serialize;
use serde_json::json;

const BLOCKED_NAME_FRAGMENTS: [&str; 7] = ["admin", "mod", "support", "shit", "fuck", "bitch", "nazi"];
const MAX_NAME_LEN: usize = 64;
const MAX_DISPLAY_NAME_LEN: usize = 48;
const CUSTOM_STOCK_PRICE_MICROS: Micros = 100 * money::MICROS_PER_STONKY;

#[derive(Debug, Clone, Serialize)]
pub struct HireReceipt {
    pub employee_id: i64,
    pub cost_micros: Micros,
    pub balance_micros: Micros,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingReceipt {
    pub employee_id: i64,
    pub cost_micros: Micros,
    pub revenue_per_tick_micros: Micros,
    pub risk_bps: i64,
    pub balance_micros: Micros,
}

#[derive(Debug, Clone, Serialize)]
pub struct MachineryReceipt {
    pub machine_type: MachineType,
    pub level: i64,
    pub cost_micros: Micros,
    pub output_bonus_micros: Micros,
    pub upkeep_micros: Micros,
    pub reliability_bps: i64,
    pub balance_micros: Micros,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpgradeReceipt {
    pub kind: UpgradeKind,
    pub level: i64,
    pub cost_micros: Micros,
    pub balance_micros: Micros,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReserveReceipt {
    pub cash_reserve_micros: Micros,
    pub balance_micros: Micros,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaleReceipt {
    pub business_id: BusinessId,
    pub valuation_micros: Micros,
    pub adjustment_factor: f64,
    pub loan_payoff_micros: Micros,
    pub reserve_returned_micros: Micros,
    pub payout_micros: Micros,
    pub balance_micros: Micros,
}

#[derive(Debug, Clone, Serialize)]
pub struct StockListing {
    pub stock_id: StockId,
    pub symbol: String,
    pub price_micros: Micros,
    pub listed_public: bool,
}

// ── Validation (no transaction) ────────────────────────────────────

pub fn validate_entity_name(raw: &str) -> SimResult<String> {
    let clean = raw.trim();
    if clean.is_empty() {
        return Err(SimError::Invalid("name is required".into()));
    }
    if clean.chars().count() > MAX_NAME_LEN {
        return Err(SimError::Invalid(format!("name too long (max {MAX_NAME_LEN} chars)")));
    }
    let lower = clean.to_lowercase();
    if BLOCKED_NAME_FRAGMENTS.iter().any(|f| lower.contains(f)) {
        return Err(SimError::Invalid("name contains blocked content".into()));
    }
    Ok(clean.to_string())
}

pub fn require_key(key: &str) -> SimResult<()> {
    if key.trim().is_empty() {
        return Err(SimError::Invalid("idempotency key is required".into()));
    }
    Ok(())
}

pub fn require_positive(amount: Micros, what: &str) -> SimResult<()> {
    if amount <= 0 {
        return Err(SimError::Invalid(format!("{what} must be > 0")));
    }
    Ok(())
}

/// Display name for a business's stock, truncated on a char boundary.
pub fn business_display_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return "Player Business".into();
    }
    trimmed.chars().take(MAX_DISPLAY_NAME_LEN).collect()
}

// ── Pricing ────────────────────────────────────────────────────────

/// Cost of raising an upgrade from `level` to `level + 1`.
pub fn upgrade_cost(level: i64, tuning: &BusinessTuning) -> SimResult<Micros> {
    let base = (tuning.upgrade_base_cost + level * tuning.upgrade_cost_per_level) as f64;
    let growth = 1.0 + tuning.upgrade_cost_growth * level as f64;
    money::round_to_i64(base * money::MICROS_PER_STONKY as f64 * growth, "upgrade cost")
}

/// Cost of buying machine `machine_type` at `level` (1 for a new machine).
pub fn machinery_cost(machine_type: MachineType, level: i64, tuning: &BusinessTuning) -> SimResult<Micros> {
    let base = money::stonky(machine_type.spec().cost) as f64;
    let factor = 1.0 + tuning.machinery_level_cost_step * (level - 1) as f64;
    money::round_to_i64(base * factor, "machinery cost")
}

/// Machine stats after buying `machine_type`: a fresh level-1 machine, or the
/// existing one upgraded in place.
pub fn next_machine(
    business_id: BusinessId,
    machine_type: MachineType,
    existing: Option<&MachineryRow>,
    tuning: &BusinessTuning,
) -> SimResult<MachineryRow> {
    match existing {
        None => {
            let spec = machine_type.spec();
            Ok(MachineryRow {
                id: 0,
                business_id,
                machine_type,
                level: 1,
                output_bonus_micros: money::stonky(spec.output),
                upkeep_micros: money::stonky(spec.upkeep),
                reliability_bps: spec.reliability_bps,
            })
        }
        Some(m) => Ok(MachineryRow {
            level: m.level + 1,
            output_bonus_micros: money::round_to_i64(
                m.output_bonus_micros as f64 * tuning.machinery_output_growth,
                "machinery output",
            )?,
            upkeep_micros: money::round_to_i64(
                m.upkeep_micros as f64 * tuning.machinery_upkeep_growth,
                "machinery upkeep",
            )?,
            reliability_bps: (m.reliability_bps - tuning.machinery_reliability_step_bps)
                .max(tuning.machinery_reliability_floor_bps),
            ..m.clone()
        }),
    }
}

// ── Shared helpers ─────────────────────────────────────────────────

/// Lock a business and require that `actor` owns it.
pub fn owned_business(tx: &Tx<'_>, actor: Actor<'_>, business_id: BusinessId) -> SimResult<BusinessRow> {
    let business = tx.lock_business(actor.season_id, business_id)?;
    if business.owner_user_id != actor.user_id {
        return Err(SimError::Unauthorized);
    }
    Ok(business)
}

/// Debit `cost` from the actor's wallet, allowing the balance to go as far
/// negative as the debt ceiling. Returns the new balance.
pub fn spend_with_debt(
    tx: &Tx<'_>,
    actor: Actor<'_>,
    action: LedgerAction,
    cost: Micros,
    context: serde_json::Value,
) -> SimResult<Micros> {
    let wallet = tx.lock_wallet(actor.user_id, actor.season_id)?;
    let debt_limit = money::debt_limit_from_peak(wallet.peak_net_worth_micros);
    if (wallet.balance_micros as i128 - cost as i128) < -(debt_limit as i128) {
        return Err(SimError::insufficient_funds());
    }
    let posting = Posting::new(actor.season_id, actor.user_id, action, cost).with_context(context);
    let balance = ledger::post_wallet_change(tx, &posting)?;
    tx.refresh_peak_net_worth(actor.user_id, actor.season_id)?;
    Ok(balance)
}

/// Debit `amount` only if the balance stays non-negative.
pub fn spend_from_cash(
    tx: &Tx<'_>,
    actor: Actor<'_>,
    action: LedgerAction,
    amount: Micros,
    context: serde_json::Value,
) -> SimResult<Micros> {
    let wallet = tx.lock_wallet(actor.user_id, actor.season_id)?;
    if wallet.balance_micros < amount {
        return Err(SimError::insufficient_funds());
    }
    let posting = Posting::new(actor.season_id, actor.user_id, action, amount).with_context(context);
    ledger::post_wallet_change(tx, &posting)
}

// ── Operations ─────────────────────────────────────────────────────

pub fn create_business(
    tx: &Tx<'_>,
    actor: Actor<'_>,
    name: &str,
    visibility: Visibility,
    key: &str,
    tuning: &BusinessTuning,
) -> SimResult<BusinessId> {
    tx.claim_idempotency(actor.user_id, key, "create_business")?;
    let net_worth = tx.net_worth(actor.user_id, actor.season_id)?;
    if net_worth < money::BUSINESS_UNLOCK_MICROS {
        return Err(SimError::BusinessLocked);
    }
    let id = tx.insert_business(actor.season_id, actor.user_id, name, visibility, tuning.base_revenue_micros)?;
    log::info!("business {id} '{name}' created by {}", actor.user_id);
    Ok(id)
}

/// Unkeyed: flipping visibility is naturally idempotent.
pub fn set_visibility(
    tx: &Tx<'_>,
    actor: Actor<'_>,
    business_id: BusinessId,
    visibility: Visibility,
) -> SimResult<()> {
    owned_business(tx, actor, business_id)?;
    tx.set_business_visibility(business_id, visibility)
}

pub fn set_strategy(
    tx: &Tx<'_>,
    actor: Actor<'_>,
    business_id: BusinessId,
    strategy: Strategy,
    key: &str,
) -> SimResult<()> {
    tx.claim_idempotency(actor.user_id, key, "business_strategy")?;
    owned_business(tx, actor, business_id)?;
    tx.set_business_strategy(business_id, strategy)
}

pub fn hire_employee(
    tx: &Tx<'_>,
    actor: Actor<'_>,
    business_id: BusinessId,
    candidate_id: i64,
    key: &str,
) -> SimResult<HireReceipt> {
    tx.claim_idempotency(actor.user_id, key, "hire_employee")?;
    owned_business(tx, actor, business_id)?;
    let candidate = tx.candidate(actor.season_id, candidate_id)?;
    let balance = spend_with_debt(
        tx,
        actor,
        LedgerAction::EmployeeHire,
        candidate.hire_cost_micros,
        json!({ "business_id": business_id, "candidate_id": candidate_id }),
    )?;
    let employee_id = tx.insert_employee(business_id, actor.season_id, &candidate)?;
    Ok(HireReceipt {
        employee_id,
        cost_micros: candidate.hire_cost_micros,
        balance_micros: balance,
    })
}

pub fn train_employee(
    tx: &Tx<'_>,
    actor: Actor<'_>,
    business_id: BusinessId,
    employee_id: i64,
    key: &str,
    tuning: &BusinessTuning,
) -> SimResult<TrainingReceipt> {
    tx.claim_idempotency(actor.user_id, key, "professional_training")?;
    owned_business(tx, actor, business_id)?;
    let employee = tx.lock_employee(business_id, employee_id)?;

    let revenue = employee.revenue_per_tick_micros as f64;
    let cost = money::round_to_i64(revenue * tuning.training_cost_factor, "training cost")?;
    let next_revenue = money::round_to_i64(revenue * tuning.training_revenue_factor, "employee revenue")?;
    let next_risk = (employee.risk_bps + tuning.training_risk_bps).min(tuning.risk_cap_bps);

    let balance = spend_with_debt(
        tx,
        actor,
        LedgerAction::ProfessionalTraining,
        cost,
        json!({ "business_id": business_id, "employee_id": employee_id }),
    )?;
    tx.set_employee_stats(employee_id, next_revenue, next_risk)?;
    Ok(TrainingReceipt {
        employee_id,
        cost_micros: cost,
        revenue_per_tick_micros: next_revenue,
        risk_bps: next_risk,
        balance_micros: balance,
    })
}

pub fn buy_machinery(
    tx: &Tx<'_>,
    actor: Actor<'_>,
    business_id: BusinessId,
    machine_type: MachineType,
    key: &str,
    tuning: &BusinessTuning,
) -> SimResult<MachineryReceipt> {
    tx.claim_idempotency(actor.user_id, key, "machinery_buy")?;
    owned_business(tx, actor, business_id)?;
    let existing = tx.lock_machine(business_id, machine_type)?;
    let next = next_machine(business_id, machine_type, existing.as_ref(), tuning)?;
    let cost = machinery_cost(machine_type, next.level, tuning)?;

    let balance = spend_with_debt(
        tx,
        actor,
        LedgerAction::MachineryBuy,
        cost,
        json!({ "business_id": business_id, "machine_type": machine_type.as_str(), "level": next.level }),
    )?;
    tx.upsert_machine(&next)?;
    Ok(MachineryReceipt {
        machine_type,
        level: next.level,
        cost_micros: cost,
        output_bonus_micros: next.output_bonus_micros,
        upkeep_micros: next.upkeep_micros,
        reliability_bps: next.reliability_bps,
        balance_micros: balance,
    })
}

pub fn buy_upgrade(
    tx: &Tx<'_>,
    actor: Actor<'_>,
    business_id: BusinessId,
    kind: UpgradeKind,
    key: &str,
    tuning: &BusinessTuning,
) -> SimResult<UpgradeReceipt> {
    tx.claim_idempotency(actor.user_id, key, "business_upgrade")?;
    let business = owned_business(tx, actor, business_id)?;
    let level = business.level(kind);
    let cost = upgrade_cost(level, tuning)?;
    let balance = spend_with_debt(
        tx,
        actor,
        LedgerAction::BusinessUpgrade,
        cost,
        json!({ "business_id": business_id, "upgrade": kind.as_str(), "level": level + 1 }),
    )?;
    tx.set_upgrade_level(business_id, kind, level + 1)?;
    Ok(UpgradeReceipt {
        kind,
        level: level + 1,
        cost_micros: cost,
        balance_micros: balance,
    })
}

pub fn reserve_deposit(
    tx: &Tx<'_>,
    actor: Actor<'_>,
    business_id: BusinessId,
    amount: Micros,
    key: &str,
) -> SimResult<ReserveReceipt> {
    tx.claim_idempotency(actor.user_id, key, "business_reserve_deposit")?;
    let business = owned_business(tx, actor, business_id)?;
    let balance = spend_from_cash(
        tx,
        actor,
        LedgerAction::BusinessReserveDeposit,
        amount,
        json!({ "business_id": business_id }),
    )?;
    let reserve = business
        .cash_reserve_micros
        .checked_add(amount)
        .ok_or(SimError::Overflow { what: "cash reserve" })?;
    tx.set_business_reserve(business_id, reserve)?;
    Ok(ReserveReceipt {
        cash_reserve_micros: reserve,
        balance_micros: balance,
    })
}

pub fn reserve_withdraw(
    tx: &Tx<'_>,
    actor: Actor<'_>,
    business_id: BusinessId,
    amount: Micros,
    key: &str,
) -> SimResult<ReserveReceipt> {
    tx.claim_idempotency(actor.user_id, key, "business_reserve_withdraw")?;
    let business = owned_business(tx, actor, business_id)?;
    if business.cash_reserve_micros < amount {
        return Err(SimError::Invalid("insufficient reserve".into()));
    }
    let reserve = business.cash_reserve_micros - amount;
    tx.set_business_reserve(business_id, reserve)?;
    let posting = Posting::new(actor.season_id, actor.user_id, LedgerAction::BusinessReserveWithdraw, amount)
        .with_context(json!({ "business_id": business_id }));
    let balance = ledger::post_wallet_change(tx, &posting)?;
    tx.refresh_peak_net_worth(actor.user_id, actor.season_id)?;
    Ok(ReserveReceipt {
        cash_reserve_micros: reserve,
        balance_micros: balance,
    })
}

/// Per-tick operating result used to value a business for sale.
pub fn operating_value(tx: &Tx<'_>, business: &BusinessRow) -> SimResult<(Micros, i64)> {
    let employees = tx.employees(business.id)?;
    let machinery = tx.machinery(business.id)?;
    let employee_revenue: i128 = employees.iter().map(|e| e.revenue_per_tick_micros as i128).sum();
    let output: i128 = machinery.iter().map(|m| m.output_bonus_micros as i128).sum();
    let upkeep: i128 = machinery.iter().map(|m| m.upkeep_micros as i128).sum();
    let operating = (business.base_revenue_micros as i128 + employee_revenue + output - upkeep).max(0);
    Ok((money::narrow(operating, "operating value")?, employees.len() as i64))
}

pub fn sell_business(
    tx: &Tx<'_>,
    actor: Actor<'_>,
    business_id: BusinessId,
    key: &str,
    tuning: &BusinessTuning,
    rng: &dyn EntropySource,
) -> SimResult<SaleReceipt> {
    tx.claim_idempotency(actor.user_id, key, "sell_business_to_bank")?;
    let business = owned_business(tx, actor, business_id)?;

    let (operating, headcount) = operating_value(tx, &business)?;
    let scale = tuning.sale_multiple_base + headcount / tuning.sale_employees_per_multiple.max(1);
    let factor = tuning.sale_factor_min + rng.next_f64() * tuning.sale_factor_spread;
    let valuation = money::round_to_i64(operating as f64 * scale as f64 * factor, "valuation")?;
    let loan_payoff = loans::total_outstanding(&tx.open_loans(business_id)?)?;
    let payout = (valuation - loan_payoff).max(0);

    tx.close_open_loans(business_id, LoanStatus::SoldOff)?;
    tx.insert_sale_record(&SaleRecord {
        business_id,
        season_id: actor.season_id,
        owner_user_id: actor.user_id.to_string(),
        business_name: business.name.clone(),
        valuation_micros: valuation,
        loan_payoff_micros: loan_payoff,
        payout_micros: payout,
        adjustment_factor: factor,
        reason: "sold_to_bank".into(),
    })?;

    let reserve = business.cash_reserve_micros;
    if reserve > 0 {
        let sweep = Posting::new(actor.season_id, actor.user_id, LedgerAction::BusinessReserveWithdraw, reserve)
            .with_context(json!({ "business_id": business_id, "reason": "sale" }));
        ledger::post_wallet_change(tx, &sweep)?;
    }
    let posting = Posting::new(actor.season_id, actor.user_id, LedgerAction::BusinessSale, payout)
        .with_context(json!({ "business_id": business_id, "valuation_micros": valuation }));
    let balance = ledger::post_wallet_change(tx, &posting)?;
    tx.delete_business(business_id)?;
    tx.refresh_peak_net_worth(actor.user_id, actor.season_id)?;

    log::info!(
        "business {business_id} sold by {}: valuation {valuation}, payout {payout}",
        actor.user_id
    );
    Ok(SaleReceipt {
        business_id,
        valuation_micros: valuation,
        adjustment_factor: factor,
        loan_payoff_micros: loan_payoff,
        reserve_returned_micros: reserve,
        payout_micros: payout,
        balance_micros: balance,
    })
}

// ── Player-created stocks ──────────────────────────────────────────

/// Create an unlisted stock tied to one of the actor's businesses.
pub fn create_custom_stock(
    tx: &Tx<'_>,
    actor: Actor<'_>,
    business_id: BusinessId,
    symbol: &str,
    display_name: &str,
    key: &str,
) -> SimResult<StockListing> {
    tx.claim_idempotency(actor.user_id, key, "create_stock")?;
    owned_business(tx, actor, business_id)?;
    if tx.lock_stock_by_symbol(actor.season_id, symbol)?.is_some() {
        return Err(SimError::Invalid("symbol already taken".into()));
    }
    let stock_id = tx.insert_stock(&NewStock {
        season_id: actor.season_id,
        symbol,
        display_name,
        price_micros: CUSTOM_STOCK_PRICE_MICROS,
        listed_public: false,
        created_by_user_id: Some(actor.user_id),
        business_id: Some(business_id),
    })?;
    Ok(StockListing {
        stock_id,
        symbol: symbol.to_string(),
        price_micros: CUSTOM_STOCK_PRICE_MICROS,
        listed_public: false,
    })
}

/// List the actor's own unlisted stock at `price`.
pub fn ipo_stock(
    tx: &Tx<'_>,
    actor: Actor<'_>,
    symbol: &str,
    price: Micros,
    key: &str,
) -> SimResult<StockListing> {
    tx.claim_idempotency(actor.user_id, key, "ipo_stock")?;
    let stock = tx
        .lock_stock_by_symbol(actor.season_id, symbol)?
        .ok_or(SimError::StockNotFound)?;
    if stock.listed_public {
        return Err(SimError::Invalid("stock already listed".into()));
    }
    if stock.created_by_user_id.as_deref() != Some(actor.user_id) {
        return Err(SimError::Unauthorized);
    }
    tx.list_stock(stock.id, price)?;
    tx.append_price_point(stock.id, price)?;
    if let Some(business_id) = stock.business_id {
        if tx.business(actor.season_id, business_id)?.is_some() {
            tx.set_business_listed(business_id)?;
        }
    }
    Ok(StockListing {
        stock_id: stock.id,
        symbol: stock.symbol,
        price_micros: price,
        listed_public: true,
    })
}

/// A public business lists a new stock directly.
pub fn business_ipo(
    tx: &Tx<'_>,
    actor: Actor<'_>,
    business_id: BusinessId,
    symbol: &str,
    price: Micros,
    key: &str,
) -> SimResult<StockListing> {
    tx.claim_idempotency(actor.user_id, key, "business_ipo")?;
    let business = owned_business(tx, actor, business_id)?;
    if business.visibility != Visibility::Public {
        return Err(SimError::Invalid("business must be public before ipo".into()));
    }
    if tx.lock_stock_by_symbol(actor.season_id, symbol)?.is_some() {
        return Err(SimError::Invalid("symbol already taken".into()));
    }
    let display = business_display_name(&business.name);
    let stock_id = tx.insert_stock(&NewStock {
        season_id: actor.season_id,
        symbol,
        display_name: &display,
        price_micros: price,
        listed_public: true,
        created_by_user_id: Some(actor.user_id),
        business_id: Some(business_id),
    })?;
    tx.set_business_listed(business_id)?;
    tx.append_price_point(stock_id, price)?;
    Ok(StockListing {
        stock_id,
        symbol: symbol.to_string(),
        price_micros: price,
        listed_public: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed_and_screened() {
        assert_eq!(validate_entity_name("  Rocket Corp ").unwrap(), "Rocket Corp");
        assert!(validate_entity_name("   ").is_err());
        assert!(validate_entity_name(&"x".repeat(65)).is_err());
        assert!(validate_entity_name("Support Desk").is_err());
    }

    #[test]
    fn upgrade_cost_grows_with_level() {
        let t = BusinessTuning::default();
        assert_eq!(upgrade_cost(0, &t).unwrap(), money::stonky(900));
        // (900 + 350) * 1.12
        assert_eq!(upgrade_cost(1, &t).unwrap(), money::stonky(1_400));
    }

    #[test]
    fn machinery_upgrades_in_place() {
        let t = BusinessTuning::default();
        let first = next_machine(1, MachineType::AssemblyLine, None, &t).unwrap();
        assert_eq!(first.level, 1);
        assert_eq!(machinery_cost(MachineType::AssemblyLine, 1, &t).unwrap(), money::stonky(6_500));

        let second = next_machine(1, MachineType::AssemblyLine, Some(&first), &t).unwrap();
        assert_eq!(second.level, 2);
        assert_eq!(second.output_bonus_micros, 85_400_000);
        assert_eq!(second.reliability_bps, 9_410);
        assert_eq!(machinery_cost(MachineType::AssemblyLine, 2, &t).unwrap(), 8_125_000_000);
    }

    #[test]
    fn display_name_truncates() {
        assert_eq!(business_display_name(""), "Player Business");
        assert_eq!(business_display_name(&"a".repeat(60)).len(), 48);
    }
}
