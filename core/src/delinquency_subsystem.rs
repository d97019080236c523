//! Loan delinquency: automatic loan payments and the escalation ladder for
//! businesses whose owners cannot pay.
//!
//! Each business with open loans owes `max(2% of outstanding, minimum)`,
//! capped at what is owed. A covered payment resets the missed-tick counter.
//! A miss charges a late fee and counts up; crossing the repossession
//! threshold strips machinery once, and reaching the liquidation threshold
//! closes the business with a zero payout.

use crate::{
    config::LoanTuning,
    error::SimResult,
    event::SimEvent,
    ledger::{self, LedgerAction, Posting},
    loans, money,
    rng::EntropySource,
    store::{BusinessRow, EmployeeRow, LoanRow, SaleRecord, Tx},
    subsystem::{TickContext, TickSubsystem},
    types::{LoanStatus, Micros},
};
use serde_json::json;

pub fn autopay_due(outstanding: Micros, t: &LoanTuning) -> SimResult<Micros> {
    let share = money::bps_of(outstanding, t.autopay_bps)?;
    Ok(share.max(t.autopay_min_micros).min(outstanding))
}

/// Revenue and risk of an employee left behind by a repossession.
pub fn repossessed_stats(e: &EmployeeRow, t: &LoanTuning) -> SimResult<(Micros, i64)> {
    let revenue = money::round_to_i64(
        e.revenue_per_tick_micros as f64 * t.repossess_revenue_factor,
        "employee revenue",
    )?;
    Ok((revenue, (e.risk_bps + t.repossess_risk_bps).min(t.risk_cap_bps)))
}

pub fn late_fee(outstanding: Micros, t: &LoanTuning) -> SimResult<Micros> {
    Ok(money::bps_of(outstanding, t.late_fee_bps)?.max(t.late_fee_min_micros))
}

/// What a miss at `missed` ticks (after incrementing) triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    None,
    Repossess,
    Liquidate,
}

pub fn escalation(previous: i64, missed: i64, t: &LoanTuning) -> Escalation {
    if missed >= t.liquidate_after_missed {
        Escalation::Liquidate
    } else if previous < t.repossess_after_missed && missed >= t.repossess_after_missed {
        Escalation::Repossess
    } else {
        Escalation::None
    }
}

pub struct DelinquencySubsystem;

impl DelinquencySubsystem {
    fn collect(
        tx: &Tx<'_>,
        ctx: &TickContext,
        business: &BusinessRow,
        loans: &[LoanRow],
        payment: Micros,
    ) -> SimResult<SimEvent> {
        let mut left = payment;
        for loan in loans {
            let pay = left.min(loan.outstanding_micros);
            left -= pay;
            let outstanding = loan.outstanding_micros - pay;
            let status = if outstanding == 0 { LoanStatus::Repaid } else { LoanStatus::Open };
            tx.update_loan(loan.id, outstanding, 0, status)?;
        }
        let posting = Posting::new(
            ctx.season_id,
            &business.owner_user_id,
            LedgerAction::BusinessLoanAutopay,
            payment,
        )
        .with_context(json!({ "business_id": business.id }));
        ledger::post_wallet_change(tx, &posting)?;
        Ok(SimEvent::LoanPaymentCollected {
            business_id: business.id,
            owner_user_id: business.owner_user_id.clone(),
            amount_micros: payment,
        })
    }

    fn repossess(tx: &Tx<'_>, business: &BusinessRow, t: &LoanTuning) -> SimResult<SimEvent> {
        let machines = tx.delete_machinery(business.id)?;
        for e in tx.employees(business.id)? {
            let (revenue, risk) = repossessed_stats(&e, t)?;
            tx.set_employee_stats(e.id, revenue, risk)?;
        }
        log::warn!(
            "business {} ({}): {machines} machines repossessed",
            business.id,
            business.owner_user_id
        );
        Ok(SimEvent::MachineryRepossessed {
            business_id: business.id,
            owner_user_id: business.owner_user_id.clone(),
            machines,
        })
    }

    fn liquidate(tx: &Tx<'_>, business: &BusinessRow, loans: &[LoanRow]) -> SimResult<SimEvent> {
        let payoff = loans::total_outstanding(loans)?;
        tx.insert_sale_record(&SaleRecord {
            business_id: business.id,
            season_id: business.season_id,
            owner_user_id: business.owner_user_id.clone(),
            business_name: business.name.clone(),
            valuation_micros: 0,
            loan_payoff_micros: payoff,
            payout_micros: 0,
            adjustment_factor: 0.0,
            reason: "loan_default".into(),
        })?;
        tx.close_open_loans(business.id, LoanStatus::SoldOff)?;
        tx.delete_business(business.id)?;
        log::warn!(
            "business {} ({}) liquidated after loan default",
            business.id,
            business.owner_user_id
        );
        Ok(SimEvent::BusinessLiquidated {
            business_id: business.id,
            owner_user_id: business.owner_user_id.clone(),
            name: business.name.clone(),
        })
    }
}

impl TickSubsystem for DelinquencySubsystem {
    fn name(&self) -> &'static str {
        "delinquency"
    }

    fn update(
        &mut self,
        tx: &Tx<'_>,
        ctx: &TickContext,
        _rng: &dyn EntropySource,
    ) -> SimResult<Vec<SimEvent>> {
        let t = &ctx.loans;
        let mut events = Vec::new();

        for business_id in tx.businesses_with_open_loans(ctx.season_id)? {
            let Some(business) = tx.business(ctx.season_id, business_id)? else {
                continue;
            };
            let loans = tx.open_loans(business_id)?;
            let outstanding = loans::total_outstanding(&loans)?;
            if outstanding <= 0 {
                for loan in &loans {
                    tx.update_loan(loan.id, 0, 0, LoanStatus::Repaid)?;
                }
                continue;
            }

            let payment = autopay_due(outstanding, t)?;
            let wallet = tx.lock_wallet(&business.owner_user_id, ctx.season_id)?;
            if wallet.balance_micros >= payment {
                events.push(Self::collect(tx, ctx, &business, &loans, payment)?);
                continue;
            }

            let fee = late_fee(outstanding, t)?;
            let posting = Posting::new(ctx.season_id, &business.owner_user_id, LedgerAction::LoanLateFee, fee)
                .with_context(json!({ "business_id": business_id }));
            ledger::post_wallet_change(tx, &posting)?;

            let previous = loans.iter().map(|l| l.missed_ticks).max().unwrap_or(0);
            for loan in &loans {
                tx.update_loan(loan.id, loan.outstanding_micros, loan.missed_ticks + 1, LoanStatus::Open)?;
            }
            let missed = previous + 1;
            events.push(SimEvent::LoanPaymentMissed {
                business_id,
                owner_user_id: business.owner_user_id.clone(),
                missed_ticks: missed,
                late_fee_micros: fee,
            });

            match escalation(previous, missed, t) {
                Escalation::Repossess => events.push(Self::repossess(tx, &business, t)?),
                Escalation::Liquidate => events.push(Self::liquidate(tx, &business, &loans)?),
                Escalation::None => {}
            }
        }

        log::debug!("season={} delinquency: events={}", ctx.season_id, events.len());
        Ok(events)
    }
}
