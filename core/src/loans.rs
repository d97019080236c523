//! Business loans: drawing credit against net worth and paying it back.

use crate::{
    business::{owned_business, spend_from_cash},
    config::LoanTuning,
    error::{SimError, SimResult},
    ledger::{self, LedgerAction, Posting},
    money,
    rng::EntropySource,
    store::{LoanRow, Tx},
    types::{Actor, BusinessId, LoanStatus, Micros},
};
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, Serialize)]
pub struct LoanReceipt {
    pub loan_id: i64,
    pub principal_micros: Micros,
    pub interest_bps: i64,
    pub balance_micros: Micros,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepaymentReceipt {
    pub repaid_micros: Micros,
    pub remaining_micros: Micros,
    pub loans_closed: usize,
    pub balance_micros: Micros,
}

/// Daily interest rate in bps for a fresh loan.
pub fn draw_interest_bps(tuning: &LoanTuning, u: f64) -> i64 {
    tuning.min_interest_bps + (u * tuning.interest_spread_bps).round() as i64
}

/// Sum of what the loans still owe.
pub fn total_outstanding(loans: &[LoanRow]) -> SimResult<Micros> {
    money::narrow(
        loans.iter().map(|l| l.outstanding_micros as i128).sum(),
        "loan payoff",
    )
}

/// Most a player may owe across all open loans given their net worth.
pub fn borrowing_capacity(net_worth: Micros, tuning: &LoanTuning) -> SimResult<Micros> {
    money::bps_of(net_worth.max(0), tuning.max_bps_of_net_worth)
}

pub fn take_loan(
    tx: &Tx<'_>,
    actor: Actor<'_>,
    business_id: BusinessId,
    amount: Micros,
    key: &str,
    tuning: &LoanTuning,
    rng: &dyn EntropySource,
) -> SimResult<LoanReceipt> {
    tx.claim_idempotency(actor.user_id, key, "business_loan")?;
    owned_business(tx, actor, business_id)?;

    let net_worth = tx.net_worth(actor.user_id, actor.season_id)?;
    let owed = tx.open_loan_total_for_owner(actor.season_id, actor.user_id)?;
    if owed as i128 + amount as i128 > borrowing_capacity(net_worth, tuning)? as i128 {
        return Err(SimError::Invalid("loan request exceeds borrowing capacity".into()));
    }

    let interest_bps = draw_interest_bps(tuning, rng.next_f64());
    let loan_id = tx.insert_loan(business_id, actor.season_id, actor.user_id, amount, interest_bps)?;
    let posting = Posting::new(actor.season_id, actor.user_id, LedgerAction::BusinessLoanDraw, amount)
        .with_context(json!({ "business_id": business_id, "loan_id": loan_id }));
    let balance = ledger::post_wallet_change(tx, &posting)?;
    tx.refresh_peak_net_worth(actor.user_id, actor.season_id)?;

    log::info!(
        "loan {loan_id}: business {business_id} drew {amount} at {interest_bps} bps/day"
    );
    Ok(LoanReceipt {
        loan_id,
        principal_micros: amount,
        interest_bps,
        balance_micros: balance,
    })
}

/// Pay `amount` toward a business's open loans, oldest first. Any excess
/// beyond the total outstanding stays in the wallet.
pub fn repay_loan(
    tx: &Tx<'_>,
    actor: Actor<'_>,
    business_id: BusinessId,
    amount: Micros,
    key: &str,
) -> SimResult<RepaymentReceipt> {
    tx.claim_idempotency(actor.user_id, key, "business_loan_repay")?;
    owned_business(tx, actor, business_id)?;

    let wallet = tx.lock_wallet(actor.user_id, actor.season_id)?;
    if wallet.balance_micros < amount {
        return Err(SimError::insufficient_funds());
    }
    let loans = tx.open_loans(business_id)?;
    if loans.is_empty() {
        return Err(SimError::Invalid("no open business loans".into()));
    }

    let mut left = amount;
    let mut closed = 0;
    let mut remaining: Micros = 0;
    for loan in &loans {
        let pay = left.min(loan.outstanding_micros);
        left -= pay;
        let outstanding = loan.outstanding_micros - pay;
        remaining += outstanding;
        if pay == 0 {
            continue;
        }
        if outstanding == 0 {
            tx.update_loan(loan.id, 0, 0, LoanStatus::Repaid)?;
            closed += 1;
        } else {
            tx.update_loan(loan.id, outstanding, loan.missed_ticks, LoanStatus::Open)?;
        }
    }

    let repaid = amount - left;
    let balance = spend_from_cash(
        tx,
        actor,
        LedgerAction::BusinessLoanRepay,
        repaid,
        json!({ "business_id": business_id }),
    )?;
    tx.refresh_peak_net_worth(actor.user_id, actor.season_id)?;
    Ok(RepaymentReceipt {
        repaid_micros: repaid,
        remaining_micros: remaining,
        loans_closed: closed,
        balance_micros: balance,
    })
}
