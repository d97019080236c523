use crate::{
    error::SimResult,
    event::SimEvent,
    ledger::{self, LedgerAction, Posting},
    money,
    rng::EntropySource,
    store::Tx,
    subsystem::{TickContext, TickSubsystem},
    types::Micros,
};
use serde_json::json;

/// Interest owed for one tick on a negative balance, rounded up.
pub fn debt_interest(balance: Micros, apr: f64, ticks_per_year: f64) -> SimResult<Micros> {
    if balance >= 0 || apr <= 0.0 || ticks_per_year <= 0.0 {
        return Ok(0);
    }
    let owed = (balance as f64).abs() * (apr / ticks_per_year);
    money::round_to_i64(owed.ceil(), "debt interest")
}

/// Charges interest on every wallet below zero.
pub struct InterestSubsystem;

impl TickSubsystem for InterestSubsystem {
    fn name(&self) -> &'static str {
        "interest"
    }

    fn update(
        &mut self,
        tx: &Tx<'_>,
        ctx: &TickContext,
        _rng: &dyn EntropySource,
    ) -> SimResult<Vec<SimEvent>> {
        let ticks_per_year = ctx.ticks_per_year();
        let mut wallets = 0;
        let mut total: Micros = 0;

        for wallet in tx.wallets_in_season(ctx.season_id)? {
            let interest = debt_interest(wallet.balance_micros, ctx.interest_apr, ticks_per_year)?;
            if interest <= 0 {
                continue;
            }
            let posting = Posting::new(ctx.season_id, &wallet.user_id, LedgerAction::DebtInterest, interest)
                .with_context(json!({ "apr": ctx.interest_apr }));
            ledger::post_wallet_change(tx, &posting)?;
            wallets += 1;
            total = total.saturating_add(interest);
        }

        if wallets == 0 {
            return Ok(vec![]);
        }
        log::debug!("season={} interest: wallets={wallets} total={total}", ctx.season_id);
        Ok(vec![SimEvent::DebtInterestCharged {
            season_id: ctx.season_id,
            wallets,
            total_micros: total,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_negative_balances_pay() {
        assert_eq!(debt_interest(1_000, 0.18, 105_120.0).unwrap(), 0);
        assert_eq!(debt_interest(0, 0.18, 105_120.0).unwrap(), 0);
        assert_eq!(debt_interest(-1_000, 0.0, 105_120.0).unwrap(), 0);
    }

    #[test]
    fn interest_rounds_up() {
        // 5_000 display units owed for one five-minute tick at 18% APR.
        let owed = debt_interest(-5_000_000_000, 0.18, 105_120.0).unwrap();
        assert_eq!(owed, 8_562);
        assert_eq!(debt_interest(-1, 0.18, 105_120.0).unwrap(), 1);
    }
}
