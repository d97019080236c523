//! Double-entry ledger.
//!
//! Every wallet balance change goes through `post_wallet_change`, which
//! updates the cached balance and appends the matching entries in the same
//! transaction. A wallet's balance therefore always equals the sum of its
//! `wallet` and `fees` entries for the season.

use crate::{
    error::SimResult,
    money,
    store::{NewLedgerEntry, Tx},
    types::{Micros, SeasonId},
};
use serde_json::{json, Value};

pub const ACCOUNT_WALLET: &str = "wallet";
pub const ACCOUNT_COUNTERPARTY: &str = "counterparty";
pub const ACCOUNT_FEES: &str = "fees";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Money enters the player's wallet.
    Inflow,
    /// Money leaves the player's wallet.
    Outflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerAction {
    StarterGrant,
    Buy,
    Sell,
    EmployeeHire,
    ProfessionalTraining,
    MachineryBuy,
    BusinessUpgrade,
    BusinessLoanDraw,
    BusinessLoanRepay,
    BusinessLoanAutopay,
    BusinessReserveDeposit,
    BusinessReserveWithdraw,
    BusinessSale,
    BusinessRevenue,
    DebtInterest,
    BusinessLoss,
    LoanLateFee,
}

impl LedgerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StarterGrant => "starter_grant",
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::EmployeeHire => "employee_hire",
            Self::ProfessionalTraining => "professional_training",
            Self::MachineryBuy => "machinery_buy",
            Self::BusinessUpgrade => "business_upgrade",
            Self::BusinessLoanDraw => "business_loan_draw",
            Self::BusinessLoanRepay => "business_loan_repay",
            Self::BusinessLoanAutopay => "business_loan_autopay",
            Self::BusinessReserveDeposit => "business_reserve_deposit",
            Self::BusinessReserveWithdraw => "business_reserve_withdraw",
            Self::BusinessSale => "business_sale",
            Self::BusinessRevenue => "business_revenue",
            Self::DebtInterest => "debt_interest",
            Self::BusinessLoss => "business_loss",
            Self::LoanLateFee => "loan_late_fee",
        }
    }

    pub fn flow(&self) -> Flow {
        match self {
            Self::StarterGrant
            | Self::Sell
            | Self::BusinessLoanDraw
            | Self::BusinessReserveWithdraw
            | Self::BusinessSale
            | Self::BusinessRevenue => Flow::Inflow,
            Self::Buy
            | Self::EmployeeHire
            | Self::ProfessionalTraining
            | Self::MachineryBuy
            | Self::BusinessUpgrade
            | Self::BusinessLoanRepay
            | Self::BusinessLoanAutopay
            | Self::BusinessReserveDeposit
            | Self::DebtInterest
            | Self::BusinessLoss
            | Self::LoanLateFee => Flow::Outflow,
        }
    }

    /// Debits with no natural counterparty post a single wallet entry.
    pub fn is_standalone(&self) -> bool {
        matches!(self, Self::BusinessLoss | Self::LoanLateFee)
    }
}

/// One balance-affecting event for a single wallet.
#[derive(Debug, Clone)]
pub struct Posting<'a> {
    pub season_id: SeasonId,
    pub user_id: &'a str,
    pub action: LedgerAction,
    /// Non-negative magnitude; the action decides the sign.
    pub amount_micros: Micros,
    /// Wallet-side fee leg, charged on top of the amount.
    pub fee_micros: Micros,
    /// Extra metadata merged next to `action` (e.g. business id, symbol).
    pub context: Option<Value>,
}

impl<'a> Posting<'a> {
    pub fn new(season_id: SeasonId, user_id: &'a str, action: LedgerAction, amount_micros: Micros) -> Self {
        Self {
            season_id,
            user_id,
            action,
            amount_micros,
            fee_micros: 0,
            context: None,
        }
    }

    pub fn with_fee(mut self, fee_micros: Micros) -> Self {
        self.fee_micros = fee_micros;
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Net change to the wallet balance.
    pub fn wallet_delta(&self) -> SimResult<Micros> {
        let signed = match self.action.flow() {
            Flow::Inflow => self.amount_micros as i128,
            Flow::Outflow => -(self.amount_micros as i128),
        };
        money::narrow(signed - self.fee_micros as i128, "wallet delta")
    }
}

/// Append the entries for `posting` under a fresh group id and return it.
/// Does not touch the cached wallet balance.
pub fn append_entries(tx: &Tx<'_>, posting: &Posting<'_>) -> SimResult<String> {
    let group_id = uuid::Uuid::new_v4().to_string();
    let mut metadata = json!({ "action": posting.action.as_str() });
    if let (Some(Value::Object(extra)), Value::Object(base)) = (&posting.context, &mut metadata) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }

    let entry = |account: &'static str, delta: Micros| NewLedgerEntry {
        season_id: posting.season_id,
        user_id: posting.user_id,
        tx_group_id: &group_id,
        account,
        delta_micros: delta,
        metadata: &metadata,
    };

    if posting.amount_micros != 0 {
        let wallet_delta = match posting.action.flow() {
            Flow::Inflow => posting.amount_micros,
            Flow::Outflow => -posting.amount_micros,
        };
        tx.insert_ledger_entry(&entry(ACCOUNT_WALLET, wallet_delta))?;
        if !posting.action.is_standalone() {
            tx.insert_ledger_entry(&entry(ACCOUNT_COUNTERPARTY, -wallet_delta))?;
        }
    }
    if posting.fee_micros != 0 {
        tx.insert_ledger_entry(&entry(ACCOUNT_FEES, -posting.fee_micros))?;
    }
    Ok(group_id)
}

/// Apply `posting` to the wallet's cached balance and append its entries.
/// Returns the new balance.
pub fn post_wallet_change(tx: &Tx<'_>, posting: &Posting<'_>) -> SimResult<Micros> {
    let wallet = tx.lock_wallet(posting.user_id, posting.season_id)?;
    let next = money::narrow(
        wallet.balance_micros as i128 + posting.wallet_delta()? as i128,
        "wallet balance",
    )?;
    tx.set_wallet_balance(posting.user_id, posting.season_id, next)?;
    append_entries(tx, posting)?;
    log::debug!(
        "ledger: {} {} {} -> balance {}",
        posting.user_id,
        posting.action.as_str(),
        posting.wallet_delta()?,
        next
    );
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outflow_with_fee_debits_both() {
        let p = Posting::new(1, "u", LedgerAction::Buy, 1_000).with_fee(2);
        assert_eq!(p.wallet_delta().unwrap(), -1_002);
    }

    #[test]
    fn inflow_nets_fee() {
        let p = Posting::new(1, "u", LedgerAction::Sell, 1_000).with_fee(2);
        assert_eq!(p.wallet_delta().unwrap(), 998);
    }

    #[test]
    fn only_loss_and_late_fee_are_standalone() {
        assert!(LedgerAction::BusinessLoss.is_standalone());
        assert!(LedgerAction::LoanLateFee.is_standalone());
        assert!(!LedgerAction::BusinessRevenue.is_standalone());
        assert_eq!(LedgerAction::BusinessLoss.flow(), Flow::Outflow);
    }
}
