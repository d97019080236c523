use crate::money::AffordableBuy;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("symbol must be exactly 6 uppercase letters")]
    InvalidSymbol,

    #[error("stock not found")]
    StockNotFound,

    #[error("duplicate idempotency key")]
    DuplicateIdempotency,

    #[error("insufficient funds{}", max_buy_suffix(.max_buy))]
    InsufficientFunds { max_buy: Option<AffordableBuy> },

    #[error("insufficient shares")]
    InsufficientShares,

    #[error("business feature locked: net worth below requirement")]
    BusinessLocked,

    #[error("unauthorized")]
    Unauthorized,

    #[error("transaction conflict: retry budget exhausted")]
    TransactionConflict,

    #[error("{0}")]
    Invalid(String),

    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("{what} overflow")]
    Overflow { what: &'static str },

    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    pub fn insufficient_funds() -> Self {
        Self::InsufficientFunds { max_buy: None }
    }

    /// True when the store refused a lock because another writer holds it.
    /// This is the only condition the retry coordinator retries.
    pub fn is_serialization_conflict(&self) -> bool {
        match self {
            Self::Database(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

fn max_buy_suffix(max_buy: &Option<AffordableBuy>) -> String {
    match max_buy {
        Some(m) => format!(
            ": max buy {:.4} shares (notional {:.2} + fee {:.2} stonky)",
            crate::money::units_to_shares(m.units),
            crate::money::micros_to_stonky(m.notional_micros),
            crate::money::micros_to_stonky(m.fee_micros),
        ),
        None => String::new(),
    }
}
