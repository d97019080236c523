use super::Tx;
use crate::error::{SimError, SimResult};
use rusqlite::params;

impl Tx<'_> {
    /// Claim `(user, key)` for `action`. A second claim of the same pair fails
    /// with `DuplicateIdempotency`; rolling back the transaction releases the claim.
    pub fn claim_idempotency(&self, user_id: &str, key: &str, action: &str) -> SimResult<()> {
        let inserted = self.tx.execute(
            "INSERT INTO idempotency_key (user_id, key, action, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (user_id, key) DO NOTHING",
            params![user_id, key, action, self.now_ms],
        )?;
        if inserted == 0 {
            return Err(SimError::DuplicateIdempotency);
        }
        Ok(())
    }

    pub fn idempotency_claimed(&self, user_id: &str, key: &str) -> SimResult<bool> {
        let count: i64 = self.tx.query_row(
            "SELECT COUNT(*) FROM idempotency_key WHERE user_id = ?1 AND key = ?2",
            params![user_id, key],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }
}
