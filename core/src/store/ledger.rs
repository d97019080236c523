use super::{to_utc, LedgerRow, NewLedgerEntry, Tx};
use crate::{
    error::SimResult,
    types::{Micros, SeasonId},
};
use rusqlite::{params, Row};

fn ledger_from_row(r: &Row<'_>) -> rusqlite::Result<LedgerRow> {
    let metadata: String = r.get(4)?;
    Ok(LedgerRow {
        id: r.get(0)?,
        tx_group_id: r.get(1)?,
        account: r.get(2)?,
        delta_micros: r.get(3)?,
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
        created_at: to_utc(r.get(5)?),
    })
}

impl Tx<'_> {
    pub fn insert_ledger_entry(&self, entry: &NewLedgerEntry<'_>) -> SimResult<()> {
        self.tx.execute(
            "INSERT INTO ledger_entry (season_id, user_id, tx_group_id, account, delta_micros,
                                       metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.season_id,
                entry.user_id,
                entry.tx_group_id,
                entry.account,
                entry.delta_micros,
                serde_json::to_string(entry.metadata)?,
                self.now_ms,
            ],
        )?;
        Ok(())
    }

    /// Newest first.
    pub fn ledger_entries(
        &self,
        user_id: &str,
        season_id: SeasonId,
        limit: usize,
    ) -> SimResult<Vec<LedgerRow>> {
        let mut stmt = self.tx.prepare(
            "SELECT id, tx_group_id, account, delta_micros, metadata, created_at
             FROM ledger_entry WHERE user_id = ?1 AND season_id = ?2
             ORDER BY id DESC LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![user_id, season_id, limit as i64], ledger_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn ledger_group(&self, tx_group_id: &str) -> SimResult<Vec<LedgerRow>> {
        let mut stmt = self.tx.prepare(
            "SELECT id, tx_group_id, account, delta_micros, metadata, created_at
             FROM ledger_entry WHERE tx_group_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![tx_group_id], ledger_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Sum of the wallet-side legs (`wallet` and `fees`) for one player.
    pub fn wallet_ledger_sum(&self, user_id: &str, season_id: SeasonId) -> SimResult<Micros> {
        Ok(self.tx.query_row(
            "SELECT COALESCE(SUM(delta_micros), 0) FROM ledger_entry
             WHERE user_id = ?1 AND season_id = ?2 AND account IN ('wallet', 'fees')",
            params![user_id, season_id],
            |r| r.get(0),
        )?)
    }
}
