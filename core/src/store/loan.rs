use super::{to_utc, LoanRow, SaleRecord, Tx};
use crate::{
    error::SimResult,
    types::{BusinessId, LoanStatus, Micros, SeasonId},
};
use rusqlite::{params, Row};

const LOAN_COLUMNS: &str = "id, business_id, owner_user_id, principal_micros, outstanding_micros, \
     interest_bps, missed_ticks, status, created_at";

fn loan_from_row(r: &Row<'_>) -> rusqlite::Result<LoanRow> {
    Ok(LoanRow {
        id: r.get(0)?,
        business_id: r.get(1)?,
        owner_user_id: r.get(2)?,
        principal_micros: r.get(3)?,
        outstanding_micros: r.get(4)?,
        interest_bps: r.get(5)?,
        missed_ticks: r.get(6)?,
        status: r.get(7)?,
        created_at: to_utc(r.get(8)?),
    })
}

impl Tx<'_> {
    pub fn insert_loan(
        &self,
        business_id: BusinessId,
        season_id: SeasonId,
        owner_user_id: &str,
        principal: Micros,
        interest_bps: i64,
    ) -> SimResult<i64> {
        self.tx.execute(
            "INSERT INTO business_loan (business_id, season_id, owner_user_id, principal_micros,
                                        outstanding_micros, interest_bps, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6, ?7, ?7)",
            params![
                business_id,
                season_id,
                owner_user_id,
                principal,
                interest_bps,
                LoanStatus::Open,
                self.now_ms,
            ],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    /// Open loans of one business, oldest first.
    pub fn open_loans(&self, business_id: BusinessId) -> SimResult<Vec<LoanRow>> {
        let mut stmt = self.tx.prepare(&format!(
            "SELECT {LOAN_COLUMNS} FROM business_loan
             WHERE business_id = ?1 AND status = ?2 ORDER BY id"
        ))?;
        let rows = stmt
            .query_map(params![business_id, LoanStatus::Open], loan_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Every loan a business ever took, oldest first.
    pub fn loans_for_business(&self, business_id: BusinessId) -> SimResult<Vec<LoanRow>> {
        let mut stmt = self.tx.prepare(&format!(
            "SELECT {LOAN_COLUMNS} FROM business_loan WHERE business_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt
            .query_map(params![business_id], loan_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn open_loan_total_for_owner(&self, season_id: SeasonId, owner_user_id: &str) -> SimResult<Micros> {
        Ok(self.tx.query_row(
            "SELECT COALESCE(SUM(outstanding_micros), 0) FROM business_loan
             WHERE season_id = ?1 AND owner_user_id = ?2 AND status = ?3",
            params![season_id, owner_user_id, LoanStatus::Open],
            |r| r.get(0),
        )?)
    }

    /// Businesses in the season that still carry at least one open loan.
    pub fn businesses_with_open_loans(&self, season_id: SeasonId) -> SimResult<Vec<BusinessId>> {
        let mut stmt = self.tx.prepare(
            "SELECT DISTINCT l.business_id FROM business_loan l
             JOIN business b ON b.id = l.business_id
             WHERE l.season_id = ?1 AND l.status = ?2
             ORDER BY l.business_id",
        )?;
        let rows = stmt
            .query_map(params![season_id, LoanStatus::Open], |r| r.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn update_loan(
        &self,
        loan_id: i64,
        outstanding: Micros,
        missed_ticks: i64,
        status: LoanStatus,
    ) -> SimResult<()> {
        self.tx.execute(
            "UPDATE business_loan
             SET outstanding_micros = ?1, missed_ticks = ?2, status = ?3, updated_at = ?4
             WHERE id = ?5",
            params![outstanding, missed_ticks, status, self.now_ms, loan_id],
        )?;
        Ok(())
    }

    /// Close every open loan of a business with `status`, zeroing what it still owes.
    pub fn close_open_loans(&self, business_id: BusinessId, status: LoanStatus) -> SimResult<usize> {
        Ok(self.tx.execute(
            "UPDATE business_loan SET status = ?1, outstanding_micros = 0, updated_at = ?2
             WHERE business_id = ?3 AND status = ?4",
            params![status, self.now_ms, business_id, LoanStatus::Open],
        )?)
    }

    // ── Sale history ───────────────────────────────────────────

    pub fn insert_sale_record(&self, sale: &SaleRecord) -> SimResult<()> {
        self.tx.execute(
            "INSERT INTO business_sale_history (business_id, season_id, owner_user_id, business_name,
                                                valuation_micros, loan_payoff_micros, payout_micros,
                                                adjustment_factor, reason, sold_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                sale.business_id,
                sale.season_id,
                sale.owner_user_id,
                sale.business_name,
                sale.valuation_micros,
                sale.loan_payoff_micros,
                sale.payout_micros,
                sale.adjustment_factor,
                sale.reason,
                self.now_ms,
            ],
        )?;
        Ok(())
    }

    pub fn sale_history(&self, business_id: BusinessId) -> SimResult<Vec<SaleRecord>> {
        let mut stmt = self.tx.prepare(
            "SELECT business_id, season_id, owner_user_id, business_name, valuation_micros,
                    loan_payoff_micros, payout_micros, adjustment_factor, reason
             FROM business_sale_history WHERE business_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![business_id], |r| {
                Ok(SaleRecord {
                    business_id: r.get(0)?,
                    season_id: r.get(1)?,
                    owner_user_id: r.get(2)?,
                    business_name: r.get(3)?,
                    valuation_micros: r.get(4)?,
                    loan_payoff_micros: r.get(5)?,
                    payout_micros: r.get(6)?,
                    adjustment_factor: r.get(7)?,
                    reason: r.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
