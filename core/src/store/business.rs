use super::{BusinessRow, CandidateRow, EmployeeRow, MachineryRow, Tx};
use crate::{
    candidates::CandidateSeed,
    error::{SimError, SimResult},
    types::{BusinessId, MachineType, Micros, SeasonId, Strategy, UpgradeKind, Visibility},
};
use rusqlite::{params, OptionalExtension, Row};

const BUSINESS_COLUMNS: &str = "id, season_id, owner_user_id, name, visibility, is_listed, strategy, \
     marketing_level, rd_level, automation_level, compliance_level, brand_bps, \
     operational_health_bps, cash_reserve_micros, base_revenue_micros, last_event";

fn business_from_row(r: &Row<'_>) -> rusqlite::Result<BusinessRow> {
    Ok(BusinessRow {
        id: r.get(0)?,
        season_id: r.get(1)?,
        owner_user_id: r.get(2)?,
        name: r.get(3)?,
        visibility: r.get(4)?,
        is_listed: r.get(5)?,
        strategy: r.get(6)?,
        marketing_level: r.get(7)?,
        rd_level: r.get(8)?,
        automation_level: r.get(9)?,
        compliance_level: r.get(10)?,
        brand_bps: r.get(11)?,
        operational_health_bps: r.get(12)?,
        cash_reserve_micros: r.get(13)?,
        base_revenue_micros: r.get(14)?,
        last_event: r.get(15)?,
    })
}

fn candidate_from_row(r: &Row<'_>) -> rusqlite::Result<CandidateRow> {
    Ok(CandidateRow {
        id: r.get(0)?,
        full_name: r.get(1)?,
        role: r.get(2)?,
        trait_name: r.get(3)?,
        hire_cost_micros: r.get(4)?,
        revenue_per_tick_micros: r.get(5)?,
        risk_bps: r.get(6)?,
    })
}

fn employee_from_row(r: &Row<'_>) -> rusqlite::Result<EmployeeRow> {
    Ok(EmployeeRow {
        id: r.get(0)?,
        business_id: r.get(1)?,
        full_name: r.get(2)?,
        role: r.get(3)?,
        trait_name: r.get(4)?,
        revenue_per_tick_micros: r.get(5)?,
        risk_bps: r.get(6)?,
    })
}

fn machinery_from_row(r: &Row<'_>) -> rusqlite::Result<MachineryRow> {
    Ok(MachineryRow {
        id: r.get(0)?,
        business_id: r.get(1)?,
        machine_type: r.get(2)?,
        level: r.get(3)?,
        output_bonus_micros: r.get(4)?,
        upkeep_micros: r.get(5)?,
        reliability_bps: r.get(6)?,
    })
}

/// Per-tick state the economy pass writes back to a business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessTickUpdate<'a> {
    pub brand_bps: i64,
    pub operational_health_bps: i64,
    pub cash_reserve_micros: Micros,
    pub last_event: &'a str,
}

impl Tx<'_> {
    // ── Businesses ─────────────────────────────────────────────

    pub fn insert_business(
        &self,
        season_id: SeasonId,
        owner_user_id: &str,
        name: &str,
        visibility: Visibility,
        base_revenue: Micros,
    ) -> SimResult<BusinessId> {
        self.tx.execute(
            "INSERT INTO business (season_id, owner_user_id, name, visibility, base_revenue_micros, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![season_id, owner_user_id, name, visibility, base_revenue, self.now_ms],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    pub fn business(&self, season_id: SeasonId, business_id: BusinessId) -> SimResult<Option<BusinessRow>> {
        let row = self
            .tx
            .query_row(
                &format!("SELECT {BUSINESS_COLUMNS} FROM business WHERE id = ?1 AND season_id = ?2"),
                params![business_id, season_id],
                business_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn lock_business(&self, season_id: SeasonId, business_id: BusinessId) -> SimResult<BusinessRow> {
        self.business(season_id, business_id)?
            .ok_or(SimError::NotFound { entity: "business" })
    }

    pub fn businesses_in_season(&self, season_id: SeasonId) -> SimResult<Vec<BusinessRow>> {
        let mut stmt = self.tx.prepare(&format!(
            "SELECT {BUSINESS_COLUMNS} FROM business WHERE season_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt
            .query_map(params![season_id], business_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn businesses_for_owner(&self, season_id: SeasonId, owner_user_id: &str) -> SimResult<Vec<BusinessRow>> {
        let mut stmt = self.tx.prepare(&format!(
            "SELECT {BUSINESS_COLUMNS} FROM business
             WHERE season_id = ?1 AND owner_user_id = ?2 ORDER BY id"
        ))?;
        let rows = stmt
            .query_map(params![season_id, owner_user_id], business_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn set_business_visibility(&self, business_id: BusinessId, visibility: Visibility) -> SimResult<()> {
        self.tx.execute(
            "UPDATE business SET visibility = ?1 WHERE id = ?2",
            params![visibility, business_id],
        )?;
        Ok(())
    }

    pub fn set_business_strategy(&self, business_id: BusinessId, strategy: Strategy) -> SimResult<()> {
        self.tx.execute(
            "UPDATE business SET strategy = ?1 WHERE id = ?2",
            params![strategy, business_id],
        )?;
        Ok(())
    }

    pub fn set_business_listed(&self, business_id: BusinessId) -> SimResult<()> {
        self.tx.execute(
            "UPDATE business SET is_listed = 1 WHERE id = ?1",
            params![business_id],
        )?;
        Ok(())
    }

    pub fn set_upgrade_level(&self, business_id: BusinessId, kind: UpgradeKind, level: i64) -> SimResult<()> {
        // Column name comes from a closed enum, never from caller input.
        self.tx.execute(
            &format!("UPDATE business SET {} = ?1 WHERE id = ?2", kind.column()),
            params![level, business_id],
        )?;
        Ok(())
    }

    pub fn set_business_reserve(&self, business_id: BusinessId, reserve: Micros) -> SimResult<()> {
        self.tx.execute(
            "UPDATE business SET cash_reserve_micros = ?1 WHERE id = ?2",
            params![reserve, business_id],
        )?;
        Ok(())
    }

    pub fn apply_business_tick(&self, business_id: BusinessId, update: &BusinessTickUpdate<'_>) -> SimResult<()> {
        self.tx.execute(
            "UPDATE business
             SET brand_bps = ?1, operational_health_bps = ?2, cash_reserve_micros = ?3, last_event = ?4
             WHERE id = ?5",
            params![
                update.brand_bps,
                update.operational_health_bps,
                update.cash_reserve_micros,
                update.last_event,
                business_id,
            ],
        )?;
        Ok(())
    }

    /// Employees and machinery cascade; loans and sale history are kept.
    pub fn delete_business(&self, business_id: BusinessId) -> SimResult<()> {
        self.tx.execute("DELETE FROM business WHERE id = ?1", params![business_id])?;
        Ok(())
    }

    // ── Candidate pool ─────────────────────────────────────────

    pub fn candidate_count(&self, season_id: SeasonId) -> SimResult<i64> {
        Ok(self.tx.query_row(
            "SELECT COUNT(*) FROM employee_candidate WHERE season_id = ?1",
            params![season_id],
            |r| r.get(0),
        )?)
    }

    pub fn insert_candidate(&self, season_id: SeasonId, c: &CandidateSeed) -> SimResult<()> {
        self.tx.execute(
            "INSERT INTO employee_candidate (season_id, full_name, role, trait, hire_cost_micros,
                                             revenue_per_tick_micros, risk_bps)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                season_id,
                c.full_name,
                c.role,
                c.trait_name,
                c.hire_cost_micros,
                c.revenue_per_tick_micros,
                c.risk_bps,
            ],
        )?;
        Ok(())
    }

    pub fn candidates(&self, season_id: SeasonId) -> SimResult<Vec<CandidateRow>> {
        let mut stmt = self.tx.prepare(
            "SELECT id, full_name, role, trait, hire_cost_micros, revenue_per_tick_micros, risk_bps
             FROM employee_candidate WHERE season_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![season_id], candidate_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn candidate(&self, season_id: SeasonId, candidate_id: i64) -> SimResult<CandidateRow> {
        let row = self
            .tx
            .query_row(
                "SELECT id, full_name, role, trait, hire_cost_micros, revenue_per_tick_micros, risk_bps
                 FROM employee_candidate WHERE id = ?1 AND season_id = ?2",
                params![candidate_id, season_id],
                candidate_from_row,
            )
            .optional()?;
        row.ok_or(SimError::NotFound { entity: "candidate" })
    }

    // ── Employees ──────────────────────────────────────────────

    pub fn insert_employee(
        &self,
        business_id: BusinessId,
        season_id: SeasonId,
        candidate: &CandidateRow,
    ) -> SimResult<i64> {
        self.tx.execute(
            "INSERT INTO business_employee (business_id, season_id, source_candidate_id, full_name,
                                            role, trait, revenue_per_tick_micros, risk_bps, hired_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                business_id,
                season_id,
                candidate.id,
                candidate.full_name,
                candidate.role,
                candidate.trait_name,
                candidate.revenue_per_tick_micros,
                candidate.risk_bps,
                self.now_ms,
            ],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    /// In hiring order.
    pub fn employees(&self, business_id: BusinessId) -> SimResult<Vec<EmployeeRow>> {
        let mut stmt = self.tx.prepare(
            "SELECT id, business_id, full_name, role, trait, revenue_per_tick_micros, risk_bps
             FROM business_employee WHERE business_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![business_id], employee_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn lock_employee(&self, business_id: BusinessId, employee_id: i64) -> SimResult<EmployeeRow> {
        let row = self
            .tx
            .query_row(
                "SELECT id, business_id, full_name, role, trait, revenue_per_tick_micros, risk_bps
                 FROM business_employee WHERE id = ?1 AND business_id = ?2",
                params![employee_id, business_id],
                employee_from_row,
            )
            .optional()?;
        row.ok_or(SimError::NotFound { entity: "employee" })
    }

    pub fn set_employee_stats(&self, employee_id: i64, revenue: Micros, risk_bps: i64) -> SimResult<()> {
        self.tx.execute(
            "UPDATE business_employee SET revenue_per_tick_micros = ?1, risk_bps = ?2 WHERE id = ?3",
            params![revenue, risk_bps, employee_id],
        )?;
        Ok(())
    }

    pub fn delete_employee(&self, employee_id: i64) -> SimResult<()> {
        self.tx.execute("DELETE FROM business_employee WHERE id = ?1", params![employee_id])?;
        Ok(())
    }

    // ── Machinery ──────────────────────────────────────────────

    pub fn machinery(&self, business_id: BusinessId) -> SimResult<Vec<MachineryRow>> {
        let mut stmt = self.tx.prepare(
            "SELECT id, business_id, machine_type, level, output_bonus_micros, upkeep_micros, reliability_bps
             FROM business_machinery WHERE business_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![business_id], machinery_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn lock_machine(&self, business_id: BusinessId, machine_type: MachineType) -> SimResult<Option<MachineryRow>> {
        let row = self
            .tx
            .query_row(
                "SELECT id, business_id, machine_type, level, output_bonus_micros, upkeep_micros, reliability_bps
                 FROM business_machinery WHERE business_id = ?1 AND machine_type = ?2",
                params![business_id, machine_type],
                machinery_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn upsert_machine(&self, row: &MachineryRow) -> SimResult<()> {
        self.tx.execute(
            "INSERT INTO business_machinery (business_id, machine_type, level, output_bonus_micros,
                                             upkeep_micros, reliability_bps, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (business_id, machine_type) DO UPDATE
             SET level = excluded.level,
                 output_bonus_micros = excluded.output_bonus_micros,
                 upkeep_micros = excluded.upkeep_micros,
                 reliability_bps = excluded.reliability_bps,
                 updated_at = excluded.updated_at",
            params![
                row.business_id,
                row.machine_type,
                row.level,
                row.output_bonus_micros,
                row.upkeep_micros,
                row.reliability_bps,
                self.now_ms,
            ],
        )?;
        Ok(())
    }

    /// Returns the number of machines removed.
    pub fn delete_machinery(&self, business_id: BusinessId) -> SimResult<usize> {
        Ok(self.tx.execute(
            "DELETE FROM business_machinery WHERE business_id = ?1",
            params![business_id],
        )?)
    }
}
