use super::{to_utc, SeasonRow, Tx};
use crate::{error::SimResult, types::SeasonId};
use rusqlite::{params, OptionalExtension, Row};

const SEASON_COLUMNS: &str = "id, name, starts_at, ends_at, is_active";

fn season_from_row(r: &Row<'_>) -> rusqlite::Result<SeasonRow> {
    Ok(SeasonRow {
        id: r.get(0)?,
        name: r.get(1)?,
        starts_at: to_utc(r.get(2)?),
        ends_at: to_utc(r.get(3)?),
        is_active: r.get(4)?,
    })
}

impl Tx<'_> {
    /// The newest active season, if any.
    pub fn active_season(&self) -> SimResult<Option<SeasonRow>> {
        let row = self
            .tx
            .query_row(
                &format!(
                    "SELECT {SEASON_COLUMNS} FROM season
                     WHERE is_active = 1 ORDER BY id DESC LIMIT 1"
                ),
                [],
                season_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn season(&self, season_id: SeasonId) -> SimResult<Option<SeasonRow>> {
        let row = self
            .tx
            .query_row(
                &format!("SELECT {SEASON_COLUMNS} FROM season WHERE id = ?1"),
                params![season_id],
                season_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn insert_season(&self, name: &str, length: chrono::Duration) -> SimResult<SeasonRow> {
        let starts_at = self.now_ms;
        let ends_at = starts_at + length.num_milliseconds();
        self.tx.execute(
            "INSERT INTO season (name, starts_at, ends_at, is_active) VALUES (?1, ?2, ?3, 1)",
            params![name, starts_at, ends_at],
        )?;
        let id = self.tx.last_insert_rowid();
        Ok(SeasonRow {
            id,
            name: name.to_string(),
            starts_at: to_utc(starts_at),
            ends_at: to_utc(ends_at),
            is_active: true,
        })
    }
}
