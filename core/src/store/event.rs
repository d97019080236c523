use super::Tx;
use crate::{error::SimResult, event::EventLogEntry, types::SeasonId};
use rusqlite::params;

impl Tx<'_> {
    pub fn append_event(&self, entry: &EventLogEntry) -> SimResult<()> {
        self.tx.execute(
            "INSERT INTO event_log (season_id, tick_at, subsystem, event_type, payload)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.season_id,
                entry.tick_at,
                entry.subsystem,
                entry.event_type,
                entry.payload,
            ],
        )?;
        Ok(())
    }

    /// Oldest first.
    pub fn events_for_season(&self, season_id: SeasonId) -> SimResult<Vec<EventLogEntry>> {
        let mut stmt = self.tx.prepare(
            "SELECT id, season_id, tick_at, subsystem, event_type, payload
             FROM event_log WHERE season_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![season_id], |row| {
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    season_id: row.get(1)?,
                    tick_at: row.get(2)?,
                    subsystem: row.get(3)?,
                    event_type: row.get(4)?,
                    payload: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self, season_id: SeasonId, event_type: &str) -> SimResult<i64> {
        Ok(self.tx.query_row(
            "SELECT COUNT(*) FROM event_log WHERE season_id = ?1 AND event_type = ?2",
            params![season_id, event_type],
            |r| r.get(0),
        )?)
    }
}
