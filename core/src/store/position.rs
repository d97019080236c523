use super::{to_utc, NewOrder, OrderRow, PositionRow, Tx};
use crate::{
    error::SimResult,
    types::{Micros, SeasonId, StockId, Units},
};
use rusqlite::{params, OptionalExtension};

impl Tx<'_> {
    pub fn lock_position(
        &self,
        user_id: &str,
        season_id: SeasonId,
        stock_id: StockId,
    ) -> SimResult<Option<PositionRow>> {
        let row = self
            .tx
            .query_row(
                "SELECT quantity_units, avg_price_micros FROM position
                 WHERE user_id = ?1 AND season_id = ?2 AND stock_id = ?3",
                params![user_id, season_id, stock_id],
                |r| {
                    Ok(PositionRow {
                        quantity_units: r.get(0)?,
                        avg_price_micros: r.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn upsert_position(
        &self,
        user_id: &str,
        season_id: SeasonId,
        stock_id: StockId,
        quantity: Units,
        avg_price: Micros,
    ) -> SimResult<()> {
        self.tx.execute(
            "INSERT INTO position (user_id, season_id, stock_id, quantity_units, avg_price_micros, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (user_id, season_id, stock_id) DO UPDATE
             SET quantity_units = excluded.quantity_units,
                 avg_price_micros = excluded.avg_price_micros,
                 updated_at = excluded.updated_at",
            params![user_id, season_id, stock_id, quantity, avg_price, self.now_ms],
        )?;
        Ok(())
    }

    pub fn delete_position(&self, user_id: &str, season_id: SeasonId, stock_id: StockId) -> SimResult<()> {
        self.tx.execute(
            "DELETE FROM position WHERE user_id = ?1 AND season_id = ?2 AND stock_id = ?3",
            params![user_id, season_id, stock_id],
        )?;
        Ok(())
    }

    // ── Orders ─────────────────────────────────────────────────

    pub fn insert_order(&self, order: &NewOrder<'_>) -> SimResult<i64> {
        self.tx.execute(
            "INSERT INTO trade_order (user_id, season_id, stock_id, side, quantity_units,
                                      price_micros, notional_micros, fee_micros,
                                      idempotency_key, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                order.user_id,
                order.season_id,
                order.stock_id,
                order.side,
                order.quantity_units,
                order.price_micros,
                order.notional_micros,
                order.fee_micros,
                order.idempotency_key,
                self.now_ms,
            ],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    /// Newest first.
    pub fn orders(&self, user_id: &str, season_id: SeasonId, limit: usize) -> SimResult<Vec<OrderRow>> {
        let mut stmt = self.tx.prepare(
            "SELECT id, stock_id, side, quantity_units, price_micros, notional_micros,
                    fee_micros, created_at
             FROM trade_order WHERE user_id = ?1 AND season_id = ?2
             ORDER BY id DESC LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![user_id, season_id, limit as i64], |r| {
                Ok(OrderRow {
                    id: r.get(0)?,
                    stock_id: r.get(1)?,
                    side: r.get(2)?,
                    quantity_units: r.get(3)?,
                    price_micros: r.get(4)?,
                    notional_micros: r.get(5)?,
                    fee_micros: r.get(6)?,
                    created_at: to_utc(r.get(7)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
