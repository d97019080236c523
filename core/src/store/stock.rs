use super::{to_utc, PricePoint, StockRow, Tx};
use crate::{
    error::SimResult,
    types::{BusinessId, Micros, Regime, SeasonId, StockId},
};
use rusqlite::{params, OptionalExtension, Row};

const STOCK_COLUMNS: &str = "id, season_id, symbol, display_name, current_price_micros, \
     anchor_price_micros, listed_public, created_by_user_id, business_id";

fn stock_from_row(r: &Row<'_>) -> rusqlite::Result<StockRow> {
    Ok(StockRow {
        id: r.get(0)?,
        season_id: r.get(1)?,
        symbol: r.get(2)?,
        display_name: r.get(3)?,
        current_price_micros: r.get(4)?,
        anchor_price_micros: r.get(5)?,
        listed_public: r.get(6)?,
        created_by_user_id: r.get(7)?,
        business_id: r.get(8)?,
    })
}

/// Fields for a newly created stock.
#[derive(Debug, Clone)]
pub struct NewStock<'a> {
    pub season_id: SeasonId,
    pub symbol: &'a str,
    pub display_name: &'a str,
    pub price_micros: Micros,
    pub listed_public: bool,
    pub created_by_user_id: Option<&'a str>,
    pub business_id: Option<BusinessId>,
}

impl Tx<'_> {
    pub fn insert_stock(&self, stock: &NewStock<'_>) -> SimResult<StockId> {
        self.tx.execute(
            "INSERT INTO stock (season_id, symbol, display_name, current_price_micros,
                                anchor_price_micros, listed_public, created_by_user_id,
                                business_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6, ?7, ?8)",
            params![
                stock.season_id,
                stock.symbol,
                stock.display_name,
                stock.price_micros,
                stock.listed_public,
                stock.created_by_user_id,
                stock.business_id,
                self.now_ms,
            ],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    pub fn stock_count(&self, season_id: SeasonId) -> SimResult<i64> {
        Ok(self.tx.query_row(
            "SELECT COUNT(*) FROM stock WHERE season_id = ?1",
            params![season_id],
            |r| r.get(0),
        )?)
    }

    pub fn lock_stock_by_symbol(
        &self,
        season_id: SeasonId,
        symbol: &str,
    ) -> SimResult<Option<StockRow>> {
        let row = self
            .tx
            .query_row(
                &format!("SELECT {STOCK_COLUMNS} FROM stock WHERE season_id = ?1 AND symbol = ?2"),
                params![season_id, symbol],
                stock_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn stocks(&self, season_id: SeasonId, include_unlisted: bool) -> SimResult<Vec<StockRow>> {
        let mut stmt = self.tx.prepare(&format!(
            "SELECT {STOCK_COLUMNS} FROM stock
             WHERE season_id = ?1 AND (listed_public = 1 OR ?2)
             ORDER BY symbol"
        ))?;
        let rows = stmt
            .query_map(params![season_id, include_unlisted], stock_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn set_stock_prices(
        &self,
        stock_id: StockId,
        current: Micros,
        anchor: Micros,
    ) -> SimResult<()> {
        self.tx.execute(
            "UPDATE stock SET current_price_micros = ?1, anchor_price_micros = ?2 WHERE id = ?3",
            params![current, anchor, stock_id],
        )?;
        Ok(())
    }

    /// Make a stock tradable at `price`, resetting its anchor to the listing price.
    pub fn list_stock(&self, stock_id: StockId, price: Micros) -> SimResult<()> {
        self.tx.execute(
            "UPDATE stock
             SET listed_public = 1, current_price_micros = ?1, anchor_price_micros = ?1
             WHERE id = ?2",
            params![price, stock_id],
        )?;
        Ok(())
    }

    // ── Price history ──────────────────────────────────────────

    pub fn append_price_point(&self, stock_id: StockId, price: Micros) -> SimResult<()> {
        self.tx.execute(
            "INSERT INTO stock_price (stock_id, tick_at, price_micros) VALUES (?1, ?2, ?3)",
            params![stock_id, self.now_ms, price],
        )?;
        Ok(())
    }

    /// Newest first.
    pub fn price_history(&self, stock_id: StockId, limit: usize) -> SimResult<Vec<PricePoint>> {
        let mut stmt = self.tx.prepare(
            "SELECT tick_at, price_micros FROM stock_price
             WHERE stock_id = ?1 ORDER BY tick_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![stock_id, limit as i64], |r| {
                Ok(PricePoint {
                    tick_at: to_utc(r.get(0)?),
                    price_micros: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Market regime ──────────────────────────────────────────

    /// Read the season's regime, creating it as neutral when missing.
    /// Always writes, so a deferred transaction takes the write lock here.
    pub fn lock_market_regime(&self, season_id: SeasonId) -> SimResult<Regime> {
        self.tx.execute(
            "INSERT INTO market_state (season_id, regime, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (season_id) DO UPDATE SET updated_at = excluded.updated_at",
            params![season_id, Regime::Neutral, self.now_ms],
        )?;
        Ok(self.tx.query_row(
            "SELECT regime FROM market_state WHERE season_id = ?1",
            params![season_id],
            |r| r.get(0),
        )?)
    }

    pub fn market_regime(&self, season_id: SeasonId) -> SimResult<Option<Regime>> {
        let row = self
            .tx
            .query_row(
                "SELECT regime FROM market_state WHERE season_id = ?1",
                params![season_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(row)
    }

    pub fn set_market_regime(&self, season_id: SeasonId, regime: Regime) -> SimResult<()> {
        self.tx.execute(
            "UPDATE market_state SET regime = ?1, updated_at = ?2 WHERE season_id = ?3",
            params![regime, self.now_ms, season_id],
        )?;
        Ok(())
    }
}
