use super::{HoldingRow, LeaderboardRow, Tx, WalletRow};
use crate::{
    error::{SimError, SimResult},
    money,
    types::{Micros, SeasonId},
};
use rusqlite::{params, OptionalExtension, Row};

fn wallet_from_row(r: &Row<'_>) -> rusqlite::Result<WalletRow> {
    Ok(WalletRow {
        user_id: r.get(0)?,
        season_id: r.get(1)?,
        balance_micros: r.get(2)?,
        peak_net_worth_micros: r.get(3)?,
    })
}

impl Tx<'_> {
    // ── Players ────────────────────────────────────────────────

    /// Insert the player or refresh their username. An existing invite code is kept.
    pub fn upsert_player(&self, user_id: &str, username: &str, invite_code: &str) -> SimResult<()> {
        self.tx.execute(
            "INSERT INTO player (user_id, username, invite_code, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (user_id) DO UPDATE SET username = excluded.username",
            params![user_id, username, invite_code, self.now_ms],
        )?;
        Ok(())
    }

    pub fn player_invite_code(&self, user_id: &str) -> SimResult<Option<String>> {
        let code = self
            .tx
            .query_row(
                "SELECT invite_code FROM player WHERE user_id = ?1",
                params![user_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(code)
    }

    pub fn player_by_invite_code(&self, invite_code: &str) -> SimResult<Option<String>> {
        let user = self
            .tx
            .query_row(
                "SELECT user_id FROM player WHERE invite_code = ?1",
                params![invite_code],
                |r| r.get(0),
            )
            .optional()?;
        Ok(user)
    }

    // ── Follows ────────────────────────────────────────────────

    pub fn insert_follow(&self, follower: &str, followee: &str) -> SimResult<bool> {
        let changed = self.tx.execute(
            "INSERT INTO friend_follow (follower_user_id, followee_user_id, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (follower_user_id, followee_user_id) DO NOTHING",
            params![follower, followee, self.now_ms],
        )?;
        Ok(changed == 1)
    }

    pub fn delete_follow(&self, follower: &str, followee: &str) -> SimResult<bool> {
        let changed = self.tx.execute(
            "DELETE FROM friend_follow WHERE follower_user_id = ?1 AND followee_user_id = ?2",
            params![follower, followee],
        )?;
        Ok(changed == 1)
    }

    pub fn followees(&self, follower: &str) -> SimResult<Vec<String>> {
        let mut stmt = self.tx.prepare(
            "SELECT followee_user_id FROM friend_follow
             WHERE follower_user_id = ?1 ORDER BY followee_user_id",
        )?;
        let rows = stmt
            .query_map(params![follower], |r| r.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Wallets ────────────────────────────────────────────────

    /// Create the wallet at `balance` unless it already exists.
    /// Returns true when a new wallet was created.
    pub fn insert_wallet_if_missing(
        &self,
        user_id: &str,
        season_id: SeasonId,
        balance: Micros,
    ) -> SimResult<bool> {
        let changed = self.tx.execute(
            "INSERT INTO wallet (user_id, season_id, balance_micros, peak_net_worth_micros, updated_at)
             VALUES (?1, ?2, ?3, ?3, ?4)
             ON CONFLICT (user_id, season_id) DO NOTHING",
            params![user_id, season_id, balance, self.now_ms],
        )?;
        Ok(changed == 1)
    }

    pub fn wallet(&self, user_id: &str, season_id: SeasonId) -> SimResult<Option<WalletRow>> {
        let row = self
            .tx
            .query_row(
                "SELECT user_id, season_id, balance_micros, peak_net_worth_micros
                 FROM wallet WHERE user_id = ?1 AND season_id = ?2",
                params![user_id, season_id],
                wallet_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn lock_wallet(&self, user_id: &str, season_id: SeasonId) -> SimResult<WalletRow> {
        self.wallet(user_id, season_id)?
            .ok_or(SimError::NotFound { entity: "wallet" })
    }

    pub fn set_wallet_balance(
        &self,
        user_id: &str,
        season_id: SeasonId,
        balance: Micros,
    ) -> SimResult<()> {
        self.tx.execute(
            "UPDATE wallet SET balance_micros = ?1, updated_at = ?2
             WHERE user_id = ?3 AND season_id = ?4",
            params![balance, self.now_ms, user_id, season_id],
        )?;
        Ok(())
    }

    pub fn wallets_in_season(&self, season_id: SeasonId) -> SimResult<Vec<WalletRow>> {
        let mut stmt = self.tx.prepare(
            "SELECT user_id, season_id, balance_micros, peak_net_worth_micros
             FROM wallet WHERE season_id = ?1 ORDER BY user_id",
        )?;
        let rows = stmt
            .query_map(params![season_id], wallet_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Net worth ──────────────────────────────────────────────

    /// Mark-to-market value of every stock position the player holds.
    pub fn holdings_value(&self, user_id: &str, season_id: SeasonId) -> SimResult<Micros> {
        let mut total: i128 = 0;
        for h in self.holdings(user_id, season_id)? {
            total += money::notional(h.current_price_micros, h.quantity_units)? as i128;
        }
        money::narrow(total, "holdings value")
    }

    pub fn net_worth(&self, user_id: &str, season_id: SeasonId) -> SimResult<Micros> {
        let wallet = self.lock_wallet(user_id, season_id)?;
        let holdings = self.holdings_value(user_id, season_id)?;
        money::narrow(
            wallet.balance_micros as i128 + holdings as i128,
            "net worth",
        )
    }

    /// Raise the wallet's high-water mark to its current net worth if higher.
    pub fn refresh_peak_net_worth(&self, user_id: &str, season_id: SeasonId) -> SimResult<Micros> {
        let net_worth = self.net_worth(user_id, season_id)?;
        self.tx.execute(
            "UPDATE wallet
             SET peak_net_worth_micros = MAX(peak_net_worth_micros, ?1), updated_at = ?2
             WHERE user_id = ?3 AND season_id = ?4",
            params![net_worth, self.now_ms, user_id, season_id],
        )?;
        Ok(net_worth)
    }

    pub fn leaderboard(&self, season_id: SeasonId, limit: usize) -> SimResult<Vec<LeaderboardRow>> {
        self.ranked_wallets(season_id, None, limit)
    }

    /// The viewer plus everyone they follow, ranked the same way.
    pub fn friends_leaderboard(&self, season_id: SeasonId, viewer: &str, limit: usize) -> SimResult<Vec<LeaderboardRow>> {
        self.ranked_wallets(season_id, Some(viewer), limit)
    }

    fn ranked_wallets(&self, season_id: SeasonId, viewer: Option<&str>, limit: usize) -> SimResult<Vec<LeaderboardRow>> {
        let mut stmt = self.tx.prepare(
            "SELECT w.user_id, COALESCE(p.username, w.user_id), COALESCE(p.invite_code, ''), w.balance_micros
             FROM wallet w LEFT JOIN player p ON p.user_id = w.user_id
             WHERE w.season_id = ?1
               AND (?2 IS NULL
                    OR w.user_id = ?2
                    OR w.user_id IN (SELECT followee_user_id FROM friend_follow WHERE follower_user_id = ?2))",
        )?;
        let wallets = stmt
            .query_map(params![season_id, viewer], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut rows = Vec::with_capacity(wallets.len());
        for (user_id, username, invite_code, balance) in wallets {
            let holdings = self.holdings_value(&user_id, season_id)?;
            let net_worth = money::narrow(balance as i128 + holdings as i128, "net worth")?;
            rows.push(LeaderboardRow {
                rank: 0,
                user_id,
                username,
                invite_code,
                balance_micros: balance,
                net_worth_micros: net_worth,
            });
        }
        rows.sort_by(|a, b| {
            b.net_worth_micros
                .cmp(&a.net_worth_micros)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        rows.truncate(limit);
        for (i, row) in rows.iter_mut().enumerate() {
            row.rank = i + 1;
        }
        Ok(rows)
    }

    pub fn holdings(&self, user_id: &str, season_id: SeasonId) -> SimResult<Vec<HoldingRow>> {
        let mut stmt = self.tx.prepare(
            "SELECT p.stock_id, s.symbol, p.quantity_units, p.avg_price_micros, s.current_price_micros
             FROM position p JOIN stock s ON s.id = p.stock_id
             WHERE p.user_id = ?1 AND p.season_id = ?2
             ORDER BY s.symbol",
        )?;
        let rows = stmt
            .query_map(params![user_id, season_id], |r| {
                Ok(HoldingRow {
                    stock_id: r.get(0)?,
                    symbol: r.get(1)?,
                    quantity_units: r.get(2)?,
                    avg_price_micros: r.get(3)?,
                    current_price_micros: r.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
