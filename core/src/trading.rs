//! Trading engine: market orders against the single authoritative price.
//!
//! Buying power is the wallet balance plus a debt ceiling derived from the
//! player's peak net worth. Orders fill completely at the current price or
//! fail; there is no book and no partial fill.

use crate::{
    error::{SimError, SimResult},
    ledger::{self, LedgerAction, Posting},
    money,
    store::{NewOrder, Tx},
    types::{Micros, SeasonId, Side, Units},
};
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: String,
    pub quantity_units: Units,
    pub idempotency_key: String,
}

impl OrderRequest {
    pub fn new(symbol: &str, side: Side, quantity_units: Units, idempotency_key: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            side: side.as_str().to_string(),
            quantity_units,
            idempotency_key: idempotency_key.to_string(),
        }
    }
}

/// An order that passed every check that needs no database access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedOrder {
    pub symbol: String,
    pub side: Side,
    pub quantity_units: Units,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderReceipt {
    pub order_id: i64,
    pub symbol: String,
    pub side: Side,
    pub quantity_units: Units,
    pub price_micros: Micros,
    pub notional_micros: Micros,
    pub fee_micros: Micros,
    pub balance_micros: Micros,
}

/// Normalise and validate caller input before any transaction opens.
pub fn validate_order(req: &OrderRequest) -> SimResult<ValidatedOrder> {
    let symbol = money::normalize_symbol(&req.symbol)?;
    let side: Side = req.side.parse()?;
    if req.quantity_units <= 0 {
        return Err(SimError::Invalid("quantity must be positive".into()));
    }
    Ok(ValidatedOrder {
        symbol,
        side,
        quantity_units: req.quantity_units,
    })
}

/// Execute a validated order inside a serializable transaction.
/// The idempotency claim is the first statement.
pub fn execute_order(
    tx: &Tx<'_>,
    season_id: SeasonId,
    user_id: &str,
    order: &ValidatedOrder,
    idempotency_key: &str,
) -> SimResult<OrderReceipt> {
    tx.claim_idempotency(user_id, idempotency_key, "place_order")?;

    let stock = tx
        .lock_stock_by_symbol(season_id, &order.symbol)?
        .ok_or(SimError::StockNotFound)?;
    if !stock.listed_public {
        return Err(SimError::Invalid("stock is not listed publicly".into()));
    }

    let price = stock.current_price_micros;
    let qty = order.quantity_units;
    let notional = money::notional(price, qty)?;
    let fee = money::order_fee(notional)?;

    let wallet = tx.lock_wallet(user_id, season_id)?;
    let debt_limit = money::debt_limit_from_peak(wallet.peak_net_worth_micros);

    let action = match order.side {
        Side::Buy => {
            let next = wallet.balance_micros as i128 - notional as i128 - fee as i128;
            if next < -(debt_limit as i128) {
                let max_buy = money::max_affordable_buy(price, wallet.balance_micros, debt_limit)?;
                return Err(SimError::InsufficientFunds {
                    max_buy: Some(max_buy),
                });
            }
            let (total_units, avg) = match tx.lock_position(user_id, season_id, stock.id)? {
                Some(held) => (
                    held.quantity_units
                        .checked_add(qty)
                        .ok_or(SimError::Overflow { what: "position quantity" })?,
                    money::weighted_average_price(
                        held.quantity_units,
                        held.avg_price_micros,
                        qty,
                        price,
                    )?,
                ),
                None => (qty, price),
            };
            tx.upsert_position(user_id, season_id, stock.id, total_units, avg)?;
            LedgerAction::Buy
        }
        Side::Sell => {
            let held = tx
                .lock_position(user_id, season_id, stock.id)?
                .filter(|p| p.quantity_units >= qty)
                .ok_or(SimError::InsufficientShares)?;
            let remaining = held.quantity_units - qty;
            if remaining == 0 {
                tx.delete_position(user_id, season_id, stock.id)?;
            } else {
                tx.upsert_position(user_id, season_id, stock.id, remaining, held.avg_price_micros)?;
            }
            LedgerAction::Sell
        }
    };

    let posting = Posting::new(season_id, user_id, action, notional)
        .with_fee(fee)
        .with_context(json!({
            "symbol": stock.symbol,
            "quantity_units": qty,
            "price_micros": price,
        }));
    let balance = ledger::post_wallet_change(tx, &posting)?;
    tx.refresh_peak_net_worth(user_id, season_id)?;

    let order_id = tx.insert_order(&NewOrder {
        user_id,
        season_id,
        stock_id: stock.id,
        side: order.side,
        quantity_units: qty,
        price_micros: price,
        notional_micros: notional,
        fee_micros: fee,
        idempotency_key,
    })?;

    log::debug!(
        "order {order_id}: {user_id} {} {} units {} @ {price}",
        order.side,
        qty,
        stock.symbol
    );

    Ok(OrderReceipt {
        order_id,
        symbol: stock.symbol,
        side: order.side,
        quantity_units: qty,
        price_micros: price,
        notional_micros: notional,
        fee_micros: fee,
        balance_micros: balance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_normalises_symbol_and_side() {
        let req = OrderRequest {
            symbol: " nimbus ".into(),
            side: "BUY".into(),
            quantity_units: 10_000,
            idempotency_key: "k".into(),
        };
        let v = validate_order(&req).unwrap();
        assert_eq!(v.symbol, "NIMBUS");
        assert_eq!(v.side, Side::Buy);
    }

    #[test]
    fn validation_rejects_bad_input() {
        let mut req = OrderRequest::new("NIMBUS", Side::Sell, 0, "k");
        assert!(matches!(validate_order(&req), Err(SimError::Invalid(_))));
        req.quantity_units = 1;
        req.side = "hold".into();
        assert!(matches!(validate_order(&req), Err(SimError::Invalid(_))));
        req.side = "sell".into();
        req.symbol = "ABC12".into();
        assert!(matches!(validate_order(&req), Err(SimError::InvalidSymbol)));
    }
}
