//! Core matching engine: a pure function over the price-quantity book.
//!
//! Given identical book state and an identical incoming order, `process_order`
//! always produces the same trades and the same final order state. The only
//! wall-clock input is the trade timestamp, which plays no part in the
//! matching decision itself.

use crate::domain::{Order, PriceQuantityBook, Trade};
use crate::result::{CancelOutcome, MatchOutcome};
use chrono::Utc;
use common::{OrderStatus, Side};
use tracing::{debug, info};
use uuid::Uuid;

pub struct MatchingEngine {
    book: PriceQuantityBook,
}

impl Default for MatchingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchingEngine {
    pub fn new() -> Self {
        Self { book: PriceQuantityBook::new() }
    }

    /// Builds an engine around a book already reconstructed by `RecoveryManager`.
    pub fn from_book(book: PriceQuantityBook) -> Self {
        Self { book }
    }

    pub fn book(&self) -> &PriceQuantityBook {
        &self.book
    }

    pub fn book_mut(&mut self) -> &mut PriceQuantityBook {
        &mut self.book
    }

    /// Runs `order` through the matching loop and rests any remainder.
    pub fn process_order(&mut self, order: Order) -> MatchOutcome {
        info!(order_id = %order.id, side = %order.side, price = order.price, qty = order.remaining_qty, "matching order");
        match order.side {
            Side::Buy => self.match_buy(order),
            Side::Sell => self.match_sell(order),
        }
    }

    pub fn cancel_order(&mut self, order_id: &str) -> CancelOutcome {
        match self.book.cancel(order_id) {
            Some(order) => CancelOutcome::cancelled(order),
            None => CancelOutcome::not_found(),
        }
    }

    fn match_buy(&mut self, mut incoming: Order) -> MatchOutcome {
        // Collect match data under a scoped borrow of the book, then build
        // Trade objects afterward; this keeps the mutation of the resting
        // side and the allocation of new Trade structs from conflicting.
        let mut matches: Vec<(String, i64, i64)> = Vec::new();
        loop {
            if incoming.remaining_qty == 0 {
                break;
            }
            let Some((best_ask_price, head)) = self.book.best_ask() else { break };
            if incoming.price < best_ask_price {
                break;
            }
            let head_id = head.id.clone();
            let head_remaining = head.remaining_qty;
            let fill_qty = incoming.remaining_qty.min(head_remaining);
            let now = Utc::now();

            self.book.update_after_trade(&head_id, fill_qty, best_ask_price, now);
            incoming.apply_fill(fill_qty, best_ask_price, now);
            matches.push((head_id, best_ask_price, fill_qty));
        }

        let trades = build_trades(&matches, &incoming, Side::Buy);
        finalize(&mut incoming, &mut self.book);
        MatchOutcome { trades, order: incoming }
    }

    fn match_sell(&mut self, mut incoming: Order) -> MatchOutcome {
        let mut matches: Vec<(String, i64, i64)> = Vec::new();
        loop {
            if incoming.remaining_qty == 0 {
                break;
            }
            let Some((best_bid_price, head)) = self.book.best_bid() else { break };
            if incoming.price > best_bid_price {
                break;
            }
            let head_id = head.id.clone();
            let head_remaining = head.remaining_qty;
            let fill_qty = incoming.remaining_qty.min(head_remaining);
            let now = Utc::now();

            self.book.update_after_trade(&head_id, fill_qty, best_bid_price, now);
            incoming.apply_fill(fill_qty, best_bid_price, now);
            matches.push((head_id, best_bid_price, fill_qty));
        }

        let trades = build_trades(&matches, &incoming, Side::Sell);
        finalize(&mut incoming, &mut self.book);
        MatchOutcome { trades, order: incoming }
    }
}

/// Builds Trade records from collected (resting_id, price, qty) tuples, in
/// emission order. The trade price is always the resting order's price.
fn build_trades(matches: &[(String, i64, i64)], incoming: &Order, incoming_side: Side) -> Vec<Trade> {
    matches
        .iter()
        .map(|(resting_id, price, qty)| {
            let (bid_order_id, ask_order_id) = match incoming_side {
                Side::Buy => (incoming.id.clone(), resting_id.clone()),
                Side::Sell => (resting_id.clone(), incoming.id.clone()),
            };
            let trade = Trade {
                id: Uuid::new_v4().to_string(),
                timestamp: Utc::now(),
                price: *price,
                qty: *qty,
                bid_order_id,
                ask_order_id,
            };
            debug!(trade_id = %trade.id, price = trade.price, qty = trade.qty, "trade executed");
            trade
        })
        .collect()
}

/// After the match loop: a remainder that wasn't cancelled rests in the
/// book, marked OPEN if untouched or PARTIALLY_FILLED if it took fills.
fn finalize(order: &mut Order, book: &mut PriceQuantityBook) {
    if order.remaining_qty > 0 && order.status != OrderStatus::Cancelled {
        order.status = if order.traded_qty > 0 {
            OrderStatus::PartiallyFilled
        } else {
            OrderStatus::Open
        };
        book.insert(order.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn new_order(id: &str, side: Side, price: i64, qty: i64) -> Order {
        Order::new(id.to_string(), side, price, qty, Utc::now())
    }

    #[test]
    fn resting_sell_then_full_fill_buy() {
        let mut engine = MatchingEngine::new();
        let sell = engine.process_order(new_order("A", Side::Sell, 12345, 10));
        assert!(sell.trades.is_empty());

        let buy = engine.process_order(new_order("B", Side::Buy, 12500, 10));
        assert_eq!(buy.trades.len(), 1);
        let trade = &buy.trades[0];
        assert_eq!(trade.price, 12345);
        assert_eq!(trade.qty, 10);
        assert_eq!(trade.bid_order_id, "B");
        assert_eq!(trade.ask_order_id, "A");
        assert_eq!(buy.order.status, OrderStatus::Filled);
        assert!(engine.book().is_empty());
    }

    #[test]
    fn partial_fill_then_rest() {
        let mut engine = MatchingEngine::new();
        engine.process_order(new_order("A", Side::Sell, 10000, 5));
        let buy = engine.process_order(new_order("B", Side::Buy, 10000, 8));
        assert_eq!(buy.trades.len(), 1);
        assert_eq!(buy.trades[0].qty, 5);
        assert_eq!(buy.order.status, OrderStatus::PartiallyFilled);
        assert_eq!(buy.order.remaining_qty, 3);
        let (price, head) = engine.book().best_bid().unwrap();
        assert_eq!(price, 10000);
        assert_eq!(head.remaining_qty, 3);
    }

    #[test]
    fn no_cross_rests_both_sides() {
        let mut engine = MatchingEngine::new();
        engine.process_order(new_order("A", Side::Sell, 11000, 5));
        let buy = engine.process_order(new_order("B", Side::Buy, 10900, 5));
        assert!(buy.trades.is_empty());
        assert_eq!(buy.order.status, OrderStatus::Open);
        let snap = engine.book().snapshot(5, Utc::now());
        assert_eq!(snap.bids, vec![(109.0, 5)]);
        assert_eq!(snap.asks, vec![(110.0, 5)]);
    }

    #[test]
    fn partial_fill_two_resting_asks_same_price() {
        let mut engine = MatchingEngine::new();
        engine.process_order(new_order("A", Side::Sell, 100, 4));
        engine.process_order(new_order("C", Side::Sell, 100, 7));
        let buy = engine.process_order(new_order("B", Side::Buy, 100, 10));
        assert_eq!(buy.trades.len(), 2);
        assert_eq!(buy.trades[0].qty, 4);
        assert_eq!(buy.trades[0].ask_order_id, "A");
        assert_eq!(buy.trades[1].qty, 6);
        assert_eq!(buy.trades[1].ask_order_id, "C");
        assert_eq!(buy.order.status, OrderStatus::Filled);
        let (_, head) = engine.book().best_ask().unwrap();
        assert_eq!(head.id, "C");
        assert_eq!(head.remaining_qty, 1);
    }

    #[test]
    fn multi_level_sweep_uses_each_resting_price() {
        let mut engine = MatchingEngine::new();
        engine.process_order(new_order("A", Side::Sell, 100, 5));
        engine.process_order(new_order("B", Side::Sell, 105, 5));
        let buy = engine.process_order(new_order("C", Side::Buy, 110, 10));
        assert_eq!(buy.trades.len(), 2);
        assert_eq!(buy.trades[0].price, 100);
        assert_eq!(buy.trades[1].price, 105);
    }

    #[test]
    fn exact_equal_price_crosses() {
        let mut engine = MatchingEngine::new();
        engine.process_order(new_order("A", Side::Sell, 100, 5));
        let buy = engine.process_order(new_order("B", Side::Buy, 100, 5));
        assert_eq!(buy.trades.len(), 1);
        assert_eq!(buy.trades[0].price, 100);
    }

    #[test]
    fn cancel_during_partial_fill() {
        let mut engine = MatchingEngine::new();
        engine.process_order(new_order("A", Side::Sell, 10000, 10));
        let buy = engine.process_order(new_order("B", Side::Buy, 10000, 3));
        assert_eq!(buy.trades[0].qty, 3);

        let cancel = engine.cancel_order("A");
        assert!(cancel.cancelled);
        assert_eq!(cancel.order.unwrap().status, OrderStatus::Cancelled);
        assert!(engine.book().best_ask().is_none());
    }

    #[test]
    fn cancel_unknown_id_is_noop() {
        let mut engine = MatchingEngine::new();
        let cancel = engine.cancel_order("missing");
        assert!(!cancel.cancelled);
        assert!(cancel.order.is_none());
    }

    /// Mirrors the CC's MODIFY pipeline at the book/engine level: remove,
    /// mutate price, re-run through `process_order`. The moved order must
    /// join the tail of its new level, behind anything already resting
    /// there, even anything that arrived after it originally did.
    #[test]
    fn modify_rejoins_tail_and_loses_priority() {
        let mut engine = MatchingEngine::new();
        engine.process_order(new_order("A", Side::Sell, 10000, 2));
        engine.process_order(new_order("C", Side::Sell, 10000, 2));
        engine.process_order(new_order("M", Side::Sell, 10100, 2));

        let mut modified = engine.book_mut().remove("M").unwrap();
        modified.price = 10000;
        engine.process_order(modified);

        let buy = engine.process_order(new_order("B", Side::Buy, 10000, 2));
        assert_eq!(buy.trades.len(), 1);
        assert_eq!(buy.trades[0].ask_order_id, "A");
    }

    #[test]
    fn price_time_priority_is_deterministic() {
        let mut a = MatchingEngine::new();
        let mut b = MatchingEngine::new();
        let script: Vec<Order> = vec![
            new_order("1", Side::Sell, 100, 5),
            new_order("2", Side::Sell, 100, 5),
            new_order("3", Side::Buy, 100, 7),
        ];
        for order in script.clone() {
            a.process_order(order);
        }
        for order in script {
            b.process_order(order);
        }
        assert_eq!(a.book().order_count(), b.book().order_count());
    }
}
