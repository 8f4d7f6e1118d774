//! Domain types for the order book microservice.
//!
//! `Order` and `Trade` mirror the WAL entity schema exactly: prices and
//! quantities are plain integers in minor units, never floating point.
//! `PriceQuantityBook` is the single in-memory book; it is owned exclusively
//! by the command consumer loop (see `engine.rs`, `command_consumer.rs`).

use chrono::{DateTime, Utc};
use common::{OrderStatus, Side};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// A resting or incoming order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub side: Side,
    pub price: i64,
    pub original_qty: i64,
    pub remaining_qty: i64,
    pub traded_qty: i64,
    pub avg_trade_price: i64,
    pub status: OrderStatus,
    pub created_ts: DateTime<Utc>,
    pub updated_ts: DateTime<Utc>,
}

impl Order {
    pub fn new(id: String, side: Side, price: i64, qty: i64, now: DateTime<Utc>) -> Self {
        Self {
            id,
            side,
            price,
            original_qty: qty,
            remaining_qty: qty,
            traded_qty: 0,
            avg_trade_price: 0,
            status: OrderStatus::Open,
            created_ts: now,
            updated_ts: now,
        }
    }

    /// Applies a fill of `qty` units at `px`, recomputing the weighted
    /// average trade price with integer truncation. Does not touch status;
    /// callers decide FILLED/PARTIALLY_FILLED/OPEN after the match loop.
    pub fn apply_fill(&mut self, qty: i64, px: i64, now: DateTime<Utc>) {
        let total = if self.traded_qty == 0 {
            px * qty
        } else {
            self.avg_trade_price * self.traded_qty + px * qty
        };
        self.traded_qty += qty;
        self.remaining_qty -= qty;
        self.avg_trade_price = total / self.traded_qty;
        self.updated_ts = now;
    }

    pub fn is_active(&self) -> bool {
        self.remaining_qty > 0 && self.status.is_active()
    }
}

/// An executed trade. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub price: i64,
    pub qty: i64,
    pub bid_order_id: String,
    pub ask_order_id: String,
}

/// Top-of-book levels surfaced to the snapshot channel. Prices are
/// converted to decimal floats only at this serialization boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub bids: Vec<(f64, i64)>,
    pub asks: Vec<(f64, i64)>,
}

fn minor_to_decimal(price: i64) -> f64 {
    price as f64 / 100.0
}

/// The single price-quantity order book: two ordered maps of price level
/// to FIFO queue, plus an id index for O(1) lookup/removal by identity.
#[derive(Debug, Default)]
pub struct PriceQuantityBook {
    bids: BTreeMap<Reverse<i64>, VecDeque<Order>>,
    asks: BTreeMap<i64, VecDeque<Order>>,
    index: HashMap<String, (Side, i64)>,
}

impl PriceQuantityBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `order` to the tail of its price level, creating the level
    /// if absent. Precondition: `order.remaining_qty > 0` and `order.id`
    /// is not already present.
    pub fn insert(&mut self, order: Order) {
        debug_assert!(order.remaining_qty > 0);
        self.index.insert(order.id.clone(), (order.side, order.price));
        match order.side {
            Side::Buy => self.bids.entry(Reverse(order.price)).or_default().push_back(order),
            Side::Sell => self.asks.entry(order.price).or_default().push_back(order),
        }
    }

    /// Detaches an order by id, removing its level if it becomes empty.
    pub fn remove(&mut self, order_id: &str) -> Option<Order> {
        let (side, price) = self.index.remove(order_id)?;
        let (removed, now_empty) = match side {
            Side::Buy => remove_from_level(self.bids.get_mut(&Reverse(price)), order_id),
            Side::Sell => remove_from_level(self.asks.get_mut(&price), order_id),
        };
        if now_empty {
            match side {
                Side::Buy => self.bids.remove(&Reverse(price)),
                Side::Sell => self.asks.remove(&price),
            };
        }
        removed
    }

    /// Index lookup followed by a scan of the (typically shallow) level.
    pub fn get(&self, order_id: &str) -> Option<&Order> {
        let (side, price) = *self.index.get(order_id)?;
        let level = match side {
            Side::Buy => self.bids.get(&Reverse(price)),
            Side::Sell => self.asks.get(&price),
        }?;
        level.iter().find(|o| o.id == order_id)
    }

    pub fn best_bid(&self) -> Option<(i64, &Order)> {
        self.bids
            .iter()
            .next()
            .and_then(|(Reverse(price), level)| level.front().map(|o| (*price, o)))
    }

    pub fn best_ask(&self) -> Option<(i64, &Order)> {
        self.asks
            .iter()
            .next()
            .and_then(|(price, level)| level.front().map(|o| (*price, o)))
    }

    /// Applies a fill against the order identified by `order_id`, which
    /// must currently be the head of its level. Recomputes its trade
    /// average and, if it has been exhausted, detaches it from the book.
    /// Time priority is never rewritten: a surviving partial fill stays at
    /// the head of its level.
    pub fn update_after_trade(&mut self, order_id: &str, qty: i64, px: i64, now: DateTime<Utc>) {
        let Some(&(side, price)) = self.index.get(order_id) else { return };

        let exhausted = {
            let level = match side {
                Side::Buy => self.bids.get_mut(&Reverse(price)),
                Side::Sell => self.asks.get_mut(&price),
            };
            let Some(level) = level else { return };
            let Some(front) = level.front_mut() else { return };
            debug_assert_eq!(front.id, order_id);
            front.apply_fill(qty, px, now);
            front.status = if front.remaining_qty == 0 {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
            if front.remaining_qty == 0 {
                level.pop_front();
                Some(level.is_empty())
            } else {
                None
            }
        };

        if let Some(level_now_empty) = exhausted {
            self.index.remove(order_id);
            if level_now_empty {
                match side {
                    Side::Buy => {
                        self.bids.remove(&Reverse(price));
                    }
                    Side::Sell => {
                        self.asks.remove(&price);
                    }
                }
            }
        }
    }

    /// Marks `order_id` CANCELLED and detaches it from the book.
    pub fn cancel(&mut self, order_id: &str) -> Option<Order> {
        let mut order = self.remove(order_id)?;
        order.status = OrderStatus::Cancelled;
        Some(order)
    }

    /// Top-`depth` levels per side with aggregated remaining quantity.
    pub fn snapshot(&self, depth: usize, now: DateTime<Utc>) -> Snapshot {
        let bids = self
            .bids
            .iter()
            .take(depth)
            .map(|(Reverse(price), level)| {
                (minor_to_decimal(*price), level.iter().map(|o| o.remaining_qty).sum())
            })
            .collect();
        let asks = self
            .asks
            .iter()
            .take(depth)
            .map(|(price, level)| (minor_to_decimal(*price), level.iter().map(|o| o.remaining_qty).sum()))
            .collect();
        Snapshot { timestamp: now, bids, asks }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    pub fn order_count(&self) -> usize {
        self.index.len()
    }
}

fn remove_from_level(level: Option<&mut VecDeque<Order>>, order_id: &str) -> (Option<Order>, bool) {
    let Some(level) = level else { return (None, false) };
    let removed = level.iter().position(|o| o.id == order_id).and_then(|pos| level.remove(pos));
    (removed, level.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: &str, side: Side, price: i64, qty: i64) -> Order {
        Order::new(id.to_string(), side, price, qty, Utc::now())
    }

    #[test]
    fn insert_and_best_of_book() {
        let mut book = PriceQuantityBook::new();
        book.insert(order("a", Side::Buy, 100, 5));
        book.insert(order("b", Side::Buy, 101, 5));
        let (price, head) = book.best_bid().unwrap();
        assert_eq!(price, 101);
        assert_eq!(head.id, "b");
    }

    #[test]
    fn fifo_within_level() {
        let mut book = PriceQuantityBook::new();
        book.insert(order("a", Side::Sell, 100, 5));
        book.insert(order("b", Side::Sell, 100, 5));
        let (_, head) = book.best_ask().unwrap();
        assert_eq!(head.id, "a");
    }

    #[test]
    fn remove_empties_level() {
        let mut book = PriceQuantityBook::new();
        book.insert(order("a", Side::Sell, 100, 5));
        assert!(book.remove("a").is_some());
        assert!(book.best_ask().is_none());
        assert!(book.is_empty());
    }

    #[test]
    fn partial_fill_keeps_head_position() {
        let mut book = PriceQuantityBook::new();
        book.insert(order("a", Side::Sell, 100, 10));
        book.insert(order("b", Side::Sell, 100, 10));
        book.update_after_trade("a", 4, 100, Utc::now());
        let (_, head) = book.best_ask().unwrap();
        assert_eq!(head.id, "a");
        assert_eq!(head.remaining_qty, 6);
        assert_eq!(head.status, OrderStatus::PartiallyFilled);
    }

    #[test]
    fn full_fill_detaches_order() {
        let mut book = PriceQuantityBook::new();
        book.insert(order("a", Side::Sell, 100, 10));
        book.update_after_trade("a", 10, 100, Utc::now());
        assert!(book.get("a").is_none());
        assert!(book.is_empty());
    }

    #[test]
    fn avg_trade_price_is_weighted_and_truncated() {
        let mut o = order("a", Side::Buy, 100, 5);
        o.apply_fill(3, 100, Utc::now());
        o.apply_fill(2, 110, Utc::now());
        assert_eq!(o.avg_trade_price, 104);
    }

    #[test]
    fn snapshot_aggregates_quantity_per_level() {
        let mut book = PriceQuantityBook::new();
        book.insert(order("a", Side::Buy, 100, 5));
        book.insert(order("b", Side::Buy, 100, 7));
        let snap = book.snapshot(5, Utc::now());
        assert_eq!(snap.bids, vec![(1.0, 12)]);
    }

    #[test]
    fn cancel_marks_status_and_removes() {
        let mut book = PriceQuantityBook::new();
        book.insert(order("a", Side::Buy, 100, 5));
        let cancelled = book.cancel("a").unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(book.get("a").is_none());
    }
}
