//! Event publisher: fans out trades and periodic book snapshots.
//!
//! Publishing is best-effort. A slow or disconnected subscriber never
//! blocks the command pipeline — both channels use `tokio::sync::broadcast`,
//! whose send simply drops the message for lagging receivers rather than
//! waiting on them.

use crate::domain::{Snapshot, Trade};
use crate::engine::MatchingEngine;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Decimal-price wire payload for a single trade, per the trade channel
/// contract: prices are minor-unit integers divided back to 2dp floats
/// only at this serialization boundary.
#[derive(Debug, Clone, Serialize)]
pub struct TradeEvent {
    pub trade_id: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub price: f64,
    pub qty: i64,
    pub bid_order_id: String,
    pub ask_order_id: String,
}

impl From<&Trade> for TradeEvent {
    fn from(t: &Trade) -> Self {
        Self {
            trade_id: t.id.clone(),
            timestamp: t.timestamp,
            price: t.price as f64 / 100.0,
            qty: t.qty,
            bid_order_id: t.bid_order_id.clone(),
            ask_order_id: t.ask_order_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotEvent {
    pub timestamp: chrono::DateTime<Utc>,
    pub bids: Vec<(f64, i64)>,
    pub asks: Vec<(f64, i64)>,
}

impl From<Snapshot> for SnapshotEvent {
    fn from(s: Snapshot) -> Self {
        Self { timestamp: s.timestamp, bids: s.bids, asks: s.asks }
    }
}

pub struct EventPublisher {
    trades_tx: broadcast::Sender<TradeEvent>,
    snapshots_tx: broadcast::Sender<SnapshotEvent>,
}

impl EventPublisher {
    pub fn new() -> Self {
        let (trades_tx, _) = broadcast::channel(1024);
        let (snapshots_tx, _) = broadcast::channel(16);
        Self { trades_tx, snapshots_tx }
    }

    pub fn subscribe_trades(&self) -> broadcast::Receiver<TradeEvent> {
        self.trades_tx.subscribe()
    }

    pub fn subscribe_snapshots(&self) -> broadcast::Receiver<SnapshotEvent> {
        self.snapshots_tx.subscribe()
    }

    /// Publishes each trade, in emission order. Errors (no subscribers)
    /// are swallowed: the command still succeeds.
    pub fn publish_trades(&self, trades: &[Trade]) {
        for trade in trades {
            let event = TradeEvent::from(trade);
            if self.trades_tx.send(event).is_err() {
                debug!(trade_id = %trade.id, "no subscribers for trade event");
            }
        }
    }

    fn publish_snapshot(&self, snapshot: Snapshot) {
        let event = SnapshotEvent::from(snapshot);
        if self.snapshots_tx.send(event).is_err() {
            debug!("no subscribers for snapshot event");
        }
    }

    /// Runs the snapshot pump until `shutdown` is cancelled: every
    /// `interval_seconds`, reads the book (through the shared engine handle)
    /// and publishes its top-`depth` levels per side. Because the engine
    /// mutex is only held by the command consumer for the duration of a
    /// single command, this only ever observes a book state that sits
    /// between two commands, never a mid-command state.
    pub async fn run_snapshot_pump(
        self: Arc<Self>,
        engine: Arc<Mutex<MatchingEngine>>,
        interval_seconds: u64,
        depth: usize,
        shutdown: CancellationToken,
    ) {
        let mut ticker = interval(Duration::from_secs(interval_seconds.max(1)));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = {
                        let engine = engine.lock().await;
                        engine.book().snapshot(depth, Utc::now())
                    };
                    if !snapshot.bids.is_empty() || !snapshot.asks.is_empty() {
                        debug!(bid_levels = snapshot.bids.len(), ask_levels = snapshot.asks.len(), "publishing snapshot");
                    }
                    self.publish_snapshot(snapshot);
                }
                _ = shutdown.cancelled() => {
                    warn!("snapshot pump shutting down");
                    break;
                }
            }
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trade() -> Trade {
        Trade {
            id: "t1".into(),
            timestamp: Utc::now(),
            price: 12345,
            qty: 10,
            bid_order_id: "b".into(),
            ask_order_id: "a".into(),
        }
    }

    #[test]
    fn trade_event_converts_price_to_decimal() {
        let event = TradeEvent::from(&sample_trade());
        assert_eq!(event.price, 123.45);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let publisher = EventPublisher::new();
        publisher.publish_trades(&[sample_trade()]);
    }

    #[tokio::test]
    async fn subscriber_receives_published_trade() {
        let publisher = EventPublisher::new();
        let mut rx = publisher.subscribe_trades();
        publisher.publish_trades(&[sample_trade()]);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.trade_id, "t1");
    }
}
