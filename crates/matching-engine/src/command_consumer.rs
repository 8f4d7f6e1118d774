//! Command consumer: pulls CREATE/MODIFY/CANCEL/FETCH commands from a
//! durable Redis Streams queue and drives them through (WAL, matching
//! engine, event publisher) in the contractual order, acknowledging only
//! once every downstream effect for that command is durable.
//!
//! The WAL-append-before-observable-effect ordering is what makes a
//! redelivered (unacked) command safe to replay after a crash: recovery
//! rebuilds state strictly from what made it to the log.

use crate::domain::{Order, Trade};
use crate::engine::MatchingEngine;
use crate::error::{ObmError, ObmResult};
use crate::event_publisher::EventPublisher;
use crate::metrics::PipelineMetrics;
use crate::wal::{Wal, WalOp, WalTable};
use chrono::Utc;
use common::Side;
use redis::AsyncCommands;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use storage::{OrderRecord, OrderStore, TradeRecord};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

fn to_order_record(order: &Order) -> OrderRecord {
    OrderRecord {
        id: order.id.clone(),
        side: order.side,
        order_price: order.price,
        order_quantity: order.original_qty,
        avg_traded_price: order.avg_trade_price,
        traded_quantity: order.traded_qty,
        status: order.status,
        created_at: order.created_ts,
        updated_at: order.updated_ts,
    }
}

fn to_trade_record(trade: &Trade) -> TradeRecord {
    TradeRecord {
        id: trade.id.clone(),
        bid_order_id: trade.bid_order_id.clone(),
        ask_order_id: trade.ask_order_id.clone(),
        traded_price: trade.price,
        traded_quantity: trade.qty,
        created_at: trade.timestamp,
    }
}

#[derive(Debug, Deserialize)]
struct CreateData {
    id: String,
    side: Side,
    price: i64,
    qty: i64,
}

#[derive(Debug, Deserialize)]
struct ModifyData {
    order_id: String,
    price: i64,
}

#[derive(Debug, Deserialize)]
struct CancelData {
    order_id: String,
}

pub struct CommandConsumer {
    redis: redis::aio::ConnectionManager,
    queue_name: String,
    consumer_group: String,
    consumer_name: String,
    engine: Arc<Mutex<MatchingEngine>>,
    wal: Wal,
    publisher: Arc<EventPublisher>,
    storage: Option<Arc<dyn OrderStore>>,
    metrics: Arc<PipelineMetrics>,
}

impl CommandConsumer {
    pub async fn connect(
        queue_url: &str,
        queue_name: String,
        consumer_group: String,
        consumer_name: String,
        engine: Arc<Mutex<MatchingEngine>>,
        wal: Wal,
        publisher: Arc<EventPublisher>,
        storage: Option<Arc<dyn OrderStore>>,
        metrics: Arc<PipelineMetrics>,
    ) -> ObmResult<Self> {
        let client = redis::Client::open(queue_url).map_err(|e| ObmError::Internal(format!("invalid queue URL: {e}")))?;
        let redis = client
            .get_connection_manager()
            .await
            .map_err(|e| ObmError::Internal(format!("connecting to queue: {e}")))?;

        Ok(Self { redis, queue_name, consumer_group, consumer_name, engine, wal, publisher, storage, metrics })
    }

    /// Creates the consumer group if it doesn't already exist. Idempotent.
    pub async fn ensure_consumer_group(&mut self) -> ObmResult<()> {
        let result: redis::RedisResult<()> = self
            .redis
            .xgroup_create_mkstream(&self.queue_name, &self.consumer_group, "0")
            .await;
        match result {
            Ok(()) => info!(group = %self.consumer_group, "created consumer group"),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                info!(group = %self.consumer_group, "consumer group already exists")
            }
            Err(e) => return Err(ObmError::Internal(format!("creating consumer group: {e}"))),
        }
        Ok(())
    }

    /// Runs the consume loop until `shutdown` is cancelled. Exits only
    /// after the in-flight command finishes; there is no mid-command
    /// preemption.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!(queue = %self.queue_name, "starting command consumer");
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let read: redis::RedisResult<
                Vec<(String, Vec<(String, HashMap<String, String>)>)>,
            > = self
                .redis
                .xread_options(
                    &[&self.queue_name],
                    &[">"],
                    &redis::streams::StreamReadOptions::default()
                        .group(&self.consumer_group, &self.consumer_name)
                        .count(1)
                        .block(1000),
                )
                .await;

            match read {
                Ok(streams) => {
                    for (_stream, messages) in streams {
                        for (message_id, fields) in messages {
                            self.process_message(&message_id, &fields).await;
                        }
                    }
                }
                Err(e) => {
                    warn!("error reading from command queue: {e}");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
        }

        if let Err(e) = self.wal.close() {
            warn!("error closing WAL during shutdown: {e}");
        }
        info!("command consumer stopped");
    }

    #[instrument(skip(self, fields))]
    async fn process_message(&mut self, message_id: &str, fields: &HashMap<String, String>) {
        let start = Instant::now();
        let operation = fields.get("operation").map(String::as_str).unwrap_or("");
        let data = fields.get("data").map(String::as_str).unwrap_or("{}");

        let outcome = match operation {
            "CREATE" => self.handle_create(data).await,
            "MODIFY" => self.handle_modify(data).await,
            "CANCEL" => self.handle_cancel(data).await,
            "FETCH" | "FETCH_ALL" => Ok(()),
            other => {
                warn!(operation = other, "unknown command operation");
                Ok(())
            }
        };

        let ack = match &outcome {
            Ok(()) => {
                self.metrics.record_command_processed();
                true
            }
            Err(ObmError::InvalidOrder(_) | ObmError::OrderNotFound(_)) => {
                self.metrics.record_command_rejected();
                warn!("command {message_id} rejected as a non-fatal no-op: {}", outcome.as_ref().unwrap_err());
                true
            }
            Err(e) => {
                self.metrics.record_command_rejected();
                error!("command {message_id} failed and will not be acked, pending redelivery: {e}");
                false
            }
        };

        if ack {
            if let Err(e) = self.redis.xack::<_, _, _, i64>(&self.queue_name, &self.consumer_group, &[message_id]).await {
                error!("failed to ack command {message_id}: {e}");
            }
        }

        self.metrics.record_latency(start.elapsed());
        self.metrics.set_wal_lsn(self.wal.next_lsn());
    }

    async fn handle_create(&mut self, data: &str) -> ObmResult<()> {
        let req: CreateData = serde_json::from_str(data).map_err(|e| ObmError::InvalidOrder(e.to_string()))?;
        if req.qty <= 0 || req.price <= 0 {
            return Err(ObmError::InvalidOrder("non-positive quantity or price".into()));
        }

        let order = Order::new(req.id, req.side, req.price, req.qty, Utc::now());

        self.wal.append(WalOp::Insert, WalTable::Order, serde_json::to_value(&order).unwrap())?;
        if let Some(storage) = &self.storage {
            storage.insert_order(&to_order_record(&order)).await;
        }

        let outcome = self.engine.lock().await.process_order(order);

        for trade in &outcome.trades {
            self.wal.append(WalOp::Insert, WalTable::Trade, serde_json::to_value(trade).unwrap())?;
            if let Some(storage) = &self.storage {
                storage.insert_trade(&to_trade_record(trade)).await;
            }
        }

        if outcome.order.traded_qty > 0 {
            self.wal.append(WalOp::Update, WalTable::Order, serde_json::to_value(&outcome.order).unwrap())?;
            if let Some(storage) = &self.storage {
                storage.update_order(&to_order_record(&outcome.order)).await;
            }
        }

        self.metrics.record_trades(outcome.trades.len());
        self.publisher.publish_trades(&outcome.trades);
        info!(order_id = %outcome.order.id, trades = outcome.trades.len(), "created order");
        Ok(())
    }

    async fn handle_modify(&mut self, data: &str) -> ObmResult<()> {
        let req: ModifyData = serde_json::from_str(data).map_err(|e| ObmError::InvalidOrder(e.to_string()))?;

        let existing = {
            let mut engine = self.engine.lock().await;
            engine.book_mut().remove(&req.order_id)
        };
        let Some(mut order) = existing else {
            info!(order_id = %req.order_id, "order not found for modification, ack as no-op");
            return Ok(());
        };

        order.price = req.price;
        order.updated_ts = Utc::now();

        self.wal.append(WalOp::Update, WalTable::Order, serde_json::to_value(&order).unwrap())?;
        if let Some(storage) = &self.storage {
            storage.update_order(&to_order_record(&order)).await;
        }

        // A modified order loses its original time priority: re-running it
        // through the matching engine joins the tail of the new level.
        let outcome = self.engine.lock().await.process_order(order);

        for trade in &outcome.trades {
            self.wal.append(WalOp::Insert, WalTable::Trade, serde_json::to_value(trade).unwrap())?;
            if let Some(storage) = &self.storage {
                storage.insert_trade(&to_trade_record(trade)).await;
            }
        }

        if outcome.order.traded_qty > 0 {
            self.wal.append(WalOp::Update, WalTable::Order, serde_json::to_value(&outcome.order).unwrap())?;
            if let Some(storage) = &self.storage {
                storage.update_order(&to_order_record(&outcome.order)).await;
            }
        }

        self.metrics.record_trades(outcome.trades.len());
        self.publisher.publish_trades(&outcome.trades);
        info!(order_id = %outcome.order.id, "modified order");
        Ok(())
    }

    async fn handle_cancel(&mut self, data: &str) -> ObmResult<()> {
        let req: CancelData = serde_json::from_str(data).map_err(|e| ObmError::InvalidOrder(e.to_string()))?;

        let cancel = self.engine.lock().await.cancel_order(&req.order_id);
        let Some(order) = cancel.order else {
            info!(order_id = %req.order_id, "order not found for cancellation, ack as no-op");
            return Ok(());
        };

        self.wal.append(WalOp::Delete, WalTable::Order, serde_json::to_value(&order).unwrap())?;
        if let Some(storage) = &self.storage {
            storage.update_order(&to_order_record(&order)).await;
        }

        info!(order_id = %order.id, "cancelled order");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_data_parses_side_and_amounts() {
        let data = CreateData {
            id: "a".into(),
            side: Side::Buy,
            price: 100,
            qty: 5,
        };
        assert_eq!(data.qty, 5);
    }
}
