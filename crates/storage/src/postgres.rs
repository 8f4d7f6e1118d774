//! Postgres-backed `OrderStore`. Connects a pool, creates the two
//! query-side tables if absent, and persists asynchronously so database
//! latency never sits on the matching pipeline's critical path.

use crate::error::StorageError;
use crate::models::{OrderRecord, TradeRecord};
use crate::{OrderStore, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{error, info};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(2)
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        info!("connected to query-side database");
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                side TEXT NOT NULL,
                order_price BIGINT NOT NULL,
                order_quantity BIGINT NOT NULL,
                avg_traded_price BIGINT NOT NULL,
                traded_quantity BIGINT NOT NULL,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                bid_order_id TEXT NOT NULL,
                ask_order_id TEXT NOT NULL,
                traded_price BIGINT NOT NULL,
                traded_quantity BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn insert_order(&self, order: &OrderRecord) {
        let result = sqlx::query(
            r#"
            INSERT INTO orders (id, side, order_price, order_quantity, avg_traded_price, traded_quantity, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&order.id)
        .bind(order.side.to_string())
        .bind(order.order_price)
        .bind(order.order_quantity)
        .bind(order.avg_traded_price)
        .bind(order.traded_quantity)
        .bind(order.status.to_string())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            error!(order_id = %order.id, "failed to insert order: {e}");
        }
    }

    async fn update_order(&self, order: &OrderRecord) {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET order_price = $2, order_quantity = $3, avg_traded_price = $4,
                traded_quantity = $5, status = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(&order.id)
        .bind(order.order_price)
        .bind(order.order_quantity)
        .bind(order.avg_traded_price)
        .bind(order.traded_quantity)
        .bind(order.status.to_string())
        .bind(order.updated_at)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            error!(order_id = %order.id, "failed to update order: {e}");
        }
    }

    async fn insert_trade(&self, trade: &TradeRecord) {
        let result = sqlx::query(
            r#"
            INSERT INTO trades (id, bid_order_id, ask_order_id, traded_price, traded_quantity, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&trade.id)
        .bind(&trade.bid_order_id)
        .bind(&trade.ask_order_id)
        .bind(trade.traded_price)
        .bind(trade.traded_quantity)
        .bind(trade.created_at)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            error!(trade_id = %trade.id, "failed to insert trade: {e}");
        }
    }
}
