//! Best-effort relational persistence for query-side reads.
//!
//! The two tables here (`orders`, `trades`) are non-authoritative: the WAL
//! owned by the matching engine is the system of record. Writes from this
//! crate are fire-and-forget from the command pipeline's perspective — a
//! failure here is logged, never propagated, and never blocks a command.

pub mod error;
pub mod models;
pub mod postgres;

pub use error::StorageError;
pub use models::{OrderRecord, TradeRecord};
pub use postgres::PostgresStore;

use async_trait::async_trait;

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Persistence sink for orders and trades. Implementations must treat
/// every method as fire-and-forget: errors are logged internally and
/// never surfaced to callers, since the WAL remains authoritative.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(&self, order: &OrderRecord);
    async fn update_order(&self, order: &OrderRecord);
    async fn insert_trade(&self, trade: &TradeRecord);
}
