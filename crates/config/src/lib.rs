//! Configuration for the order book microservice
//!
//! Scope is intentionally narrow: the OBM core has exactly one
//! instrument's book and reads its wiring from a handful of settings.
//! Everything HTTP/DB-pool/process-launcher related lives outside this
//! crate's concern per the out-of-scope interfaces.

pub mod defaults;
pub mod parser;
pub mod substitution;
pub mod validator;

pub use defaults::*;
pub use parser::*;
pub use validator::*;

use serde::{Deserialize, Serialize};

/// Top-level configuration document.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MasterConfig {
    /// Path to the write-ahead log file.
    #[serde(default = "default_wal_file_path")]
    pub wal_file_path: String,

    /// Durable command queue connection string (Redis Streams).
    #[serde(default = "default_queue_url")]
    pub queue_url: String,

    /// Consumer group name used when reading the command stream.
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,

    /// Consumer name within the group (must be unique per running process).
    #[serde(default = "default_consumer_name")]
    pub consumer_name: String,

    /// Name of the command stream / queue key.
    #[serde(default = "default_order_queue_name")]
    pub order_queue_name: String,

    /// Pub/sub channel trades are published to.
    #[serde(default = "default_trade_channel")]
    pub trade_channel: String,

    /// Pub/sub channel snapshots are published to.
    #[serde(default = "default_snapshot_channel")]
    pub snapshot_channel: String,

    /// Optional relational store connection string. When absent, the
    /// non-authoritative persistence layer is disabled entirely (the WAL
    /// remains the system of record regardless).
    #[serde(default)]
    pub database_url: Option<String>,

    /// Snapshot publication cadence, in seconds.
    #[serde(default = "default_snapshot_interval_seconds")]
    pub snapshot_interval_seconds: u64,

    /// Number of price levels per side included in a snapshot.
    #[serde(default = "default_snapshot_depth")]
    pub snapshot_depth: usize,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            wal_file_path: default_wal_file_path(),
            queue_url: default_queue_url(),
            consumer_group: default_consumer_group(),
            consumer_name: default_consumer_name(),
            order_queue_name: default_order_queue_name(),
            trade_channel: default_trade_channel(),
            snapshot_channel: default_snapshot_channel(),
            database_url: None,
            snapshot_interval_seconds: default_snapshot_interval_seconds(),
            snapshot_depth: default_snapshot_depth(),
        }
    }
}
