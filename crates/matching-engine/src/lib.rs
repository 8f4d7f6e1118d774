//! Order book microservice core: a single-instrument, price-time-priority
//! matching engine fed by a durable command queue, backed by a
//! write-ahead log for crash recovery, and fanning out trades and book
//! snapshots to subscribers.
//!
//! # Architecture
//!
//! The matching engine itself is a pure function:
//! `(old_state, order) -> (new_state, trades)`.
//! Given the same book state and the same incoming order, it always
//! produces the same trades and the same resulting order state — wall
//! clock is only ever used to stamp trades, never to decide them.
//!
//! ## Core components
//!
//! - [`domain`] - order/trade/book types
//! - [`engine`] - the matching algorithm
//! - [`wal`] - append-only write-ahead log
//! - [`recovery`] - WAL replay into book + trade journal state
//! - [`event_publisher`] - broadcast fan-out of trades and periodic snapshots
//! - [`command_consumer`] - Redis Streams command pipeline
//! - [`shutdown`] - cooperative shutdown via cancellation tokens
//! - [`error`] - domain error type
//! - [`metrics`] - pipeline counters/gauges/histograms

pub mod command_consumer;
pub mod domain;
pub mod engine;
pub mod error;
pub mod event_publisher;
pub mod metrics;
pub mod recovery;
pub mod result;
pub mod shutdown;
pub mod wal;

pub use command_consumer::CommandConsumer;
pub use domain::{Order, PriceQuantityBook, Snapshot, Trade};
pub use engine::MatchingEngine;
pub use error::{ObmError, ObmResult};
pub use event_publisher::EventPublisher;
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use recovery::{RecoveredState, RecoveryManager};
pub use result::{CancelOutcome, MatchOutcome};
pub use shutdown::ShutdownController;
pub use wal::{Wal, WalOp, WalRecord, WalTable};
