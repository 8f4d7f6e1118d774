//! Crash recovery: deterministically rebuilds (book, trade journal, last
//! LSN) by replaying the WAL in LSN order.
//!
//! A malformed line at the tail of the file is the signature of a crash
//! mid-append (the writer died between `write` and `fsync`, or between
//! two records) and is treated as a truncation point: replay stops there
//! with whatever was durably flushed. A malformed line anywhere else in
//! the file means the log itself is corrupt; replaying past it would be
//! non-deterministic, so recovery refuses to proceed.

use crate::domain::{Order, PriceQuantityBook, Trade};
use crate::error::{ObmError, ObmResult};
use crate::wal::{WalOp, WalRecord, WalTable};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

pub struct RecoveredState {
    pub book: PriceQuantityBook,
    pub trades: Vec<Trade>,
    pub last_lsn: i64,
}

pub struct RecoveryManager;

impl RecoveryManager {
    /// Replays the WAL file at `path`. Returns an empty book with
    /// `last_lsn = -1` if the file is missing or empty; CC still begins
    /// writing at LSN 0 in that case.
    pub fn recover<P: AsRef<Path>>(path: P) -> ObmResult<RecoveredState> {
        let path = path.as_ref();
        let mut book = PriceQuantityBook::new();
        let mut trades = Vec::new();
        let mut last_lsn: i64 = -1;

        if !path.exists() {
            info!(path = ?path, "no WAL file found, starting fresh");
            return Ok(RecoveredState { book, trades, last_lsn });
        }

        let file = File::open(path).map_err(|e| ObmError::Wal(format!("opening WAL for recovery: {e}")))?;
        if file.metadata().map(|m| m.len()).unwrap_or(0) == 0 {
            info!(path = ?path, "WAL file is empty, starting fresh");
            return Ok(RecoveredState { book, trades, last_lsn });
        }

        info!(path = ?path, "replaying WAL");
        let lines: Vec<String> = BufReader::new(file)
            .lines()
            .collect::<std::io::Result<_>>()
            .map_err(|e| ObmError::Wal(format!("reading WAL for recovery: {e}")))?;

        let mut entries_replayed = 0usize;
        for (idx, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: WalRecord = match serde_json::from_str(line) {
                Ok(r) => r,
                Err(e) => {
                    let is_tail = idx == lines.len() - 1;
                    if is_tail {
                        warn!(line = idx + 1, "truncated WAL record at tail, treating as crash marker");
                        break;
                    }
                    return Err(ObmError::Corruption {
                        lsn: last_lsn.max(0) as u64,
                        reason: format!("malformed record at line {}: {e}", idx + 1),
                    });
                }
            };

            Self::replay_record(&record, &mut book, &mut trades)?;
            last_lsn = record.lsn as i64;
            entries_replayed += 1;
        }

        info!(
            entries_replayed,
            orders_in_book = book.order_count(),
            trades_recovered = trades.len(),
            last_lsn,
            "recovery complete"
        );
        Ok(RecoveredState { book, trades, last_lsn })
    }

    fn replay_record(record: &WalRecord, book: &mut PriceQuantityBook, trades: &mut Vec<Trade>) -> ObmResult<()> {
        match record.table {
            WalTable::Order => {
                let order: Order = serde_json::from_value(record.data.clone())
                    .map_err(|e| ObmError::Corruption { lsn: record.lsn, reason: format!("decoding ORDER: {e}") })?;
                match record.operation {
                    WalOp::Insert | WalOp::Update => {
                        book.remove(&order.id);
                        if order.is_active() {
                            book.insert(order);
                        }
                    }
                    WalOp::Delete => {
                        book.remove(&order.id);
                    }
                }
            }
            WalTable::Trade => {
                if record.operation == WalOp::Insert {
                    let trade: Trade = serde_json::from_value(record.data.clone()).map_err(|e| {
                        ObmError::Corruption { lsn: record.lsn, reason: format!("decoding TRADE: {e}") }
                    })?;
                    trades.push(trade);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::Wal;
    use chrono::Utc;
    use common::Side;
    use std::io::Write as _;
    use tempfile::tempdir;

    fn order_json(id: &str, side: Side, price: i64, remaining: i64, status: &str) -> serde_json::Value {
        let now = Utc::now();
        serde_json::json!({
            "id": id, "side": side, "price": price,
            "original_qty": remaining, "remaining_qty": remaining,
            "traded_qty": 0, "avg_trade_price": 0,
            "status": status, "created_ts": now, "updated_ts": now
        })
    }

    #[test]
    fn missing_wal_starts_empty() {
        let dir = tempdir().unwrap();
        let state = RecoveryManager::recover(dir.path().join("missing.log")).unwrap();
        assert_eq!(state.last_lsn, -1);
        assert!(state.book.is_empty());
    }

    #[test]
    fn replays_insert_and_tracks_last_lsn() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");
        let mut wal = Wal::open(&path).unwrap();
        wal.append(WalOp::Insert, WalTable::Order, order_json("a", Side::Buy, 100, 5, "OPEN")).unwrap();
        drop(wal);

        let state = RecoveryManager::recover(&path).unwrap();
        assert_eq!(state.last_lsn, 0);
        assert!(state.book.get("a").is_some());
    }

    #[test]
    fn delete_removes_order_from_rebuilt_book() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");
        let mut wal = Wal::open(&path).unwrap();
        wal.append(WalOp::Insert, WalTable::Order, order_json("a", Side::Buy, 100, 5, "OPEN")).unwrap();
        wal.append(WalOp::Delete, WalTable::Order, order_json("a", Side::Buy, 100, 5, "CANCELLED")).unwrap();
        drop(wal);

        let state = RecoveryManager::recover(&path).unwrap();
        assert!(state.book.get("a").is_none());
    }

    #[test]
    fn truncated_tail_record_stops_cleanly() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");
        let mut wal = Wal::open(&path).unwrap();
        wal.append(WalOp::Insert, WalTable::Order, order_json("a", Side::Buy, 100, 5, "OPEN")).unwrap();
        drop(wal);
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        write!(f, "{{\"lsn\": 1, \"truncat").unwrap();
        drop(f);

        let state = RecoveryManager::recover(&path).unwrap();
        assert_eq!(state.last_lsn, 0);
    }

    #[test]
    fn mid_file_corruption_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");
        std::fs::write(&path, "not json at all\n{\"lsn\": 1, \"timestamp\": \"2024-01-01T00:00:00Z\", \"operation\": \"INSERT\", \"table\": \"ORDER\", \"data\": {}}\n").unwrap();

        let result = RecoveryManager::recover(&path);
        assert!(matches!(result, Err(ObmError::Corruption { .. })));
    }

    /// After a full-fill (A/B at 10000) followed by a partial fill
    /// (A/B at 10000 with B resting qty=3), recovery must rebuild a book
    /// with exactly B resting at qty=3 and both trades in original order.
    #[test]
    fn recovers_book_and_trade_journal_across_two_commands() {
        use crate::engine::MatchingEngine;

        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");
        let mut engine = MatchingEngine::new();
        let mut wal = Wal::open(&path).unwrap();

        let a1 = Order::new("A1".into(), Side::Sell, 12345, 10, Utc::now());
        wal.append(WalOp::Insert, WalTable::Order, serde_json::to_value(&a1).unwrap()).unwrap();
        let outcome = engine.process_order(a1);
        if outcome.order.traded_qty > 0 {
            wal.append(WalOp::Update, WalTable::Order, serde_json::to_value(&outcome.order).unwrap()).unwrap();
        }

        let b1 = Order::new("B1".into(), Side::Buy, 12500, 10, Utc::now());
        wal.append(WalOp::Insert, WalTable::Order, serde_json::to_value(&b1).unwrap()).unwrap();
        let outcome = engine.process_order(b1);
        for trade in &outcome.trades {
            wal.append(WalOp::Insert, WalTable::Trade, serde_json::to_value(trade).unwrap()).unwrap();
        }
        wal.append(WalOp::Update, WalTable::Order, serde_json::to_value(&outcome.order).unwrap()).unwrap();

        let a2 = Order::new("A2".into(), Side::Sell, 10000, 5, Utc::now());
        wal.append(WalOp::Insert, WalTable::Order, serde_json::to_value(&a2).unwrap()).unwrap();
        let outcome = engine.process_order(a2);
        if outcome.order.traded_qty > 0 {
            wal.append(WalOp::Update, WalTable::Order, serde_json::to_value(&outcome.order).unwrap()).unwrap();
        }

        let b2 = Order::new("B2".into(), Side::Buy, 10000, 8, Utc::now());
        wal.append(WalOp::Insert, WalTable::Order, serde_json::to_value(&b2).unwrap()).unwrap();
        let outcome = engine.process_order(b2);
        for trade in &outcome.trades {
            wal.append(WalOp::Insert, WalTable::Trade, serde_json::to_value(trade).unwrap()).unwrap();
        }
        wal.append(WalOp::Update, WalTable::Order, serde_json::to_value(&outcome.order).unwrap()).unwrap();
        drop(wal);

        let state = RecoveryManager::recover(&path).unwrap();
        assert!(state.book.get("A1").is_none());
        let b2_resting = state.book.get("B2").unwrap();
        assert_eq!(b2_resting.remaining_qty, 3);
        assert_eq!(state.trades.len(), 2);
        assert_eq!(state.trades[0].qty, 10);
        assert_eq!(state.trades[1].qty, 5);
    }
}
