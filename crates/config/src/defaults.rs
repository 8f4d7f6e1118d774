//! Default values for configuration fields, per spec.md §6.

pub fn default_wal_file_path() -> String {
    "./data/wal.log".to_string()
}

pub fn default_queue_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

pub fn default_consumer_group() -> String {
    "obm_group".to_string()
}

pub fn default_consumer_name() -> String {
    "obm_consumer".to_string()
}

pub fn default_order_queue_name() -> String {
    "order_queue".to_string()
}

pub fn default_trade_channel() -> String {
    "trade_events".to_string()
}

pub fn default_snapshot_channel() -> String {
    "snapshot_events".to_string()
}

pub fn default_snapshot_interval_seconds() -> u64 {
    1
}

pub fn default_snapshot_depth() -> usize {
    5
}
