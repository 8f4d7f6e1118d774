//! Row shapes for the `orders` and `trades` query-side tables.

use chrono::{DateTime, Utc};
use common::{OrderStatus, Side};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: String,
    pub side: Side,
    pub order_price: i64,
    pub order_quantity: i64,
    pub avg_traded_price: i64,
    pub traded_quantity: i64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    pub bid_order_id: String,
    pub ask_order_id: String,
    pub traded_price: i64,
    pub traded_quantity: i64,
    pub created_at: DateTime<Utc>,
}
