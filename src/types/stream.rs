use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{AggTrade, Interval, Kline, PriceLevel};

/// Envelope shared by every pushed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WsEvent {
    pub event_type: String,
    pub event_time: DateTime<Utc>,
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KlineEvent {
    pub event: WsEvent,
    pub interval: Interval,
    pub first_trade_id: i64,
    pub last_trade_id: i64,
    /// The bar is closed and will not be updated again.
    pub is_final: bool,
    pub kline: Kline,
}

/// Incremental book update between two update ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthEvent {
    pub event: WsEvent,
    pub first_update_id: u64,
    pub final_update_id: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggTradeEvent {
    pub event: WsEvent,
    pub trade: AggTrade,
}

/// Token identifying a private user data stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenKey(pub String);

impl ListenKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

impl Balance {
    pub fn total(&self) -> Decimal {
        self.free + self.locked
    }
}

/// Balances changed by account activity, pushed on the user data stream.
///
/// The envelope symbol is empty: account events are not tied to a market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountEvent {
    pub event: WsEvent,
    pub last_update: DateTime<Utc>,
    pub balances: Vec<Balance>,
}
