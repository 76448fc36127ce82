//! Exchange-native payloads, exactly as they arrive on the wire.
//!
//! Prices and volumes stay as decimal strings and times as epoch
//! milliseconds until [`super::normalize`] converts them.

use serde::Deserialize;
use serde_json::Value;

use crate::error::ConversionError;

/// One kline as sent by the exchange.
///
/// The stream payload carries it as an object keyed by single letters; the
/// REST endpoint sends a positional array, see [`RawKline::from_row`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawKline {
    #[serde(rename = "t")]
    pub open_time: i64,
    #[serde(rename = "T")]
    pub close_time: i64,
    #[serde(rename = "o")]
    pub open: String,
    #[serde(rename = "h")]
    pub high: String,
    #[serde(rename = "l")]
    pub low: String,
    #[serde(rename = "c")]
    pub close: String,
    #[serde(rename = "v")]
    pub volume: String,
    #[serde(rename = "q")]
    pub quote_asset_volume: String,
    #[serde(rename = "V")]
    pub taker_buy_base_volume: String,
    #[serde(rename = "Q")]
    pub taker_buy_quote_volume: String,
    #[serde(rename = "n")]
    pub trade_count: u64,
}

impl RawKline {
    /// Decodes a `/api/v3/klines` row:
    /// `[openTime, open, high, low, close, volume, closeTime, quoteVolume,
    ///   trades, takerBuyBase, takerBuyQuote, ignore]`.
    pub fn from_row(row: &[Value]) -> Result<Self, ConversionError> {
        fn int(row: &[Value], idx: usize, field: &'static str) -> Result<i64, ConversionError> {
            row.get(idx)
                .and_then(Value::as_i64)
                .ok_or(ConversionError::MissingField(field))
        }

        fn text(row: &[Value], idx: usize, field: &'static str) -> Result<String, ConversionError> {
            row.get(idx)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or(ConversionError::MissingField(field))
        }

        Ok(RawKline {
            open_time: int(row, 0, "open_time")?,
            open: text(row, 1, "open")?,
            high: text(row, 2, "high")?,
            low: text(row, 3, "low")?,
            close: text(row, 4, "close")?,
            volume: text(row, 5, "volume")?,
            close_time: int(row, 6, "close_time")?,
            quote_asset_volume: text(row, 7, "quote_asset_volume")?,
            trade_count: row
                .get(8)
                .and_then(Value::as_u64)
                .ok_or(ConversionError::MissingField("trade_count"))?,
            taker_buy_base_volume: text(row, 9, "taker_buy_base_volume")?,
            taker_buy_quote_volume: text(row, 10, "taker_buy_quote_volume")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawStreamKline {
    #[serde(flatten)]
    pub kline: RawKline,
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "f")]
    pub first_trade_id: i64,
    #[serde(rename = "L")]
    pub last_trade_id: i64,
    #[serde(rename = "x")]
    pub is_final: bool,
}

/// `<symbol>@kline_<interval>` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawKlineEvent {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "k")]
    pub kline: RawStreamKline,
}

#[derive(Debug, Deserialize)]
pub struct RawOrderBook {
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: u64,
    pub bids: Vec<(String, String)>,
    pub asks: Vec<(String, String)>,
}

/// `<symbol>@depth` payload.
#[derive(Debug, Deserialize)]
pub struct RawDepthEvent {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "U")]
    pub first_update_id: u64,
    #[serde(rename = "u")]
    pub final_update_id: u64,
    #[serde(rename = "b")]
    pub bids: Vec<(String, String)>,
    #[serde(rename = "a")]
    pub asks: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
pub struct RawAggTrade {
    #[serde(rename = "a")]
    pub id: u64,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "f")]
    pub first_trade_id: u64,
    #[serde(rename = "l")]
    pub last_trade_id: u64,
    #[serde(rename = "T")]
    pub timestamp: i64,
    #[serde(rename = "m")]
    pub buyer_maker: bool,
    #[serde(rename = "M")]
    pub best_price_match: bool,
}

/// `<symbol>@aggTrade` payload.
#[derive(Debug, Deserialize)]
pub struct RawAggTradeEvent {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(flatten)]
    pub trade: RawAggTrade,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTicker24 {
    pub symbol: String,
    pub price_change: String,
    pub price_change_percent: String,
    pub weighted_avg_price: String,
    pub prev_close_price: String,
    pub last_price: String,
    pub bid_price: String,
    pub ask_price: String,
    pub open_price: String,
    pub high_price: String,
    pub low_price: String,
    pub volume: String,
    pub open_time: i64,
    pub close_time: i64,
    pub first_id: i64,
    pub last_id: i64,
    pub count: u64,
}

#[derive(Debug, Deserialize)]
pub struct RawPriceTicker {
    pub symbol: String,
    pub price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBookTicker {
    pub symbol: String,
    pub bid_price: String,
    pub bid_qty: String,
    pub ask_price: String,
    pub ask_qty: String,
}

#[derive(Debug, Deserialize)]
pub struct RawServerTime {
    #[serde(rename = "serverTime")]
    pub server_time: i64,
}

#[derive(Debug, Deserialize)]
pub struct RawListenKey {
    #[serde(rename = "listenKey")]
    pub listen_key: String,
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct RawApiError {
    pub code: i64,
    pub msg: String,
}

/// Just enough of a user data payload to dispatch on its type.
#[derive(Debug, Deserialize)]
pub struct RawEventKind {
    #[serde(rename = "e")]
    pub event_type: String,
}

#[derive(Debug, Deserialize)]
pub struct RawBalance {
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "f")]
    pub free: String,
    #[serde(rename = "l")]
    pub locked: String,
}

/// `outboundAccountPosition` payload of the user data stream.
#[derive(Debug, Deserialize)]
pub struct RawAccountPosition {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "u")]
    pub last_update: i64,
    #[serde(rename = "B")]
    pub balances: Vec<RawBalance>,
}
