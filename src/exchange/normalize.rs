//! Conversions from wire records to normalized records.
//!
//! Every function here is pure. Decimal strings become [`Decimal`], epoch
//! milliseconds become [`DateTime<Utc>`], and the first field that fails to
//! convert aborts the whole record.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

use super::wire::*;
use crate::error::ConversionError;
use crate::types::{
    AccountEvent, AggTrade, AggTradeEvent, Balance, BookTicker, DepthEvent, Interval, Kline,
    KlineEvent, OrderBook, PriceLevel, PriceTicker, Ticker24, WsEvent,
};

pub(crate) const ACCOUNT_POSITION_EVENT: &str = "outboundAccountPosition";

/// Parses at `Decimal` precision: 28 significant digits. Digits past that
/// are rounded away, and integer parts too large for 96 bits are rejected.
pub fn parse_decimal(field: &'static str, value: &str) -> Result<Decimal, ConversionError> {
    Decimal::from_str(value).map_err(|_| ConversionError::InvalidDecimal {
        field,
        value: value.to_string(),
    })
}

/// Prices, quantities and volumes are never negative.
pub fn parse_amount(field: &'static str, value: &str) -> Result<Decimal, ConversionError> {
    let amount = parse_decimal(field, value)?;
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ConversionError::Negative {
            field,
            value: value.to_string(),
        });
    }
    Ok(amount)
}

pub fn millis_to_datetime(field: &'static str, millis: i64) -> Result<DateTime<Utc>, ConversionError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or(ConversionError::InvalidTimestamp { field, millis })
}

fn price_levels(
    side: &'static str,
    levels: &[(String, String)],
) -> Result<Vec<PriceLevel>, ConversionError> {
    levels
        .iter()
        .map(|(price, quantity)| {
            Ok(PriceLevel {
                price: parse_amount(side, price)?,
                quantity: parse_amount(side, quantity)?,
            })
        })
        .collect()
}

pub fn normalize_kline(raw: &RawKline) -> Result<Kline, ConversionError> {
    Ok(Kline {
        open_time: millis_to_datetime("open_time", raw.open_time)?,
        close_time: millis_to_datetime("close_time", raw.close_time)?,
        open: parse_amount("open", &raw.open)?,
        high: parse_amount("high", &raw.high)?,
        low: parse_amount("low", &raw.low)?,
        close: parse_amount("close", &raw.close)?,
        volume: parse_amount("volume", &raw.volume)?,
        quote_asset_volume: parse_amount("quote_asset_volume", &raw.quote_asset_volume)?,
        taker_buy_base_volume: parse_amount("taker_buy_base_volume", &raw.taker_buy_base_volume)?,
        taker_buy_quote_volume: parse_amount("taker_buy_quote_volume", &raw.taker_buy_quote_volume)?,
        trade_count: raw.trade_count,
    })
}

pub fn normalize_kline_event(raw: &RawKlineEvent) -> Result<KlineEvent, ConversionError> {
    let kline = normalize_kline(&raw.kline.kline)?;
    Ok(KlineEvent {
        event: WsEvent {
            event_type: raw.event_type.clone(),
            event_time: millis_to_datetime("event_time", raw.event_time)?,
            symbol: raw.symbol.clone(),
        },
        interval: raw.kline.interval.parse::<Interval>()?,
        first_trade_id: raw.kline.first_trade_id,
        last_trade_id: raw.kline.last_trade_id,
        is_final: raw.kline.is_final,
        kline,
    })
}

/// Converts a whole REST kline batch; one bad row fails the batch.
pub fn normalize_klines(rows: &[Vec<serde_json::Value>]) -> Result<Vec<Kline>, ConversionError> {
    rows.iter()
        .map(|row| normalize_kline(&RawKline::from_row(row)?))
        .collect()
}

pub fn normalize_order_book(raw: &RawOrderBook) -> Result<OrderBook, ConversionError> {
    Ok(OrderBook {
        last_update_id: raw.last_update_id,
        bids: price_levels("bids", &raw.bids)?,
        asks: price_levels("asks", &raw.asks)?,
    })
}

pub fn normalize_depth_event(raw: &RawDepthEvent) -> Result<DepthEvent, ConversionError> {
    Ok(DepthEvent {
        event: WsEvent {
            event_type: raw.event_type.clone(),
            event_time: millis_to_datetime("event_time", raw.event_time)?,
            symbol: raw.symbol.clone(),
        },
        first_update_id: raw.first_update_id,
        final_update_id: raw.final_update_id,
        bids: price_levels("bids", &raw.bids)?,
        asks: price_levels("asks", &raw.asks)?,
    })
}

pub fn normalize_agg_trade(raw: &RawAggTrade) -> Result<AggTrade, ConversionError> {
    Ok(AggTrade {
        id: raw.id,
        price: parse_amount("price", &raw.price)?,
        quantity: parse_amount("quantity", &raw.quantity)?,
        first_trade_id: raw.first_trade_id,
        last_trade_id: raw.last_trade_id,
        timestamp: millis_to_datetime("timestamp", raw.timestamp)?,
        buyer_maker: raw.buyer_maker,
        best_price_match: raw.best_price_match,
    })
}

pub fn normalize_agg_trade_event(raw: &RawAggTradeEvent) -> Result<AggTradeEvent, ConversionError> {
    Ok(AggTradeEvent {
        event: WsEvent {
            event_type: raw.event_type.clone(),
            event_time: millis_to_datetime("event_time", raw.event_time)?,
            symbol: raw.symbol.clone(),
        },
        trade: normalize_agg_trade(&raw.trade)?,
    })
}

pub fn normalize_ticker24(raw: &RawTicker24) -> Result<Ticker24, ConversionError> {
    Ok(Ticker24 {
        symbol: raw.symbol.clone(),
        // change fields are signed
        price_change: parse_decimal("price_change", &raw.price_change)?,
        price_change_percent: parse_decimal("price_change_percent", &raw.price_change_percent)?,
        weighted_avg_price: parse_amount("weighted_avg_price", &raw.weighted_avg_price)?,
        prev_close_price: parse_amount("prev_close_price", &raw.prev_close_price)?,
        last_price: parse_amount("last_price", &raw.last_price)?,
        bid_price: parse_amount("bid_price", &raw.bid_price)?,
        ask_price: parse_amount("ask_price", &raw.ask_price)?,
        open_price: parse_amount("open_price", &raw.open_price)?,
        high_price: parse_amount("high_price", &raw.high_price)?,
        low_price: parse_amount("low_price", &raw.low_price)?,
        volume: parse_amount("volume", &raw.volume)?,
        open_time: millis_to_datetime("open_time", raw.open_time)?,
        close_time: millis_to_datetime("close_time", raw.close_time)?,
        first_id: raw.first_id,
        last_id: raw.last_id,
        count: raw.count,
    })
}

pub fn normalize_price_ticker(raw: &RawPriceTicker) -> Result<PriceTicker, ConversionError> {
    Ok(PriceTicker {
        symbol: raw.symbol.clone(),
        price: parse_amount("price", &raw.price)?,
    })
}

pub fn normalize_book_ticker(raw: &RawBookTicker) -> Result<BookTicker, ConversionError> {
    Ok(BookTicker {
        symbol: raw.symbol.clone(),
        bid_price: parse_amount("bid_price", &raw.bid_price)?,
        bid_qty: parse_amount("bid_qty", &raw.bid_qty)?,
        ask_price: parse_amount("ask_price", &raw.ask_price)?,
        ask_qty: parse_amount("ask_qty", &raw.ask_qty)?,
    })
}

pub fn normalize_account_event(raw: &RawAccountPosition) -> Result<AccountEvent, ConversionError> {
    let balances = raw
        .balances
        .iter()
        .map(|b| {
            Ok(Balance {
                asset: b.asset.clone(),
                free: parse_amount("free", &b.free)?,
                locked: parse_amount("locked", &b.locked)?,
            })
        })
        .collect::<Result<Vec<_>, ConversionError>>()?;

    Ok(AccountEvent {
        event: WsEvent {
            event_type: raw.event_type.clone(),
            event_time: millis_to_datetime("event_time", raw.event_time)?,
            symbol: String::new(),
        },
        last_update: millis_to_datetime("last_update", raw.last_update)?,
        balances,
    })
}

// Frame decoders used by the stream relays: JSON text in, normalized event out.

pub fn decode_kline_frame(frame: &str) -> Result<KlineEvent, ConversionError> {
    let raw: RawKlineEvent = serde_json::from_str(frame)?;
    normalize_kline_event(&raw)
}

pub fn decode_depth_frame(frame: &str) -> Result<DepthEvent, ConversionError> {
    let raw: RawDepthEvent = serde_json::from_str(frame)?;
    normalize_depth_event(&raw)
}

pub fn decode_agg_trade_frame(frame: &str) -> Result<AggTradeEvent, ConversionError> {
    let raw: RawAggTradeEvent = serde_json::from_str(frame)?;
    normalize_agg_trade_event(&raw)
}

/// Only balance snapshots are normalized; order and balance-delta reports
/// come back as [`ConversionError::UnsupportedEvent`].
pub fn decode_user_data_frame(frame: &str) -> Result<AccountEvent, ConversionError> {
    let kind: RawEventKind = serde_json::from_str(frame)?;
    if kind.event_type != ACCOUNT_POSITION_EVENT {
        return Err(ConversionError::UnsupportedEvent(kind.event_type));
    }
    let raw: RawAccountPosition = serde_json::from_str(frame)?;
    normalize_account_event(&raw)
}
