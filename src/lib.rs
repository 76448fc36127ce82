//! Normalized client for the Binance REST and WebSocket APIs.
//!
//! Wire records (decimal strings, epoch milliseconds) are converted into
//! [`rust_decimal::Decimal`] and [`chrono::DateTime`] values. Push streams are
//! relayed through [`exchange::EventStream`]s that close exactly once, either
//! when the exchange ends the stream or when the caller's
//! [`tokio_util::sync::CancellationToken`] fires.

pub mod config;
pub mod error;
pub mod exchange;
pub mod types;

pub use error::{ClientError, ClientResult, ConversionError};
pub use exchange::{
    BinanceClient, EventStream, FeedSubscription, MarketData, MarketStreams, PushFeed,
    StreamState, UserDataStreams, WsFeed,
};
