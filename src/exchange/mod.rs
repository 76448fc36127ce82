pub mod binance;
pub mod feed;
pub mod normalize;
pub mod relay;
pub mod wire;

pub use binance::*;
pub use feed::{FeedSubscription, PushFeed, WsFeed};
pub use relay::{EventStream, StreamState};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::ClientResult;
use crate::types::{
    AccountEvent, AggTrade, AggTradeEvent, AggTradesRequest, BookTicker, DepthEvent, Interval,
    Kline, KlineEvent, KlinesRequest, ListenKey, OrderBook, OrderBookRequest, PriceTicker,
    Ticker24,
};

// Capability sets. A client implements the ones it can actually serve;
// signed trading, account and funding endpoints are not part of any set.

/// Public market data over REST.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Tests connectivity.
    async fn ping(&self) -> ClientResult<()>;
    async fn server_time(&self) -> ClientResult<DateTime<Utc>>;
    async fn order_book(&self, request: &OrderBookRequest) -> ClientResult<OrderBook>;
    async fn agg_trades(&self, request: &AggTradesRequest) -> ClientResult<Vec<AggTrade>>;
    /// Fails as a whole if any returned kline cannot be converted.
    async fn klines(&self, request: &KlinesRequest) -> ClientResult<Vec<Kline>>;
    async fn ticker_24h(&self, symbol: &str) -> ClientResult<Ticker24>;
    async fn all_prices(&self) -> ClientResult<Vec<PriceTicker>>;
    async fn all_book_tickers(&self) -> ClientResult<Vec<BookTicker>>;
}

/// Public push streams. Each call opens its own subscription.
#[async_trait]
pub trait MarketStreams: Send + Sync {
    async fn open_kline_stream(
        &self,
        cancel: CancellationToken,
        symbol: &str,
        interval: Interval,
    ) -> ClientResult<EventStream<KlineEvent>>;

    async fn open_depth_stream(
        &self,
        cancel: CancellationToken,
        symbol: &str,
    ) -> ClientResult<EventStream<DepthEvent>>;

    async fn open_agg_trade_stream(
        &self,
        cancel: CancellationToken,
        symbol: &str,
    ) -> ClientResult<EventStream<AggTradeEvent>>;
}

/// Listen-key lifecycle and the private stream it unlocks.
///
/// A listen key expires unless kept alive; the exchange recommends a
/// keep-alive roughly every 30 minutes.
#[async_trait]
pub trait UserDataStreams: Send + Sync {
    async fn start_user_data_stream(&self) -> ClientResult<ListenKey>;
    async fn keep_alive_user_data_stream(&self, key: &ListenKey) -> ClientResult<()>;
    async fn close_user_data_stream(&self, key: &ListenKey) -> ClientResult<()>;

    async fn open_user_data_stream(
        &self,
        cancel: CancellationToken,
        key: &ListenKey,
    ) -> ClientResult<EventStream<AccountEvent>>;
}
