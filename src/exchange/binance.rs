use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::feed::{PushFeed, WsFeed};
use super::normalize::{self, millis_to_datetime};
use super::relay::{open_stream, EventStream};
use super::wire::*;
use super::{MarketData, MarketStreams, UserDataStreams};
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::types::{
    AccountEvent, AggTrade, AggTradeEvent, AggTradesRequest, BookTicker, DepthEvent, Interval,
    Kline, KlineEvent, KlinesRequest, ListenKey, OrderBook, OrderBookRequest, PriceTicker,
    Ticker24,
};

const API_KEY_HEADER: &str = "X-MBX-APIKEY";

#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    feed: Arc<dyn PushFeed>,
    stream_buffer: usize,
}

impl BinanceClient {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone().filter(|key| !key.is_empty()),
            base_url: config.rest_url.trim_end_matches('/').to_string(),
            feed: Arc::new(WsFeed::new(config.ws_url.clone(), config.stream_buffer)),
            stream_buffer: config.stream_buffer,
        })
    }

    /// Client for public endpoints on the production exchange.
    pub fn public_only() -> Self {
        let config = ClientConfig::default();
        Self {
            client: Client::new(),
            api_key: None,
            base_url: config.rest_url,
            feed: Arc::new(WsFeed::new(config.ws_url, config.stream_buffer)),
            stream_buffer: config.stream_buffer,
        }
    }

    /// Replaces the push feed used by every stream this client opens.
    pub fn with_feed(mut self, feed: Arc<dyn PushFeed>) -> Self {
        self.feed = feed;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> ClientResult<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {} {:?}", url, query);
        let resp = self.client.get(&url).query(query).send().await?;
        Self::decode(resp).await
    }

    /// Request authenticated by API key only; listen-key endpoints need no signature.
    async fn keyed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> ClientResult<T> {
        let api_key = self.api_key.as_ref().ok_or(ClientError::MissingApiKey)?;
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        let resp = self
            .client
            .request(method, &url)
            .header(API_KEY_HEADER, api_key)
            .query(query)
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> ClientResult<T> {
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await?;
            let (code, message) = match serde_json::from_str::<RawApiError>(&text) {
                Ok(err) => (err.code, err.msg),
                Err(_) => (-1, text),
            };
            return Err(ClientError::Api {
                status: status.as_u16(),
                code,
                message,
            });
        }
        Ok(resp.json::<T>().await?)
    }

    fn kline_stream_name(symbol: &str, interval: Interval) -> String {
        format!("{}@kline_{}", symbol.to_lowercase(), interval.as_str())
    }
}

#[async_trait]
impl MarketData for BinanceClient {
    async fn ping(&self) -> ClientResult<()> {
        let _: serde_json::Value = self.get("/api/v3/ping", &[]).await?;
        Ok(())
    }

    async fn server_time(&self) -> ClientResult<DateTime<Utc>> {
        let resp: RawServerTime = self.get("/api/v3/time", &[]).await?;
        Ok(millis_to_datetime("server_time", resp.server_time)?)
    }

    async fn order_book(&self, request: &OrderBookRequest) -> ClientResult<OrderBook> {
        let mut query = vec![("symbol", request.symbol.clone())];
        if let Some(limit) = request.limit {
            query.push(("limit", limit.to_string()));
        }
        let resp: RawOrderBook = self.get("/api/v3/depth", &query).await?;
        Ok(normalize::normalize_order_book(&resp)?)
    }

    async fn agg_trades(&self, request: &AggTradesRequest) -> ClientResult<Vec<AggTrade>> {
        let resp: Vec<RawAggTrade> = self.get("/api/v3/aggTrades", &request.query()).await?;
        let trades = resp
            .iter()
            .map(normalize::normalize_agg_trade)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(trades)
    }

    async fn klines(&self, request: &KlinesRequest) -> ClientResult<Vec<Kline>> {
        let rows: Vec<Vec<serde_json::Value>> =
            self.get("/api/v3/klines", &request.query()).await?;
        let klines = normalize::normalize_klines(&rows)?;
        debug!("Fetched {} klines for {}", klines.len(), request.symbol);
        Ok(klines)
    }

    async fn ticker_24h(&self, symbol: &str) -> ClientResult<Ticker24> {
        let resp: RawTicker24 = self
            .get("/api/v3/ticker/24hr", &[("symbol", symbol.to_string())])
            .await?;
        Ok(normalize::normalize_ticker24(&resp)?)
    }

    async fn all_prices(&self) -> ClientResult<Vec<PriceTicker>> {
        let resp: Vec<RawPriceTicker> = self.get("/api/v3/ticker/price", &[]).await?;
        let prices = resp
            .iter()
            .map(normalize::normalize_price_ticker)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(prices)
    }

    async fn all_book_tickers(&self) -> ClientResult<Vec<BookTicker>> {
        let resp: Vec<RawBookTicker> = self.get("/api/v3/ticker/bookTicker", &[]).await?;
        let books = resp
            .iter()
            .map(normalize::normalize_book_ticker)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(books)
    }
}

#[async_trait]
impl MarketStreams for BinanceClient {
    async fn open_kline_stream(
        &self,
        cancel: CancellationToken,
        symbol: &str,
        interval: Interval,
    ) -> ClientResult<EventStream<KlineEvent>> {
        open_stream(
            self.feed.as_ref(),
            Self::kline_stream_name(symbol, interval),
            cancel,
            self.stream_buffer,
            normalize::decode_kline_frame,
        )
        .await
    }

    async fn open_depth_stream(
        &self,
        cancel: CancellationToken,
        symbol: &str,
    ) -> ClientResult<EventStream<DepthEvent>> {
        open_stream(
            self.feed.as_ref(),
            format!("{}@depth", symbol.to_lowercase()),
            cancel,
            self.stream_buffer,
            normalize::decode_depth_frame,
        )
        .await
    }

    async fn open_agg_trade_stream(
        &self,
        cancel: CancellationToken,
        symbol: &str,
    ) -> ClientResult<EventStream<AggTradeEvent>> {
        open_stream(
            self.feed.as_ref(),
            format!("{}@aggTrade", symbol.to_lowercase()),
            cancel,
            self.stream_buffer,
            normalize::decode_agg_trade_frame,
        )
        .await
    }
}

#[async_trait]
impl UserDataStreams for BinanceClient {
    async fn start_user_data_stream(&self) -> ClientResult<ListenKey> {
        let resp: RawListenKey = self
            .keyed(Method::POST, "/api/v3/userDataStream", &[])
            .await?;
        info!("User data stream started");
        Ok(ListenKey(resp.listen_key))
    }

    async fn keep_alive_user_data_stream(&self, key: &ListenKey) -> ClientResult<()> {
        let _: serde_json::Value = self
            .keyed(
                Method::PUT,
                "/api/v3/userDataStream",
                &[("listenKey", key.as_str().to_string())],
            )
            .await?;
        debug!("User data stream kept alive");
        Ok(())
    }

    async fn close_user_data_stream(&self, key: &ListenKey) -> ClientResult<()> {
        let _: serde_json::Value = self
            .keyed(
                Method::DELETE,
                "/api/v3/userDataStream",
                &[("listenKey", key.as_str().to_string())],
            )
            .await?;
        info!("User data stream closed");
        Ok(())
    }

    async fn open_user_data_stream(
        &self,
        cancel: CancellationToken,
        key: &ListenKey,
    ) -> ClientResult<EventStream<AccountEvent>> {
        open_stream(
            self.feed.as_ref(),
            key.as_str().to_string(),
            cancel,
            self.stream_buffer,
            normalize::decode_user_data_frame,
        )
        .await
    }
}
