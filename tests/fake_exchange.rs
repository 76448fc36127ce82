//! End-to-end client tests against an in-process fake exchange.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use binance_client::config::ClientConfig;
use binance_client::types::{
    AggTradesRequest, Interval, KlinesRequest, ListenKey, OrderBookRequest,
};
use binance_client::{
    BinanceClient, ClientError, MarketData, MarketStreams, StreamState, UserDataStreams,
};

const API_KEY: &str = "test-key";
const LISTEN_KEY: &str = "pqia91ma19a5s61cv6a81va65sdf19v8a65a1a5s61cv6a81va65sdf19v8a65a1";
const T0: i64 = 1_700_000_000_000;

#[derive(Clone, Default)]
struct Exchange {
    kline_queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    agg_trade_queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    broken_prices: Arc<AtomicBool>,
    listen_key_calls: Arc<Mutex<Vec<String>>>,
}

fn api_error(status: StatusCode, code: i64, msg: &str) -> Response {
    (status, Json(json!({ "code": code, "msg": msg }))).into_response()
}

fn kline_row(open_time: i64, close: &str) -> Value {
    json!([
        open_time, "100.5", "101.0", "99.8", close, "10.2",
        open_time + 59_999, "1027.35", 42, "4.1", "413.0", "0"
    ])
}

fn kline_frame(open_time: i64, close: &str) -> String {
    json!({
        "e": "kline",
        "E": open_time + 1_000,
        "s": "BTCUSDT",
        "k": {
            "t": open_time, "T": open_time + 59_999, "s": "BTCUSDT",
            "i": "1m", "f": 1, "L": 2,
            "o": "100.5", "c": close, "h": "101.0", "l": "99.8",
            "v": "10.2", "n": 2, "x": true,
            "q": "1027.35", "V": "4.1", "Q": "413.0", "B": "0"
        }
    })
    .to_string()
}

async fn ping() -> Json<Value> {
    Json(json!({}))
}

async fn time() -> Json<Value> {
    Json(json!({ "serverTime": T0 }))
}

async fn depth(Query(query): Query<HashMap<String, String>>) -> Response {
    if query.get("symbol").map(String::as_str) != Some("BNBBTC") {
        return api_error(StatusCode::BAD_REQUEST, -1121, "Invalid symbol.");
    }
    Json(json!({
        "lastUpdateId": 1027024,
        "bids": [["4.00000000", "431.00000000"]],
        "asks": [["4.00000200", "12.00000000"]]
    }))
    .into_response()
}

async fn klines(
    State(exchange): State<Exchange>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    exchange.kline_queries.lock().unwrap().push(query.clone());
    let rows = if query.get("symbol").map(String::as_str) == Some("BROKEN") {
        vec![kline_row(T0, "100.9"), kline_row(T0 + 60_000, "?")]
    } else {
        vec![kline_row(T0, "100.9"), kline_row(T0 + 60_000, "101.2")]
    };
    Json(Value::Array(rows))
}

async fn agg_trades(
    State(exchange): State<Exchange>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    exchange.agg_trade_queries.lock().unwrap().push(query);
    Json(json!([
        { "a": 26129, "p": "0.01633102", "q": "4.70443515", "f": 27781, "l": 27781,
          "T": T0, "m": true, "M": true },
        { "a": 26130, "p": "0.01633200", "q": "1.00000000", "f": 27782, "l": 27784,
          "T": T0 + 250, "m": false, "M": true }
    ]))
}

async fn ticker_24h(Query(query): Query<HashMap<String, String>>) -> Response {
    let Some(symbol) = query.get("symbol") else {
        return api_error(StatusCode::BAD_REQUEST, -1102, "Mandatory parameter 'symbol' was not sent.");
    };
    Json(json!({
        "symbol": symbol,
        "priceChange": "-94.99999800",
        "priceChangePercent": "-95.960",
        "weightedAvgPrice": "0.29628482",
        "prevClosePrice": "0.10002000",
        "lastPrice": "4.00000200",
        "lastQty": "200.00000000",
        "bidPrice": "4.00000000",
        "askPrice": "4.00000200",
        "openPrice": "99.00000000",
        "highPrice": "100.00000000",
        "lowPrice": "0.10000000",
        "volume": "8913.30000000",
        "openTime": T0 - 86_400_000,
        "closeTime": T0,
        "firstId": 28385,
        "lastId": 28460,
        "count": 76
    }))
    .into_response()
}

async fn prices(State(exchange): State<Exchange>) -> Json<Value> {
    let last = if exchange.broken_prices.load(Ordering::SeqCst) { "n/a" } else { "0.00251800" };
    Json(json!([
        { "symbol": "LTCBTC", "price": "4.00000200" },
        { "symbol": "ETHBTC", "price": "0.07946600" },
        { "symbol": "BNBBTC", "price": last }
    ]))
}

async fn book_tickers() -> Json<Value> {
    Json(json!([
        { "symbol": "LTCBTC", "bidPrice": "4.00000000", "bidQty": "431.00000000",
          "askPrice": "4.00000200", "askQty": "9.00000000" },
        { "symbol": "ETHBTC", "bidPrice": "0.07946700", "bidQty": "9.00000000",
          "askPrice": "100000.00000000", "askQty": "1000.00000000" }
    ]))
}

async fn user_data_stream(
    State(exchange): State<Exchange>,
    headers: HeaderMap,
    method: axum::http::Method,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if headers.get("X-MBX-APIKEY").and_then(|v| v.to_str().ok()) != Some(API_KEY) {
        return api_error(StatusCode::UNAUTHORIZED, -2014, "API-key format invalid.");
    }
    exchange
        .listen_key_calls
        .lock()
        .unwrap()
        .push(format!("{} {}", method, query.get("listenKey").cloned().unwrap_or_default()));

    if method == axum::http::Method::POST {
        Json(json!({ "listenKey": LISTEN_KEY })).into_response()
    } else {
        Json(json!({})).into_response()
    }
}

async fn stream(Path(name): Path<String>, ws: WebSocketUpgrade) -> Response {
    match name.as_str() {
        "btcusdt@kline_1m" => ws.on_upgrade(push_then_close).into_response(),
        "btcusdt@kline_1h" => ws.on_upgrade(push_then_hold).into_response(),
        _ => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn push_then_close(mut socket: WebSocket) {
    for (i, close) in ["100.1", "bogus", "100.2", "100.3"].iter().enumerate() {
        let frame = kline_frame(T0 + i as i64 * 60_000, close);
        if socket.send(Message::Text(frame)).await.is_err() {
            return;
        }
    }
    let _ = socket.send(Message::Close(None)).await;
}

async fn push_then_hold(mut socket: WebSocket) {
    if socket.send(Message::Text(kline_frame(T0, "100.9"))).await.is_err() {
        return;
    }
    while let Some(Ok(msg)) = socket.recv().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }
}

async fn spawn_exchange() -> (ClientConfig, Exchange) {
    let exchange = Exchange::default();
    let app = Router::new()
        .route("/api/v3/ping", get(ping))
        .route("/api/v3/time", get(time))
        .route("/api/v3/depth", get(depth))
        .route("/api/v3/klines", get(klines))
        .route("/api/v3/aggTrades", get(agg_trades))
        .route("/api/v3/ticker/24hr", get(ticker_24h))
        .route("/api/v3/ticker/price", get(prices))
        .route("/api/v3/ticker/bookTicker", get(book_tickers))
        .route(
            "/api/v3/userDataStream",
            post(user_data_stream).put(user_data_stream).delete(user_data_stream),
        )
        .route("/ws/:stream", get(stream))
        .with_state(exchange.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = ClientConfig {
        rest_url: format!("http://{}", addr),
        ws_url: format!("ws://{}/ws", addr),
        api_key: Some(API_KEY.to_string()),
        request_timeout_secs: 5,
        stream_buffer: 16,
    };
    (config, exchange)
}

#[tokio::test]
async fn test_ping_and_server_time() {
    let (config, _) = spawn_exchange().await;
    let client = BinanceClient::new(&config).unwrap();

    client.ping().await.unwrap();
    let time = client.server_time().await.unwrap();
    assert_eq!(time.to_rfc3339(), "2023-11-14T22:13:20+00:00");
}

#[tokio::test]
async fn test_order_book() {
    let (config, _) = spawn_exchange().await;
    let client = BinanceClient::new(&config).unwrap();

    let book = client
        .order_book(&OrderBookRequest::new("BNBBTC").limit(5))
        .await
        .unwrap();
    assert_eq!(book.last_update_id, 1027024);
    assert_eq!(book.best_bid().unwrap().quantity, dec!(431));
    assert_eq!(book.spread(), Some(dec!(0.000002)));
}

#[tokio::test]
async fn test_api_error_is_surfaced() {
    let (config, _) = spawn_exchange().await;
    let client = BinanceClient::new(&config).unwrap();

    match client.order_book(&OrderBookRequest::new("NOPE")).await {
        Err(ClientError::Api { status, code, message }) => {
            assert_eq!(status, 400);
            assert_eq!(code, -1121);
            assert_eq!(message, "Invalid symbol.");
        }
        other => panic!("expected API error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_klines_with_independent_bounds() {
    let (config, exchange) = spawn_exchange().await;
    let client = BinanceClient::new(&config).unwrap();

    let start = Utc.timestamp_millis_opt(T0).unwrap();
    let end = Utc.timestamp_millis_opt(T0 + 3_600_000).unwrap();
    let request = KlinesRequest::new("BTCUSDT", Interval::M1)
        .limit(2)
        .start_time(start)
        .end_time(end);
    let klines = assert_ok!(client.klines(&request).await);

    assert_eq!(klines.len(), 2);
    assert_eq!(klines[0].open, dec!(100.5));
    assert_eq!(klines[1].close, dec!(101.2));
    assert_eq!(klines[0].open_time.timestamp_millis(), T0);

    let queries = exchange.kline_queries.lock().unwrap().clone();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0]["startTime"], T0.to_string());
    assert_eq!(queries[0]["endTime"], (T0 + 3_600_000).to_string());
    assert_eq!(queries[0]["interval"], "1m");
    assert_eq!(queries[0]["limit"], "2");
}

#[tokio::test]
async fn test_kline_batch_fails_atomically() {
    let (config, _) = spawn_exchange().await;
    let client = BinanceClient::new(&config).unwrap();

    let err = assert_err!(
        client
            .klines(&KlinesRequest::new("BROKEN", Interval::M1))
            .await
    );
    assert!(err.is_conversion());
}

#[tokio::test]
async fn test_listen_key_lifecycle() {
    let (config, exchange) = spawn_exchange().await;
    let client = BinanceClient::new(&config).unwrap();

    let key = client.start_user_data_stream().await.unwrap();
    assert_eq!(key, ListenKey(LISTEN_KEY.to_string()));
    client.keep_alive_user_data_stream(&key).await.unwrap();
    client.close_user_data_stream(&key).await.unwrap();

    let calls = exchange.listen_key_calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![
            "POST ".to_string(),
            format!("PUT {}", LISTEN_KEY),
            format!("DELETE {}", LISTEN_KEY),
        ]
    );

    let wrong_key = ClientConfig {
        api_key: Some("other".to_string()),
        ..config
    };
    let client = BinanceClient::new(&wrong_key).unwrap();
    assert!(matches!(
        client.start_user_data_stream().await,
        Err(ClientError::Api { status: 401, code: -2014, .. })
    ));
}

#[tokio::test]
async fn test_kline_stream_over_websocket() {
    let (config, _) = spawn_exchange().await;
    let client = BinanceClient::new(&config).unwrap();

    let mut stream = client
        .open_kline_stream(CancellationToken::new(), "BTCUSDT", Interval::M1)
        .await
        .unwrap();
    assert_eq!(stream.name(), "btcusdt@kline_1m");

    let mut closes = Vec::new();
    while let Some(event) = timeout(Duration::from_secs(5), stream.recv()).await.unwrap() {
        assert_eq!(event.event.symbol, "BTCUSDT");
        closes.push(event.kline.close);
    }
    // the "bogus" tick is dropped
    assert_eq!(closes, vec![dec!(100.1), dec!(100.2), dec!(100.3)]);

    timeout(Duration::from_secs(5), stream.closed()).await.unwrap();
    assert_eq!(stream.state(), StreamState::Closed);
}

#[tokio::test]
async fn test_rejected_stream() {
    let (config, _) = spawn_exchange().await;
    let client = BinanceClient::new(&config).unwrap();

    let result = client
        .open_kline_stream(CancellationToken::new(), "ETHUSDT", Interval::M1)
        .await;
    match result {
        Err(ClientError::Subscription { stream, .. }) => assert_eq!(stream, "ethusdt@kline_1m"),
        other => panic!("expected subscription error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cancel_websocket_stream() {
    let (config, _) = spawn_exchange().await;
    let client = BinanceClient::new(&config).unwrap();
    let cancel = CancellationToken::new();

    let mut stream = client
        .open_kline_stream(cancel.clone(), "BTCUSDT", Interval::H1)
        .await
        .unwrap();
    let first = timeout(Duration::from_secs(5), stream.recv()).await.unwrap();
    assert!(first.is_some());

    cancel.cancel();

    let next = timeout(Duration::from_secs(5), stream.recv()).await.unwrap();
    assert!(next.is_none());
    timeout(Duration::from_secs(5), stream.closed()).await.unwrap();
}

#[tokio::test]
async fn test_agg_trades_query_and_decode() {
    let (config, exchange) = spawn_exchange().await;
    let client = BinanceClient::new(&config).unwrap();

    let request = AggTradesRequest {
        from_id: Some(26129),
        start_time: Some(Utc.timestamp_millis_opt(T0 - 60_000).unwrap()),
        end_time: Some(Utc.timestamp_millis_opt(T0).unwrap()),
        limit: Some(2),
        ..AggTradesRequest::new("BNBBTC")
    };
    let trades = assert_ok!(client.agg_trades(&request).await);

    assert_eq!(trades.len(), 2);
    assert_eq!(trades[0].id, 26129);
    assert_eq!(trades[0].price, dec!(0.01633102));
    assert!(trades[0].buyer_maker);
    assert_eq!(trades[1].last_trade_id, 27784);
    assert_eq!(trades[1].timestamp.timestamp_millis(), T0 + 250);

    let queries = exchange.agg_trade_queries.lock().unwrap().clone();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0]["symbol"], "BNBBTC");
    assert_eq!(queries[0]["fromId"], "26129");
    assert_eq!(queries[0]["startTime"], (T0 - 60_000).to_string());
    assert_eq!(queries[0]["endTime"], T0.to_string());
    assert_eq!(queries[0]["limit"], "2");
}

#[tokio::test]
async fn test_ticker_24h() {
    let (config, _) = spawn_exchange().await;
    let client = BinanceClient::new(&config).unwrap();

    let ticker = assert_ok!(client.ticker_24h("BNBBTC").await);
    assert_eq!(ticker.symbol, "BNBBTC");
    assert_eq!(ticker.price_change, dec!(-94.999998));
    assert_eq!(ticker.high_price, dec!(100));
    assert_eq!(ticker.close_time.timestamp_millis(), T0);
    assert_eq!(ticker.count, 76);
}

#[tokio::test]
async fn test_all_prices() {
    let (config, exchange) = spawn_exchange().await;
    let client = BinanceClient::new(&config).unwrap();

    let prices = assert_ok!(client.all_prices().await);
    let symbols: Vec<_> = prices.iter().map(|p| p.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["LTCBTC", "ETHBTC", "BNBBTC"]);
    assert_eq!(prices[2].price, dec!(0.002518));

    // One unparseable price rejects the whole list.
    exchange.broken_prices.store(true, Ordering::SeqCst);
    let err = assert_err!(client.all_prices().await);
    assert!(err.is_conversion());
}

#[tokio::test]
async fn test_all_book_tickers() {
    let (config, _) = spawn_exchange().await;
    let client = BinanceClient::new(&config).unwrap();

    let books = assert_ok!(client.all_book_tickers().await);
    assert_eq!(books.len(), 2);
    assert_eq!(books[0].bid_qty, dec!(431));
    assert_eq!(books[0].spread(), dec!(0.000002));
    assert_eq!(books[1].ask_qty, dec!(1000));
}
