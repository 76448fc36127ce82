use anyhow::{anyhow, Result};
use chrono::{NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use binance_client::config::ClientConfig;
use binance_client::types::{Interval, KlinesRequest, OrderBookRequest};
use binance_client::{BinanceClient, MarketData, MarketStreams};

#[derive(Parser)]
#[command(name = "binance-client")]
#[command(version = "0.1.0")]
#[command(about = "Query Binance.US market data and stream klines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to ./binance.toml if present)
    #[arg(short, long)]
    config: Option<String>,

    /// Use the public testnet endpoints
    #[arg(long)]
    testnet: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Test connectivity
    Ping,
    /// Show server time
    Time,
    /// Show the order book
    Depth {
        #[arg(short, long, default_value = "BTCUSDT")]
        symbol: String,
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },
    /// Fetch historical klines
    Klines {
        #[arg(short, long, default_value = "BTCUSDT")]
        symbol: String,
        /// Interval (1m, 5m, 1h, 1d, ...)
        #[arg(short, long, default_value = "1h")]
        interval: String,
        #[arg(short, long)]
        limit: Option<u32>,
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,
    },
    /// Show 24h statistics for a symbol
    Ticker {
        #[arg(short, long, default_value = "BTCUSDT")]
        symbol: String,
    },
    /// Show the latest price of every symbol
    Prices,
    /// Stream live klines until Ctrl-C
    StreamKlines {
        #[arg(short, long, default_value = "BTCUSDT")]
        symbol: String,
        #[arg(short, long, default_value = "1m")]
        interval: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = if cli.testnet {
        ClientConfig::testnet()
    } else {
        ClientConfig::load(cli.config.as_deref())?
    };
    config
        .validate()
        .map_err(|errors| anyhow!("invalid configuration: {}", errors.join(", ")))?;
    let client = BinanceClient::new(&config)?;

    match cli.command {
        Commands::Ping => {
            client.ping().await?;
            info!("{} is reachable", client.base_url());
        }
        Commands::Time => {
            let time = client.server_time().await?;
            let skew = Utc::now() - time;
            info!("Server time {} (local clock ahead by {} ms)", time, skew.num_milliseconds());
            print_json(&time)?;
        }
        Commands::Depth { symbol, limit } => {
            let book = client
                .order_book(&OrderBookRequest::new(symbol).limit(limit))
                .await?;
            if let (Some(spread), Some(mid)) = (book.spread(), book.mid_price()) {
                info!("Spread {} around mid {}", spread, mid);
            }
            print_json(&book)?;
        }
        Commands::Klines { symbol, interval, limit, start, end } => {
            let mut request = KlinesRequest::new(symbol, interval.parse::<Interval>()?);
            if let Some(limit) = limit {
                request = request.limit(limit);
            }
            if let Some(start) = start {
                request = request.start_time(parse_date(&start)?);
            }
            if let Some(end) = end {
                request = request.end_time(parse_date(&end)?);
            }
            let klines = client.klines(&request).await?;
            info!("Fetched {} klines", klines.len());
            print_json(&klines)?;
        }
        Commands::Ticker { symbol } => {
            print_json(&client.ticker_24h(&symbol).await?)?;
        }
        Commands::Prices => {
            print_json(&client.all_prices().await?)?;
        }
        Commands::StreamKlines { symbol, interval } => {
            let cancel = CancellationToken::new();
            let mut stream = client
                .open_kline_stream(cancel.clone(), &symbol, interval.parse::<Interval>()?)
                .await?;

            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutting down stream");
                    ctrl_c.cancel();
                }
            });

            while let Some(event) = stream.recv().await {
                println!("{}", serde_json::to_string(&event)?);
            }
            if !cancel.is_cancelled() {
                warn!("Stream {} ended by the exchange", stream.name());
            }
        }
    }

    Ok(())
}

fn parse_date(date: &str) -> Result<chrono::DateTime<Utc>> {
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")?;
    let midnight = day
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("invalid date: {}", date))?;
    Ok(Utc.from_utc_datetime(&midnight))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
