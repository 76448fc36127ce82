use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::ClientResult;

const BINANCE_US_API: &str = "https://api.binance.us";
const BINANCE_US_WS: &str = "wss://stream.binance.us:9443/ws";
const BINANCE_TESTNET_API: &str = "https://testnet.binance.vision";
const BINANCE_TESTNET_WS: &str = "wss://testnet.binance.vision/ws";

/// Connection settings for [`crate::exchange::BinanceClient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub rest_url: String,
    pub ws_url: String,
    /// Only needed for listen-key requests.
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
    /// Capacity of each stream's event channel.
    pub stream_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            rest_url: BINANCE_US_API.to_string(),
            ws_url: BINANCE_US_WS.to_string(),
            api_key: None,
            request_timeout_secs: 10,
            stream_buffer: 256,
        }
    }
}

impl ClientConfig {
    pub fn testnet() -> Self {
        Self {
            rest_url: BINANCE_TESTNET_API.to_string(),
            ws_url: BINANCE_TESTNET_WS.to_string(),
            ..Self::default()
        }
    }

    /// Loads `.env`, then the optional config file, then `BINANCE_*`
    /// environment variables; later sources win.
    pub fn load(path: Option<&str>) -> ClientResult<Self> {
        let _ = dotenvy::dotenv();

        let file = match path {
            Some(path) => File::with_name(path).required(true),
            None => File::with_name("binance").required(false),
        };

        let settings = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix("BINANCE").try_parsing(true))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn from_toml(text: &str) -> ClientResult<Self> {
        let settings = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !(self.rest_url.starts_with("http://") || self.rest_url.starts_with("https://")) {
            errors.push(format!("rest_url must be an http(s) URL: {}", self.rest_url));
        }
        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            errors.push(format!("ws_url must be a ws(s) URL: {}", self.ws_url));
        }
        if self.request_timeout_secs == 0 {
            errors.push("request_timeout_secs must be > 0".to_string());
        }
        if self.stream_buffer == 0 {
            errors.push("stream_buffer must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
