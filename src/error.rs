use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

/// A wire record could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("field `{field}` is not a decimal number: {value:?}")]
    InvalidDecimal { field: &'static str, value: String },

    #[error("field `{field}` must not be negative: {value}")]
    Negative { field: &'static str, value: String },

    #[error("field `{field}` is not a valid millisecond timestamp: {millis}")]
    InvalidTimestamp { field: &'static str, millis: i64 },

    #[error("unknown kline interval: {0:?}")]
    UnknownInterval(String),

    #[error("missing or mistyped field `{0}`")]
    MissingField(&'static str),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("unsupported event type: {0}")]
    UnsupportedEvent(String),
}

impl From<serde_json::Error> for ConversionError {
    fn from(e: serde_json::Error) -> Self {
        ConversionError::Malformed(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error ({status}) {code}: {message}")]
    Api {
        status: u16,
        code: i64,
        message: String,
    },

    #[error("subscription to `{stream}` rejected: {reason}")]
    Subscription { stream: String, reason: String },

    #[error("an API key is required for this operation")]
    MissingApiKey,

    #[error("configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
}

impl ClientError {
    pub fn is_conversion(&self) -> bool {
        matches!(self, ClientError::Conversion(_))
    }
}
