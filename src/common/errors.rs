//! Error types for the application

use thiserror::Error;

/// Result type alias using our BotError
pub type Result<T> = std::result::Result<T, BotError>;

/// Subtype of an order rejected by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// `positionSide` does not match the account's position mode (-4061)
    PositionSideMismatch,
    /// `reduceOnly` sent where it is not accepted (-1106)
    ReduceOnlyRejected,
    /// Reduce-only order with nothing left to reduce (-2022)
    NothingToReduce,
    /// Order notional below the symbol floor (-4164)
    NotionalTooSmall,
    /// Not enough margin for the order (-2019)
    InsufficientMargin,
    /// Stop price would trigger immediately (-2021)
    WouldImmediatelyTrigger,
    /// Malformed or out-of-range parameter
    InvalidParameter,
    /// Anything the classifier does not recognise
    Other,
}

impl RejectionKind {
    /// Whether the gateway may correct the parameters and resubmit once
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RejectionKind::PositionSideMismatch | RejectionKind::ReduceOnlyRejected
        )
    }

    /// Map a Binance futures error code to a rejection subtype
    pub fn from_binance_code(code: i64) -> Self {
        match code {
            -4061 => RejectionKind::PositionSideMismatch,
            -1106 => RejectionKind::ReduceOnlyRejected,
            -2022 => RejectionKind::NothingToReduce,
            -4164 => RejectionKind::NotionalTooSmall,
            -2019 | -2018 => RejectionKind::InsufficientMargin,
            -2021 => RejectionKind::WouldImmediatelyTrigger,
            -1102..=-1100 | -1111 | -1013 | -4003 | -4014 => {
                RejectionKind::InvalidParameter
            }
            _ => RejectionKind::Other,
        }
    }
}

/// Main error type for bot operations
#[derive(Error, Debug)]
pub enum BotError {
    /// No balance or invalid account data
    #[error("Invalid account state: {0}")]
    InvalidAccountState(String),

    /// Computed SL/TP violates the ordering invariant
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    /// Order rejected by the exchange
    #[error("Exchange rejected order ({kind:?}, code {code}): {message}")]
    ExchangeRejection {
        code: i64,
        message: String,
        kind: RejectionKind,
    },

    /// Price/ATR feed returned suspicious data
    #[error("Stale or invalid market data: {0}")]
    StaleData(String),

    /// Transient transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded: {message}, retry after {retry_after_seconds:?} seconds")]
    RateLimit {
        message: String,
        retry_after_seconds: Option<u64>,
    },

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// HTTP request errors
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Invalid API response
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Order parameters rejected locally before submission
    #[error("Order precondition failed: {0}")]
    OrderPrecondition(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// State file read/write errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BotError {
    /// Errors worth one more attempt after a backoff
    pub fn is_transient(&self) -> bool {
        match self {
            BotError::Network(_) | BotError::RateLimit { .. } | BotError::Timeout(_) => true,
            BotError::HttpRequest(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// Rejections the gateway can auto-correct
    pub fn is_retryable_rejection(&self) -> bool {
        matches!(self, BotError::ExchangeRejection { kind, .. } if kind.is_retryable())
    }

    pub fn rejection(code: i64, message: impl Into<String>) -> Self {
        BotError::ExchangeRejection {
            code,
            message: message.into(),
            kind: RejectionKind::from_binance_code(code),
        }
    }
}

impl From<std::io::Error> for BotError {
    fn from(err: std::io::Error) -> Self {
        BotError::Persistence(err.to_string())
    }
}
