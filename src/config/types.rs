//! Configuration types

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Main application configuration
///
/// All `*_pct` values are fractions: `0.02` means 2%.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Binance Futures connection settings
    #[serde(default)]
    pub binance: BinanceConfig,
    /// Balance-bracket risk table
    #[serde(default)]
    pub risk: RiskConfig,
    /// Stop-loss / take-profit calculation
    #[serde(default)]
    pub sltp: SltpConfig,
    /// Trailing stop parameters
    #[serde(default)]
    pub trailing: TrailingConfig,
    /// Telegram notifications (optional)
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

/// Binance Futures configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceConfig {
    /// API key for signed endpoints
    #[serde(default)]
    pub api_key: Option<String>,
    /// API secret for HMAC signing
    #[serde(default)]
    pub api_secret: Option<String>,
    /// Base URL for the USDⓈ-M futures REST API
    #[serde(default = "default_binance_rest_url")]
    pub rest_url: String,
    /// recvWindow sent with signed requests, in milliseconds
    #[serde(default = "default_recv_window")]
    pub recv_window_ms: u64,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Margin asset used for balance lookups
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_secret: None,
            rest_url: default_binance_rest_url(),
            recv_window_ms: default_recv_window(),
            request_timeout_seconds: default_request_timeout(),
            quote_asset: default_quote_asset(),
        }
    }
}

fn default_binance_rest_url() -> String {
    "https://fapi.binance.com".to_string()
}

fn default_recv_window() -> u64 {
    5000
}

fn default_request_timeout() -> u64 {
    10
}

fn default_quote_asset() -> String {
    "USDT".to_string()
}

/// One row of the risk table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskBracket {
    /// Inclusive upper bound of the balance bracket
    pub max_balance: Decimal,
    /// Fraction of balance risked per trade
    pub risk_per_trade: Decimal,
    pub leverage: u32,
    pub sl_pct: Decimal,
    pub tp_pct: Decimal,
}

/// Risk table configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Ordered brackets, ascending by `max_balance`
    #[serde(default = "default_brackets")]
    pub brackets: Vec<RiskBracket>,
    /// Optional JSON file replacing `brackets`
    #[serde(default)]
    pub table_path: Option<String>,
    /// ATR/price at or below which the market counts as low volatility
    #[serde(default = "default_low_volatility_pct")]
    pub low_volatility_atr_pct: Decimal,
    /// ATR/price at or above which the market counts as high volatility
    #[serde(default = "default_high_volatility_pct")]
    pub high_volatility_atr_pct: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            brackets: default_brackets(),
            table_path: None,
            low_volatility_atr_pct: default_low_volatility_pct(),
            high_volatility_atr_pct: default_high_volatility_pct(),
        }
    }
}

fn default_brackets() -> Vec<RiskBracket> {
    vec![
        RiskBracket {
            max_balance: dec!(100),
            risk_per_trade: dec!(0.02),
            leverage: 10,
            sl_pct: dec!(0.02),
            tp_pct: dec!(0.04),
        },
        RiskBracket {
            max_balance: dec!(1000),
            risk_per_trade: dec!(0.015),
            leverage: 10,
            sl_pct: dec!(0.02),
            tp_pct: dec!(0.03),
        },
        RiskBracket {
            max_balance: dec!(10000),
            risk_per_trade: dec!(0.01),
            leverage: 5,
            sl_pct: dec!(0.015),
            tp_pct: dec!(0.03),
        },
        RiskBracket {
            max_balance: dec!(100000),
            risk_per_trade: dec!(0.0075),
            leverage: 3,
            sl_pct: dec!(0.015),
            tp_pct: dec!(0.025),
        },
    ]
}

fn default_low_volatility_pct() -> Decimal {
    dec!(0.005)
}

fn default_high_volatility_pct() -> Decimal {
    dec!(0.02)
}

/// Stop-loss / take-profit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SltpConfig {
    /// Use ATR distances when an ATR value is available
    #[serde(default)]
    pub use_atr: bool,
    /// Kline interval for the ATR
    #[serde(default = "default_atr_interval")]
    pub atr_interval: String,
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,
    #[serde(default = "default_sl_atr_multiplier")]
    pub sl_atr_multiplier: Decimal,
    #[serde(default = "default_tp_atr_multiplier")]
    pub tp_atr_multiplier: Decimal,
    /// Lower clamp for the ATR stop distance, as a fraction of entry
    #[serde(default = "default_min_sl_pct")]
    pub min_sl_pct: Decimal,
    /// Upper clamp for the ATR stop distance, as a fraction of entry
    #[serde(default = "default_max_sl_pct")]
    pub max_sl_pct: Decimal,
    /// How long a fetched ATR is reused
    #[serde(default = "default_atr_cache_seconds")]
    pub atr_cache_seconds: u64,
}

impl Default for SltpConfig {
    fn default() -> Self {
        Self {
            use_atr: false,
            atr_interval: default_atr_interval(),
            atr_period: default_atr_period(),
            sl_atr_multiplier: default_sl_atr_multiplier(),
            tp_atr_multiplier: default_tp_atr_multiplier(),
            min_sl_pct: default_min_sl_pct(),
            max_sl_pct: default_max_sl_pct(),
            atr_cache_seconds: default_atr_cache_seconds(),
        }
    }
}

fn default_atr_interval() -> String {
    "15m".to_string()
}

fn default_atr_period() -> usize {
    14
}

fn default_sl_atr_multiplier() -> Decimal {
    dec!(2.0)
}

fn default_tp_atr_multiplier() -> Decimal {
    dec!(3.0)
}

fn default_min_sl_pct() -> Decimal {
    dec!(0.005)
}

fn default_max_sl_pct() -> Decimal {
    dec!(0.05)
}

fn default_atr_cache_seconds() -> u64 {
    300
}

/// Step of the dynamic callback function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackStep {
    /// Peak profit at which this callback starts to apply
    pub profit_pct: Decimal,
    pub callback_pct: Decimal,
}

/// Partial take-profit threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialExit {
    pub profit_pct: Decimal,
    /// Fraction of the remaining quantity to close
    pub fraction: Decimal,
}

/// Trailing parameters for one volatility regime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeTrailing {
    pub activation_pct: Decimal,
    pub callback_pct: Decimal,
}

/// Per-regime overrides of the base trailing parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegimeOverrides {
    #[serde(default)]
    pub low: Option<RegimeTrailing>,
    #[serde(default)]
    pub normal: Option<RegimeTrailing>,
    #[serde(default)]
    pub high: Option<RegimeTrailing>,
}

/// Trailing stop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_activation_pct")]
    pub activation_pct: Decimal,
    #[serde(default = "default_callback_pct")]
    pub callback_pct: Decimal,
    /// Dynamic callback steps, ascending by `profit_pct`
    #[serde(default)]
    pub callback_steps: Vec<CallbackStep>,
    /// Break-even-or-better floor once armed
    #[serde(default)]
    pub min_profit_pct: Option<Decimal>,
    #[serde(default)]
    pub partial_exits: Vec<PartialExit>,
    /// Largest accepted move between two consecutive ticks
    #[serde(default = "default_max_price_deviation_pct")]
    pub max_price_deviation_pct: Decimal,
    #[serde(default)]
    pub regimes: RegimeOverrides,
}

impl Default for TrailingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            activation_pct: default_activation_pct(),
            callback_pct: default_callback_pct(),
            callback_steps: Vec::new(),
            min_profit_pct: None,
            partial_exits: Vec::new(),
            max_price_deviation_pct: default_max_price_deviation_pct(),
            regimes: RegimeOverrides::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_activation_pct() -> Decimal {
    dec!(0.02)
}

fn default_callback_pct() -> Decimal {
    dec!(0.01)
}

fn default_max_price_deviation_pct() -> Decimal {
    dec!(0.10)
}

/// Telegram notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_telegram_url")]
    pub api_url: String,
}

fn default_telegram_url() -> String {
    "https://api.telegram.org".to_string()
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Delay between polling ticks in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Path of the persisted position table
    #[serde(default = "default_state_file")]
    pub state_file: String,
    /// Consecutive per-symbol failures before an alert is sent
    #[serde(default = "default_alert_after_failures")]
    pub alert_after_failures: u32,
    /// Fixed backoff before the single transient retry, in milliseconds
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
    /// Restrict management to these symbols (empty = all)
    #[serde(default)]
    pub symbols: Vec<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            poll_interval_seconds: default_poll_interval(),
            state_file: default_state_file(),
            alert_after_failures: default_alert_after_failures(),
            retry_backoff_ms: default_retry_backoff(),
            symbols: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval() -> u64 {
    30
}

fn default_state_file() -> String {
    "active_positions.json".to_string()
}

fn default_alert_after_failures() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    1000
}

/// API credentials for signed requests
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl ApiCredentials {
    pub fn new(api_key: String, api_secret: String) -> Self {
        Self { api_key, api_secret }
    }
}

impl BinanceConfig {
    /// Credentials when both key and secret are configured
    pub fn credentials(&self) -> Option<ApiCredentials> {
        match (&self.api_key, &self.api_secret) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => {
                Some(ApiCredentials::new(key.clone(), secret.clone()))
            }
            _ => None,
        }
    }
}
