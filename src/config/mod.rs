//! Configuration loading and typed settings

pub mod loader;
pub mod types;

pub use loader::{load_config, load_risk_table};
pub use types::AppConfig;
