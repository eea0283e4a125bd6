//! Position manager: reconcile, trail, protect, persist

mod health;
mod manager;

pub use health::HealthStatus;
pub use manager::{OpenOutcome, PositionManager, TickReport};
