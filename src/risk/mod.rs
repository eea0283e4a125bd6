//! Risk parameter resolution and position sizing
//!
//! - [`RiskResolver`]: balance-bracket lookup returning a [`RiskProfile`]
//! - [`VolatilityRegime`]: ATR-relative market classification
//! - [`size_position`]: quantity that risks the profile's share of balance

mod resolver;
mod sizing;

pub use resolver::{RiskProfile, RiskResolver, VolatilityRegime};
pub use sizing::{size_position, ComputedSize};
