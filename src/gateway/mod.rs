//! Order gateway
//!
//! Strategy code speaks in [`OrderIntent`]s. This module owns the
//! translation into exchange parameters, including the hedge / one-way
//! position mode branching, tick and step rounding, and minimum notional.

mod executor;
mod intent;

pub use executor::{remaining_quantity, OrderGateway, ProtectionReport};
pub use intent::{build_params, meet_min_notional, next_client_order_id, OrderIntent, OrderParams};
