//! Trailing stop state machine
//!
//! ```text
//!   INACTIVE ──profit ≥ activation──▶ ARMED ──new extreme──▶ TRAILING
//!                                       │                       │
//!                                       └──price crosses stop───┴──▶ TRIGGERED
//! ```
//!
//! The state for each position is plain data ([`TrailingState`]) stored on
//! the position and persisted with it; [`TrailingStop`] holds the parameters
//! and advances a state by one price observation.

mod state;

pub use state::{TrailingEvent, TrailingParams, TrailingPhase, TrailingState, TrailingStop};
