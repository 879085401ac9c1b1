//! Rating resolution for the CobroCharging engine
//!
//! Turns call descriptors into rated segments by walking rating profile
//! activations and rate interval calendars, and lints tariff data at load
//! time.

pub mod resolver;
pub mod validation;

pub use resolver::{pick_rate_interval, CallCost, RatedSegment, RatingResolver};
pub use validation::{first_discontinuous, first_unsane_rate, first_unsane_timing};
