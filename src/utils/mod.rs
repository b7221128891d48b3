//! Small helpers shared across the clients.
//!
//! - [`duration`] - `10s` / `1m30s` style duration parsing and formatting
//! - [`mask`] - secret masking for log output

pub mod duration;
pub mod mask;

pub use duration::{format_duration, parse_duration};
pub use mask::{mask_connection_string, mask_secret};
