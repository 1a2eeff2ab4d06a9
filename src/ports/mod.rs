//! Port traits the core depends on.

pub mod config_port;
pub mod market_data_port;
