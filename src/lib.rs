//! sigtrader: indicator-driven trading signal engine.
//!
//! Hexagonal architecture: indicators, the rule language and the strategy
//! engine live in [`domain`], port traits in [`ports`], file-backed
//! implementations in [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
pub mod logging;
