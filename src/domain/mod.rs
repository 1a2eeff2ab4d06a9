//! Core domain types and logic.

pub mod price;
pub mod indicator;
pub mod registry;
pub mod rule;
pub mod rule_parser;
pub mod rule_eval;
pub mod decision;
pub mod strategy;
pub mod factory;
pub mod error;
