//! Market data port trait.

use crate::domain::error::EngineError;
use crate::domain::price::PriceWindow;

/// Source of historical prices for the engine.
pub trait MarketDataPort {
    /// The most recent `limit` bars for `symbol`, oldest first.
    ///
    /// Fewer bars may be returned when less history exists; the engine reports
    /// that as insufficient data.
    fn get_price_history(&self, symbol: &str, limit: usize) -> Result<PriceWindow, EngineError>;

    fn list_symbols(&self) -> Result<Vec<String>, EngineError> {
        Ok(Vec::new())
    }
}
