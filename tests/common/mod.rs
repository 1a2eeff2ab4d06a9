#![allow(dead_code)]

use sigtrader::domain::error::EngineError;
use sigtrader::domain::price::{PriceBar, PriceWindow};
use sigtrader::ports::market_data_port::MarketDataPort;
use std::cell::RefCell;
use std::collections::HashMap;

pub struct MockMarketData {
    pub data: HashMap<String, Vec<f64>>,
    pub errors: HashMap<String, String>,
    pub requests: RefCell<Vec<(String, usize)>>,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn with_closes(mut self, symbol: &str, closes: Vec<f64>) -> Self {
        self.data.insert(symbol.to_string(), closes);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl MarketDataPort for MockMarketData {
    fn get_price_history(&self, symbol: &str, limit: usize) -> Result<PriceWindow, EngineError> {
        self.requests
            .borrow_mut()
            .push((symbol.to_string(), limit));
        if let Some(reason) = self.errors.get(symbol) {
            return Err(EngineError::MarketData {
                symbol: symbol.to_string(),
                reason: reason.clone(),
            });
        }
        let closes = self.data.get(symbol).cloned().unwrap_or_default();
        let start = closes.len().saturating_sub(limit);
        PriceWindow::from_closes(&closes[start..])
    }

    fn list_symbols(&self) -> Result<Vec<String>, EngineError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

pub fn window(closes: &[f64]) -> PriceWindow {
    PriceWindow::from_closes(closes).unwrap()
}

pub fn bars(closes: &[f64]) -> Vec<PriceBar> {
    closes.iter().copied().map(PriceBar::from_close).collect()
}

/// `n` prices falling by `step` from `start`.
pub fn falling(start: f64, step: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| start - step * i as f64).collect()
}

/// `n` prices rising by `step` from `start`.
pub fn rising(start: f64, step: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| start + step * i as f64).collect()
}

/// Alternating up/down moves around `base`; RSI stays near 50.
pub fn choppy(base: f64, n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| if i % 2 == 0 { base } else { base + 1.0 })
        .collect()
}
