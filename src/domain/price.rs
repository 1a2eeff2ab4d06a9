//! Price observations and the bounded window indicators read from.

use chrono::NaiveDateTime;

use crate::domain::error::EngineError;

/// A single observation. Only `close` is required; OHLC fields are optional.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub timestamp: Option<NaiveDateTime>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
}

impl PriceBar {
    pub fn from_close(close: f64) -> Self {
        Self {
            timestamp: None,
            open: None,
            high: None,
            low: None,
            close,
        }
    }
}

/// Ordered observations, oldest first. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceWindow {
    bars: Vec<PriceBar>,
    closes: Vec<f64>,
}

impl PriceWindow {
    pub fn new(bars: Vec<PriceBar>) -> Result<Self, EngineError> {
        if bars.is_empty() {
            return Err(EngineError::EmptyWindow);
        }
        let closes = bars.iter().map(|b| b.close).collect();
        Ok(Self { bars, closes })
    }

    pub fn from_closes(closes: &[f64]) -> Result<Self, EngineError> {
        Self::new(closes.iter().copied().map(PriceBar::from_close).collect())
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn closes(&self) -> &[f64] {
        &self.closes
    }

    pub fn last_close(&self) -> f64 {
        // Non-empty by construction.
        self.closes[self.closes.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Always false; kept for API symmetry with slices.
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_is_rejected() {
        assert!(matches!(
            PriceWindow::new(Vec::new()),
            Err(EngineError::EmptyWindow)
        ));
        assert!(matches!(
            PriceWindow::from_closes(&[]),
            Err(EngineError::EmptyWindow)
        ));
    }

    #[test]
    fn closes_preserve_order() {
        let window = PriceWindow::from_closes(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(window.closes(), &[1.0, 2.0, 3.0]);
        assert_eq!(window.len(), 3);
        assert!((window.last_close() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn bars_keep_optional_fields() {
        let bar = PriceBar {
            timestamp: None,
            open: Some(100.0),
            high: Some(110.0),
            low: Some(90.0),
            close: 105.0,
        };
        let window = PriceWindow::new(vec![PriceBar::from_close(7.0), bar.clone()]).unwrap();
        assert_eq!(window.bars()[1], bar);
        assert_eq!(window.bars()[0].high, None);
        assert_eq!(window.closes(), &[7.0, 105.0]);
    }
}
