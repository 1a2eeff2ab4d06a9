//! Exponential Moving Average indicator.
//!
//! k = 2/(n+1), seed with first SMA, then EMA[i] = C[i]*k + EMA[i-1]*(1-k).
//! The signal compares the latest close with a buffer zone around the EMA:
//! above EMA*(1+buy_buffer%) is bullish, below EMA*(1-sell_buffer%) is
//! bearish. `buffer_percent` sets both sides; the per-side keys override it.

use serde_json::{Map, Value};

use crate::domain::error::EngineError;
use crate::domain::indicator::{
    check_buffer, check_period, checked_closes, ema_series, finite, Indicator, IndicatorKind,
    IndicatorOutput, Options, Signal,
};
use crate::domain::price::PriceWindow;

pub const DEFAULT_PERIOD: usize = 50;
pub const DEFAULT_BUFFER_PERCENT: f64 = 0.2;

#[derive(Debug, Clone, PartialEq)]
pub struct EmaConfig {
    pub period: usize,
    pub buy_buffer_percent: f64,
    pub sell_buffer_percent: f64,
}

impl Default for EmaConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD, DEFAULT_BUFFER_PERCENT)
    }
}

impl EmaConfig {
    /// Symmetric buffer on both sides of the EMA.
    pub fn new(period: usize, buffer_percent: f64) -> Self {
        Self {
            period,
            buy_buffer_percent: buffer_percent,
            sell_buffer_percent: buffer_percent,
        }
    }

    pub fn with_buffers(mut self, buy_buffer_percent: f64, sell_buffer_percent: f64) -> Self {
        self.buy_buffer_percent = buy_buffer_percent;
        self.sell_buffer_percent = sell_buffer_percent;
        self
    }

    pub fn from_options(map: &Map<String, Value>) -> Result<Self, String> {
        let opts = Options::new(
            map,
            &[
                &["period"],
                &["buffer_percent"],
                &["buy_buffer_percent"],
                &["sell_buffer_percent"],
            ],
        )?;
        let both = opts.f64(&["buffer_percent"], DEFAULT_BUFFER_PERCENT)?;
        Ok(Self::new(opts.usize(&["period"], DEFAULT_PERIOD)?, both).with_buffers(
            opts.f64(&["buy_buffer_percent"], both)?,
            opts.f64(&["sell_buffer_percent"], both)?,
        ))
    }

    fn upper_threshold(&self, ema: f64) -> f64 {
        ema * (1.0 + self.buy_buffer_percent / 100.0)
    }

    fn lower_threshold(&self, ema: f64) -> f64 {
        ema * (1.0 - self.sell_buffer_percent / 100.0)
    }
}

impl Indicator for EmaConfig {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Ema
    }

    fn label(&self) -> String {
        format!("EMA({})", self.period)
    }

    fn validate_config(&self) -> Result<(), String> {
        check_period("period", self.period)?;
        check_buffer("buy_buffer_percent", self.buy_buffer_percent)?;
        check_buffer("sell_buffer_percent", self.sell_buffer_percent)
    }

    fn required_length(&self) -> usize {
        self.period
    }

    fn calculate(&self, window: &PriceWindow) -> Result<IndicatorOutput, EngineError> {
        let closes = checked_closes(self, window)?;
        let ema = ema_series(closes, self.period)
            .last()
            .copied()
            .flatten()
            .ok_or_else(|| EngineError::IndicatorComputation {
                indicator: self.label(),
                reason: "no EMA value produced".into(),
            })?;
        let ema = finite(self, "ema", ema)?;
        Ok(IndicatorOutput::new(ema)
            .with("upper_threshold", self.upper_threshold(ema))
            .with("lower_threshold", self.lower_threshold(ema)))
    }

    fn classify(&self, window: &PriceWindow, output: &IndicatorOutput) -> Signal {
        let price = window.last_close();
        if price > self.upper_threshold(output.value) {
            Signal::Bullish
        } else if price < self.lower_threshold(output.value) {
            Signal::Bearish
        } else {
            Signal::Neutral
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn window(prices: &[f64]) -> PriceWindow {
        PriceWindow::from_closes(prices).unwrap()
    }

    #[test]
    fn ema_period_1_is_last_price() {
        let out = EmaConfig::new(1, 0.0)
            .calculate(&window(&[10.0, 20.0, 30.0]))
            .unwrap();
        assert!((out.value - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ema_seed_is_sma() {
        let out = EmaConfig::new(3, 0.0)
            .calculate(&window(&[10.0, 20.0, 30.0]))
            .unwrap();
        assert!((out.value - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn ema_recursive_calculation() {
        let out = EmaConfig::new(3, 0.0)
            .calculate(&window(&[10.0, 20.0, 30.0, 40.0, 50.0]))
            .unwrap();
        let k = 2.0 / 4.0;
        let sma = 20.0;
        let ema_3 = 40.0 * k + sma * (1.0 - k);
        let ema_4 = 50.0 * k + ema_3 * (1.0 - k);
        assert!((out.value - ema_4).abs() < f64::EPSILON);
    }

    #[test]
    fn ema_equal_prices() {
        let out = EmaConfig::new(3, 0.2)
            .calculate(&window(&[100.0; 5]))
            .unwrap();
        assert!((out.value - 100.0).abs() < f64::EPSILON);
        assert_eq!(
            EmaConfig::new(3, 0.2).classify(&window(&[100.0; 5]), &out),
            Signal::Neutral
        );
    }

    #[test]
    fn ema_insufficient_data() {
        let err = EmaConfig::new(5, 0.0)
            .calculate(&window(&[1.0, 2.0, 3.0]))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientData { have: 3, need: 5, .. }
        ));
    }

    #[test]
    fn ema_buffer_zone_signals() {
        let config = EmaConfig::new(3, 1.0);
        let w = window(&[100.0]);
        assert_eq!(
            config.classify(&window(&[101.5]), &IndicatorOutput::new(100.0)),
            Signal::Bullish
        );
        assert_eq!(
            config.classify(&window(&[98.5]), &IndicatorOutput::new(100.0)),
            Signal::Bearish
        );
        assert_eq!(
            config.classify(&window(&[100.5]), &IndicatorOutput::new(100.0)),
            Signal::Neutral
        );
        assert_eq!(config.classify(&w, &IndicatorOutput::new(100.0)), Signal::Neutral);
    }

    #[test]
    fn ema_thresholds_in_components() {
        let out = EmaConfig::new(1, 10.0).calculate(&window(&[100.0])).unwrap();
        assert!((out.component("upper_threshold").unwrap() - 110.0).abs() < 1e-9);
        assert!((out.component("lower_threshold").unwrap() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn ema_validate_config() {
        assert!(EmaConfig::default().is_valid_config());
        assert!(!EmaConfig::new(0, 0.2).is_valid_config());
        assert!(!EmaConfig::new(10, -0.1).is_valid_config());
        assert!(!EmaConfig::new(10, f64::NAN).is_valid_config());
        assert!(!EmaConfig::new(10, 0.2).with_buffers(0.2, -1.0).is_valid_config());
    }

    #[test]
    fn ema_from_options() {
        let map = json!({"period": 21, "buffer_percent": 0.5});
        let config = EmaConfig::from_options(map.as_object().unwrap()).unwrap();
        assert_eq!(config, EmaConfig::new(21, 0.5));
    }

    #[test]
    fn ema_buy_and_sell_buffers_are_separate() {
        let map = json!({"buy_buffer_percent": 0.5, "sell_buffer_percent": 5.0});
        let config = EmaConfig::from_options(map.as_object().unwrap()).unwrap();
        assert_eq!(config, EmaConfig::default().with_buffers(0.5, 5.0));

        let swapped = json!({"sell_buffer_percent": 0.5, "buy_buffer_percent": 5.0});
        let config = EmaConfig::from_options(swapped.as_object().unwrap()).unwrap();
        assert_eq!(config.buy_buffer_percent, 5.0);
        assert_eq!(config.sell_buffer_percent, 0.5);

        // one side overrides the shared buffer
        let mixed = json!({"buffer_percent": 1.0, "sell_buffer_percent": 3.0});
        let config = EmaConfig::from_options(mixed.as_object().unwrap()).unwrap();
        assert_eq!(config.buy_buffer_percent, 1.0);
        assert_eq!(config.sell_buffer_percent, 3.0);
    }

    #[test]
    fn ema_asymmetric_buffer_zone() {
        let config = EmaConfig::new(1, 0.0).with_buffers(0.5, 5.0);
        let out = config.calculate(&window(&[100.0])).unwrap();
        assert!((out.component("upper_threshold").unwrap() - 100.5).abs() < 1e-9);
        assert!((out.component("lower_threshold").unwrap() - 95.0).abs() < 1e-9);

        let at = IndicatorOutput::new(100.0);
        assert_eq!(config.classify(&window(&[101.0]), &at), Signal::Bullish);
        assert_eq!(config.classify(&window(&[97.0]), &at), Signal::Neutral);
        assert_eq!(config.classify(&window(&[94.0]), &at), Signal::Bearish);
    }
}
