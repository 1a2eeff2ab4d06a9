//! Bollinger Bands indicator.
//!
//! Bollinger Bands consist of:
//! - Middle: Simple Moving Average (SMA) over n periods
//! - Upper: Middle + (std_dev × StdDev)
//! - Lower: Middle - (std_dev × StdDev)
//!
//! Where StdDev is population standard deviation (divides by N, not N-1).
//!
//! Default parameters: period=20, std_dev=2.0, squeeze threshold 2%
//!
//! Derived values: band width, band width as a percentage of the middle band,
//! %B (position of the close between the bands, 0.5 when they collapse) and a
//! squeeze flag (1.0 when the width percentage is under the threshold).

use serde_json::{Map, Value};

use crate::domain::error::EngineError;
use crate::domain::indicator::{
    check_period, checked_closes, finite, sma_at, Indicator, IndicatorKind, IndicatorOutput,
    Options, Signal,
};
use crate::domain::price::PriceWindow;

pub const DEFAULT_PERIOD: usize = 20;
pub const DEFAULT_STD_DEV: f64 = 2.0;
pub const DEFAULT_SQUEEZE_THRESHOLD_PERCENT: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerConfig {
    pub period: usize,
    pub std_dev: f64,
    pub squeeze_threshold_percent: f64,
}

impl Default for BollingerConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            std_dev: DEFAULT_STD_DEV,
            squeeze_threshold_percent: DEFAULT_SQUEEZE_THRESHOLD_PERCENT,
        }
    }
}

impl BollingerConfig {
    pub fn new(period: usize, std_dev: f64) -> Self {
        Self {
            period,
            std_dev,
            squeeze_threshold_percent: DEFAULT_SQUEEZE_THRESHOLD_PERCENT,
        }
    }

    pub fn from_options(map: &Map<String, Value>) -> Result<Self, String> {
        let std_keys: &[&str] = &["std_dev", "std_multiplier"];
        let squeeze_keys: &[&str] = &["squeeze_threshold_percent", "squeeze_threshold"];
        let opts = Options::new(map, &[&["period"], std_keys, squeeze_keys])?;
        Ok(Self {
            period: opts.usize(&["period"], DEFAULT_PERIOD)?,
            std_dev: opts.f64(std_keys, DEFAULT_STD_DEV)?,
            squeeze_threshold_percent: opts.f64(squeeze_keys, DEFAULT_SQUEEZE_THRESHOLD_PERCENT)?,
        })
    }
}

impl Indicator for BollingerConfig {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::BollingerBands
    }

    fn label(&self) -> String {
        format!("BB({},{})", self.period, self.std_dev)
    }

    fn validate_config(&self) -> Result<(), String> {
        check_period("period", self.period)?;
        if self.std_dev.is_nan() || self.std_dev < 0.0 {
            return Err(format!("std_dev must be non-negative, got {}", self.std_dev));
        }
        if self.squeeze_threshold_percent.is_nan() || self.squeeze_threshold_percent < 0.0 {
            return Err(format!(
                "squeeze_threshold_percent must be non-negative, got {}",
                self.squeeze_threshold_percent
            ));
        }
        Ok(())
    }

    fn required_length(&self) -> usize {
        self.period
    }

    fn calculate(&self, window: &PriceWindow) -> Result<IndicatorOutput, EngineError> {
        let closes = checked_closes(self, window)?;
        let last = closes.len() - 1;
        let middle = finite(self, "middle band", sma_at(closes, last, self.period))?;
        if middle == 0.0 {
            return Err(EngineError::IndicatorComputation {
                indicator: self.label(),
                reason: "middle band is zero, band width percent undefined".into(),
            });
        }

        let variance = closes[last + 1 - self.period..]
            .iter()
            .map(|c| {
                let diff = c - middle;
                diff * diff
            })
            .sum::<f64>()
            / self.period as f64;
        let band = self.std_dev * variance.sqrt();
        let upper = middle + band;
        let lower = middle - band;

        let band_width = upper - lower;
        let band_width_percent = band_width / middle * 100.0;
        let percent_b = if band_width > 0.0 {
            (closes[last] - lower) / band_width
        } else {
            0.5
        };
        let squeeze = if band_width_percent < self.squeeze_threshold_percent {
            1.0
        } else {
            0.0
        };

        Ok(IndicatorOutput::new(middle)
            .with("upper", finite(self, "upper band", upper)?)
            .with("middle", middle)
            .with("lower", finite(self, "lower band", lower)?)
            .with("band_width", band_width)
            .with("band_width_percent", band_width_percent)
            .with("percent_b", percent_b)
            .with("squeeze", squeeze))
    }

    fn classify(&self, window: &PriceWindow, output: &IndicatorOutput) -> Signal {
        let price = window.last_close();
        let upper = output.component("upper").unwrap_or(output.value);
        let lower = output.component("lower").unwrap_or(output.value);
        if price < lower {
            Signal::Oversold
        } else if price > upper {
            Signal::Overbought
        } else {
            Signal::Neutral
        }
    }
}
