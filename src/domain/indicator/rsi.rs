//! RSI (Relative Strength Index) indicator implementation.
//!
//! Uses Wilder's smoothing for average gain/loss calculation:
//! - First average: simple mean of gains/losses over first n price changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 100
//!
//! Needs n + 1 prices (n price changes) before the first value exists.

use serde_json::{Map, Value};

use crate::domain::error::EngineError;
use crate::domain::indicator::{
    check_period, checked_closes, finite, Indicator, IndicatorKind, IndicatorOutput, Options,
    Signal,
};
use crate::domain::price::PriceWindow;

pub const DEFAULT_PERIOD: usize = 14;
pub const DEFAULT_OVERSOLD: f64 = 30.0;
pub const DEFAULT_OVERBOUGHT: f64 = 70.0;

#[derive(Debug, Clone, PartialEq)]
pub struct RsiConfig {
    pub period: usize,
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for RsiConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            oversold: DEFAULT_OVERSOLD,
            overbought: DEFAULT_OVERBOUGHT,
        }
    }
}

impl RsiConfig {
    pub fn new(period: usize, oversold: f64, overbought: f64) -> Self {
        Self {
            period,
            oversold,
            overbought,
        }
    }

    pub fn from_options(map: &Map<String, Value>) -> Result<Self, String> {
        let oversold_keys: &[&str] = &["oversold", "oversold_threshold"];
        let overbought_keys: &[&str] = &["overbought", "overbought_threshold"];
        let opts = Options::new(map, &[&["period"], oversold_keys, overbought_keys])?;
        Ok(Self {
            period: opts.usize(&["period"], DEFAULT_PERIOD)?,
            oversold: opts.f64(oversold_keys, DEFAULT_OVERSOLD)?,
            overbought: opts.f64(overbought_keys, DEFAULT_OVERBOUGHT)?,
        })
    }
}

/// Wilder-smoothed RSI at the last index of `closes`. Requires `closes.len() > period`.
fn wilder_rsi(closes: &[f64], period: usize) -> (f64, f64, f64) {
    let mut gains = Vec::with_capacity(closes.len() - 1);
    let mut losses = Vec::with_capacity(closes.len() - 1);
    for pair in closes.windows(2) {
        let change = pair[1] - pair[0];
        gains.push(if change > 0.0 { change } else { 0.0 });
        losses.push(if change < 0.0 { -change } else { 0.0 });
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
    }

    let rsi = if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    };
    (rsi, avg_gain, avg_loss)
}

impl Indicator for RsiConfig {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Rsi
    }

    fn label(&self) -> String {
        format!("RSI({})", self.period)
    }

    fn validate_config(&self) -> Result<(), String> {
        check_period("period", self.period)?;
        if !(0.0 < self.oversold && self.oversold < self.overbought && self.overbought < 100.0) {
            return Err(format!(
                "thresholds must satisfy 0 < oversold < overbought < 100, got {} / {}",
                self.oversold, self.overbought
            ));
        }
        Ok(())
    }

    fn required_length(&self) -> usize {
        self.period.saturating_add(1)
    }

    fn calculate(&self, window: &PriceWindow) -> Result<IndicatorOutput, EngineError> {
        let closes = checked_closes(self, window)?;
        let (rsi, avg_gain, avg_loss) = wilder_rsi(closes, self.period);
        Ok(IndicatorOutput::new(finite(self, "rsi", rsi)?)
            .with("avg_gain", avg_gain)
            .with("avg_loss", avg_loss))
    }

    fn classify(&self, _window: &PriceWindow, output: &IndicatorOutput) -> Signal {
        if output.value <= self.oversold {
            Signal::Oversold
        } else if output.value >= self.overbought {
            Signal::Overbought
        } else {
            Signal::Neutral
        }
    }
}
