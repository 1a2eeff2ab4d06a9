//! MACD (Moving Average Convergence Divergence) indicator.
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) of MACD Line
//! Histogram = MACD Line - Signal Line
//!
//! Default parameters: fast=12, slow=26, signal=9
//!
//! The MACD line exists from bar slow-1 and the signal line from bar
//! slow+signal-2. One more bar gives the previous histogram, so slow+signal
//! closes are required to detect a zero crossing.

use serde_json::{Map, Value};

use crate::domain::error::EngineError;
use crate::domain::indicator::{
    check_period, checked_closes, ema_series, finite, Indicator, IndicatorKind,
    IndicatorOutput, Options, Signal,
};
use crate::domain::price::PriceWindow;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

#[derive(Debug, Clone, PartialEq)]
pub struct MacdConfig {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl Default for MacdConfig {
    fn default() -> Self {
        Self {
            fast: DEFAULT_FAST,
            slow: DEFAULT_SLOW,
            signal: DEFAULT_SIGNAL,
        }
    }
}

impl MacdConfig {
    pub fn new(fast: usize, slow: usize, signal: usize) -> Self {
        Self { fast, slow, signal }
    }

    pub fn from_options(map: &Map<String, Value>) -> Result<Self, String> {
        let fast_keys: &[&str] = &["fast", "fast_period"];
        let slow_keys: &[&str] = &["slow", "slow_period"];
        let signal_keys: &[&str] = &["signal", "signal_period"];
        let opts = Options::new(map, &[fast_keys, slow_keys, signal_keys])?;
        Ok(Self {
            fast: opts.usize(fast_keys, DEFAULT_FAST)?,
            slow: opts.usize(slow_keys, DEFAULT_SLOW)?,
            signal: opts.usize(signal_keys, DEFAULT_SIGNAL)?,
        })
    }
}

/// The MACD, signal and histogram series; entries are `None` until defined.
struct MacdSeries {
    macd: Vec<Option<f64>>,
    signal: Vec<Option<f64>>,
}

impl MacdSeries {
    fn histogram(&self, i: usize) -> Option<f64> {
        Some(self.macd[i]? - self.signal[i]?)
    }
}

fn macd_series(closes: &[f64], fast: usize, slow: usize, signal_period: usize) -> MacdSeries {
    let ema_fast = ema_series(closes, fast);
    let ema_slow = ema_series(closes, slow);

    let macd: Vec<Option<f64>> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();

    let mut signal = vec![None; closes.len()];
    let defined: Vec<f64> = macd.iter().flatten().copied().collect();
    let offset = closes.len() - defined.len();
    for (i, value) in ema_series(&defined, signal_period).into_iter().enumerate() {
        signal[offset + i] = value;
    }

    MacdSeries { macd, signal }
}

impl Indicator for MacdConfig {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Macd
    }

    fn label(&self) -> String {
        format!("MACD({},{},{})", self.fast, self.slow, self.signal)
    }

    fn validate_config(&self) -> Result<(), String> {
        check_period("fast period", self.fast)?;
        check_period("slow period", self.slow)?;
        check_period("signal period", self.signal)?;
        if self.fast >= self.slow {
            return Err(format!(
                "fast period ({}) must be less than slow period ({})",
                self.fast, self.slow
            ));
        }
        Ok(())
    }

    fn required_length(&self) -> usize {
        self.slow.saturating_add(self.signal)
    }

    fn calculate(&self, window: &PriceWindow) -> Result<IndicatorOutput, EngineError> {
        let closes = checked_closes(self, window)?;
        let series = macd_series(closes, self.fast, self.slow, self.signal);
        let last = closes.len() - 1;

        let missing = || EngineError::IndicatorComputation {
            indicator: self.label(),
            reason: "MACD series undefined at the latest bar".into(),
        };
        let macd = finite(self, "macd", series.macd[last].ok_or_else(missing)?)?;
        let signal = finite(self, "signal", series.signal[last].ok_or_else(missing)?)?;
        let histogram = macd - signal;
        let previous = series.histogram(last - 1).ok_or_else(missing)?;

        Ok(IndicatorOutput::new(macd)
            .with("macd", macd)
            .with("signal", signal)
            .with("histogram", histogram)
            .with("previous_histogram", previous))
    }

    fn classify(&self, _window: &PriceWindow, output: &IndicatorOutput) -> Signal {
        let (Some(histogram), Some(previous)) = (
            output.component("histogram"),
            output.component("previous_histogram"),
        ) else {
            return Signal::Neutral;
        };
        if previous <= 0.0 && histogram > 0.0 {
            Signal::Bullish
        } else if previous >= 0.0 && histogram < 0.0 {
            Signal::Bearish
        } else {
            Signal::Neutral
        }
    }
}
