//! Technical indicator implementations.
//!
//! This module provides the shared vocabulary for indicators:
//! - `Signal`: closed set of qualitative states an indicator can report
//! - `IndicatorKind`: indicator identity, keyed by canonical name
//! - `IndicatorConfig`: validated parameters for one indicator variant
//! - `IndicatorResult`: value, named sub-values and signal for one window
//! - `Indicator`: the capability every variant implements
//!
//! Every calculation reads the whole supplied window and keeps no state
//! between calls.

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::domain::error::EngineError;
use crate::domain::price::PriceWindow;

pub use bollinger::BollingerConfig;
pub use ema::EmaConfig;
pub use macd::MacdConfig;
pub use rsi::RsiConfig;
pub use sma::{CrossoverType, SmaConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Signal {
    Oversold,
    Overbought,
    Bullish,
    Bearish,
    Neutral,
}

/// Direction a signal leans towards when signals are aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl Signal {
    pub const ALL: [Signal; 5] = [
        Signal::Oversold,
        Signal::Overbought,
        Signal::Bullish,
        Signal::Bearish,
        Signal::Neutral,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Signal::Oversold => "OVERSOLD",
            Signal::Overbought => "OVERBOUGHT",
            Signal::Bullish => "BULLISH",
            Signal::Bearish => "BEARISH",
            Signal::Neutral => "NEUTRAL",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn from_name(name: &str) -> Option<Signal> {
        Signal::ALL
            .into_iter()
            .find(|s| s.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Oversold reads as a buying opportunity, overbought as a selling one.
    pub fn bias(&self) -> Bias {
        match self {
            Signal::Oversold | Signal::Bullish => Bias::Bullish,
            Signal::Overbought | Signal::Bearish => Bias::Bearish,
            Signal::Neutral => Bias::Neutral,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorKind {
    Rsi,
    Ema,
    Sma,
    Macd,
    BollingerBands,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 5] = [
        IndicatorKind::Rsi,
        IndicatorKind::Ema,
        IndicatorKind::Sma,
        IndicatorKind::Macd,
        IndicatorKind::BollingerBands,
    ];

    /// Canonical registry name; also the default snapshot key.
    pub fn name(&self) -> &'static str {
        match self {
            IndicatorKind::Rsi => "rsi",
            IndicatorKind::Ema => "ema",
            IndicatorKind::Sma => "sma",
            IndicatorKind::Macd => "macd",
            IndicatorKind::BollingerBands => "bollinger_bands",
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Numeric output of one calculation: a primary value plus named sub-values.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorOutput {
    pub value: f64,
    pub components: BTreeMap<String, f64>,
}

impl IndicatorOutput {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            components: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.components.insert(name.to_string(), value);
        self
    }

    pub fn component(&self, name: &str) -> Option<f64> {
        self.components.get(name).copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorResult {
    pub kind: IndicatorKind,
    pub value: f64,
    pub components: BTreeMap<String, f64>,
    pub signal: Signal,
}

impl IndicatorResult {
    /// `value` is the primary output; anything else is looked up among the components.
    pub fn field(&self, name: &str) -> Option<f64> {
        if name == "value" {
            return Some(self.value);
        }
        self.components.get(name).copied()
    }
}

/// Capability shared by every indicator variant.
pub trait Indicator {
    fn kind(&self) -> IndicatorKind;

    /// Short label with parameters, e.g. `RSI(14)`.
    fn label(&self) -> String;

    /// Reject parameters that cannot produce a meaningful value.
    fn validate_config(&self) -> Result<(), String>;

    fn required_length(&self) -> usize;

    /// Bars to fetch so every signal state is reachable. At least
    /// `required_length`; longer when the signal compares against an earlier bar.
    fn history_length(&self) -> usize {
        self.required_length()
    }

    fn calculate(&self, window: &PriceWindow) -> Result<IndicatorOutput, EngineError>;

    /// Map an already computed output to a signal.
    fn classify(&self, window: &PriceWindow, output: &IndicatorOutput) -> Signal;

    fn is_valid_config(&self) -> bool {
        self.validate_config().is_ok()
    }

    fn get_signal(&self, window: &PriceWindow) -> Result<Signal, EngineError> {
        let output = self.calculate(window)?;
        Ok(self.classify(window, &output))
    }

    /// Calculate and classify in one pass.
    fn evaluate(&self, window: &PriceWindow) -> Result<IndicatorResult, EngineError> {
        let output = self.calculate(window)?;
        let signal = self.classify(window, &output);
        Ok(IndicatorResult {
            kind: self.kind(),
            value: output.value,
            components: output.components,
            signal,
        })
    }
}

/// Validated parameters for one of the closed set of indicator variants.
#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorConfig {
    Rsi(RsiConfig),
    Ema(EmaConfig),
    Sma(SmaConfig),
    Macd(MacdConfig),
    BollingerBands(BollingerConfig),
}

impl IndicatorConfig {
    /// Default parameters for a kind.
    pub fn default_for(kind: IndicatorKind) -> Self {
        match kind {
            IndicatorKind::Rsi => IndicatorConfig::Rsi(RsiConfig::default()),
            IndicatorKind::Ema => IndicatorConfig::Ema(EmaConfig::default()),
            IndicatorKind::Sma => IndicatorConfig::Sma(SmaConfig::default()),
            IndicatorKind::Macd => IndicatorConfig::Macd(MacdConfig::default()),
            IndicatorKind::BollingerBands => {
                IndicatorConfig::BollingerBands(BollingerConfig::default())
            }
        }
    }

    fn as_indicator(&self) -> &dyn Indicator {
        match self {
            IndicatorConfig::Rsi(c) => c,
            IndicatorConfig::Ema(c) => c,
            IndicatorConfig::Sma(c) => c,
            IndicatorConfig::Macd(c) => c,
            IndicatorConfig::BollingerBands(c) => c,
        }
    }
}

impl Indicator for IndicatorConfig {
    fn kind(&self) -> IndicatorKind {
        self.as_indicator().kind()
    }

    fn label(&self) -> String {
        self.as_indicator().label()
    }

    fn validate_config(&self) -> Result<(), String> {
        self.as_indicator().validate_config()
    }

    fn required_length(&self) -> usize {
        self.as_indicator().required_length()
    }

    fn history_length(&self) -> usize {
        self.as_indicator().history_length()
    }

    fn calculate(&self, window: &PriceWindow) -> Result<IndicatorOutput, EngineError> {
        self.as_indicator().calculate(window)
    }

    fn classify(&self, window: &PriceWindow, output: &IndicatorOutput) -> Signal {
        self.as_indicator().classify(window, output)
    }
}

impl fmt::Display for IndicatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Longest lookback any indicator accepts.
pub const MAX_PERIOD: usize = 100_000;

/// Reject a zero period or one beyond [`MAX_PERIOD`].
pub(crate) fn check_period(name: &str, period: usize) -> Result<(), String> {
    if period == 0 {
        return Err(format!("{name} must be positive"));
    }
    if period > MAX_PERIOD {
        return Err(format!("{name} must be at most {MAX_PERIOD}, got {period}"));
    }
    Ok(())
}

/// A buffer zone width in percent; zero disables the buffer.
pub(crate) fn check_buffer(name: &str, percent: f64) -> Result<(), String> {
    if percent.is_nan() || percent < 0.0 {
        return Err(format!("{name} must be non-negative, got {percent}"));
    }
    Ok(())
}

/// Closing prices of `window`, provided there are enough and all are finite.
pub(crate) fn checked_closes<'w>(
    indicator: &dyn Indicator,
    window: &'w PriceWindow,
) -> Result<&'w [f64], EngineError> {
    let need = indicator.required_length();
    let closes = window.closes();
    if closes.len() < need {
        return Err(EngineError::InsufficientData {
            indicator: indicator.label(),
            have: closes.len(),
            need,
        });
    }
    if let Some(pos) = closes.iter().position(|c| !c.is_finite()) {
        return Err(EngineError::IndicatorComputation {
            indicator: indicator.label(),
            reason: format!("non-finite price at index {pos}"),
        });
    }
    Ok(closes)
}

/// Fail with a computation error instead of leaking NaN or infinity.
pub(crate) fn finite(indicator: &dyn Indicator, name: &str, value: f64) -> Result<f64, EngineError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EngineError::IndicatorComputation {
            indicator: indicator.label(),
            reason: format!("{name} is not finite"),
        })
    }
}

/// Arithmetic mean of `values[end + 1 - period..=end]`.
pub(crate) fn sma_at(values: &[f64], end: usize, period: usize) -> f64 {
    let start = end + 1 - period;
    values[start..=end].iter().sum::<f64>() / period as f64
}

/// EMA series with k = 2/(n+1), seeded with the SMA of the first n values.
/// Entries before the seed are `None`.
pub(crate) fn ema_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    if period == 0 {
        out.resize(values.len(), None);
        return out;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = 0.0;
    let mut sum = 0.0;

    for (i, &v) in values.iter().enumerate() {
        if i < period - 1 {
            sum += v;
            out.push(None);
        } else if i == period - 1 {
            sum += v;
            ema = sum / period as f64;
            out.push(Some(ema));
        } else {
            ema = v * k + ema * (1.0 - k);
            out.push(Some(ema));
        }
    }
    out
}

/// Typed reader over an indicator's raw option mapping.
///
/// Each option may be spelled several ways; the first spelling present wins.
/// Keys not listed as known are rejected so typos surface at construction.
pub struct Options<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> Options<'a> {
    pub const ALIAS_KEY: &'static str = "alias";

    pub fn new(map: &'a Map<String, Value>, known: &[&[&str]]) -> Result<Self, String> {
        for key in map.keys() {
            let recognised = key == Self::ALIAS_KEY
                || known.iter().any(|spellings| spellings.contains(&key.as_str()));
            if !recognised {
                return Err(format!("unrecognised option '{key}'"));
            }
        }
        Ok(Self { map })
    }

    fn find<'k>(&self, keys: &[&'k str]) -> Option<(&'k str, &'a Value)> {
        keys.iter().find_map(|k| self.map.get(*k).map(|v| (*k, v)))
    }

    pub fn usize(&self, keys: &[&str], default: usize) -> Result<usize, String> {
        match self.find(keys) {
            None => Ok(default),
            Some((key, value)) => match value {
                Value::Number(n) => {
                    if let Some(u) = n.as_u64() {
                        return Ok(u as usize);
                    }
                    match n.as_f64() {
                        Some(f) if f >= 0.0 && f.fract() == 0.0 => Ok(f as usize),
                        _ => Err(format!("'{key}' must be a positive integer, got {n}")),
                    }
                }
                Value::String(s) => s
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| format!("'{key}' must be a positive integer, got '{s}'")),
                other => Err(format!("'{key}' must be a positive integer, got {other}")),
            },
        }
    }

    pub fn f64(&self, keys: &[&str], default: f64) -> Result<f64, String> {
        match self.find(keys) {
            None => Ok(default),
            Some((key, value)) => match value {
                Value::Number(n) => n
                    .as_f64()
                    .ok_or_else(|| format!("'{key}' must be a number, got {n}")),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| format!("'{key}' must be a number, got '{s}'")),
                other => Err(format!("'{key}' must be a number, got {other}")),
            },
        }
    }

    pub fn string(&self, keys: &[&str], default: &str) -> Result<String, String> {
        match self.find(keys) {
            None => Ok(default.to_string()),
            Some((_, Value::String(s))) => Ok(s.trim().to_string()),
            Some((key, other)) => Err(format!("'{key}' must be a string, got {other}")),
        }
    }
}
