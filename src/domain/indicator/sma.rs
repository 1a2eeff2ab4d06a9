//! Simple Moving Average indicator.
//!
//! SMA(n) = mean of the last n closes.
//!
//! The signal depends on the configured crossover type:
//! - `slope`: current SMA against the SMA one bar earlier
//! - `price`: close crossing the SMA between the previous and current bar
//! - `position`: close against the SMA with a buy buffer above it and a sell
//!   buffer below it
//!
//! `slope` and `price` need one extra bar for the previous SMA; with exactly
//! n closes they report NEUTRAL. Their `history_length` is therefore n + 1.

use std::fmt;

use serde_json::{Map, Value};

use crate::domain::error::EngineError;
use crate::domain::indicator::{
    check_buffer, check_period, checked_closes, finite, sma_at, Indicator, IndicatorKind,
    IndicatorOutput, Options, Signal,
};
use crate::domain::price::PriceWindow;

pub const DEFAULT_PERIOD: usize = 20;
pub const DEFAULT_BUFFER_PERCENT: f64 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrossoverType {
    #[default]
    Slope,
    Price,
    Position,
}

impl CrossoverType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "slope" | "sma" => Some(CrossoverType::Slope),
            "price" | "cross" => Some(CrossoverType::Price),
            "position" | "filter" => Some(CrossoverType::Position),
            _ => None,
        }
    }
}

impl fmt::Display for CrossoverType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CrossoverType::Slope => "slope",
            CrossoverType::Price => "price",
            CrossoverType::Position => "position",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SmaConfig {
    pub period: usize,
    pub buy_buffer_percent: f64,
    pub sell_buffer_percent: f64,
    pub crossover_type: CrossoverType,
}

impl Default for SmaConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD, CrossoverType::default())
    }
}

impl SmaConfig {
    pub fn new(period: usize, crossover_type: CrossoverType) -> Self {
        Self {
            period,
            buy_buffer_percent: DEFAULT_BUFFER_PERCENT,
            sell_buffer_percent: DEFAULT_BUFFER_PERCENT,
            crossover_type,
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
                &["crossover_type"],
            ],
        )?;
        let crossover_name = opts.string(&["crossover_type"], "slope")?;
        let crossover_type = CrossoverType::from_name(&crossover_name)
            .ok_or_else(|| format!("unknown crossover_type '{crossover_name}'"))?;
        let both = opts.f64(&["buffer_percent"], DEFAULT_BUFFER_PERCENT)?;
        Ok(Self::new(opts.usize(&["period"], DEFAULT_PERIOD)?, crossover_type).with_buffers(
            opts.f64(&["buy_buffer_percent"], both)?,
            opts.f64(&["sell_buffer_percent"], both)?,
        ))
    }
}

impl Indicator for SmaConfig {
    fn kind(&self) -> IndicatorKind {
        IndicatorKind::Sma
    }

    fn label(&self) -> String {
        format!("SMA({})", self.period)
    }

    fn validate_config(&self) -> Result<(), String> {
        check_period("period", self.period)?;
        check_buffer("buy_buffer_percent", self.buy_buffer_percent)?;
        check_buffer("sell_buffer_percent", self.sell_buffer_percent)
    }

    fn required_length(&self) -> usize {
        self.period
    }

    fn history_length(&self) -> usize {
        match self.crossover_type {
            CrossoverType::Slope | CrossoverType::Price => self.period.saturating_add(1),
            CrossoverType::Position => self.period,
        }
    }

    fn calculate(&self, window: &PriceWindow) -> Result<IndicatorOutput, EngineError> {
        let closes = checked_closes(self, window)?;
        let last = closes.len() - 1;
        let sma = finite(self, "sma", sma_at(closes, last, self.period))?;

        let mut output = IndicatorOutput::new(sma);
        if self.period > 0 && closes.len() > self.period {
            output = output.with("previous", sma_at(closes, last - 1, self.period));
        }
        if sma != 0.0 {
            output = output.with("distance_percent", (closes[last] - sma) / sma * 100.0);
        }
        Ok(output)
    }

    fn classify(&self, window: &PriceWindow, output: &IndicatorOutput) -> Signal {
        let sma = output.value;
        match self.crossover_type {
            CrossoverType::Slope => match output.component("previous") {
                Some(prev) if sma > prev => Signal::Bullish,
                Some(prev) if sma < prev => Signal::Bearish,
                _ => Signal::Neutral,
            },
            CrossoverType::Price => {
                let closes = window.closes();
                let (Some(prev_sma), true) = (output.component("previous"), closes.len() >= 2)
                else {
                    return Signal::Neutral;
                };
                let price = closes[closes.len() - 1];
                let prev_price = closes[closes.len() - 2];
                if prev_price <= prev_sma && price > sma {
                    Signal::Bullish
                } else if prev_price >= prev_sma && price < sma {
                    Signal::Bearish
                } else {
                    Signal::Neutral
                }
            }
            CrossoverType::Position => {
                let price = window.last_close();
                if price > sma * (1.0 + self.buy_buffer_percent / 100.0) {
                    Signal::Bullish
                } else if price < sma * (1.0 - self.sell_buffer_percent / 100.0) {
                    Signal::Bearish
                } else {
                    Signal::Neutral
                }
            }
        }
    }
}
