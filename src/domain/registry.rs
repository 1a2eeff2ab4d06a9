//! Indicator registry: name → constructor.
//!
//! A registry is assembled with [`RegistryBuilder`] and frozen into an
//! immutable [`IndicatorRegistry`]. The process-wide instance lives in a
//! `OnceCell`; it is filled with the builtin indicators on first access unless
//! [`install`] supplied a different registry before that.

use std::collections::BTreeMap;

use once_cell::sync::OnceCell;
use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::error::{ConfigError, ConfigIssue};
use crate::domain::indicator::{
    BollingerConfig, EmaConfig, Indicator, IndicatorConfig, MacdConfig, RsiConfig, SmaConfig,
};

/// Builds a validated-later config from a raw option mapping.
pub type Constructor = fn(&Map<String, Value>) -> Result<IndicatorConfig, String>;

#[derive(Debug, Clone)]
pub struct Entry {
    name: String,
    constructor: Constructor,
}

impl Entry {
    /// Canonical name; aliases resolve to the entry of their target.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Construct and validate a config from raw options.
    pub fn build(&self, options: &Map<String, Value>) -> Result<IndicatorConfig, ConfigError> {
        let invalid = |reason: String| {
            ConfigError::single(ConfigIssue::InvalidIndicatorConfig {
                name: self.name.clone(),
                reason,
            })
        };
        let config = (self.constructor)(options).map_err(invalid)?;
        config.validate_config().map_err(invalid)?;
        debug!(indicator = %self.name, config = %config, "indicator config built");
        Ok(config)
    }

    pub fn default_config(&self) -> Result<IndicatorConfig, ConfigError> {
        self.build(&Map::new())
    }
}

fn normalise(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: BTreeMap<String, Entry>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The five builtin variants plus the bollinger spellings.
    pub fn with_builtins() -> Self {
        Self::new()
            .register("rsi", |o| RsiConfig::from_options(o).map(IndicatorConfig::Rsi))
            .register("ema", |o| EmaConfig::from_options(o).map(IndicatorConfig::Ema))
            .register("sma", |o| SmaConfig::from_options(o).map(IndicatorConfig::Sma))
            .register("macd", |o| MacdConfig::from_options(o).map(IndicatorConfig::Macd))
            .register("bollinger_bands", |o| {
                BollingerConfig::from_options(o).map(IndicatorConfig::BollingerBands)
            })
            .alias("bollinger", "bollinger_bands")
            .alias("bb", "bollinger_bands")
            .alias("bollingerbands", "bollinger_bands")
    }

    /// Names are case-insensitive. Registering an existing name replaces it.
    pub fn register(mut self, name: &str, constructor: Constructor) -> Self {
        let key = normalise(name);
        let entry = Entry {
            name: key.clone(),
            constructor,
        };
        self.entries.insert(key, entry);
        self
    }

    /// Make `alias` resolve to the entry currently registered as `target`.
    /// Unknown targets are ignored.
    pub fn alias(mut self, alias: &str, target: &str) -> Self {
        if let Some(entry) = self.entries.get(&normalise(target)).cloned() {
            self.entries.insert(normalise(alias), entry);
        }
        self
    }

    pub fn freeze(self) -> IndicatorRegistry {
        IndicatorRegistry {
            entries: self.entries,
        }
    }
}

/// Read-only name → constructor mapping.
#[derive(Debug)]
pub struct IndicatorRegistry {
    entries: BTreeMap<String, Entry>,
}

impl IndicatorRegistry {
    pub fn builtin() -> Self {
        RegistryBuilder::with_builtins().freeze()
    }

    pub fn lookup(&self, name: &str) -> Result<&Entry, ConfigError> {
        self.entries
            .get(&normalise(name))
            .ok_or_else(|| ConfigError::unknown_indicator(name))
    }

    pub fn build(
        &self,
        name: &str,
        options: &Map<String, Value>,
    ) -> Result<IndicatorConfig, ConfigError> {
        self.lookup(name)?.build(options)
    }

    pub fn default_config(&self, name: &str) -> Result<IndicatorConfig, ConfigError> {
        self.lookup(name)?.default_config()
    }

    /// Canonical names in sorted order, aliases excluded.
    pub fn names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(key, entry)| *key == &entry.name)
            .map(|(key, _)| key.as_str())
            .collect()
    }

    /// Every accepted spelling with the canonical name it resolves to.
    pub fn aliases(&self) -> Vec<(&str, &str)> {
        self.entries
            .iter()
            .filter(|(key, entry)| *key != &entry.name)
            .map(|(key, entry)| (key.as_str(), entry.name.as_str()))
            .collect()
    }
}

static GLOBAL: OnceCell<IndicatorRegistry> = OnceCell::new();

/// Install the process-wide registry. Fails, handing the registry back, once
/// the global registry has been installed or read.
pub fn install(registry: IndicatorRegistry) -> Result<(), IndicatorRegistry> {
    GLOBAL.set(registry)
}

/// The process-wide registry, builtins unless [`install`] ran first.
pub fn global() -> &'static IndicatorRegistry {
    GLOBAL.get_or_init(IndicatorRegistry::builtin)
}
