//! Strategy construction from presets and raw configuration mappings.
//!
//! A raw configuration is a JSON object:
//!
//! ```text
//! {
//!   "name": "my strategy",                      optional
//!   "indicators": [{"name": "rsi", "config": {"period": 14, "alias": "rsi14"}}],
//!   "rules": ["rsi14 < 30"],
//!   "aggregation": "all" | "any",               optional
//!   "confidence_policy": "strict" | "partial_agreement",   optional
//!   "min_confidence": 0.6                       optional, 0..=1
//! }
//! ```
//!
//! Every indicator and rule is checked before anything is returned, and all
//! problems are reported together in one [`ConfigError`].
//!
//! A mapping of the form `{"preset": "rsi_macd", "name": "..."}` selects a
//! preset instead. INI files reach the same mapping through
//! [`mapping_from_config`].

use std::collections::HashSet;

use serde_json::{json, Map, Value};
use tracing::info;

use crate::domain::error::{ConfigError, ConfigIssue};
use crate::domain::indicator::Options;
use crate::domain::registry::IndicatorRegistry;
use crate::domain::strategy::{
    Aggregation, ConfidencePolicy, ConfiguredIndicator, ParsedRule, StrategyConfig,
};
use crate::ports::config_port::ConfigPort;

const DEFAULT_NAME: &str = "custom";
const STRATEGY_SECTION: &str = "strategy";
const RULES_SECTION: &str = "rules";
const INDICATOR_PREFIX: &str = "indicator.";
const STRATEGY_KEYS: [&str; 4] = ["name", "aggregation", "confidence_policy", "min_confidence"];

const PRESETS: [&str; 8] = [
    "simple_rsi",
    "rsi_macd",
    "rsi_macd_ema",
    "bollinger_rsi",
    "sma_crossover",
    "macd_crossover",
    "ema_trend",
    "conservative",
];

pub fn preset_names() -> &'static [&'static str] {
    &PRESETS
}

fn preset_definition(name: &str) -> Option<Value> {
    let raw = match name {
        "simple_rsi" => json!({
            "indicators": [
                {"name": "rsi", "config": {"period": 14, "oversold": 25, "overbought": 75}}
            ],
            "rules": ["rsi == 'OVERSOLD' OR rsi == 'OVERBOUGHT'"],
        }),
        "rsi_macd" => json!({
            "indicators": [
                {"name": "rsi", "config": {"period": 14}},
                {"name": "macd", "config": {"fast": 12, "slow": 26, "signal": 9}}
            ],
            "rules": [
                "rsi < 30 AND macd_histogram > 0",
                "rsi > 70 AND macd_histogram < 0"
            ],
            "aggregation": "any",
        }),
        "rsi_macd_ema" => json!({
            "indicators": [
                {"name": "rsi", "config": {"period": 14, "oversold": 30, "overbought": 70}},
                {"name": "macd", "config": {"fast": 12, "slow": 26, "signal": 9}},
                {"name": "ema", "config": {"period": 50, "buffer_percent": 0.2}}
            ],
            "rules": [
                "rsi == 'OVERSOLD' AND macd_histogram > 0",
                "rsi == 'OVERBOUGHT' AND macd_histogram < 0",
                "macd == 'BULLISH' OR macd == 'BEARISH'"
            ],
            "aggregation": "any",
            "min_confidence": 0.6,
        }),
        "bollinger_rsi" => json!({
            "indicators": [
                {"name": "bollinger_bands", "config": {"period": 20, "std_dev": 2.0}},
                {"name": "rsi", "config": {"period": 14}}
            ],
            "rules": [
                "bollinger_bands == 'OVERSOLD' AND rsi < 40",
                "bollinger_bands == 'OVERBOUGHT' AND rsi > 60"
            ],
            "aggregation": "any",
        }),
        "sma_crossover" => json!({
            "indicators": [
                {"name": "sma", "config": {
                    "alias": "sma_fast", "period": 10, "buffer_percent": 0.1,
                    "crossover_type": "price"
                }},
                {"name": "sma", "config": {"alias": "sma_slow", "period": 30}},
                {"name": "rsi", "config": {"period": 14, "oversold": 40, "overbought": 60}}
            ],
            "rules": [
                "sma_fast == 'BULLISH' AND rsi < 60",
                "sma_fast == 'BEARISH' AND rsi > 40"
            ],
            "aggregation": "any",
        }),
        "macd_crossover" => json!({
            "indicators": [
                {"name": "macd", "config": {"fast": 12, "slow": 26, "signal": 9}}
            ],
            "rules": ["macd != 'NEUTRAL'"],
        }),
        "ema_trend" => json!({
            "indicators": [
                {"name": "ema", "config": {"period": 21, "buffer_percent": 0.5}}
            ],
            "rules": ["ema != 'NEUTRAL'"],
        }),
        "conservative" => json!({
            "indicators": [
                {"name": "rsi", "config": {"period": 21, "oversold": 25, "overbought": 75}},
                {"name": "macd", "config": {"fast": 12, "slow": 26, "signal": 9}},
                {"name": "ema", "config": {"period": 100, "buffer_percent": 0.1}}
            ],
            "rules": [
                "rsi == 'OVERSOLD' AND macd == 'BULLISH' AND ema == 'BULLISH'",
                "rsi == 'OVERBOUGHT' AND macd == 'BEARISH' AND ema == 'BEARISH'"
            ],
            "aggregation": "any",
            "min_confidence": 0.8,
        }),
        _ => return None,
    };
    Some(raw)
}

/// Build one of the named presets.
pub fn create_preset(
    name: &str,
    registry: &IndicatorRegistry,
) -> Result<StrategyConfig, ConfigError> {
    let key = name.trim().to_ascii_lowercase();
    let mut raw = preset_definition(&key).ok_or_else(|| {
        ConfigError::single(ConfigIssue::UnknownPreset {
            name: name.to_string(),
        })
    })?;
    if let Value::Object(map) = &mut raw {
        map.insert("name".into(), Value::String(key));
    }
    create_custom(&raw, registry)
}

/// Build a strategy from a raw configuration mapping.
pub fn create_custom(
    raw: &Value,
    registry: &IndicatorRegistry,
) -> Result<StrategyConfig, ConfigError> {
    let root = raw
        .as_object()
        .ok_or_else(|| ConfigError::malformed("configuration must be a mapping"))?;

    let mut issues = Vec::new();

    let name = match root.get("name") {
        None | Some(Value::Null) => DEFAULT_NAME.to_string(),
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(other) => {
            issues.push(malformed(format!("'name' must be a non-empty string, got {other}")));
            DEFAULT_NAME.to_string()
        }
    };

    let indicators = build_indicators(root, registry, &mut issues);
    let rules = parse_rules(root, &mut issues);
    let aggregation = read_aggregation(root, &mut issues);
    let confidence_policy = read_confidence_policy(root, &mut issues);
    let min_confidence = read_min_confidence(root, &mut issues);

    if !issues.is_empty() {
        return Err(ConfigError { issues });
    }

    let config = StrategyConfig::new(&name, indicators, rules)
        .with_aggregation(aggregation)
        .with_confidence_policy(confidence_policy)
        .with_min_confidence(min_confidence);

    info!(
        strategy = %config.name,
        indicators = config.indicators.len(),
        rules = config.rules.len(),
        aggregation = %config.aggregation,
        "strategy created"
    );
    Ok(config)
}

/// Build from a raw mapping, honouring a `preset` key.
///
/// With a preset, `name`, `aggregation`, `confidence_policy` and
/// `min_confidence` override the preset's values; `indicators` and `rules`
/// are not allowed.
pub fn create(raw: &Value, registry: &IndicatorRegistry) -> Result<StrategyConfig, ConfigError> {
    let Some(preset) = raw.get("preset").filter(|p| !p.is_null()) else {
        return create_custom(raw, registry);
    };
    let preset = preset
        .as_str()
        .ok_or_else(|| ConfigError::malformed(format!("'preset' must be a string, got {preset}")))?;
    let mut config = create_preset(preset, registry)?;

    let Some(root) = raw.as_object() else {
        return Ok(config);
    };
    let mut issues = Vec::new();
    for key in ["indicators", "rules"] {
        if root.contains_key(key) {
            issues.push(malformed(format!("'{key}' cannot be combined with a preset")));
        }
    }
    match root.get("name") {
        None | Some(Value::Null) => {}
        Some(Value::String(name)) if !name.trim().is_empty() => {
            config.name = name.trim().to_string();
        }
        Some(other) => {
            issues.push(malformed(format!("'name' must be a non-empty string, got {other}")));
        }
    }
    if root.contains_key("aggregation") {
        config.aggregation = read_aggregation(root, &mut issues);
    }
    if root.contains_key("confidence_policy") {
        config.confidence_policy = read_confidence_policy(root, &mut issues);
    }
    if root.contains_key("min_confidence") {
        config.min_confidence = read_min_confidence(root, &mut issues);
    }

    if !issues.is_empty() {
        return Err(ConfigError { issues });
    }
    Ok(config)
}

/// Convert an INI-style configuration into the raw mapping.
///
/// `[strategy]` carries the top-level keys, each `[indicator.<alias>]` section
/// one indicator (`type` plus options), and `[rules]` one rule per key. Rule
/// keys are ordered shortest first, then lexically, so `rule2` precedes
/// `rule10`.
pub fn mapping_from_config(config: &dyn ConfigPort) -> Result<Value, ConfigError> {
    let mut issues = Vec::new();
    let mut root = Map::new();

    if let Some(preset) = config.get_string(STRATEGY_SECTION, "preset") {
        root.insert("preset".into(), Value::String(preset));
    }
    for key in config.keys(STRATEGY_SECTION) {
        if key == "preset" {
            continue;
        }
        if !STRATEGY_KEYS.contains(&key.as_str()) {
            issues.push(malformed(format!("unknown key '{key}' in [{STRATEGY_SECTION}]")));
            continue;
        }
        if let Some(value) = config.get_string(STRATEGY_SECTION, &key) {
            root.insert(key, Value::String(value));
        }
    }

    let mut indicators = Vec::new();
    for section in config.sections() {
        let Some(alias) = section.strip_prefix(INDICATOR_PREFIX) else {
            if section != STRATEGY_SECTION && section != RULES_SECTION {
                issues.push(malformed(format!("unknown section [{section}]")));
            }
            continue;
        };
        let Some(kind) = config.get_string(&section, "type") else {
            issues.push(malformed(format!("[{section}] has no 'type'")));
            continue;
        };
        let mut options = Map::new();
        options.insert(Options::ALIAS_KEY.into(), Value::String(alias.to_string()));
        for key in config.keys(&section) {
            if key == "type" {
                continue;
            }
            if let Some(value) = config.get_string(&section, &key) {
                options.insert(key, Value::String(value));
            }
        }
        indicators.push(json!({"name": kind, "config": options}));
    }

    let mut rule_keys = config.keys(RULES_SECTION);
    rule_keys.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    let rules: Vec<Value> = rule_keys
        .iter()
        .filter_map(|key| config.get_string(RULES_SECTION, key))
        .map(Value::String)
        .collect();

    if !issues.is_empty() {
        return Err(ConfigError { issues });
    }
    if !root.contains_key("preset") {
        root.insert("indicators".into(), Value::Array(indicators));
        root.insert("rules".into(), Value::Array(rules));
    }
    Ok(Value::Object(root))
}

fn malformed(reason: String) -> ConfigIssue {
    ConfigIssue::Malformed { reason }
}

fn build_indicators(
    root: &Map<String, Value>,
    registry: &IndicatorRegistry,
    issues: &mut Vec<ConfigIssue>,
) -> Vec<ConfiguredIndicator> {
    let entries = match root.get("indicators") {
        Some(Value::Array(entries)) if !entries.is_empty() => entries,
        Some(Value::Array(_)) | None => {
            issues.push(malformed("at least one indicator is required".into()));
            return Vec::new();
        }
        Some(other) => {
            issues.push(malformed(format!("'indicators' must be a sequence, got {other}")));
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    let mut built = Vec::with_capacity(entries.len());
    let empty = Map::new();

    for (index, entry) in entries.iter().enumerate() {
        let Some(entry) = entry.as_object() else {
            issues.push(malformed(format!("indicator #{} must be a mapping", index + 1)));
            continue;
        };
        // `type` is the older spelling of `name`
        let Some(name) = entry
            .get("name")
            .or_else(|| entry.get("type"))
            .and_then(Value::as_str)
        else {
            issues.push(malformed(format!("indicator #{} has no name", index + 1)));
            continue;
        };
        let options = match entry.get("config") {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(options)) => options,
            Some(other) => {
                issues.push(ConfigIssue::InvalidIndicatorConfig {
                    name: name.to_string(),
                    reason: format!("config must be a mapping, got {other}"),
                });
                continue;
            }
        };

        let entry = match registry.lookup(name) {
            Ok(entry) => entry,
            Err(err) => {
                issues.extend(err.issues);
                continue;
            }
        };

        let key = match options.get(Options::ALIAS_KEY) {
            None => entry.name().to_string(),
            Some(Value::String(alias)) if is_identifier(alias.trim()) => alias.trim().to_string(),
            Some(other) => {
                issues.push(ConfigIssue::InvalidIndicatorConfig {
                    name: name.to_string(),
                    reason: format!("alias must be an identifier, got {other}"),
                });
                continue;
            }
        };
        if !seen.insert(key.clone()) {
            issues.push(ConfigIssue::DuplicateIndicator { key });
            continue;
        }

        match entry.build(options) {
            Ok(config) => built.push(ConfiguredIndicator::new(&key, config)),
            Err(err) => issues.extend(err.issues),
        }
    }
    built
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_rules(root: &Map<String, Value>, issues: &mut Vec<ConfigIssue>) -> Vec<ParsedRule> {
    let sources = match root.get("rules") {
        Some(Value::Array(sources)) if !sources.is_empty() => sources,
        Some(Value::Array(_)) | None => {
            issues.push(malformed("at least one rule is required".into()));
            return Vec::new();
        }
        Some(other) => {
            issues.push(malformed(format!("'rules' must be a sequence, got {other}")));
            return Vec::new();
        }
    };

    let mut rules = Vec::with_capacity(sources.len());
    for (index, source) in sources.iter().enumerate() {
        let Some(source) = source.as_str() else {
            issues.push(malformed(format!("rule #{} must be a string", index + 1)));
            continue;
        };
        match ParsedRule::parse(source) {
            Ok(rule) => rules.push(rule),
            Err(error) => issues.push(ConfigIssue::InvalidRule {
                rule: source.to_string(),
                error,
            }),
        }
    }
    rules
}

fn read_aggregation(root: &Map<String, Value>, issues: &mut Vec<ConfigIssue>) -> Aggregation {
    match root.get("aggregation") {
        None | Some(Value::Null) => Aggregation::default(),
        Some(Value::String(s)) => Aggregation::from_name(s).unwrap_or_else(|| {
            issues.push(malformed(format!(
                "unknown aggregation '{s}', expected 'all' or 'any'"
            )));
            Aggregation::default()
        }),
        Some(other) => {
            issues.push(malformed(format!("'aggregation' must be a string, got {other}")));
            Aggregation::default()
        }
    }
}

fn read_confidence_policy(
    root: &Map<String, Value>,
    issues: &mut Vec<ConfigIssue>,
) -> ConfidencePolicy {
    match root.get("confidence_policy") {
        None | Some(Value::Null) => ConfidencePolicy::default(),
        Some(Value::String(s)) => ConfidencePolicy::from_name(s).unwrap_or_else(|| {
            issues.push(malformed(format!(
                "unknown confidence_policy '{s}', expected 'strict' or 'partial_agreement'"
            )));
            ConfidencePolicy::default()
        }),
        Some(other) => {
            issues.push(malformed(format!(
                "'confidence_policy' must be a string, got {other}"
            )));
            ConfidencePolicy::default()
        }
    }
}

fn read_min_confidence(root: &Map<String, Value>, issues: &mut Vec<ConfigIssue>) -> f64 {
    let value = match root.get("min_confidence") {
        None | Some(Value::Null) => return 0.0,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    match value {
        Some(v) if (0.0..=1.0).contains(&v) => v,
        _ => {
            issues.push(malformed(
                "'min_confidence' must be a number between 0 and 1".into(),
            ));
            0.0
        }
    }
}
