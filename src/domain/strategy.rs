//! Strategy configuration and the evaluation engine.
//!
//! One evaluation runs in three steps:
//! 1. every configured indicator is calculated and classified against the
//!    window, producing the snapshot
//! 2. every rule is evaluated against the snapshot
//! 3. the rule outcomes and the directional bias of the signals are
//!    aggregated into a [`Decision`]
//!
//! Nothing is cached between calls, so the same config and window always
//! produce the same decision.

use std::fmt;

use tracing::{debug, error, info, warn};

use crate::domain::decision::{Action, Decision};
use crate::domain::error::{ConfigError, ConfigIssue, EngineError, RuleSyntaxError};
use crate::domain::indicator::{Bias, Indicator, IndicatorConfig, Signal};
use crate::domain::price::PriceWindow;
use crate::domain::rule::Rule;
use crate::domain::rule_eval::{self, Snapshot};
use crate::domain::rule_parser;
use crate::ports::market_data_port::MarketDataPort;

const CONFIDENCE_SCALE: f64 = 10_000.0;

/// How rule outcomes combine before the directional bias is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Aggregation {
    /// Every rule must hold.
    #[default]
    All,
    /// At least one rule must hold.
    Any,
}

impl Aggregation {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "all" | "and" => Some(Aggregation::All),
            "any" | "or" => Some(Aggregation::Any),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Aggregation::All => "all",
            Aggregation::Any => "any",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Confidence reported for HOLD decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfidencePolicy {
    /// HOLD always has confidence 0.
    #[default]
    Strict,
    /// HOLD reports the share of indicators with a neutral signal.
    PartialAgreement,
}

impl ConfidencePolicy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(ConfidencePolicy::Strict),
            "partial_agreement" | "partial" => Some(ConfidencePolicy::PartialAgreement),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConfidencePolicy::Strict => "strict",
            ConfidencePolicy::PartialAgreement => "partial_agreement",
        }
    }
}

impl fmt::Display for ConfidencePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An indicator together with the snapshot key its result is stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfiguredIndicator {
    pub key: String,
    pub config: IndicatorConfig,
}

impl ConfiguredIndicator {
    pub fn new(key: &str, config: IndicatorConfig) -> Self {
        Self {
            key: key.to_string(),
            config,
        }
    }
}

/// A rule and the text it was parsed from.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRule {
    pub source: String,
    pub rule: Rule,
}

impl ParsedRule {
    pub fn parse(source: &str) -> Result<Self, RuleSyntaxError> {
        Ok(Self {
            source: source.trim().to_string(),
            rule: rule_parser::parse(source)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub name: String,
    pub indicators: Vec<ConfiguredIndicator>,
    pub rules: Vec<ParsedRule>,
    pub aggregation: Aggregation,
    pub confidence_policy: ConfidencePolicy,
    /// Directional decisions below this confidence are demoted to HOLD.
    pub min_confidence: f64,
}

impl StrategyConfig {
    pub fn new(name: &str, indicators: Vec<ConfiguredIndicator>, rules: Vec<ParsedRule>) -> Self {
        Self {
            name: name.to_string(),
            indicators,
            rules,
            aggregation: Aggregation::default(),
            confidence_policy: ConfidencePolicy::default(),
            min_confidence: 0.0,
        }
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn with_confidence_policy(mut self, policy: ConfidencePolicy) -> Self {
        self.confidence_policy = policy;
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Longest history any configured indicator needs.
    pub fn required_length(&self) -> usize {
        self.indicators
            .iter()
            .map(|ind| ind.config.required_length())
            .max()
            .unwrap_or(1)
            .max(1)
    }

    /// Bars `evaluate_symbol` fetches: the longest `history_length` of any
    /// indicator, never less than `required_length`.
    pub fn history_length(&self) -> usize {
        self.indicators
            .iter()
            .map(|ind| ind.config.history_length())
            .max()
            .unwrap_or(1)
            .max(self.required_length())
    }

    pub fn evaluate(&self, window: &PriceWindow) -> Result<Decision, EngineError> {
        evaluate(self, window)
    }
}

fn round_confidence(value: f64) -> f64 {
    (value * CONFIDENCE_SCALE).round() / CONFIDENCE_SCALE
}

fn build_snapshot(config: &StrategyConfig, window: &PriceWindow) -> Result<Snapshot, EngineError> {
    let mut snapshot = Snapshot::new();
    for ind in &config.indicators {
        ind.config.validate_config().map_err(|reason| {
            ConfigError::single(ConfigIssue::InvalidIndicatorConfig {
                name: ind.key.clone(),
                reason,
            })
        })?;
        let result = ind.config.evaluate(window)?;
        debug!(
            key = %ind.key,
            indicator = %ind.config,
            value = result.value,
            signal = %result.signal,
            "indicator computed"
        );
        snapshot.insert(ind.key.clone(), result);
    }
    Ok(snapshot)
}

/// Evaluate `config` against `window`.
///
/// Indicator and rule failures propagate; use [`evaluate_or_hold`] to degrade
/// them to HOLD.
pub fn evaluate(config: &StrategyConfig, window: &PriceWindow) -> Result<Decision, EngineError> {
    let snapshot = build_snapshot(config, window)?;

    let rules_matched = config
        .rules
        .iter()
        .map(|r| rule_eval::evaluate(&r.rule, &snapshot))
        .collect::<Result<Vec<bool>, _>>()?;

    let rules_hold = match config.aggregation {
        Aggregation::All => rules_matched.iter().all(|m| *m),
        Aggregation::Any => rules_matched.iter().any(|m| *m),
    };

    let total = snapshot.len();
    let count = |bias: Bias| {
        snapshot
            .values()
            .filter(|r| r.signal.bias() == bias)
            .count()
    };
    let bullish = count(Bias::Bullish);
    let bearish = count(Bias::Bearish);
    let neutral = count(Bias::Neutral);

    let direction = if bullish > bearish {
        Action::Buy
    } else if bearish > bullish {
        Action::Sell
    } else {
        Action::Hold
    };
    let mut action = if rules_hold { direction } else { Action::Hold };

    let ratio = |n: usize| {
        if total == 0 {
            0.0
        } else {
            round_confidence(n as f64 / total as f64)
        }
    };

    let mut confidence = action.bias().map_or(0.0, |bias| ratio(count(bias)));
    let mut demoted = None;
    if action != Action::Hold && confidence < config.min_confidence {
        debug!(
            strategy = %config.name,
            confidence,
            min_confidence = config.min_confidence,
            "confidence below minimum, holding"
        );
        demoted = Some(confidence);
        action = Action::Hold;
    }
    if action == Action::Hold {
        confidence = match config.confidence_policy {
            ConfidencePolicy::Strict => 0.0,
            ConfidencePolicy::PartialAgreement => ratio(neutral),
        };
    }

    info!(
        strategy = %config.name,
        action = %action,
        confidence,
        bullish,
        bearish,
        neutral,
        "decision"
    );

    let reason = build_reason(config, &rules_matched, &snapshot, rules_hold, direction, demoted);
    Ok(Decision {
        action,
        confidence,
        snapshot,
        rules_matched,
        reason,
    })
}

fn build_reason(
    config: &StrategyConfig,
    rules_matched: &[bool],
    snapshot: &Snapshot,
    rules_hold: bool,
    direction: Action,
    demoted: Option<f64>,
) -> String {
    let mut parts = Vec::new();

    let matched: Vec<&str> = config
        .rules
        .iter()
        .zip(rules_matched)
        .filter(|(_, m)| **m)
        .map(|(r, _)| r.source.as_str())
        .collect();
    if rules_hold {
        parts.push(format!("matched {}", matched.join(" | ")));
    } else if matched.is_empty() {
        parts.push("no rule matched".to_string());
    } else {
        parts.push(format!("{} of {} rules matched", matched.len(), rules_matched.len()));
    }

    let active: Vec<String> = snapshot
        .iter()
        .filter(|(_, r)| r.signal != Signal::Neutral)
        .map(|(key, r)| format!("{key} {} ({:.2})", r.signal, r.value))
        .collect();
    if active.is_empty() {
        parts.push("no active signals".to_string());
    } else {
        parts.push(format!("active: {}", active.join(", ")));
    }

    if rules_hold && direction == Action::Hold {
        parts.push("bullish and bearish signals tied".to_string());
    }
    if let Some(confidence) = demoted {
        parts.push(format!(
            "confidence {confidence:.4} below minimum {:.4}",
            config.min_confidence
        ));
    }
    parts.join("; ")
}

/// Evaluate, turning any failure into HOLD with zero confidence.
///
/// Rule evaluation failures point at a broken configuration and are logged at
/// error level; data problems are logged as warnings.
pub fn evaluate_or_hold(config: &StrategyConfig, window: &PriceWindow) -> Decision {
    match evaluate(config, window) {
        Ok(decision) => decision,
        Err(err) => {
            match &err {
                EngineError::RuleEvaluation(_) => {
                    error!(strategy = %config.name, error = %err, "rule evaluation failed, holding");
                }
                e if e.is_recoverable() => {
                    warn!(strategy = %config.name, error = %err, "evaluation skipped, holding");
                }
                _ => {
                    error!(strategy = %config.name, error = %err, "evaluation failed, holding");
                }
            }
            Decision::hold(format!("evaluation failed: {err}"))
        }
    }
}

/// Fetch `history_length()` bars for `symbol` and evaluate them.
pub fn evaluate_symbol(
    config: &StrategyConfig,
    port: &dyn MarketDataPort,
    symbol: &str,
) -> Result<Decision, EngineError> {
    let window = port.get_price_history(symbol, config.history_length())?;
    debug!(symbol, bars = window.len(), "price history loaded");
    evaluate(config, &window)
}
