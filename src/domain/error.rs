//! Domain error types.
//!
//! Construction-time failures (`ConfigError`, `RuleSyntaxError`) abort strategy
//! creation. Evaluation-time failures are per call and leave every strategy
//! usable for the next window.

use std::fmt;

/// A rule string that could not be tokenized or parsed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("syntax error at position {position} near '{token}': {message}")]
pub struct RuleSyntaxError {
    pub message: String,
    pub token: String,
    pub position: usize,
}

impl RuleSyntaxError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// One problem found while validating a strategy configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigIssue {
    UnknownIndicator { name: String },
    InvalidIndicatorConfig { name: String, reason: String },
    DuplicateIndicator { key: String },
    InvalidRule { rule: String, error: RuleSyntaxError },
    UnknownPreset { name: String },
    Malformed { reason: String },
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigIssue::UnknownIndicator { name } => write!(f, "unknown indicator '{name}'"),
            ConfigIssue::InvalidIndicatorConfig { name, reason } => {
                write!(f, "invalid config for indicator '{name}': {reason}")
            }
            ConfigIssue::DuplicateIndicator { key } => {
                write!(f, "indicator key '{key}' is used more than once")
            }
            ConfigIssue::InvalidRule { rule, error } => write!(f, "invalid rule '{rule}': {error}"),
            ConfigIssue::UnknownPreset { name } => write!(f, "unknown preset '{name}'"),
            ConfigIssue::Malformed { reason } => write!(f, "malformed config: {reason}"),
        }
    }
}

/// All validation failures discovered while building a strategy.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}", describe_issues(.issues))]
pub struct ConfigError {
    pub issues: Vec<ConfigIssue>,
}

impl ConfigError {
    pub fn single(issue: ConfigIssue) -> Self {
        Self {
            issues: vec![issue],
        }
    }

    pub fn unknown_indicator(name: &str) -> Self {
        Self::single(ConfigIssue::UnknownIndicator {
            name: name.to_string(),
        })
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::single(ConfigIssue::Malformed {
            reason: reason.into(),
        })
    }

    /// Name carried by the first unknown-indicator issue, if any.
    pub fn unknown_indicator_name(&self) -> Option<&str> {
        self.issues.iter().find_map(|issue| match issue {
            ConfigIssue::UnknownIndicator { name } => Some(name.as_str()),
            _ => None,
        })
    }
}

fn describe_issues(issues: &[ConfigIssue]) -> String {
    match issues {
        [] => "invalid configuration".to_string(),
        [only] => only.to_string(),
        many => {
            let mut out = format!("{} configuration errors:", many.len());
            for issue in many {
                out.push_str(&format!("\n  - {issue}"));
            }
            out
        }
    }
}

/// A rule that parsed but cannot be applied to the current snapshot.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleEvaluationError {
    #[error("field '{field}' is not present in the indicator snapshot")]
    MissingField { field: String },

    #[error("type mismatch on '{field}': {reason}")]
    TypeMismatch { field: String, reason: String },
}

/// Top-level error type for sigtrader.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    RuleSyntax(#[from] RuleSyntaxError),

    #[error("insufficient data for {indicator}: have {have} prices, need {need}")]
    InsufficientData {
        indicator: String,
        have: usize,
        need: usize,
    },

    #[error("computation failed for {indicator}: {reason}")]
    IndicatorComputation { indicator: String, reason: String },

    #[error(transparent)]
    RuleEvaluation(#[from] RuleEvaluationError),

    #[error("price window is empty")]
    EmptyWindow,

    #[error("market data error for {symbol}: {reason}")]
    MarketData { symbol: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Errors a caller can absorb by holding and trying again on the next tick.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::InsufficientData { .. }
                | EngineError::IndicatorComputation { .. }
                | EngineError::RuleEvaluation(_)
                | EngineError::EmptyWindow
                | EngineError::MarketData { .. }
        )
    }
}

impl From<&EngineError> for std::process::ExitCode {
    fn from(err: &EngineError) -> Self {
        let code: u8 = match err {
            EngineError::Io(_) => 1,
            EngineError::Config(_) => 2,
            EngineError::RuleSyntax(_) => 4,
            EngineError::InsufficientData { .. }
            | EngineError::EmptyWindow
            | EngineError::MarketData { .. } => 5,
            EngineError::IndicatorComputation { .. } | EngineError::RuleEvaluation(_) => 6,
        };
        std::process::ExitCode::from(code)
    }
}
