//! CLI definition and dispatch.

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

use crate::adapters::csv_adapter::CsvMarketData;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::decision::Decision;
use crate::domain::error::{ConfigError, ConfigIssue, EngineError};
use crate::domain::factory::{self, create, create_preset, mapping_from_config};
use crate::domain::indicator::Indicator;
use crate::domain::registry::{self, IndicatorRegistry};
use crate::domain::strategy::{self, StrategyConfig};
use crate::ports::market_data_port::MarketDataPort;

#[derive(Parser, Debug)]
#[command(name = "sigtrader", about = "Indicator-driven trading signal engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate a strategy against the latest prices of one or more symbols
    Evaluate {
        #[arg(long, conflicts_with = "strategy", required_unless_present = "strategy")]
        preset: Option<String>,
        #[arg(short, long)]
        strategy: Option<PathBuf>,
        /// Directory holding one <SYMBOL>.csv per symbol
        #[arg(short, long)]
        prices: PathBuf,
        /// Symbols to evaluate; every CSV in the directory when omitted
        #[arg(long = "symbol")]
        symbols: Vec<String>,
        /// Bars to load; never fewer than the strategy needs
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Validate a strategy file (INI or JSON)
    Validate {
        #[arg(short, long)]
        strategy: PathBuf,
    },
    /// List the built-in strategy presets
    Presets,
    /// List the registered indicators
    Indicators,
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Evaluate {
            preset,
            strategy,
            prices,
            symbols,
            limit,
            format,
        } => run_evaluate(
            preset.as_deref(),
            strategy.as_deref(),
            &prices,
            &symbols,
            limit,
            format,
        ),
        Command::Validate { strategy } => run_validate(&strategy),
        Command::Presets => run_presets(),
        Command::Indicators => run_indicators(),
    }
}

/// Load a strategy file: `.json` files hold the raw mapping, anything else is
/// read as INI.
pub fn load_strategy(
    path: &Path,
    registry: &IndicatorRegistry,
) -> Result<StrategyConfig, EngineError> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let raw: serde_json::Value = if is_json {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            ConfigError::malformed(format!("{}: invalid JSON: {}", path.display(), e))
        })?
    } else {
        let adapter = FileConfigAdapter::from_file(path)?;
        mapping_from_config(&adapter)?
    };
    Ok(create(&raw, registry)?)
}

pub fn resolve_strategy(
    preset: Option<&str>,
    strategy_path: Option<&Path>,
    registry: &IndicatorRegistry,
) -> Result<StrategyConfig, EngineError> {
    match (preset, strategy_path) {
        (Some(name), _) => Ok(create_preset(name, registry)?),
        (None, Some(path)) => load_strategy(path, registry),
        (None, None) => {
            Err(ConfigError::malformed("either a preset or a strategy file is required").into())
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IndicatorReport {
    pub kind: &'static str,
    pub value: f64,
    pub signal: &'static str,
    pub components: BTreeMap<String, f64>,
}

#[derive(Debug, Serialize)]
pub struct DecisionReport {
    pub symbol: String,
    pub strategy: String,
    pub action: &'static str,
    pub confidence: f64,
    pub rules_matched: Vec<bool>,
    pub reason: String,
    pub indicators: BTreeMap<String, IndicatorReport>,
}

impl DecisionReport {
    pub fn new(symbol: &str, config: &StrategyConfig, decision: &Decision) -> Self {
        let indicators = decision
            .snapshot
            .iter()
            .map(|(key, result)| {
                let report = IndicatorReport {
                    kind: result.kind.name(),
                    value: result.value,
                    signal: result.signal.name(),
                    components: result.components.clone(),
                };
                (key.clone(), report)
            })
            .collect();
        Self {
            symbol: symbol.to_string(),
            strategy: config.name.clone(),
            action: decision.action.name(),
            confidence: decision.confidence,
            rules_matched: decision.rules_matched.clone(),
            reason: decision.reason.clone(),
            indicators,
        }
    }

    pub fn to_text(&self) -> String {
        let mut out = format!(
            "{}: {} (confidence {:.4}) [{}]",
            self.symbol, self.action, self.confidence, self.strategy
        );
        for (key, ind) in &self.indicators {
            out.push_str(&format!("\n  {:<16} {:>12.4}  {}", key, ind.value, ind.signal));
        }
        let matched: Vec<&str> = self
            .rules_matched
            .iter()
            .map(|m| if *m { "true" } else { "false" })
            .collect();
        out.push_str(&format!("\n  rules matched: [{}]", matched.join(", ")));
        out.push_str(&format!("\n  reason: {}", self.reason));
        out
    }
}

/// Evaluate `config` for one symbol, loading at least `history_length()` bars.
pub fn evaluate_one(
    config: &StrategyConfig,
    port: &dyn MarketDataPort,
    symbol: &str,
    limit: Option<usize>,
) -> Result<DecisionReport, EngineError> {
    let decision = match limit {
        Some(limit) if limit > config.history_length() => {
            let window = port.get_price_history(symbol, limit)?;
            strategy::evaluate(config, &window)?
        }
        _ => strategy::evaluate_symbol(config, port, symbol)?,
    };
    Ok(DecisionReport::new(symbol, config, &decision))
}

fn run_evaluate(
    preset: Option<&str>,
    strategy_path: Option<&Path>,
    prices: &Path,
    symbols: &[String],
    limit: Option<usize>,
    format: OutputFormat,
) -> ExitCode {
    let config = match resolve_strategy(preset, strategy_path, registry::global()) {
        Ok(c) => c,
        Err(e) => {
            report_error(&e, strategy_path);
            return (&e).into();
        }
    };

    let port = CsvMarketData::new(prices.to_path_buf());
    let symbols = if symbols.is_empty() {
        match port.list_symbols() {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        }
    } else {
        symbols.to_vec()
    };
    if symbols.is_empty() {
        eprintln!("error: no symbols found in {}", prices.display());
        return ExitCode::from(5);
    }

    info!(strategy = %config.name, symbols = symbols.len(), "evaluating");

    let mut exit = ExitCode::SUCCESS;
    let mut reports = Vec::new();
    for symbol in &symbols {
        match evaluate_one(&config, &port, symbol, limit) {
            Ok(report) => reports.push(report),
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "evaluation failed");
                eprintln!("error: {symbol}: {e}");
                exit = (&e).into();
            }
        }
    }

    match format {
        OutputFormat::Text => {
            for report in &reports {
                println!("{}", report.to_text());
            }
        }
        OutputFormat::Json => match serde_json::to_string_pretty(&reports) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("error: failed to serialise report: {e}");
                return ExitCode::from(1);
            }
        },
    }
    exit
}

fn report_error(err: &EngineError, strategy_path: Option<&Path>) {
    if let Some(path) = strategy_path {
        eprintln!("error in {}:", path.display());
    }
    match err {
        EngineError::Config(config) => {
            for issue in &config.issues {
                match issue {
                    ConfigIssue::InvalidRule { rule, error } => {
                        eprintln!("  invalid rule:");
                        for line in error.display_with_context(rule).lines() {
                            eprintln!("    {line}");
                        }
                    }
                    other => eprintln!("  {other}"),
                }
            }
        }
        other => eprintln!("  {other}"),
    }
}

fn describe(config: &StrategyConfig) {
    eprintln!(
        "Strategy: {} (aggregation {}, confidence {}, min confidence {})",
        config.name, config.aggregation, config.confidence_policy, config.min_confidence
    );
    eprintln!("\nIndicators:");
    for ind in &config.indicators {
        eprintln!(
            "  {:<16} {:<20} needs {} bars",
            ind.key,
            ind.config.label(),
            ind.config.history_length()
        );
    }
    eprintln!("\nRules:");
    for rule in &config.rules {
        eprintln!("  Parsed: {}", rule.rule);
        eprintln!("  Raw:    {}", rule.source);
    }
}

fn run_validate(strategy_path: &Path) -> ExitCode {
    eprintln!("Validating strategy: {}", strategy_path.display());
    let config = match load_strategy(strategy_path, registry::global()) {
        Ok(c) => c,
        Err(e) => {
            report_error(&e, Some(strategy_path));
            return (&e).into();
        }
    };

    describe(&config);

    // rules that name fields no indicator provides fail at evaluation time
    let keys: Vec<&str> = config.indicators.iter().map(|i| i.key.as_str()).collect();
    for rule in &config.rules {
        for field in rule.rule.fields() {
            let known = keys.iter().any(|k| {
                field == *k
                    || field
                        .strip_prefix(k)
                        .is_some_and(|rest| rest.starts_with('.') || rest.starts_with('_'))
            });
            if !known {
                eprintln!("warning: field '{field}' does not match any configured indicator");
            }
        }
    }

    eprintln!("\nStrategy configuration is valid.");
    ExitCode::SUCCESS
}

fn run_presets() -> ExitCode {
    let registry = registry::global();
    for name in factory::preset_names() {
        match create_preset(name, registry) {
            Ok(config) => {
                let labels: Vec<String> = config
                    .indicators
                    .iter()
                    .map(|i| i.config.label())
                    .collect();
                println!("{:<16} {}", name, labels.join(", "));
                for rule in &config.rules {
                    println!("  {}", rule.source);
                }
            }
            Err(e) => {
                eprintln!("error: preset {name}: {e}");
                return ExitCode::from(2);
            }
        }
    }
    ExitCode::SUCCESS
}

fn run_indicators() -> ExitCode {
    let registry = registry::global();
    for name in registry.names() {
        match registry.default_config(name) {
            Ok(config) => println!(
                "{:<16} default {:<16} needs {} bars",
                name,
                config.label(),
                config.history_length()
            ),
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::from(2);
            }
        }
    }
    let aliases = registry.aliases();
    if !aliases.is_empty() {
        println!();
        for (alias, target) in aliases {
            println!("{alias:<16} -> {target}");
        }
    }
    ExitCode::SUCCESS
}
