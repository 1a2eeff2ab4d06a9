//! Integration tests for strategy construction and evaluation.
//!
//! Tests cover:
//! - Presets evaluated end to end against synthetic price paths
//! - Custom configurations built through the global registry
//! - Market data port usage (`evaluate_symbol`)
//! - Error propagation and HOLD degradation
//! - Sharing one strategy across threads

mod common;

use common::*;
use serde_json::json;
use sigtrader::domain::decision::Action;
use sigtrader::domain::error::{EngineError, RuleEvaluationError};
use sigtrader::domain::factory::{create_custom, create_preset};
use sigtrader::domain::indicator::Signal;
use sigtrader::domain::registry::{self, IndicatorRegistry, RegistryBuilder};
use sigtrader::domain::strategy::{evaluate, evaluate_or_hold, evaluate_symbol, StrategyConfig};

fn preset(name: &str) -> StrategyConfig {
    create_preset(name, registry::global()).unwrap()
}

mod presets {
    use super::*;

    #[test]
    fn simple_rsi_buys_a_selloff() {
        let config = preset("simple_rsi");
        let decision = evaluate(&config, &window(&falling(100.0, 1.0, 40))).unwrap();

        assert_eq!(decision.action, Action::Buy);
        assert_eq!(decision.confidence, 1.0);
        assert_eq!(decision.snapshot["rsi"].signal, Signal::Oversold);
        assert_eq!(decision.rules_matched, vec![true]);
    }

    #[test]
    fn simple_rsi_sells_a_rally() {
        let config = preset("simple_rsi");
        let decision = evaluate(&config, &window(&rising(100.0, 1.0, 40))).unwrap();

        assert_eq!(decision.action, Action::Sell);
        assert_eq!(decision.confidence, 1.0);
    }

    #[test]
    fn simple_rsi_holds_in_a_range() {
        let config = preset("simple_rsi");
        let decision = evaluate(&config, &window(&choppy(100.0, 40))).unwrap();

        assert_eq!(decision.action, Action::Hold);
        assert_eq!(decision.confidence, 0.0);
        assert_eq!(decision.snapshot["rsi"].signal, Signal::Neutral);
    }

    #[test]
    fn ema_trend_follows_direction() {
        let config = preset("ema_trend");

        let up = evaluate(&config, &window(&rising(100.0, 1.0, 40))).unwrap();
        assert_eq!(up.action, Action::Buy);
        assert_eq!(up.snapshot["ema"].signal, Signal::Bullish);

        let down = evaluate(&config, &window(&falling(200.0, 1.0, 40))).unwrap();
        assert_eq!(down.action, Action::Sell);
        assert_eq!(down.snapshot["ema"].signal, Signal::Bearish);
    }

    #[test]
    fn every_preset_reports_insufficient_data_on_one_bar() {
        for name in sigtrader::domain::factory::preset_names() {
            let config = preset(name);
            let result = evaluate(&config, &window(&[100.0]));
            assert!(
                matches!(result, Err(EngineError::InsufficientData { .. })),
                "{name}: {result:?}"
            );
        }
    }
}

mod custom {
    use super::*;

    #[test]
    fn short_window_is_insufficient_data_not_nan() {
        let raw = json!({
            "indicators": [{"name": "rsi", "config": {"period": 14}}],
            "rules": ["rsi < 30"]
        });
        let config = create_custom(&raw, registry::global()).unwrap();

        match evaluate(&config, &window(&falling(100.0, 1.0, 10))) {
            Err(EngineError::InsufficientData { have, need, .. }) => {
                assert_eq!(have, 10);
                assert_eq!(need, 15);
            }
            other => panic!("expected insufficient data, got {other:?}"),
        }
    }

    #[test]
    fn unknown_indicator_never_builds() {
        let raw = json!({
            "indicators": [
                {"name": "rsi", "config": {"period": 14}},
                {"name": "unknown_indicator", "config": {}}
            ],
            "rules": ["rsi < 30"]
        });
        let err = create_custom(&raw, registry::global()).unwrap_err();
        assert_eq!(err.unknown_indicator_name(), Some("unknown_indicator"));
        assert_eq!(err.issues.len(), 1);
    }

    #[test]
    fn missing_field_surfaces_as_rule_evaluation_error() {
        let raw = json!({
            "indicators": [{"name": "rsi"}],
            "rules": ["ema > 1"]
        });
        let config = create_custom(&raw, registry::global()).unwrap();
        let prices = window(&falling(100.0, 1.0, 30));

        match evaluate(&config, &prices) {
            Err(EngineError::RuleEvaluation(RuleEvaluationError::MissingField { field })) => {
                assert_eq!(field, "ema");
            }
            other => panic!("expected missing field, got {other:?}"),
        }

        let decision = evaluate_or_hold(&config, &prices);
        assert_eq!(decision.action, Action::Hold);
        assert_eq!(decision.confidence, 0.0);
        assert!(decision.snapshot.is_empty());
    }

    #[test]
    fn partial_agreement_reports_neutral_share_on_hold() {
        let raw = json!({
            "indicators": [
                {"name": "rsi"},
                {"name": "ema", "config": {"period": 5, "buffer_percent": 0}}
            ],
            "rules": ["rsi < 10"],
            "confidence_policy": "partial_agreement"
        });
        let config = create_custom(&raw, registry::global()).unwrap();
        let decision = evaluate(&config, &window(&choppy(100.0, 40))).unwrap();

        assert_eq!(decision.action, Action::Hold);
        assert_eq!(decision.snapshot["rsi"].signal, Signal::Neutral);
        assert_eq!(decision.snapshot["ema"].signal, Signal::Bullish);
        assert_eq!(decision.confidence, 0.5);
    }

    #[test]
    fn min_confidence_demotes_weak_agreement() {
        let raw = |min: f64| {
            json!({
                "indicators": [
                    {"name": "rsi"},
                    {"name": "ema", "config": {"period": 5}},
                    {"name": "sma", "config": {"alias": "sma_fast", "period": 3}}
                ],
                "rules": ["rsi < 30"],
                "min_confidence": min
            })
        };
        let prices = window(&falling(100.0, 1.0, 40));

        // RSI oversold against two falling averages: SELL with 2 of 3 agreeing
        let lenient = create_custom(&raw(0.5), registry::global()).unwrap();
        let decision = evaluate(&lenient, &prices).unwrap();
        assert_eq!(decision.action, Action::Sell);
        assert_eq!(decision.confidence, 0.6667);

        let strict = create_custom(&raw(0.9), registry::global()).unwrap();
        let decision = evaluate(&strict, &prices).unwrap();
        assert_eq!(decision.action, Action::Hold);
        assert_eq!(decision.confidence, 0.0);
        assert_eq!(decision.rules_matched, vec![true]);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let config = preset("rsi_macd_ema");
        let mut prices = falling(150.0, 0.5, 60);
        prices.extend(rising(120.0, 0.8, 20));
        let prices = window(&prices);

        let first = evaluate(&config, &prices).unwrap();
        let second = evaluate(&config, &prices).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.confidence.to_bits(), second.confidence.to_bits());
    }
}

mod market_data {
    use super::*;

    #[test]
    fn evaluate_symbol_requests_required_length() {
        let port = MockMarketData::new().with_closes("AAA", falling(100.0, 1.0, 50));
        let config = preset("simple_rsi");

        let decision = evaluate_symbol(&config, &port, "AAA").unwrap();
        assert_eq!(decision.action, Action::Buy);
        assert_eq!(port.requests.borrow().as_slice(), &[("AAA".to_string(), 15)]);
    }

    #[test]
    fn sma_slope_sees_its_previous_average_through_the_port() {
        let port = MockMarketData::new().with_closes("UP", rising(50.0, 1.0, 100));
        let raw = json!({
            "indicators": [{"name": "sma", "config": {"period": 20}}],
            "rules": ["sma == 'BULLISH'"]
        });
        let config = create_custom(&raw, registry::global()).unwrap();

        let decision = evaluate_symbol(&config, &port, "UP").unwrap();
        assert_eq!(port.requests.borrow().as_slice(), &[("UP".to_string(), 21)]);
        assert_eq!(decision.snapshot["sma"].signal, Signal::Bullish);
        assert_eq!(decision.action, Action::Buy);
    }

    #[test]
    fn port_errors_propagate_and_are_recoverable() {
        let port = MockMarketData::new().with_error("AAA", "exchange offline");
        let config = preset("simple_rsi");

        let err = evaluate_symbol(&config, &port, "AAA").unwrap_err();
        assert!(matches!(err, EngineError::MarketData { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn unknown_symbol_is_an_empty_window() {
        let port = MockMarketData::new();
        let config = preset("simple_rsi");
        assert!(matches!(
            evaluate_symbol(&config, &port, "ZZZ"),
            Err(EngineError::EmptyWindow)
        ));
    }

    #[test]
    fn list_symbols_from_port() {
        use sigtrader::ports::market_data_port::MarketDataPort;
        let port = MockMarketData::new()
            .with_closes("BBB", vec![1.0])
            .with_closes("AAA", vec![1.0]);
        assert_eq!(port.list_symbols().unwrap(), vec!["AAA", "BBB"]);
    }
}

mod sharing {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn strategy_config_is_send_and_sync() {
        assert_send_sync::<StrategyConfig>();
        assert_send_sync::<IndicatorRegistry>();
    }

    #[test]
    fn one_config_many_threads() {
        let config = preset("simple_rsi");
        let paths = [
            falling(100.0, 1.0, 40),
            rising(100.0, 1.0, 40),
            choppy(100.0, 40),
        ];

        let actions: Vec<Action> = std::thread::scope(|s| {
            let handles: Vec<_> = paths
                .iter()
                .map(|p| {
                    let config = &config;
                    s.spawn(move || evaluate(config, &window(p)).unwrap().action)
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(actions, vec![Action::Buy, Action::Sell, Action::Hold]);
    }
}

mod registry_lifecycle {
    use super::*;

    #[test]
    fn install_after_first_use_is_rejected() {
        assert!(registry::global().lookup("rsi").is_ok());
        let custom = RegistryBuilder::new().freeze();
        assert!(registry::install(custom).is_err());
        assert!(registry::global().lookup("bollinger_bands").is_ok());
    }

    #[test]
    fn private_registry_limits_indicators() {
        let builtins = RegistryBuilder::with_builtins().freeze();
        assert!(create_preset("rsi_macd", &builtins).is_ok());

        let minimal = RegistryBuilder::new()
            .register("rsi", |o| {
                sigtrader::domain::indicator::RsiConfig::from_options(o)
                    .map(sigtrader::domain::indicator::IndicatorConfig::Rsi)
            })
            .freeze();
        assert!(create_preset("simple_rsi", &minimal).is_ok());
        let err = create_preset("rsi_macd", &minimal).unwrap_err();
        assert_eq!(err.unknown_indicator_name(), Some("macd"));
    }
}
