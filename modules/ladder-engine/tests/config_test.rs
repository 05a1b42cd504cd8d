//! Methodology validation against the standard pool's catalog.

use std::sync::Arc;

use ladder_common::{ConfigError, Methodology, PhaseProfileSpec, SignalCatalog};
use ladder_engine::testing::{closing, laddering_spec, spec_with, strategy, MockTextAnalysis};
use ladder_engine::SignalPool;

fn catalog() -> SignalCatalog {
    SignalPool::standard(Arc::new(MockTextAnalysis::new()))
        .unwrap()
        .catalog()
        .clone()
}

#[test]
fn builtin_laddering_methodology_loads() {
    let methodology = Methodology::load(laddering_spec(), &catalog()).unwrap();
    assert_eq!(methodology.strategies().len(), 5);
    assert_eq!(methodology.strategies()[0].name, "deepen");
}

#[test]
fn every_violation_is_reported_at_once() {
    let mut spec = spec_with(vec![
        strategy("deepen", "laddering", &[("graph.node.mystery", 1.0)]),
        strategy("deepen", "laddering", &[]),
        strategy("hypnotize", "hypnosis", &[]),
        strategy("probe", "probing", &[("llm.response_depth.profound", 1.0)]),
    ]);
    spec.phases.insert(
        "mid".to_string(),
        PhaseProfileSpec {
            signal_weights: [("ghost".to_string(), 2.0)].into(),
            phase_bonuses: Default::default(),
        },
    );

    let errors = Methodology::load(spec, &catalog()).unwrap_err();
    let all: Vec<&ConfigError> = errors.iter().collect();

    assert!(all.iter().any(|e| matches!(e, ConfigError::UnknownSignal { key, .. } if key == "graph.node.mystery")));
    assert!(all.iter().any(|e| matches!(e, ConfigError::DuplicateStrategy(name) if name == "deepen")));
    assert!(all.iter().any(|e| matches!(e, ConfigError::UnknownTechnique { technique, .. } if technique == "hypnosis")));
    assert!(all.iter().any(|e| matches!(e, ConfigError::UnknownSignalValue { .. })));
    assert!(all.iter().any(|e| matches!(e, ConfigError::UnknownPhaseStrategy { strategy, .. } if strategy == "ghost")));
    assert!(all.iter().any(|e| matches!(e, ConfigError::NoFallbackStrategy)));
    assert!(errors.len() >= 6);
}

#[test]
fn categorical_weight_without_a_value_is_rejected() {
    let spec = spec_with(vec![
        strategy("deepen", "laddering", &[("graph.node.exhausted", 1.0)]),
        closing("close", &[]),
    ]);
    let errors = Methodology::load(spec, &catalog()).unwrap_err();
    assert!(matches!(
        errors.iter().next(),
        Some(ConfigError::KindMismatch { .. })
    ));
}

#[test]
fn meta_signals_are_referencable() {
    let spec = spec_with(vec![
        strategy("rephrase", "elaboration", &[("meta.node.opportunity.probe_deeper", 1.0)]),
        closing("close", &[("meta.interview.progress", 1.0)]),
    ]);
    assert!(Methodology::load(spec, &catalog()).is_ok());
}
