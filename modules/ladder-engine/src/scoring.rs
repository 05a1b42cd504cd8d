//! Joint (strategy, node) scoring.
//!
//! Every strategy is scored against every tracked node, or once with no
//! node when it is node-independent:
//!
//! ```text
//! base  = Σ weight               for "signal.value" terms whose signal equals value
//!       + Σ weight * value       for numeric terms
//! final = base * phase multiplier + phase bonus
//! ```
//!
//! Ranking is by final score, then strategy declaration order, then node id
//! (node-independent first). Signals are read with node values taking
//! precedence over global ones. A term whose signal is absent, or holds the
//! wrong kind of value, fails the whole scoring call.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use ladder_common::{
    keys, Methodology, NodeId, Phase, SignalBag, SignalValue, Strategy, Technique, WeightTerm,
};

use crate::error::ScoringError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermContribution {
    pub term: String,
    pub weight: f64,
    pub observed: SignalValue,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub strategy: String,
    pub technique: Technique,
    pub node_id: Option<NodeId>,
    pub base_score: f64,
    pub multiplier: f64,
    pub bonus: f64,
    pub final_score: f64,
    pub terms: Vec<TermContribution>,
    #[serde(skip)]
    declaration_index: usize,
}

impl ScoredCandidate {
    fn rank(&self, other: &Self) -> Ordering {
        other
            .final_score
            .total_cmp(&self.final_score)
            .then(self.declaration_index.cmp(&other.declaration_index))
            .then_with(|| self.node_id.cmp(&other.node_id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoringOutcome {
    pub phase: Phase,
    /// Best first.
    pub ranked: Vec<ScoredCandidate>,
}

impl ScoringOutcome {
    pub fn winner(&self) -> Option<&ScoredCandidate> {
        self.ranked.first()
    }
}

pub struct StrategyScoringEngine {
    methodology: Arc<Methodology>,
}

impl StrategyScoringEngine {
    pub fn new(methodology: Arc<Methodology>) -> Self {
        Self { methodology }
    }

    pub fn methodology(&self) -> &Methodology {
        &self.methodology
    }

    /// Score every candidate. `nodes` are the tracked node ids; their order
    /// does not affect the result.
    pub fn score(&self, bag: &SignalBag, nodes: &[NodeId]) -> Result<ScoringOutcome, ScoringError> {
        let phase = read_phase(bag)?;
        let profile = self.methodology.profile(phase);

        let mut ranked = Vec::new();
        for (index, strategy) in self.methodology.strategies().iter().enumerate() {
            let multiplier = profile.multiplier(&strategy.name);
            let bonus = profile.bonus(&strategy.name);

            let targets: Vec<Option<&NodeId>> = if strategy.targets_node {
                nodes.iter().map(Some).collect()
            } else {
                vec![None]
            };

            for node in targets {
                let (base_score, terms) = score_terms(strategy, bag, node)?;
                ranked.push(ScoredCandidate {
                    strategy: strategy.name.clone(),
                    technique: strategy.technique,
                    node_id: node.cloned(),
                    base_score,
                    multiplier,
                    bonus,
                    final_score: base_score * multiplier + bonus,
                    terms,
                    declaration_index: index,
                });
            }
        }

        if ranked.is_empty() {
            return Err(ScoringError::NoCandidates);
        }
        ranked.sort_by(ScoredCandidate::rank);

        for candidate in ranked.iter().take(5) {
            debug!(
                strategy = %candidate.strategy,
                node = ?candidate.node_id,
                base = candidate.base_score,
                score = candidate.final_score,
                "Candidate"
            );
        }

        Ok(ScoringOutcome { phase, ranked })
    }
}

fn read_phase(bag: &SignalBag) -> Result<Phase, ScoringError> {
    let key = keys::interview_phase();
    let raw = bag
        .categorical(&key)
        .ok_or_else(|| ScoringError::Phase(format!("'{key}' was not detected")))?;
    raw.parse::<Phase>()
        .map_err(|_| ScoringError::Phase(format!("'{key}' holds unknown phase '{raw}'")))
}

fn score_terms(
    strategy: &Strategy,
    bag: &SignalBag,
    node: Option<&NodeId>,
) -> Result<(f64, Vec<TermContribution>), ScoringError> {
    let mut base = 0.0;
    let mut terms = Vec::with_capacity(strategy.terms.len());

    for term in &strategy.terms {
        if node.is_none() && term.is_node_scoped() {
            continue;
        }

        let observed = bag.lookup(term.key(), node).ok_or_else(|| ScoringError::MissingSignal {
            strategy: strategy.name.clone(),
            key: term.key().to_string(),
            node: node.cloned(),
        })?;

        let contribution = match term {
            WeightTerm::Numeric { weight, .. } => {
                let value = observed.as_numeric().ok_or_else(|| mismatch(strategy, term, "numeric", observed))?;
                weight * value
            }
            WeightTerm::Match { value, weight, .. } => {
                let label = observed
                    .as_categorical()
                    .ok_or_else(|| mismatch(strategy, term, "categorical", observed))?;
                if label == value {
                    *weight
                } else {
                    0.0
                }
            }
        };

        base += contribution;
        terms.push(TermContribution {
            term: term.raw().to_string(),
            weight: term.weight(),
            observed: observed.clone(),
            contribution,
        });
    }

    Ok((base, terms))
}

fn mismatch(
    strategy: &Strategy,
    term: &WeightTerm,
    expected: &'static str,
    observed: &SignalValue,
) -> ScoringError {
    ScoringError::KindMismatch {
        strategy: strategy.name.clone(),
        key: term.raw().to_string(),
        expected,
        actual: observed.kind_name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ladder_common::{
        MethodologySpec, PhaseProfileSpec, PhaseThresholds, SignalCatalog, SignalShape, StrategySpec,
    };
    use std::collections::BTreeMap;

    fn catalog() -> SignalCatalog {
        let mut catalog = SignalCatalog::new();
        catalog.insert(keys::node_exhausted(), SignalShape::boolean());
        catalog.insert(keys::node_recency_score(), SignalShape::Numeric);
        catalog.insert(keys::valence(), SignalShape::Numeric);
        catalog.insert(
            keys::interview_phase(),
            SignalShape::categorical(&["early", "mid", "late"]),
        );
        catalog
    }

    fn strategy(name: &str, weights: &[(&str, f64)], targets_node: bool) -> StrategySpec {
        StrategySpec {
            name: name.to_string(),
            technique: "laddering".to_string(),
            description: String::new(),
            signal_weights: weights.iter().map(|(k, w)| (k.to_string(), *w)).collect(),
            targets_node,
        }
    }

    fn engine(strategies: Vec<StrategySpec>, phases: BTreeMap<String, PhaseProfileSpec>) -> StrategyScoringEngine {
        let spec = MethodologySpec {
            name: "test".to_string(),
            description: String::new(),
            strategies,
            phase_thresholds: PhaseThresholds {
                early_max: 5,
                mid_max: 15,
            },
            phases,
            exhaustion: Default::default(),
        };
        StrategyScoringEngine::new(Arc::new(Methodology::load(spec, &catalog()).unwrap()))
    }

    fn bag(phase: &str) -> SignalBag {
        let mut bag = SignalBag::new();
        bag.insert_global(keys::interview_phase(), phase);
        bag
    }

    fn ids(raw: &[&str]) -> Vec<NodeId> {
        raw.iter().map(|s| NodeId::from(*s)).collect()
    }

    #[test]
    fn node_value_overrides_global_value() {
        let engine = engine(
            vec![
                strategy("warm", &[("llm.valence", 1.0)], true),
                strategy("close", &[], false),
            ],
            BTreeMap::new(),
        );
        let mut bag = bag("early");
        bag.insert_global(keys::valence(), 0.2);
        let valence_key = keys::valence();
        bag.insert_node_value(valence_key, NodeId::from("a"), 0.9);

        let outcome = engine.score(&bag, &ids(&["a", "b"])).unwrap();
        let a = outcome.ranked.iter().find(|c| c.node_id == Some(NodeId::from("a"))).unwrap();
        let b = outcome.ranked.iter().find(|c| c.node_id == Some(NodeId::from("b"))).unwrap();
        assert_eq!(a.base_score, 0.9);
        assert_eq!(b.base_score, 0.2);
    }

    #[test]
    fn node_independent_strategies_skip_node_terms() {
        let engine = engine(
            vec![strategy("close", &[("graph.node.recency_score", 5.0), ("llm.valence", 2.0)], false)],
            BTreeMap::new(),
        );
        let mut bag = bag("late");
        bag.insert_global(keys::valence(), 0.5);

        let outcome = engine.score(&bag, &ids(&["a"])).unwrap();
        assert_eq!(outcome.ranked.len(), 1);
        let winner = outcome.winner().unwrap();
        assert_eq!(winner.node_id, None);
        assert_eq!(winner.base_score, 1.0);
        assert_eq!(winner.terms.len(), 1);
    }

    #[test]
    fn phase_multiplier_and_bonus_apply() {
        let phases = BTreeMap::from([(
            "mid".to_string(),
            PhaseProfileSpec {
                signal_weights: BTreeMap::from([("warm".to_string(), 3.0)]),
                phase_bonuses: BTreeMap::from([("close".to_string(), 0.25)]),
            },
        )]);
        let engine = engine(
            vec![
                strategy("warm", &[("llm.valence", 1.0)], false),
                strategy("close", &[], false),
            ],
            phases,
        );
        let mut bag = bag("mid");
        bag.insert_global(keys::valence(), 0.5);

        let outcome = engine.score(&bag, &[]).unwrap();
        assert_eq!(outcome.phase, Phase::Mid);
        assert_eq!(outcome.ranked[0].strategy, "warm");
        assert_eq!(outcome.ranked[0].final_score, 1.5);
        assert_eq!(outcome.ranked[1].final_score, 0.25);
    }

    #[test]
    fn candidates_carry_their_strategy_technique() {
        let close = StrategySpec {
            technique: "closing".to_string(),
            ..strategy("close", &[], false)
        };
        let engine = engine(vec![strategy("deepen", &[], true), close], BTreeMap::new());

        let outcome = engine.score(&bag("early"), &ids(&["a"])).unwrap();

        let technique_of = |name: &str| {
            outcome
                .ranked
                .iter()
                .find(|c| c.strategy == name)
                .map(|c| c.technique)
        };
        assert_eq!(technique_of("deepen"), Some(Technique::Laddering));
        assert_eq!(technique_of("close"), Some(Technique::Closing));
    }

    #[test]
    fn missing_signal_aborts_instead_of_scoring_zero() {
        let engine = engine(
            vec![
                strategy("fresh", &[("graph.node.recency_score", 1.0)], true),
                strategy("close", &[], false),
            ],
            BTreeMap::new(),
        );
        let err = engine.score(&bag("early"), &ids(&["a"])).unwrap_err();
        assert_eq!(
            err,
            ScoringError::MissingSignal {
                strategy: "fresh".to_string(),
                key: "graph.node.recency_score".to_string(),
                node: Some(NodeId::from("a")),
            }
        );
    }

    #[test]
    fn kind_mismatch_aborts() {
        let engine = engine(
            vec![strategy("warm", &[("llm.valence", 1.0)], false)],
            BTreeMap::new(),
        );
        let mut bag = bag("early");
        bag.insert_global(keys::valence(), "very");
        assert!(matches!(
            engine.score(&bag, &[]),
            Err(ScoringError::KindMismatch { expected: "numeric", .. })
        ));
    }

    #[test]
    fn missing_phase_is_an_error() {
        let engine = engine(vec![strategy("close", &[], false)], BTreeMap::new());
        assert!(matches!(
            engine.score(&SignalBag::new(), &[]),
            Err(ScoringError::Phase(_))
        ));
    }

    #[test]
    fn ties_break_by_declaration_then_node_id() {
        let engine = engine(
            vec![
                strategy("first", &[], true),
                strategy("second", &[], true),
                strategy("close", &[], false),
            ],
            BTreeMap::new(),
        );
        let outcome = engine.score(&bag("early"), &ids(&["b", "a"])).unwrap();
        let order: Vec<(String, Option<String>)> = outcome
            .ranked
            .iter()
            .map(|c| (c.strategy.clone(), c.node_id.as_ref().map(|n| n.to_string())))
            .collect();
        assert_eq!(
            order,
            vec![
                ("first".to_string(), Some("a".to_string())),
                ("first".to_string(), Some("b".to_string())),
                ("second".to_string(), Some("a".to_string())),
                ("second".to_string(), Some("b".to_string())),
                ("close".to_string(), None),
            ]
        );
    }
}
