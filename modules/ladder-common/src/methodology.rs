//! Methodology configuration.
//!
//! `MethodologySpec` is the plain, already-parsed shape handed over by the
//! configuration collaborator. `Methodology::load` validates it once against
//! the signal catalog of a pool and returns an immutable `Methodology`, or
//! every violation it found.

use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ConfigError, ConfigErrors};
use crate::signal::{SignalCatalog, SignalKey, SignalShape};
use crate::types::Phase;

// --- Raw spec ---

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MethodologySpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Declaration order is the scoring tie-break order.
    pub strategies: Vec<StrategySpec>,
    pub phase_thresholds: PhaseThresholds,
    /// Keyed by phase name (`early`, `mid`, `late`).
    #[serde(default)]
    pub phases: BTreeMap<String, PhaseProfileSpec>,
    #[serde(default)]
    pub exhaustion: ExhaustionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct StrategySpec {
    pub name: String,
    pub technique: String,
    #[serde(default)]
    pub description: String,
    /// Signal key -> weight. Categorical signals are matched with a value
    /// suffix, e.g. `llm.response_depth.surface`.
    #[serde(default)]
    pub signal_weights: BTreeMap<String, f64>,
    /// `false` for strategies that never target a node (closing, summarizing).
    #[serde(default = "default_targets_node")]
    pub targets_node: bool,
}

fn default_targets_node() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PhaseThresholds {
    /// Node counts below this are `early`.
    pub early_max: usize,
    /// Node counts below this (and at least `early_max`) are `mid`.
    pub mid_max: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PhaseProfileSpec {
    /// Strategy name -> multiplier (default 1.0).
    #[serde(default)]
    pub signal_weights: BTreeMap<String, f64>,
    /// Strategy name -> additive bonus (default 0.0).
    #[serde(default)]
    pub phase_bonuses: BTreeMap<String, f64>,
}

/// Parameters of the deterministic exhaustion rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct ExhaustionConfig {
    pub min_turns_since_yield: u32,
    pub min_focus_streak: u32,
    pub shallow_ratio_threshold: f64,
    /// Number of most recent response-depth labels the shallow ratio looks at.
    pub window: usize,
    /// Labels retained per node.
    pub history_capacity: usize,
}

impl Default for ExhaustionConfig {
    fn default() -> Self {
        Self {
            min_turns_since_yield: 3,
            min_focus_streak: 2,
            shallow_ratio_threshold: 0.66,
            window: 3,
            history_capacity: 10,
        }
    }
}

impl ExhaustionConfig {
    fn violations(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.min_turns_since_yield == 0 {
            out.push("min_turns_since_yield must be at least 1".to_string());
        }
        if self.min_focus_streak == 0 {
            out.push("min_focus_streak must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.shallow_ratio_threshold) {
            out.push(format!(
                "shallow_ratio_threshold {} is outside [0, 1]",
                self.shallow_ratio_threshold
            ));
        }
        if self.window == 0 {
            out.push("window must be at least 1".to_string());
        }
        if self.history_capacity < self.window {
            out.push(format!(
                "history_capacity {} is smaller than window {}",
                self.history_capacity, self.window
            ));
        }
        out
    }
}

// --- Techniques ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Technique {
    Laddering,
    Elaboration,
    Probing,
    Clarification,
    Contrast,
    Validation,
    Synthesis,
    Reflection,
    Transition,
    Closing,
}

impl Technique {
    pub fn as_str(self) -> &'static str {
        match self {
            Technique::Laddering => "laddering",
            Technique::Elaboration => "elaboration",
            Technique::Probing => "probing",
            Technique::Clarification => "clarification",
            Technique::Contrast => "contrast",
            Technique::Validation => "validation",
            Technique::Synthesis => "synthesis",
            Technique::Reflection => "reflection",
            Technique::Transition => "transition",
            Technique::Closing => "closing",
        }
    }
}

impl std::fmt::Display for Technique {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Technique {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "laddering" => Ok(Technique::Laddering),
            "elaboration" => Ok(Technique::Elaboration),
            "probing" => Ok(Technique::Probing),
            "clarification" => Ok(Technique::Clarification),
            "contrast" => Ok(Technique::Contrast),
            "validation" => Ok(Technique::Validation),
            "synthesis" => Ok(Technique::Synthesis),
            "reflection" => Ok(Technique::Reflection),
            "transition" => Ok(Technique::Transition),
            "closing" => Ok(Technique::Closing),
            other => Err(format!("unknown technique '{other}'")),
        }
    }
}

// --- Validated methodology ---

/// One resolved strategy weight.
#[derive(Debug, Clone, PartialEq)]
pub enum WeightTerm {
    /// `weight * value` of a numeric signal.
    Numeric {
        raw: String,
        key: SignalKey,
        weight: f64,
    },
    /// `weight` when the categorical signal equals `value`, else 0.
    Match {
        raw: String,
        key: SignalKey,
        value: String,
        weight: f64,
    },
}

impl WeightTerm {
    pub fn key(&self) -> &SignalKey {
        match self {
            WeightTerm::Numeric { key, .. } | WeightTerm::Match { key, .. } => key,
        }
    }

    pub fn raw(&self) -> &str {
        match self {
            WeightTerm::Numeric { raw, .. } | WeightTerm::Match { raw, .. } => raw,
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            WeightTerm::Numeric { weight, .. } | WeightTerm::Match { weight, .. } => *weight,
        }
    }

    pub fn is_node_scoped(&self) -> bool {
        self.key().is_node_scoped()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub name: String,
    pub technique: Technique,
    pub description: String,
    pub terms: Vec<WeightTerm>,
    pub targets_node: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseProfile {
    multipliers: BTreeMap<String, f64>,
    bonuses: BTreeMap<String, f64>,
}

impl PhaseProfile {
    pub fn multiplier(&self, strategy: &str) -> f64 {
        self.multipliers.get(strategy).copied().unwrap_or(1.0)
    }

    pub fn bonus(&self, strategy: &str) -> f64 {
        self.bonuses.get(strategy).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct Methodology {
    name: String,
    description: String,
    strategies: Vec<Strategy>,
    thresholds: PhaseThresholds,
    profiles: BTreeMap<Phase, PhaseProfile>,
    exhaustion: ExhaustionConfig,
}

impl Methodology {
    /// Validate `spec` against the signals a pool can produce. Collects every
    /// violation rather than stopping at the first one.
    pub fn load(spec: MethodologySpec, catalog: &SignalCatalog) -> Result<Self, ConfigErrors> {
        let mut errors = Vec::new();

        if spec.strategies.is_empty() {
            errors.push(ConfigError::EmptyStrategyList);
        }

        let mut seen = HashSet::new();
        let mut strategies = Vec::with_capacity(spec.strategies.len());
        for raw in &spec.strategies {
            if !seen.insert(raw.name.as_str()) {
                errors.push(ConfigError::DuplicateStrategy(raw.name.clone()));
            }
            if let Some(strategy) = resolve_strategy(raw, catalog, &mut errors) {
                strategies.push(strategy);
            }
        }

        if !spec.strategies.is_empty() && spec.strategies.iter().all(|s| s.targets_node) {
            errors.push(ConfigError::NoFallbackStrategy);
        }

        let thresholds = spec.phase_thresholds;
        if thresholds.early_max > thresholds.mid_max {
            errors.push(ConfigError::InvalidPhaseThresholds {
                early_max: thresholds.early_max,
                mid_max: thresholds.mid_max,
            });
        }

        errors.extend(
            spec.exhaustion
                .violations()
                .into_iter()
                .map(ConfigError::InvalidExhaustion),
        );

        let mut profiles: BTreeMap<Phase, PhaseProfile> =
            Phase::ALL.iter().map(|p| (*p, PhaseProfile::default())).collect();
        for (phase_name, profile) in &spec.phases {
            let phase = match phase_name.parse::<Phase>() {
                Ok(phase) => phase,
                Err(_) => {
                    errors.push(ConfigError::UnknownPhase(phase_name.clone()));
                    continue;
                }
            };
            for (strategy, value) in profile.signal_weights.iter().chain(&profile.phase_bonuses) {
                if !seen.contains(strategy.as_str()) {
                    errors.push(ConfigError::UnknownPhaseStrategy {
                        phase,
                        strategy: strategy.clone(),
                    });
                }
                if !value.is_finite() {
                    errors.push(ConfigError::NonFinitePhaseValue {
                        phase,
                        strategy: strategy.clone(),
                    });
                }
            }
            profiles.insert(
                phase,
                PhaseProfile {
                    multipliers: profile.signal_weights.clone(),
                    bonuses: profile.phase_bonuses.clone(),
                },
            );
        }

        if !errors.is_empty() {
            warn!(methodology = %spec.name, errors = errors.len(), "Methodology rejected");
            return Err(ConfigErrors(errors));
        }

        debug!(
            methodology = %spec.name,
            strategies = strategies.len(),
            "Methodology loaded"
        );
        Ok(Self {
            name: spec.name,
            description: spec.description,
            strategies,
            thresholds,
            profiles,
            exhaustion: spec.exhaustion,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Strategies in declaration order.
    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn strategy(&self, name: &str) -> Option<&Strategy> {
        self.strategies.iter().find(|s| s.name == name)
    }

    pub fn thresholds(&self) -> PhaseThresholds {
        self.thresholds
    }

    pub fn profile(&self, phase: Phase) -> &PhaseProfile {
        // Every phase is filled in by `load`.
        &self.profiles[&phase]
    }

    pub fn exhaustion(&self) -> &ExhaustionConfig {
        &self.exhaustion
    }
}

fn resolve_strategy(
    raw: &StrategySpec,
    catalog: &SignalCatalog,
    errors: &mut Vec<ConfigError>,
) -> Option<Strategy> {
    let before = errors.len();

    let technique = match raw.technique.parse::<Technique>() {
        Ok(t) => Some(t),
        Err(_) => {
            errors.push(ConfigError::UnknownTechnique {
                strategy: raw.name.clone(),
                technique: raw.technique.clone(),
            });
            None
        }
    };

    let mut terms = Vec::with_capacity(raw.signal_weights.len());
    for (key, weight) in &raw.signal_weights {
        if !weight.is_finite() {
            errors.push(ConfigError::NonFiniteWeight {
                strategy: raw.name.clone(),
                key: key.clone(),
            });
            continue;
        }
        match resolve_weight(&raw.name, key, *weight, catalog) {
            Ok(term) => terms.push(term),
            Err(e) => errors.push(e),
        }
    }

    if errors.len() > before {
        return None;
    }

    Some(Strategy {
        name: raw.name.clone(),
        technique: technique?,
        description: raw.description.clone(),
        terms,
        targets_node: raw.targets_node,
    })
}

/// Resolve one weight key. An exact catalog hit must be numeric; otherwise
/// the key is split at a dot into `<categorical signal>.<label>`.
fn resolve_weight(
    strategy: &str,
    raw: &str,
    weight: f64,
    catalog: &SignalCatalog,
) -> Result<WeightTerm, ConfigError> {
    if let Ok(key) = SignalKey::parse(raw) {
        match catalog.get(&key) {
            Some(SignalShape::Numeric) => {
                return Ok(WeightTerm::Numeric {
                    raw: raw.to_string(),
                    key,
                    weight,
                })
            }
            Some(SignalShape::Categorical(_)) => {
                return Err(ConfigError::KindMismatch {
                    strategy: strategy.to_string(),
                    key: raw.to_string(),
                    detail: "categorical signal needs a value suffix".to_string(),
                })
            }
            None => {}
        }
    }

    for (dot, _) in raw.rmatch_indices('.') {
        let (prefix, value) = (&raw[..dot], &raw[dot + 1..]);
        if value.is_empty() {
            continue;
        }
        let Ok(key) = SignalKey::parse(prefix) else {
            continue;
        };
        match catalog.get(&key) {
            Some(shape @ SignalShape::Categorical(_)) => {
                if !shape.allows_label(value) {
                    return Err(ConfigError::UnknownSignalValue {
                        strategy: strategy.to_string(),
                        key: prefix.to_string(),
                        value: value.to_string(),
                    });
                }
                return Ok(WeightTerm::Match {
                    raw: raw.to_string(),
                    key,
                    value: value.to_string(),
                    weight,
                });
            }
            Some(SignalShape::Numeric) => {
                return Err(ConfigError::KindMismatch {
                    strategy: strategy.to_string(),
                    key: raw.to_string(),
                    detail: format!("numeric signal '{prefix}' cannot be matched against a label"),
                })
            }
            None => continue,
        }
    }

    Err(ConfigError::UnknownSignal {
        strategy: strategy.to_string(),
        key: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::keys;

    fn catalog() -> SignalCatalog {
        let mut c = SignalCatalog::new();
        c.insert(keys::node_count(), SignalShape::Numeric);
        c.insert(keys::node_exhausted(), SignalShape::boolean());
        c.insert(
            keys::response_depth(),
            SignalShape::categorical(&["surface", "shallow", "moderate", "deep"]),
        );
        c.insert(keys::node_exhaustion_score(), SignalShape::Numeric);
        c
    }

    fn strategy(name: &str, technique: &str, weights: &[(&str, f64)]) -> StrategySpec {
        StrategySpec {
            name: name.to_string(),
            technique: technique.to_string(),
            description: String::new(),
            signal_weights: weights.iter().map(|(k, w)| (k.to_string(), *w)).collect(),
            targets_node: true,
        }
    }

    fn closing() -> StrategySpec {
        StrategySpec {
            targets_node: false,
            ..strategy("close", "closing", &[])
        }
    }

    fn spec(strategies: Vec<StrategySpec>) -> MethodologySpec {
        MethodologySpec {
            name: "test".to_string(),
            description: String::new(),
            strategies,
            phase_thresholds: PhaseThresholds {
                early_max: 5,
                mid_max: 15,
            },
            phases: BTreeMap::new(),
            exhaustion: ExhaustionConfig::default(),
        }
    }

    #[test]
    fn resolves_numeric_and_categorical_terms() {
        let m = Methodology::load(
            spec(vec![
                strategy(
                    "deepen",
                    "laddering",
                    &[
                        ("graph.node.exhausted.false", 1.0),
                        ("graph.node.exhaustion_score", -0.5),
                        ("llm.response_depth.surface", 0.8),
                    ],
                ),
                closing(),
            ]),
            &catalog(),
        )
        .unwrap();

        let deepen = m.strategy("deepen").unwrap();
        assert_eq!(deepen.technique, Technique::Laddering);
        assert!(deepen.terms.contains(&WeightTerm::Match {
            raw: "graph.node.exhausted.false".into(),
            key: keys::node_exhausted(),
            value: "false".into(),
            weight: 1.0,
        }));
        assert!(deepen.terms.contains(&WeightTerm::Numeric {
            raw: "graph.node.exhaustion_score".into(),
            key: keys::node_exhaustion_score(),
            weight: -0.5,
        }));
    }

    #[test]
    fn collects_every_violation() {
        let mut bad = spec(vec![
            strategy("a", "laddering", &[("graph.node.exhausted.flase", 1.0)]),
            strategy("a", "interrogation", &[("graph.nodes_total", 1.0)]),
            strategy("b", "probing", &[("llm.response_depth", 1.0)]),
        ]);
        bad.phase_thresholds = PhaseThresholds {
            early_max: 20,
            mid_max: 10,
        };
        bad.phases.insert(
            "mid".to_string(),
            PhaseProfileSpec {
                signal_weights: [("ghost".to_string(), 2.0)].into_iter().collect(),
                phase_bonuses: BTreeMap::new(),
            },
        );
        bad.phases.insert("finale".to_string(), PhaseProfileSpec::default());

        let errors = Methodology::load(bad, &catalog()).unwrap_err();
        let errors: Vec<_> = errors.iter().cloned().collect();

        assert!(errors.contains(&ConfigError::UnknownSignalValue {
            strategy: "a".into(),
            key: "graph.node.exhausted".into(),
            value: "flase".into(),
        }));
        assert!(errors.contains(&ConfigError::DuplicateStrategy("a".into())));
        assert!(errors.contains(&ConfigError::UnknownTechnique {
            strategy: "a".into(),
            technique: "interrogation".into(),
        }));
        assert!(errors.contains(&ConfigError::UnknownSignal {
            strategy: "a".into(),
            key: "graph.nodes_total".into(),
        }));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::KindMismatch { strategy, .. } if strategy == "b")));
        assert!(errors.contains(&ConfigError::NoFallbackStrategy));
        assert!(errors.contains(&ConfigError::InvalidPhaseThresholds {
            early_max: 20,
            mid_max: 10,
        }));
        assert!(errors.contains(&ConfigError::UnknownPhaseStrategy {
            phase: Phase::Mid,
            strategy: "ghost".into(),
        }));
        assert!(errors.contains(&ConfigError::UnknownPhase("finale".into())));
    }

    #[test]
    fn numeric_signal_with_label_suffix_is_a_kind_mismatch() {
        let errors = Methodology::load(
            spec(vec![strategy("a", "probing", &[("graph.node_count.high", 1.0)]), closing()]),
            &catalog(),
        )
        .unwrap_err();
        assert!(matches!(errors.0[0], ConfigError::KindMismatch { .. }));
    }

    #[test]
    fn rejects_non_finite_weights_and_bad_exhaustion() {
        let mut s = spec(vec![strategy("a", "probing", &[("graph.node_count", f64::NAN)]), closing()]);
        s.exhaustion.window = 0;
        let errors = Methodology::load(s, &catalog()).unwrap_err();
        assert!(errors.0.contains(&ConfigError::NonFiniteWeight {
            strategy: "a".into(),
            key: "graph.node_count".into(),
        }));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidExhaustion(msg) if msg.contains("window"))));
    }

    #[test]
    fn missing_phase_profiles_default_to_neutral() {
        let m = Methodology::load(spec(vec![strategy("a", "probing", &[]), closing()]), &catalog())
            .unwrap();
        assert_eq!(m.profile(Phase::Late).multiplier("a"), 1.0);
        assert_eq!(m.profile(Phase::Late).bonus("a"), 0.0);
    }

    #[test]
    fn parses_from_toml() {
        let raw = r#"
            name = "means_end_chain"

            [phase_thresholds]
            early_max = 5
            mid_max = 15

            [[strategies]]
            name = "deepen"
            technique = "laddering"
            [strategies.signal_weights]
            "graph.node.exhausted.false" = 1.0

            [[strategies]]
            name = "close"
            technique = "closing"
            targets_node = false

            [phases.late.phase_bonuses]
            close = 0.5

            [exhaustion]
            window = 4
            history_capacity = 8
        "#;
        let spec: MethodologySpec = toml::from_str(raw).unwrap();
        assert_eq!(spec.exhaustion.window, 4);
        assert_eq!(spec.exhaustion.min_focus_streak, 2);

        let m = Methodology::load(spec, &catalog()).unwrap();
        assert_eq!(m.strategies().len(), 2);
        assert_eq!(m.profile(Phase::Late).bonus("close"), 0.5);
        assert!(!m.strategy("close").unwrap().targets_node);
    }
}
