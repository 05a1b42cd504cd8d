//! Stand-ins for the text-analysis collaborator.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::debug;

use ladder_common::{keys, DepthLabel};
use ladder_engine::{TextAnalysis, TextAnalysisSource};

use crate::transcript::{ScriptedValues, Transcript};

const HEDGES: &[&str] = &[
    "maybe", "perhaps", "i guess", "kind of", "sort of", "not sure", "i think", "probably",
];
const POSITIVE: &[&str] = &["love", "like", "enjoy", "great", "happy", "calm", "good", "better"];
const NEGATIVE: &[&str] = &["hate", "dislike", "bad", "worse", "annoying", "stress", "worried"];
const REASONING: &[&str] = &["because", "so that", "which means", "that way", "matters"];

/// Word-count and keyword heuristics. Stateless: every call depends only on
/// the text it is given.
#[derive(Debug, Default, Clone, Copy)]
pub struct LexicalAnalysis;

impl LexicalAnalysis {
    pub fn read(&self, response_text: &str) -> TextAnalysis {
        let lower = response_text.to_lowercase();
        let words = lower.split_whitespace().count();
        let reasons = count_phrases(&lower, REASONING);

        let depth = match (words, reasons) {
            (0..=3, _) => DepthLabel::Surface,
            (_, 0) if words < 12 => DepthLabel::Shallow,
            (_, 0) | (_, 1) => DepthLabel::Moderate,
            _ => DepthLabel::Deep,
        };

        let hedges = count_phrases(&lower, HEDGES);
        let hedging = match hedges {
            0 => "none",
            1 => "low",
            2 => "medium",
            _ => "high",
        };

        let positive = count_phrases(&lower, POSITIVE) as f64;
        let negative = count_phrases(&lower, NEGATIVE) as f64;
        let valence = if positive + negative == 0.0 {
            0.0
        } else {
            (positive - negative) / (positive + negative)
        };

        TextAnalysis::new()
            .with(keys::response_depth(), depth)
            .with(keys::valence(), valence)
            .with(keys::hedging_language(), hedging)
            .with(keys::response_quality_trend(), "stable")
    }
}

fn count_phrases(text: &str, phrases: &[&str]) -> usize {
    phrases.iter().map(|p| text.matches(p).count()).sum()
}

#[async_trait]
impl TextAnalysisSource for LexicalAnalysis {
    async fn analyze(&self, response_text: &str) -> Result<TextAnalysis> {
        Ok(self.read(response_text))
    }
}

/// Transcript-scripted analysis keyed by response text, with the lexical
/// heuristic for answers the transcript leaves unannotated.
///
/// Turns that repeat an answer word for word get their own scripted values
/// in transcript order. Once the earlier ones are used up, the last value
/// for a text answers every further call.
#[derive(Debug, Default)]
pub struct ScriptedAnalysis {
    scripted: Mutex<HashMap<String, VecDeque<TextAnalysis>>>,
    fallback: LexicalAnalysis,
}

impl ScriptedAnalysis {
    pub fn from_transcript(transcript: &Transcript) -> Self {
        let mut scripted: HashMap<String, VecDeque<TextAnalysis>> = HashMap::new();
        for turn in &transcript.turns {
            if let Some(values) = &turn.analysis {
                scripted
                    .entry(turn.response.clone())
                    .or_default()
                    .push_back(scripted_values(values));
            }
        }
        for (text, queue) in &scripted {
            if queue.len() > 1 {
                debug!(chars = text.len(), turns = queue.len(), "Response text repeats across turns");
            }
        }
        Self {
            scripted: Mutex::new(scripted),
            fallback: LexicalAnalysis,
        }
    }

    /// Distinct scripted response texts.
    pub fn scripted_count(&self) -> usize {
        self.scripted.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn next_scripted(&self, response_text: &str) -> Result<Option<TextAnalysis>> {
        let mut scripted = self
            .scripted
            .lock()
            .map_err(|_| anyhow!("scripted analysis lock poisoned"))?;
        let Some(queue) = scripted.get_mut(response_text) else {
            return Ok(None);
        };
        if queue.len() > 1 {
            Ok(queue.pop_front())
        } else {
            Ok(queue.front().cloned())
        }
    }
}

fn scripted_values(values: &ScriptedValues) -> TextAnalysis {
    TextAnalysis::new()
        .with(keys::response_depth(), values.response_depth.as_str())
        .with(keys::valence(), values.valence)
        .with(keys::hedging_language(), values.hedging_language.as_str())
        .with(keys::response_quality_trend(), values.response_quality_trend.as_str())
}

#[async_trait]
impl TextAnalysisSource for ScriptedAnalysis {
    async fn analyze(&self, response_text: &str) -> Result<TextAnalysis> {
        match self.next_scripted(response_text)? {
            Some(analysis) => Ok(analysis),
            None => {
                debug!(chars = response_text.len(), "No scripted analysis, using lexical heuristics");
                Ok(self.fallback.read(response_text))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ladder_common::SignalValue;

    fn depth_of(analysis: &TextAnalysis) -> Option<&SignalValue> {
        analysis.0.get(&keys::response_depth())
    }

    #[test]
    fn short_answers_read_as_surface() {
        let analysis = LexicalAnalysis.read("It's fine.");
        assert_eq!(depth_of(&analysis), Some(&SignalValue::from("surface")));
    }

    #[test]
    fn reasoning_reads_as_deep() {
        let analysis = LexicalAnalysis.read(
            "I pick it because it keeps me calm in the morning, which means I start the day with less stress",
        );
        assert_eq!(depth_of(&analysis), Some(&SignalValue::from("deep")));
    }

    #[tokio::test]
    async fn repeated_answers_keep_their_own_scripted_values() {
        let transcript: Transcript = serde_json::from_value(serde_json::json!({
            "turns": [
                { "response": "I don't know.", "analysis": { "response_depth": "surface" } },
                { "response": "Because it saves me time.", "analysis": { "response_depth": "moderate" } },
                { "response": "I don't know.", "analysis": { "response_depth": "shallow" } }
            ]
        }))
        .unwrap();
        let analysis = ScriptedAnalysis::from_transcript(&transcript);
        assert_eq!(analysis.scripted_count(), 2);

        let first = analysis.analyze("I don't know.").await.unwrap();
        let second = analysis.analyze("I don't know.").await.unwrap();
        let retried = analysis.analyze("I don't know.").await.unwrap();

        assert_eq!(depth_of(&first), Some(&SignalValue::from("surface")));
        assert_eq!(depth_of(&second), Some(&SignalValue::from("shallow")));
        assert_eq!(depth_of(&retried), Some(&SignalValue::from("shallow")));
    }

    #[test]
    fn hedges_and_valence_are_counted() {
        let analysis = LexicalAnalysis.read("Maybe I like it, I guess, kind of, I think");
        assert_eq!(
            analysis.0.get(&keys::hedging_language()),
            Some(&SignalValue::from("high"))
        );
        assert_eq!(analysis.0.get(&keys::valence()), Some(&SignalValue::Numeric(1.0)));
    }
}
