use serde::Serialize;

/// Session-level record of which strategy was chosen, turn by turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StrategyHistory {
    last_strategy: Option<String>,
    consecutive: u32,
    last_change_turn: Option<u32>,
    decisions: u32,
}

impl StrategyHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, turn: u32, strategy: &str) {
        if self.last_strategy.as_deref() == Some(strategy) {
            self.consecutive += 1;
        } else {
            self.last_strategy = Some(strategy.to_string());
            self.consecutive = 1;
            self.last_change_turn = Some(turn);
        }
        self.decisions += 1;
    }

    pub fn last_strategy(&self) -> Option<&str> {
        self.last_strategy.as_deref()
    }

    /// Length of the current run of the same strategy. 0 before any decision.
    pub fn repetition_count(&self) -> u32 {
        self.consecutive
    }

    pub fn turns_since_change(&self, turn: u32) -> u32 {
        self.last_change_turn
            .map_or(0, |changed| turn.saturating_sub(changed))
    }

    pub fn decisions(&self) -> u32 {
        self.decisions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_runs_and_changes() {
        let mut history = StrategyHistory::new();
        assert_eq!(history.repetition_count(), 0);
        assert_eq!(history.turns_since_change(4), 0);

        history.record(1, "deepen");
        history.record(2, "deepen");
        assert_eq!(history.repetition_count(), 2);
        assert_eq!(history.turns_since_change(3), 2);

        history.record(3, "broaden");
        assert_eq!(history.repetition_count(), 1);
        assert_eq!(history.last_strategy(), Some("broaden"));
        assert_eq!(history.turns_since_change(4), 1);
        assert_eq!(history.decisions(), 3);
    }
}
