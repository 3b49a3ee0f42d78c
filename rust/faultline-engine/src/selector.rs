//! Choosing the candidate root cause a feedback path should end at.

use crate::belief::{Beliefs, Labels};
use crate::config::SelectionConfig;
use faultline_core::StepOrder;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SelectionStrategy {
    /// The step with the lowest correctness belief.
    #[default]
    MinProbability,
    /// The earliest step whose belief falls below the threshold, or the
    /// lowest-belief step when none does.
    FirstBelow,
}

#[derive(Debug, Clone)]
pub struct RootCauseSelector {
    strategy: SelectionStrategy,
    threshold: f64,
}

impl RootCauseSelector {
    pub fn new(strategy: SelectionStrategy, threshold: f64) -> Self {
        Self {
            strategy,
            threshold,
        }
    }

    pub fn from_config(config: &SelectionConfig) -> Self {
        Self::new(config.strategy, config.threshold)
    }

    /// Pick the candidate among `slice`. Steps pinned by feedback are never
    /// candidates; ties go to the earliest step. Falls back to `output` when
    /// every slice step is pinned.
    pub fn select(
        &self,
        slice: &[StepOrder],
        beliefs: &Beliefs,
        labels: &Labels,
        output: StepOrder,
    ) -> StepOrder {
        let mut candidates: Vec<(StepOrder, f64)> = slice
            .iter()
            .filter(|s| !labels.is_fixed_step(**s))
            .map(|s| (*s, beliefs.step(*s)))
            .collect();
        candidates.sort_by_key(|(s, _)| *s);

        let lowest = candidates
            .iter()
            .copied()
            .reduce(|best, next| if next.1 < best.1 { next } else { best });

        let chosen = match self.strategy {
            SelectionStrategy::MinProbability => lowest,
            SelectionStrategy::FirstBelow => candidates
                .iter()
                .copied()
                .find(|(_, p)| *p < self.threshold)
                .or(lowest),
        };

        match chosen {
            Some((step, probability)) => {
                debug!(strategy = %self.strategy, %step, probability, "selected candidate root cause");
                step
            }
            None => output,
        }
    }
}

impl Default for RootCauseSelector {
    fn default() -> Self {
        Self::from_config(&SelectionConfig::default())
    }
}
