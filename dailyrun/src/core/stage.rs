//! Linear stage machine for a single run.
//!
//! `Init → Collect → Translate → Cleanup → CommitOrSkip → Done`, with a failure
//! edge from every non-terminal stage to `Aborted`. There are no cycles.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::types::StepKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    Collect,
    Translate,
    Cleanup,
    CommitOrSkip,
    Done,
    Aborted,
}

impl Stage {
    /// Successor on success. Terminal stages map to themselves.
    pub fn next(self) -> Stage {
        match self {
            Stage::Init => Stage::Collect,
            Stage::Collect => Stage::Translate,
            Stage::Translate => Stage::Cleanup,
            Stage::Cleanup => Stage::CommitOrSkip,
            Stage::CommitOrSkip => Stage::Done,
            Stage::Done => Stage::Done,
            Stage::Aborted => Stage::Aborted,
        }
    }

    /// The external step executed in this stage, if any.
    pub fn step(self) -> Option<StepKind> {
        match self {
            Stage::Collect => Some(StepKind::Collect),
            Stage::Translate => Some(StepKind::Translate),
            Stage::Cleanup => Some(StepKind::Cleanup),
            _ => None,
        }
    }
}

impl From<StepKind> for Stage {
    fn from(step: StepKind) -> Self {
        match step {
            StepKind::Collect => Stage::Collect,
            StepKind::Translate => Stage::Translate,
            StepKind::Cleanup => Stage::Cleanup,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::Collect => "collect",
            Stage::Translate => "translate",
            Stage::Cleanup => "cleanup",
            Stage::CommitOrSkip => "commit-or-skip",
            Stage::Done => "done",
            Stage::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_linear_sequence_to_done() {
        let mut stage = Stage::Init;
        let mut seen = vec![stage];
        while stage != Stage::Done {
            stage = stage.next();
            seen.push(stage);
        }
        assert_eq!(
            seen,
            vec![
                Stage::Init,
                Stage::Collect,
                Stage::Translate,
                Stage::Cleanup,
                Stage::CommitOrSkip,
                Stage::Done,
            ]
        );
    }

    #[test]
    fn step_stages_follow_step_order() {
        let steps: Vec<StepKind> = [Stage::Init, Stage::Collect, Stage::Translate, Stage::Cleanup]
            .iter()
            .filter_map(|stage| stage.step())
            .collect();
        assert_eq!(steps, StepKind::ALL.to_vec());
    }

    #[test]
    fn terminal_stages_are_sticky() {
        assert_eq!(Stage::Done.next(), Stage::Done);
        assert_eq!(Stage::Aborted.next(), Stage::Aborted);
    }

    #[test]
    fn step_stages_round_trip_through_step_kind() {
        for kind in StepKind::ALL {
            assert_eq!(Stage::from(kind).step(), Some(kind));
        }
    }
}
