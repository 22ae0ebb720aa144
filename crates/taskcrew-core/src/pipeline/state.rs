//! Pipeline states and their fixed ordering.

use serde::{Deserialize, Serialize};

use crate::roles::Phase;

/// `Classify -> Plan -> Build -> Review -> Test -> Integrate -> Done`, with
/// `Failed` reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Classify,
    Plan,
    Build,
    Review,
    Test,
    Integrate,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// The phase executed in this state, if any.
    pub fn phase(self) -> Option<Phase> {
        match self {
            Self::Plan => Some(Phase::Plan),
            Self::Build => Some(Phase::Build),
            Self::Review => Some(Phase::Review),
            Self::Test => Some(Phase::Test),
            Self::Integrate => Some(Phase::Integrate),
            Self::Classify | Self::Done | Self::Failed => None,
        }
    }

    /// Successor on success. Terminal states absorb.
    pub fn next(self) -> Self {
        match self {
            Self::Classify => Self::Plan,
            Self::Plan => Self::Build,
            Self::Build => Self::Review,
            Self::Review => Self::Test,
            Self::Test => Self::Integrate,
            Self::Integrate => Self::Done,
            Self::Done => Self::Done,
            Self::Failed => Self::Failed,
        }
    }

    /// Successor on failure. `Done` stays `Done`.
    pub fn fail(self) -> Self {
        match self {
            Self::Done => Self::Done,
            _ => Self::Failed,
        }
    }
}

impl From<Phase> for PipelineState {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Plan => Self::Plan,
            Phase::Build => Self::Build,
            Phase::Review => Self::Review,
            Phase::Test => Self::Test,
            Phase::Integrate => Self::Integrate,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Classify => "classify",
            Self::Plan => "plan",
            Self::Build => "build",
            Self::Review => "review",
            Self::Test => "test",
            Self::Integrate => "integrate",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_visits_every_phase_in_order() {
        let mut state = PipelineState::Classify;
        let mut phases = Vec::new();
        while !state.is_terminal() {
            if let Some(p) = state.phase() {
                phases.push(p);
            }
            state = state.next();
        }
        assert_eq!(phases, Phase::ALL.to_vec());
        assert_eq!(state, PipelineState::Done);
    }

    #[test]
    fn test_failed_absorbs() {
        for s in [PipelineState::Classify, PipelineState::Build, PipelineState::Integrate] {
            assert_eq!(s.fail(), PipelineState::Failed);
        }
        assert_eq!(PipelineState::Failed.next(), PipelineState::Failed);
        assert_eq!(PipelineState::Done.fail(), PipelineState::Done);
    }

    #[test]
    fn test_phase_round_trip() {
        for p in Phase::ALL {
            assert_eq!(PipelineState::from(p).phase(), Some(p));
        }
    }
}
