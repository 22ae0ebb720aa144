//! Core vocabulary: `Role` and `Phase`.
//!
//! Every phase is owned by exactly one role, so the two enums map 1:1.

use serde::{Deserialize, Serialize};

/// The five responsibilities a request can be split across.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Planner,
    Builder,
    Reviewer,
    Tester,
    Integrator,
}

impl Role {
    /// All roles in pipeline order.
    pub const ALL: [Role; 5] = [
        Role::Planner,
        Role::Builder,
        Role::Reviewer,
        Role::Tester,
        Role::Integrator,
    ];

    /// The phase this role executes.
    pub fn phase(self) -> Phase {
        match self {
            Role::Planner => Phase::Plan,
            Role::Builder => Phase::Build,
            Role::Reviewer => Phase::Review,
            Role::Tester => Phase::Test,
            Role::Integrator => Phase::Integrate,
        }
    }

    /// Default persona handed to the execution capability.
    pub fn default_persona(self) -> &'static str {
        match self {
            Role::Planner => "Project Manager: turns a request into an actionable development plan",
            Role::Builder => "Software Developer: implements the plan as working source files",
            Role::Reviewer => "Code Reviewer: checks correctness, quality and adherence to the plan",
            Role::Tester => "QA Engineer: writes and runs tests, reports failures precisely",
            Role::Integrator => "Integration Manager: prepares, reviews and merges the change request",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Planner => "planner",
            Role::Builder => "builder",
            Role::Reviewer => "reviewer",
            Role::Tester => "tester",
            Role::Integrator => "integrator",
        };
        write!(f, "{s}")
    }
}

/// One stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Plan,
    Build,
    Review,
    Test,
    Integrate,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Phase; 5] = [
        Phase::Plan,
        Phase::Build,
        Phase::Review,
        Phase::Test,
        Phase::Integrate,
    ];

    /// The role that owns this phase.
    pub fn role(self) -> Role {
        match self {
            Phase::Plan => Role::Planner,
            Phase::Build => Role::Builder,
            Phase::Review => Role::Reviewer,
            Phase::Test => Role::Tester,
            Phase::Integrate => Role::Integrator,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Plan => "plan",
            Phase::Build => "build",
            Phase::Review => "review",
            Phase::Test => "test",
            Phase::Integrate => "integrate",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_phase_mapping_is_bijective() {
        for role in Role::ALL {
            assert_eq!(role.phase().role(), role);
        }
        for phase in Phase::ALL {
            assert_eq!(phase.role().phase(), phase);
        }
    }

    #[test]
    fn test_phase_order_matches_role_order() {
        let from_roles: Vec<Phase> = Role::ALL.iter().map(|r| r.phase()).collect();
        assert_eq!(from_roles, Phase::ALL.to_vec());
    }

    #[test]
    fn test_display_is_snake_case_like_serde() {
        let json = serde_json::to_string(&Role::Integrator).unwrap();
        assert_eq!(json, format!("\"{}\"", Role::Integrator));
    }
}
