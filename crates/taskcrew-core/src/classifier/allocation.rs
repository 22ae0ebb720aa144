//! Static role/phase requirements per task type.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::TaskType;
use crate::roles::{Phase, Role};

/// Which of the five roles a task type needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRequirements {
    pub planner: bool,
    pub builder: bool,
    pub reviewer: bool,
    pub tester: bool,
    pub integrator: bool,
}

impl RoleRequirements {
    const fn new(planner: bool, builder: bool, reviewer: bool, tester: bool) -> Self {
        Self {
            planner,
            builder,
            reviewer,
            tester,
            integrator: false,
        }
    }

    pub fn is_required(&self, role: Role) -> bool {
        match role {
            Role::Planner => self.planner,
            Role::Builder => self.builder,
            Role::Reviewer => self.reviewer,
            Role::Tester => self.tester,
            Role::Integrator => self.integrator,
        }
    }

    /// The required roles as a set.
    pub fn required(&self) -> BTreeSet<Role> {
        Role::ALL
            .into_iter()
            .filter(|r| self.is_required(*r))
            .collect()
    }
}

/// Look up the roles required for `task_type`.
///
/// The Integrator is required for every task type exactly when integration
/// was requested.
pub fn get_required_roles(task_type: TaskType, integration_requested: bool) -> RoleRequirements {
    //                                        planner builder reviewer tester
    let mut reqs = match task_type {
        TaskType::FullProject => RoleRequirements::new(true, true, true, true),
        TaskType::ProofOfConcept => RoleRequirements::new(false, true, false, false),
        TaskType::Qa => RoleRequirements::new(false, false, false, true),
        TaskType::CodeReview => RoleRequirements::new(false, true, true, false),
        TaskType::BugFix => RoleRequirements::new(false, true, true, true),
        TaskType::Documentation => RoleRequirements::new(false, true, false, false),
        TaskType::TestGeneration => RoleRequirements::new(false, true, false, true),
        TaskType::Refactoring => RoleRequirements::new(false, true, true, true),
        TaskType::SecurityAudit => RoleRequirements::new(false, true, true, false),
        TaskType::FeatureAddition => RoleRequirements::new(false, true, true, true),
    };
    reqs.integrator = integration_requested;
    reqs
}

/// The phases implied by a set of roles, in pipeline order.
pub fn get_required_phases(roles: &BTreeSet<Role>) -> Vec<Phase> {
    Phase::ALL
        .into_iter()
        .filter(|p| roles.contains(&p.role()))
        .collect()
}
