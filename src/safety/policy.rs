//! Policy resolution
//!
//! Maps (safety level, policy mode) to an execution decision:
//!
//! | Policy   | READ_ONLY   | SIDE_EFFECT | DESTRUCTIVE |
//! |----------|-------------|-------------|-------------|
//! | strict   | RequireHitl | RequireHitl | Block       |
//! | standard | AutoExecute | RequireHitl | Block       |
//! | relaxed  | AutoExecute | AutoExecute | Block       |

use super::{PolicyMode, SafetyLevel};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    AutoExecute,
    RequireHitl,
    Block,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::AutoExecute => write!(f, "auto_execute"),
            Decision::RequireHitl => write!(f, "require_hitl"),
            Decision::Block => write!(f, "block"),
        }
    }
}

pub struct SafetyPolicyGuard;

impl SafetyPolicyGuard {
    pub fn decide(level: SafetyLevel, policy: PolicyMode) -> Decision {
        match (level, policy) {
            (SafetyLevel::Destructive, _) => Decision::Block,
            (SafetyLevel::SideEffect, PolicyMode::Relaxed) => Decision::AutoExecute,
            (SafetyLevel::SideEffect, _) => Decision::RequireHitl,
            (SafetyLevel::ReadOnly, PolicyMode::Strict) => Decision::RequireHitl,
            (SafetyLevel::ReadOnly, _) => Decision::AutoExecute,
        }
    }

    pub fn requires_hitl(level: SafetyLevel, policy: PolicyMode) -> bool {
        Self::decide(level, policy) == Decision::RequireHitl
    }

    /// Whether the command may run at all, with or without confirmation
    pub fn is_allowed(level: SafetyLevel, policy: PolicyMode) -> bool {
        Self::decide(level, policy) != Decision::Block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEVELS: [SafetyLevel; 3] = [
        SafetyLevel::ReadOnly,
        SafetyLevel::SideEffect,
        SafetyLevel::Destructive,
    ];
    const POLICIES: [PolicyMode; 3] = [PolicyMode::Strict, PolicyMode::Standard, PolicyMode::Relaxed];

    #[test]
    fn test_decision_table() {
        use Decision::*;
        let expected = [
            [RequireHitl, RequireHitl, Block],
            [AutoExecute, RequireHitl, Block],
            [AutoExecute, AutoExecute, Block],
        ];

        for (p, policy) in POLICIES.iter().enumerate() {
            for (l, level) in LEVELS.iter().enumerate() {
                assert_eq!(
                    SafetyPolicyGuard::decide(*level, *policy),
                    expected[p][l],
                    "{} / {}",
                    policy,
                    level
                );
            }
        }
    }

    #[test]
    fn test_destructive_never_auto_executes() {
        for policy in POLICIES {
            assert_eq!(SafetyPolicyGuard::decide(SafetyLevel::Destructive, policy), Decision::Block);
            assert!(!SafetyPolicyGuard::is_allowed(SafetyLevel::Destructive, policy));
        }
    }

    #[test]
    fn test_helpers_agree_with_decide() {
        assert!(SafetyPolicyGuard::requires_hitl(SafetyLevel::ReadOnly, PolicyMode::Strict));
        assert!(!SafetyPolicyGuard::requires_hitl(SafetyLevel::ReadOnly, PolicyMode::Standard));
        assert!(SafetyPolicyGuard::is_allowed(SafetyLevel::SideEffect, PolicyMode::Strict));
    }
}
