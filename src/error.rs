//! Error taxonomy for lifecycle operations.
//!
//! Client errors (`Forbidden`, `InvalidState`, `Validation`, `Conflict`) are
//! surfaced to the caller verbatim and are never retried. `Upstream` wraps a
//! Git-hosting provider failure; the orchestrator retries the transient ones
//! once before surfacing, and a surfaced upstream error leaves the change
//! request untouched so the same action can be retried safely.

use thiserror::Error;

use crate::gate::Action;
use crate::git::GitHostError;
use crate::types::{PrStatus, RepoType, RequestId, RequestState, Role};

/// Top-level error returned by every lifecycle operation.
///
/// Each variant carries enough structure (kind, current state, attempted
/// action) for the calling layer to render an actionable message.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The action exists in the current state, but not for this role.
    #[error("role {role} may not {action} while the request is {state}")]
    Forbidden {
        state: RequestState,
        action: Action,
        role: Role,
    },

    /// The current state defines no such transition at all.
    #[error("cannot {action} while the request is {state}")]
    InvalidState {
        state: RequestState,
        action: Action,
    },

    /// A payload invariant was violated.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A duplicate artifact or a stale concurrent write.
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// The Git-hosting provider failed after retry.
    #[error("git hosting provider error: {0}")]
    Upstream(#[from] GitHostError),

    /// No change request with this id exists.
    #[error("change request {id} not found")]
    NotFound { id: RequestId },
}

impl LifecycleError {
    /// Short machine-readable kind, for callers that tag responses.
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleError::Forbidden { .. } => "forbidden",
            LifecycleError::InvalidState { .. } => "invalid_state",
            LifecycleError::Validation(_) => "validation",
            LifecycleError::Conflict(_) => "conflict",
            LifecycleError::Upstream(_) => "upstream",
            LifecycleError::NotFound { .. } => "not_found",
        }
    }
}

/// A payload or derived-state invariant was not met.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// One or more of the four technical plan fields is blank.
    #[error("technical plans incomplete, missing: {}", missing.join(", "))]
    IncompletePlans { missing: Vec<&'static str> },

    /// The title of a draft may not be blank.
    #[error("title must not be blank")]
    BlankTitle,

    /// The operation needs a branch that was never recorded.
    #[error("no branch recorded for the {repo_type} repository")]
    MissingBranch { repo_type: RepoType },

    /// The operation needs a pull request that was never recorded.
    #[error("no pull request recorded for the {repo_type} repository")]
    MissingPullRequest { repo_type: RepoType },

    /// Not every tracked repository has an active pull request yet.
    #[error("not every tracked repository has an active pull request")]
    NotReadyForTesting,

    /// Deployment requires every pull request to be approved or merged.
    #[error("the {repo_type} pull request is not approved or merged")]
    PullRequestsNotApproved { repo_type: RepoType },
}

/// A duplicate artifact or a concurrent-modification conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConflictError {
    /// A branch already exists for this (request, repository type).
    #[error("a branch already exists for the {repo_type} repository")]
    BranchAlreadyExists { repo_type: RepoType },

    /// The branch already has a pull request that is neither rejected nor
    /// merged.
    #[error("an open pull request already exists for the {repo_type} repository")]
    OpenPullRequestExists { repo_type: RepoType },

    /// A status update tried to move backward along the status graph.
    #[error("pull request status may not move from {from} to {to}")]
    PrStatusRegression { from: PrStatus, to: PrStatus },

    /// The aggregate was modified concurrently; reload and retry.
    #[error("stale version: expected {expected}, found {found}")]
    StaleVersion { expected: u64, found: u64 },

    /// A request with this id already exists in the store.
    #[error("change request {id} already exists")]
    DuplicateRequest { id: RequestId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_message_names_state_action_and_role() {
        let err = LifecycleError::Forbidden {
            state: RequestState::EnDesarrollo,
            action: Action::SubmitPlans,
            role: Role::User,
        };
        let message = err.to_string();
        assert!(message.contains("EN_DESARROLLO"));
        assert!(message.contains("submit-plans"));
        assert!(message.contains("USER"));
    }

    #[test]
    fn incomplete_plans_lists_the_blank_fields() {
        let err = ValidationError::IncompletePlans {
            missing: vec!["rollout", "backout"],
        };
        assert_eq!(
            err.to_string(),
            "technical plans incomplete, missing: rollout, backout"
        );
    }

    #[test]
    fn kinds_are_stable() {
        assert_eq!(
            LifecycleError::Validation(ValidationError::NotReadyForTesting).kind(),
            "validation"
        );
        assert_eq!(
            LifecycleError::Conflict(ConflictError::StaleVersion {
                expected: 1,
                found: 2
            })
            .kind(),
            "conflict"
        );
        assert_eq!(LifecycleError::NotFound { id: RequestId(9) }.kind(), "not_found");
    }
}
