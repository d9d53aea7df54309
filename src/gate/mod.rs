//! Role gate: the single declarative authority for who may do what, when.
//!
//! One table maps (state, action) to the set of permitted roles. Every
//! lifecycle operation consults it before touching anything, which keeps the
//! permission matrix in one place instead of scattered per-screen checks.
//!
//! Denials are reported with the offending (state, action, role) echoed so
//! the calling layer can render an actionable message. An empty permitted
//! set means the state simply has no such transition, which is an
//! `InvalidState` rather than a `Forbidden`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::LifecycleError;
use crate::types::{Actor, RequestState, Role};

/// Every user-facing action on a change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Create,
    UpdateDraft,
    Submit,
    Cancel,
    StartReview,
    Approve,
    Reject,
    AssignDeveloper,
    CreateBranch,
    CreatePullRequest,
    SubmitPlans,
    ApprovePlans,
    RejectPlans,
    ResumeDevelopment,
    SendToTesting,
    ApprovePullRequest,
    RejectPullRequest,
    Deploy,
    Complete,
    Fail,
}

impl Action {
    pub const ALL: [Action; 20] = [
        Action::Create,
        Action::UpdateDraft,
        Action::Submit,
        Action::Cancel,
        Action::StartReview,
        Action::Approve,
        Action::Reject,
        Action::AssignDeveloper,
        Action::CreateBranch,
        Action::CreatePullRequest,
        Action::SubmitPlans,
        Action::ApprovePlans,
        Action::RejectPlans,
        Action::ResumeDevelopment,
        Action::SendToTesting,
        Action::ApprovePullRequest,
        Action::RejectPullRequest,
        Action::Deploy,
        Action::Complete,
        Action::Fail,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::UpdateDraft => "update-draft",
            Action::Submit => "submit",
            Action::Cancel => "cancel",
            Action::StartReview => "start-review",
            Action::Approve => "approve",
            Action::Reject => "reject",
            Action::AssignDeveloper => "assign-developer",
            Action::CreateBranch => "create-branch",
            Action::CreatePullRequest => "create-pr",
            Action::SubmitPlans => "submit-plans",
            Action::ApprovePlans => "approve-plans",
            Action::RejectPlans => "reject-plans",
            Action::ResumeDevelopment => "resume-development",
            Action::SendToTesting => "send-to-testing",
            Action::ApprovePullRequest => "master-approve",
            Action::RejectPullRequest => "master-reject",
            Action::Deploy => "deploy",
            Action::Complete => "complete",
            Action::Fail => "fail",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The permission table. This is the canonical matrix; nothing else in the
/// crate decides role permissions.
pub fn permitted_roles(state: RequestState, action: Action) -> &'static [Role] {
    use Action::*;
    use RequestState::*;
    use Role::*;

    match (state, action) {
        // Drafting. Ownership (only the authoring user) is enforced by the
        // service on top of the role check.
        (Borrador, Create | UpdateDraft | Submit | Cancel) => &[User],

        // Admin triage of a submitted request. EnRevision is an optional
        // explicit step; approval and rejection work straight from Pendiente.
        (Pendiente, StartReview | Approve | Reject) => &[Admin],
        (EnRevision, Approve | Reject) => &[Admin],

        // Development starts when an admin assigns a developer. Branch and
        // pull-request creation is available from approval onward.
        (Aprobada, AssignDeveloper) => &[Admin],
        (Aprobada, CreateBranch | CreatePullRequest) => &[Developer],
        (EnDesarrollo, CreateBranch | CreatePullRequest) => &[Developer],
        (EnDesarrollo, SubmitPlans | SendToTesting) => &[Developer],

        // Plan review.
        (PlanesPendientesAprobacion, ApprovePlans | RejectPlans) => &[Admin, Master],
        (ListoParaImplementar, ResumeDevelopment) => &[Developer],

        // Testing and sign-off.
        (EnTesting, ApprovePullRequest | RejectPullRequest | Deploy) => &[Master],

        // Deployment outcome.
        (EnDespliegue, Complete | Fail) => &[Master],

        // Everything else, including every action in a terminal state.
        _ => &[],
    }
}

/// Authorizes `actor` to perform `action` in `state`.
pub fn authorize(
    state: RequestState,
    action: Action,
    actor: &Actor,
) -> Result<(), LifecycleError> {
    let permitted = permitted_roles(state, action);
    if permitted.is_empty() {
        return Err(LifecycleError::InvalidState { state, action });
    }
    if !permitted.contains(&actor.role) {
        return Err(LifecycleError::Forbidden {
            state,
            action,
            role: actor.role,
        });
    }
    Ok(())
}

/// Returns true if some state admits (action, role).
///
/// Used for idempotent replays: a retried call arrives after the state
/// already moved on, so the source-state check is gone; this confirms the
/// caller could legitimately have issued the action at all.
pub fn replay_permitted(action: Action, role: Role) -> bool {
    RequestState::ALL
        .iter()
        .any(|state| permitted_roles(*state, action).contains(&role))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UserId;

    fn actor(role: Role) -> Actor {
        Actor {
            id: UserId::new("someone"),
            role,
        }
    }

    #[test]
    fn draft_actions_belong_to_the_user() {
        assert_eq!(
            permitted_roles(RequestState::Borrador, Action::Submit),
            &[Role::User]
        );
        assert_eq!(
            permitted_roles(RequestState::Borrador, Action::Cancel),
            &[Role::User]
        );
    }

    #[test]
    fn initial_approval_belongs_to_the_admin() {
        for state in [RequestState::Pendiente, RequestState::EnRevision] {
            assert_eq!(permitted_roles(state, Action::Approve), &[Role::Admin]);
            assert_eq!(permitted_roles(state, Action::Reject), &[Role::Admin]);
        }
    }

    #[test]
    fn plan_review_is_shared_between_admin_and_master() {
        let roles = permitted_roles(
            RequestState::PlanesPendientesAprobacion,
            Action::ApprovePlans,
        );
        assert_eq!(roles, &[Role::Admin, Role::Master]);
    }

    #[test]
    fn pr_sign_off_belongs_to_the_master() {
        assert_eq!(
            permitted_roles(RequestState::EnTesting, Action::ApprovePullRequest),
            &[Role::Master]
        );
        assert_eq!(
            permitted_roles(RequestState::EnTesting, Action::RejectPullRequest),
            &[Role::Master]
        );
    }

    #[test]
    fn branch_work_is_available_from_approval_onward() {
        for state in [RequestState::Aprobada, RequestState::EnDesarrollo] {
            assert_eq!(
                permitted_roles(state, Action::CreateBranch),
                &[Role::Developer]
            );
            assert_eq!(
                permitted_roles(state, Action::CreatePullRequest),
                &[Role::Developer]
            );
        }
    }

    #[test]
    fn terminal_states_admit_no_action_for_any_role() {
        for state in RequestState::ALL.iter().filter(|s| s.is_terminal()) {
            for action in Action::ALL {
                assert!(
                    permitted_roles(*state, action).is_empty(),
                    "{state} unexpectedly admits {action}"
                );
            }
        }
    }

    #[test]
    fn empty_set_yields_invalid_state_for_every_role() {
        for role in Role::ALL {
            let result = authorize(RequestState::Completada, Action::Submit, &actor(role));
            assert!(matches!(
                result,
                Err(LifecycleError::InvalidState {
                    state: RequestState::Completada,
                    action: Action::Submit,
                })
            ));
        }
    }

    #[test]
    fn wrong_role_yields_forbidden_with_echoed_triple() {
        let result = authorize(
            RequestState::EnDesarrollo,
            Action::SubmitPlans,
            &actor(Role::Admin),
        );
        match result {
            Err(LifecycleError::Forbidden {
                state,
                action,
                role,
            }) => {
                assert_eq!(state, RequestState::EnDesarrollo);
                assert_eq!(action, Action::SubmitPlans);
                assert_eq!(role, Role::Admin);
            }
            other => panic!("expected Forbidden, got {other:?}"),
        }
    }

    #[test]
    fn permitted_role_passes() {
        assert!(authorize(
            RequestState::EnDesarrollo,
            Action::SubmitPlans,
            &actor(Role::Developer)
        )
        .is_ok());
    }

    /// The whole matrix: authorize agrees with the table for every triple.
    #[test]
    fn authorize_is_consistent_with_the_table() {
        for state in RequestState::ALL {
            for action in Action::ALL {
                let permitted = permitted_roles(state, action);
                for role in Role::ALL {
                    let result = authorize(state, action, &actor(role));
                    match (permitted.is_empty(), permitted.contains(&role)) {
                        (true, _) => assert!(matches!(
                            result,
                            Err(LifecycleError::InvalidState { .. })
                        )),
                        (false, true) => assert!(result.is_ok()),
                        (false, false) => assert!(matches!(
                            result,
                            Err(LifecycleError::Forbidden { .. })
                        )),
                    }
                }
            }
        }
    }

    #[test]
    fn replay_permitted_matches_some_state() {
        assert!(replay_permitted(Action::Submit, Role::User));
        assert!(replay_permitted(Action::ApprovePlans, Role::Master));
        assert!(!replay_permitted(Action::Submit, Role::Master));
        assert!(!replay_permitted(Action::Deploy, Role::User));
    }
}
