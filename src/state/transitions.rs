//! State transitions for the change-request lifecycle.
//!
//! Pure functions for computing the successor aggregate from the current
//! request and a requested transition. Role authorization happens in the
//! gate before any of this runs; readiness checks that need tracker state
//! (testing readiness, deployment sign-off) happen in the service. What is
//! validated here is everything derivable from the aggregate itself.

use chrono::{DateTime, Utc};

use crate::error::{LifecycleError, ValidationError};
use crate::gate::Action;
use crate::types::{ChangeRequest, RequestState, TechnicalPlans, UserId};

/// A requested state transition with its payload.
///
/// Branch and pull-request creation are deliberately absent: they are side
/// effects on the provider and the tracker, not movements of the request
/// state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Owner submits the draft for admin triage.
    Submit,

    /// Admin picks the request up for explicit review.
    StartReview,

    /// Admin approves the request.
    Approve { comments: Option<String> },

    /// Admin rejects the request. Terminal.
    Reject { comments: String },

    /// Admin assigns a developer; development starts.
    AssignDeveloper { developer: UserId },

    /// Developer submits the four technical plans.
    SubmitPlans { plans: TechnicalPlans },

    /// Admin or master approves the submitted plans.
    ApprovePlans,

    /// Admin or master sends the plans back for rework.
    RejectPlans { comments: String },

    /// Developer resumes implementation after plan approval.
    ResumeDevelopment,

    /// Developer hands the request over to testing.
    SendToTesting,

    /// Master rejects a pull request during testing; the request bounces
    /// back to development with the rejection reason visible to the
    /// developer only.
    RejectPullRequest { comments: String },

    /// Master starts the deployment.
    Deploy,

    /// Deployment finished successfully. Terminal.
    Complete,

    /// Deployment failed. Terminal.
    Fail,

    /// Owner withdraws the draft. Terminal.
    Cancel,
}

impl Transition {
    /// The gate action this transition corresponds to.
    pub fn action(&self) -> Action {
        match self {
            Transition::Submit => Action::Submit,
            Transition::StartReview => Action::StartReview,
            Transition::Approve { .. } => Action::Approve,
            Transition::Reject { .. } => Action::Reject,
            Transition::AssignDeveloper { .. } => Action::AssignDeveloper,
            Transition::SubmitPlans { .. } => Action::SubmitPlans,
            Transition::ApprovePlans => Action::ApprovePlans,
            Transition::RejectPlans { .. } => Action::RejectPlans,
            Transition::ResumeDevelopment => Action::ResumeDevelopment,
            Transition::SendToTesting => Action::SendToTesting,
            Transition::RejectPullRequest { .. } => Action::RejectPullRequest,
            Transition::Deploy => Action::Deploy,
            Transition::Complete => Action::Complete,
            Transition::Fail => Action::Fail,
            Transition::Cancel => Action::Cancel,
        }
    }

    /// The state this transition lands in when it applies.
    pub fn target_state(&self) -> RequestState {
        match self {
            Transition::Submit => RequestState::Pendiente,
            Transition::StartReview => RequestState::EnRevision,
            Transition::Approve { .. } => RequestState::Aprobada,
            Transition::Reject { .. } => RequestState::Rechazada,
            Transition::AssignDeveloper { .. } => RequestState::EnDesarrollo,
            Transition::SubmitPlans { .. } => RequestState::PlanesPendientesAprobacion,
            Transition::ApprovePlans => RequestState::ListoParaImplementar,
            Transition::RejectPlans { .. } => RequestState::EnDesarrollo,
            Transition::ResumeDevelopment => RequestState::EnDesarrollo,
            Transition::SendToTesting => RequestState::EnTesting,
            Transition::RejectPullRequest { .. } => RequestState::EnDesarrollo,
            Transition::Deploy => RequestState::EnDespliegue,
            Transition::Complete => RequestState::Completada,
            Transition::Fail => RequestState::Fallida,
            Transition::Cancel => RequestState::Cancelada,
        }
    }
}

/// Returns true if `transition` has already been applied to `request`.
///
/// A retried call arrives after the state moved on; re-applying the same
/// transition with the same payload must be a no-op success, never a second
/// side effect. Terminal targets are excluded: a terminal state admits no
/// operation at all, so even an exact replay of the closing transition is
/// refused there.
pub fn is_replay(request: &ChangeRequest, transition: &Transition) -> bool {
    let target = transition.target_state();
    if request.state != target || target.is_terminal() {
        return false;
    }

    match transition {
        Transition::AssignDeveloper { developer } => {
            request.assigned_developer.as_ref() == Some(developer)
        }
        Transition::SubmitPlans { plans } => request.technical_plans.as_ref() == Some(plans),
        Transition::Approve { comments: Some(c) } => {
            request.admin_comments.as_deref() == Some(c.as_str())
        }
        Transition::RejectPlans { comments } => {
            request.admin_comments.as_deref() == Some(comments.as_str())
        }
        Transition::RejectPullRequest { comments } => {
            request.internal_comments.as_deref() == Some(comments.as_str())
        }
        _ => true,
    }
}

/// Computes the successor aggregate for a transition.
///
/// Returns the updated request on success. Arms not defined on the graph
/// fall through to `InvalidState`. The caller persists the result
/// atomically; nothing here touches storage or the provider.
pub fn apply(
    request: &ChangeRequest,
    transition: &Transition,
    now: DateTime<Utc>,
) -> Result<ChangeRequest, LifecycleError> {
    use RequestState::*;

    let mut next = request.clone();

    match (&request.state, transition) {
        (Borrador, Transition::Submit) => {
            next.state = Pendiente;
        }

        (Borrador, Transition::Cancel) => {
            next.state = Cancelada;
        }

        (Pendiente, Transition::StartReview) => {
            next.state = EnRevision;
        }

        (Pendiente | EnRevision, Transition::Approve { comments }) => {
            next.state = Aprobada;
            if comments.is_some() {
                next.admin_comments = comments.clone();
            }
            next.responded_at = Some(now);
        }

        (Pendiente | EnRevision, Transition::Reject { comments }) => {
            next.state = Rechazada;
            next.admin_comments = Some(comments.clone());
            next.responded_at = Some(now);
        }

        (Aprobada, Transition::AssignDeveloper { developer }) => {
            next.assigned_developer = Some(developer.clone());
            next.state = EnDesarrollo;
        }

        (EnDesarrollo, Transition::SubmitPlans { plans }) => {
            let missing = plans.missing_fields();
            if !missing.is_empty() {
                return Err(ValidationError::IncompletePlans { missing }.into());
            }
            next.technical_plans = Some(plans.clone());
            next.state = PlanesPendientesAprobacion;
        }

        (PlanesPendientesAprobacion, Transition::ApprovePlans) => {
            next.state = ListoParaImplementar;
        }

        (PlanesPendientesAprobacion, Transition::RejectPlans { comments }) => {
            next.admin_comments = Some(comments.clone());
            next.state = EnDesarrollo;
        }

        (ListoParaImplementar, Transition::ResumeDevelopment) => {
            next.state = EnDesarrollo;
        }

        (EnDesarrollo, Transition::SendToTesting) => {
            next.state = EnTesting;
        }

        (EnTesting, Transition::RejectPullRequest { comments }) => {
            next.internal_comments = Some(comments.clone());
            next.state = EnDesarrollo;
        }

        (EnTesting, Transition::Deploy) => {
            next.state = EnDespliegue;
        }

        (EnDespliegue, Transition::Complete) => {
            next.state = Completada;
        }

        (EnDespliegue, Transition::Fail) => {
            next.state = Fallida;
        }

        (state, transition) => {
            return Err(LifecycleError::InvalidState {
                state: *state,
                action: transition.action(),
            });
        }
    }

    next.last_updated_at = now;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{arb_change_request, complete_plans, draft_request};
    use proptest::prelude::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn request_in(state: RequestState) -> ChangeRequest {
        let mut request = draft_request(42);
        request.state = state;
        request
    }

    mod happy_path {
        use super::*;

        #[test]
        fn submit_moves_draft_to_pendiente() {
            let request = request_in(RequestState::Borrador);
            let next = apply(&request, &Transition::Submit, at(10)).unwrap();

            assert_eq!(next.state, RequestState::Pendiente);
            assert_eq!(next.last_updated_at, at(10));
        }

        #[test]
        fn approve_works_from_pendiente_and_en_revision() {
            for state in [RequestState::Pendiente, RequestState::EnRevision] {
                let request = request_in(state);
                let next = apply(
                    &request,
                    &Transition::Approve {
                        comments: Some("ok".into()),
                    },
                    at(20),
                )
                .unwrap();

                assert_eq!(next.state, RequestState::Aprobada);
                assert_eq!(next.admin_comments.as_deref(), Some("ok"));
                assert_eq!(next.responded_at, Some(at(20)));
            }
        }

        #[test]
        fn approve_without_comments_keeps_existing_ones() {
            let mut request = request_in(RequestState::Pendiente);
            request.admin_comments = Some("previo".into());

            let next = apply(&request, &Transition::Approve { comments: None }, at(20)).unwrap();
            assert_eq!(next.admin_comments.as_deref(), Some("previo"));
        }

        #[test]
        fn reject_is_terminal_and_records_the_reason() {
            let request = request_in(RequestState::Pendiente);
            let next = apply(
                &request,
                &Transition::Reject {
                    comments: "fuera de alcance".into(),
                },
                at(30),
            )
            .unwrap();

            assert_eq!(next.state, RequestState::Rechazada);
            assert!(next.state.is_terminal());
            assert_eq!(next.admin_comments.as_deref(), Some("fuera de alcance"));
            assert_eq!(next.responded_at, Some(at(30)));
        }

        #[test]
        fn assignment_starts_development() {
            let request = request_in(RequestState::Aprobada);
            let next = apply(
                &request,
                &Transition::AssignDeveloper {
                    developer: "dev.perez".into(),
                },
                at(40),
            )
            .unwrap();

            assert_eq!(next.state, RequestState::EnDesarrollo);
            assert_eq!(next.assigned_developer, Some("dev.perez".into()));
        }

        #[test]
        fn complete_plans_move_to_pending_approval() {
            let request = request_in(RequestState::EnDesarrollo);
            let next = apply(
                &request,
                &Transition::SubmitPlans {
                    plans: complete_plans(),
                },
                at(50),
            )
            .unwrap();

            assert_eq!(next.state, RequestState::PlanesPendientesAprobacion);
            assert!(next.technical_plans.is_some());
        }

        #[test]
        fn plan_approval_then_resume_returns_to_development() {
            let request = request_in(RequestState::PlanesPendientesAprobacion);
            let approved = apply(&request, &Transition::ApprovePlans, at(60)).unwrap();
            assert_eq!(approved.state, RequestState::ListoParaImplementar);

            let resumed = apply(&approved, &Transition::ResumeDevelopment, at(61)).unwrap();
            assert_eq!(resumed.state, RequestState::EnDesarrollo);
        }

        #[test]
        fn deploy_then_complete() {
            let request = request_in(RequestState::EnTesting);
            let deploying = apply(&request, &Transition::Deploy, at(70)).unwrap();
            assert_eq!(deploying.state, RequestState::EnDespliegue);

            let done = apply(&deploying, &Transition::Complete, at(71)).unwrap();
            assert_eq!(done.state, RequestState::Completada);
        }

        #[test]
        fn deploy_then_fail() {
            let request = request_in(RequestState::EnDespliegue);
            let failed = apply(&request, &Transition::Fail, at(72)).unwrap();
            assert_eq!(failed.state, RequestState::Fallida);
        }
    }

    mod rework_paths {
        use super::*;

        #[test]
        fn plan_rejection_returns_to_development_with_comments() {
            let request = request_in(RequestState::PlanesPendientesAprobacion);
            let next = apply(
                &request,
                &Transition::RejectPlans {
                    comments: "falta el plan de backout".into(),
                },
                at(80),
            )
            .unwrap();

            assert_eq!(next.state, RequestState::EnDesarrollo);
            assert_eq!(
                next.admin_comments.as_deref(),
                Some("falta el plan de backout")
            );
        }

        #[test]
        fn pr_rejection_bounces_back_with_internal_comments() {
            let mut request = request_in(RequestState::EnTesting);
            request.technical_plans = Some(complete_plans());

            let next = apply(
                &request,
                &Transition::RejectPullRequest {
                    comments: "rompe la migración".into(),
                },
                at(90),
            )
            .unwrap();

            assert_eq!(next.state, RequestState::EnDesarrollo);
            assert_eq!(next.internal_comments.as_deref(), Some("rompe la migración"));
            // Prior artifacts survive the bounce.
            assert!(next.technical_plans.is_some());
        }
    }

    mod validation {
        use super::*;

        #[test]
        fn blank_plan_fields_are_refused() {
            let request = request_in(RequestState::EnDesarrollo);
            let mut plans = complete_plans();
            plans.backout = "   ".into();

            let result = apply(&request, &Transition::SubmitPlans { plans }, at(50));
            match result {
                Err(LifecycleError::Validation(ValidationError::IncompletePlans { missing })) => {
                    assert_eq!(missing, vec!["backout"]);
                }
                other => panic!("expected IncompletePlans, got {other:?}"),
            }
        }

        #[test]
        fn refused_plans_leave_the_request_unchanged() {
            let request = request_in(RequestState::EnDesarrollo);
            let plans = TechnicalPlans {
                implementation: String::new(),
                rollout: String::new(),
                backout: String::new(),
                testing: String::new(),
            };

            assert!(apply(&request, &Transition::SubmitPlans { plans }, at(50)).is_err());
            assert_eq!(request.state, RequestState::EnDesarrollo);
            assert!(request.technical_plans.is_none());
        }
    }

    mod invalid_transitions {
        use super::*;

        #[test]
        fn cancel_only_works_from_borrador() {
            for state in RequestState::ALL {
                if state == RequestState::Borrador {
                    continue;
                }
                let request = request_in(state);
                let result = apply(&request, &Transition::Cancel, at(5));
                assert!(
                    matches!(result, Err(LifecycleError::InvalidState { .. })),
                    "cancel unexpectedly allowed from {state}"
                );
            }
        }

        #[test]
        fn deploy_requires_en_testing() {
            let request = request_in(RequestState::EnDesarrollo);
            let result = apply(&request, &Transition::Deploy, at(5));
            assert!(matches!(
                result,
                Err(LifecycleError::InvalidState {
                    state: RequestState::EnDesarrollo,
                    action: Action::Deploy,
                })
            ));
        }

        #[test]
        fn terminal_states_refuse_every_transition() {
            let transitions = [
                Transition::Submit,
                Transition::StartReview,
                Transition::Approve { comments: None },
                Transition::Reject {
                    comments: "x".into(),
                },
                Transition::AssignDeveloper {
                    developer: "d".into(),
                },
                Transition::SubmitPlans {
                    plans: complete_plans(),
                },
                Transition::ApprovePlans,
                Transition::RejectPlans {
                    comments: "x".into(),
                },
                Transition::ResumeDevelopment,
                Transition::SendToTesting,
                Transition::RejectPullRequest {
                    comments: "x".into(),
                },
                Transition::Deploy,
                Transition::Complete,
                Transition::Fail,
                Transition::Cancel,
            ];

            for state in RequestState::ALL.iter().filter(|s| s.is_terminal()) {
                for transition in &transitions {
                    let request = request_in(*state);
                    let result = apply(&request, transition, at(5));
                    assert!(
                        matches!(result, Err(LifecycleError::InvalidState { .. })),
                        "{state} unexpectedly accepted {:?}",
                        transition.action()
                    );
                }
            }
        }
    }

    mod replay {
        use super::*;

        #[test]
        fn submit_replay_is_detected() {
            let request = request_in(RequestState::Pendiente);
            assert!(is_replay(&request, &Transition::Submit));
        }

        #[test]
        fn submit_is_not_a_replay_from_other_states() {
            assert!(!is_replay(
                &request_in(RequestState::Borrador),
                &Transition::Submit
            ));
            assert!(!is_replay(
                &request_in(RequestState::Aprobada),
                &Transition::Submit
            ));
        }

        #[test]
        fn assignment_replay_requires_the_same_developer() {
            let mut request = request_in(RequestState::EnDesarrollo);
            request.assigned_developer = Some("dev.perez".into());

            assert!(is_replay(
                &request,
                &Transition::AssignDeveloper {
                    developer: "dev.perez".into()
                }
            ));
            assert!(!is_replay(
                &request,
                &Transition::AssignDeveloper {
                    developer: "otra.persona".into()
                }
            ));
        }

        #[test]
        fn plan_replay_requires_identical_plans() {
            let mut request = request_in(RequestState::PlanesPendientesAprobacion);
            request.technical_plans = Some(complete_plans());

            assert!(is_replay(
                &request,
                &Transition::SubmitPlans {
                    plans: complete_plans()
                }
            ));

            let mut other = complete_plans();
            other.testing = "algo distinto".into();
            assert!(!is_replay(&request, &Transition::SubmitPlans { plans: other }));
        }

        #[test]
        fn terminal_closures_are_never_replays() {
            let request = request_in(RequestState::Completada);
            assert!(!is_replay(&request, &Transition::Complete));

            let request = request_in(RequestState::Cancelada);
            assert!(!is_replay(&request, &Transition::Cancel));
        }
    }

    mod properties {
        use super::*;

        proptest! {
            /// Whatever the starting aggregate, a successful transition
            /// always stamps `last_updated_at` and lands on the declared
            /// target state.
            #[test]
            fn successful_transitions_land_on_the_target(
                request in arb_change_request(),
                secs in 0i64..4_000_000_000,
            ) {
                let transitions = [
                    Transition::Submit,
                    Transition::StartReview,
                    Transition::Approve { comments: None },
                    Transition::ApprovePlans,
                    Transition::ResumeDevelopment,
                    Transition::SendToTesting,
                    Transition::Deploy,
                    Transition::Complete,
                    Transition::Fail,
                    Transition::Cancel,
                ];
                let now = at(secs);

                for transition in &transitions {
                    if let Ok(next) = apply(&request, transition, now) {
                        prop_assert_eq!(next.state, transition.target_state());
                        prop_assert_eq!(next.last_updated_at, now);
                    }
                }
            }

            /// Terminal aggregates accept nothing, whatever the payload.
            #[test]
            fn terminal_aggregates_accept_nothing(
                request in arb_change_request(),
                secs in 0i64..4_000_000_000,
            ) {
                prop_assume!(request.state.is_terminal());
                let result = apply(&request, &Transition::Submit, at(secs));
                let is_invalid_state = matches!(result, Err(LifecycleError::InvalidState { .. }));
                prop_assert!(is_invalid_state);
            }

            /// `apply` never mutates its input.
            #[test]
            fn apply_leaves_the_input_untouched(
                request in arb_change_request(),
                secs in 0i64..4_000_000_000,
            ) {
                let before = request.clone();
                let _ = apply(&request, &Transition::SendToTesting, at(secs));
                prop_assert_eq!(request, before);
            }
        }
    }
}
