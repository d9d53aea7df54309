//! The change-request aggregate and its workflow attributes.
//!
//! State names, priorities and change types keep the Spanish wire values of
//! the surrounding administration portal.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{RequestId, UserId};

/// The kind of change a request proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    #[serde(rename = "NUEVA_FUNCIONALIDAD")]
    NuevaFuncionalidad,
    #[serde(rename = "MEJORA")]
    Mejora,
    #[serde(rename = "CORRECCION_ERROR")]
    CorreccionError,
    #[serde(rename = "SEGURIDAD")]
    Seguridad,
    #[serde(rename = "OTRO")]
    Otro,
}

/// Business priority of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Baja,
    Media,
    Alta,
    Critica,
    Urgente,
}

/// How soon the requester needs the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    Baja,
    Media,
    Alta,
}

/// The lifecycle state of a change request.
///
/// Transitions between these states are defined by the state machine in
/// `crate::state` and gated by role in `crate::gate`; nothing else may move
/// a request along this graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    /// Being authored; editable and cancellable by its owner.
    Borrador,

    /// Submitted, waiting for an admin to pick it up.
    Pendiente,

    /// An admin is actively reviewing it.
    EnRevision,

    /// Admin approved; development may start.
    Aprobada,

    /// Admin rejected the request. Terminal.
    Rechazada,

    /// A developer is implementing it (branches, pull requests, rework).
    EnDesarrollo,

    /// Technical plans submitted, waiting for approval.
    PlanesPendientesAprobacion,

    /// Plans approved; the developer may resume implementation.
    ListoParaImplementar,

    /// All tracked repositories have an active pull request; under test.
    EnTesting,

    /// Master signed off; deployment in progress.
    EnDespliegue,

    /// Deployed successfully. Terminal.
    Completada,

    /// Deployment failed. Terminal.
    Fallida,

    /// Withdrawn by its owner before submission. Terminal.
    Cancelada,
}

impl RequestState {
    pub const ALL: [RequestState; 13] = [
        RequestState::Borrador,
        RequestState::Pendiente,
        RequestState::EnRevision,
        RequestState::Aprobada,
        RequestState::Rechazada,
        RequestState::EnDesarrollo,
        RequestState::PlanesPendientesAprobacion,
        RequestState::ListoParaImplementar,
        RequestState::EnTesting,
        RequestState::EnDespliegue,
        RequestState::Completada,
        RequestState::Fallida,
        RequestState::Cancelada,
    ];

    /// Returns true if no further transition is permitted from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Completada
                | RequestState::Rechazada
                | RequestState::Cancelada
                | RequestState::Fallida
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            RequestState::Borrador => "BORRADOR",
            RequestState::Pendiente => "PENDIENTE",
            RequestState::EnRevision => "EN_REVISION",
            RequestState::Aprobada => "APROBADA",
            RequestState::Rechazada => "RECHAZADA",
            RequestState::EnDesarrollo => "EN_DESARROLLO",
            RequestState::PlanesPendientesAprobacion => "PLANES_PENDIENTES_APROBACION",
            RequestState::ListoParaImplementar => "LISTO_PARA_IMPLEMENTAR",
            RequestState::EnTesting => "EN_TESTING",
            RequestState::EnDespliegue => "EN_DESPLIEGUE",
            RequestState::Completada => "COMPLETADA",
            RequestState::Fallida => "FALLIDA",
            RequestState::Cancelada => "CANCELADA",
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The four technical plans a developer submits before leaving development.
///
/// Persisted either fully populated or not at all; a partially filled set is
/// never a valid value of `ChangeRequest::technical_plans`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnicalPlans {
    pub implementation: String,
    pub rollout: String,
    pub backout: String,
    pub testing: String,
}

impl TechnicalPlans {
    /// Names of the plan fields that are blank (empty or whitespace only).
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.implementation.trim().is_empty() {
            missing.push("implementation");
        }
        if self.rollout.trim().is_empty() {
            missing.push("rollout");
        }
        if self.backout.trim().is_empty() {
            missing.push("backout");
        }
        if self.testing.trim().is_empty() {
            missing.push("testing");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

/// The author-editable content of a request, used at creation and while the
/// request is still a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDraft {
    pub title: String,
    pub description: String,
    pub justification: String,
    pub change_type: ChangeType,
    pub priority: Priority,
    pub urgency: Urgency,
    pub deadline: Option<NaiveDate>,
}

/// A tracked proposal to modify the system, carrying its own lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub id: RequestId,

    pub title: String,
    pub description: String,
    pub justification: String,
    pub change_type: ChangeType,
    pub priority: Priority,
    pub urgency: Urgency,

    /// Date by which the requester would like the change live.
    pub deadline: Option<NaiveDate>,

    pub state: RequestState,

    /// Fully populated once plans are submitted, `None` before that.
    pub technical_plans: Option<TechnicalPlans>,

    pub created_by: UserId,
    pub assigned_developer: Option<UserId>,

    /// Comments from the admin decision (approval, rejection, plan review).
    pub admin_comments: Option<String>,

    /// Developer-only visibility. Set when a master rejects a pull request.
    pub internal_comments: Option<String>,

    pub created_at: DateTime<Utc>,

    /// When the admin first approved or rejected the request.
    pub responded_at: Option<DateTime<Utc>>,

    pub last_updated_at: DateTime<Utc>,
}

impl ChangeRequest {
    /// Creates a fresh draft owned by `author`.
    pub fn draft(id: RequestId, content: RequestDraft, author: UserId, now: DateTime<Utc>) -> Self {
        ChangeRequest {
            id,
            title: content.title,
            description: content.description,
            justification: content.justification,
            change_type: content.change_type,
            priority: content.priority,
            urgency: content.urgency,
            deadline: content.deadline,
            state: RequestState::Borrador,
            technical_plans: None,
            created_by: author,
            assigned_developer: None,
            admin_comments: None,
            internal_comments: None,
            created_at: now,
            responded_at: None,
            last_updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{arb_change_request, arb_request_state};
    use proptest::prelude::*;

    #[test]
    fn terminal_states_are_exactly_the_four() {
        let terminal: Vec<_> = RequestState::ALL
            .iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![
                &RequestState::Completada,
                &RequestState::Rechazada,
                &RequestState::Cancelada,
                &RequestState::Fallida,
            ]
        );
    }

    #[test]
    fn state_wire_values_match_names() {
        for state in RequestState::ALL {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.name()));
        }
    }

    #[test]
    fn plan_missing_fields_reports_blanks() {
        let plans = TechnicalPlans {
            implementation: "add endpoint".into(),
            rollout: "  ".into(),
            backout: String::new(),
            testing: "integration suite".into(),
        };
        assert_eq!(plans.missing_fields(), vec!["rollout", "backout"]);
        assert!(!plans.is_complete());
    }

    #[test]
    fn complete_plans_have_no_missing_fields() {
        let plans = TechnicalPlans {
            implementation: "a".into(),
            rollout: "b".into(),
            backout: "c".into(),
            testing: "d".into(),
        };
        assert!(plans.is_complete());
    }

    #[test]
    fn draft_starts_in_borrador_with_no_workflow_data() {
        let now = Utc::now();
        let request = ChangeRequest::draft(
            RequestId(7),
            RequestDraft {
                title: "Nuevo informe".into(),
                description: "d".into(),
                justification: "j".into(),
                change_type: ChangeType::Mejora,
                priority: Priority::Media,
                urgency: Urgency::Baja,
                deadline: None,
            },
            UserId::new("ana"),
            now,
        );

        assert_eq!(request.state, RequestState::Borrador);
        assert!(request.technical_plans.is_none());
        assert!(request.assigned_developer.is_none());
        assert!(request.responded_at.is_none());
        assert_eq!(request.created_at, request.last_updated_at);
    }

    proptest! {
        #[test]
        fn state_serde_roundtrip(state in arb_request_state()) {
            let json = serde_json::to_string(&state).unwrap();
            let parsed: RequestState = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(state, parsed);
        }

        #[test]
        fn request_serde_roundtrip(request in arb_change_request()) {
            let json = serde_json::to_string(&request).unwrap();
            let parsed: ChangeRequest = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(request, parsed);
        }
    }
}
