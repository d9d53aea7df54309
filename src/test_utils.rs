//! Shared test fixtures, arbitrary generators and a scriptable fake
//! Git-hosting provider.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use proptest::prelude::*;

use crate::git::{CreatedPr, GitHost, GitHostError};
use crate::types::{
    ChangeRequest, ChangeType, PrNumber, PrStatus, Priority, RepoType, RequestDraft, RequestId,
    RequestState, Role, TechnicalPlans, Urgency, UserId,
};

// ─── Fixtures ─────────────────────────────────────────────────────────────────

pub fn some_draft() -> RequestDraft {
    RequestDraft {
        title: "Actualizar informes de cursos".into(),
        description: "Añadir el desglose por sede".into(),
        justification: "Lo pide coordinación académica".into(),
        change_type: ChangeType::Mejora,
        priority: Priority::Media,
        urgency: Urgency::Media,
        deadline: None,
    }
}

pub fn draft_request(id: u64) -> ChangeRequest {
    ChangeRequest::draft(
        RequestId(id),
        some_draft(),
        UserId::new("ana"),
        DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
    )
}

pub fn complete_plans() -> TechnicalPlans {
    TechnicalPlans {
        implementation: "nuevo endpoint y pantalla de desglose".into(),
        rollout: "feature flag por sede".into(),
        backout: "desactivar el flag".into(),
        testing: "suite de integración de informes".into(),
    }
}

// ─── Arbitrary generators ─────────────────────────────────────────────────────

pub fn arb_request_state() -> impl Strategy<Value = RequestState> {
    prop::sample::select(RequestState::ALL.to_vec())
}

pub fn arb_pr_status() -> impl Strategy<Value = PrStatus> {
    prop::sample::select(vec![
        PrStatus::Pending,
        PrStatus::Open,
        PrStatus::InReview,
        PrStatus::Approved,
        PrStatus::Rejected,
        PrStatus::Merged,
    ])
}

pub fn arb_role() -> impl Strategy<Value = Role> {
    prop::sample::select(Role::ALL.to_vec())
}

pub fn arb_change_type() -> impl Strategy<Value = ChangeType> {
    prop::sample::select(vec![
        ChangeType::NuevaFuncionalidad,
        ChangeType::Mejora,
        ChangeType::CorreccionError,
        ChangeType::Seguridad,
        ChangeType::Otro,
    ])
}

pub fn arb_priority() -> impl Strategy<Value = Priority> {
    prop::sample::select(vec![
        Priority::Baja,
        Priority::Media,
        Priority::Alta,
        Priority::Critica,
        Priority::Urgente,
    ])
}

pub fn arb_urgency() -> impl Strategy<Value = Urgency> {
    prop::sample::select(vec![Urgency::Baja, Urgency::Media, Urgency::Alta])
}

pub fn arb_user_id() -> impl Strategy<Value = UserId> {
    "[a-z]{3,10}".prop_map(UserId::new)
}

pub fn arb_plans() -> impl Strategy<Value = TechnicalPlans> {
    ("[a-z ]{1,20}", "[a-z ]{1,20}", "[a-z ]{1,20}", "[a-z ]{1,20}").prop_map(
        |(implementation, rollout, backout, testing)| TechnicalPlans {
            implementation,
            rollout,
            backout,
            testing,
        },
    )
}

fn arb_timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..4_000_000_000).prop_map(|secs| DateTime::from_timestamp(secs, 0).unwrap())
}

fn arb_deadline() -> impl Strategy<Value = Option<NaiveDate>> {
    prop::option::of(
        (2020i32..2035, 1u32..13, 1u32..29)
            .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap()),
    )
}

pub fn arb_change_request() -> impl Strategy<Value = ChangeRequest> {
    let content = (
        any::<u64>(),
        "[A-Za-z ]{1,30}",
        "[A-Za-z ]{0,40}",
        "[A-Za-z ]{0,40}",
        arb_change_type(),
        arb_priority(),
        arb_urgency(),
        arb_deadline(),
    );
    let workflow = (
        arb_request_state(),
        prop::option::of(arb_plans()),
        arb_user_id(),
        prop::option::of(arb_user_id()),
        prop::option::of("[a-z ]{1,30}"),
        prop::option::of("[a-z ]{1,30}"),
        arb_timestamp(),
        prop::option::of(arb_timestamp()),
    );

    (content, workflow).prop_map(
        |(
            (id, title, description, justification, change_type, priority, urgency, deadline),
            (
                state,
                technical_plans,
                created_by,
                assigned_developer,
                admin_comments,
                internal_comments,
                created_at,
                responded_at,
            ),
        )| ChangeRequest {
            id: RequestId(id),
            title,
            description,
            justification,
            change_type,
            priority,
            urgency,
            deadline,
            state,
            technical_plans,
            created_by,
            assigned_developer,
            admin_comments,
            internal_comments,
            created_at,
            responded_at,
            last_updated_at: created_at,
        },
    )
}

// ─── Fake Git-hosting provider ────────────────────────────────────────────────

#[derive(Debug, Default)]
struct FakeHostState {
    /// Remaining calls that fail with a transient error before succeeding.
    transient_failures: u32,
    next_pr: u64,
    branches: Vec<(RepoType, String, String)>,
    pull_requests: Vec<(RepoType, String, String, String)>,
    statuses: HashMap<(RepoType, u64), PrStatus>,
}

/// Scriptable in-memory stand-in for the Git-hosting provider.
///
/// Records every confirmed call and can be told to fail a number of calls
/// transiently first, which is how the retry path is exercised.
#[derive(Debug)]
pub struct FakeHost {
    state: Mutex<FakeHostState>,
}

impl FakeHost {
    pub fn new() -> Self {
        FakeHost {
            state: Mutex::new(FakeHostState {
                next_pr: 1,
                ..FakeHostState::default()
            }),
        }
    }

    /// The next `n` provider calls fail with a transient error.
    pub fn with_transient_failures(self, n: u32) -> Self {
        self.state.lock().unwrap().transient_failures = n;
        self
    }

    /// Scripts the status the provider reports for a pull request.
    pub fn set_status(&self, repo_type: RepoType, number: u64, status: PrStatus) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert((repo_type, number), status);
    }

    pub fn created_branches(&self) -> Vec<(RepoType, String, String)> {
        self.state.lock().unwrap().branches.clone()
    }

    pub fn created_pull_requests(&self) -> Vec<(RepoType, String, String, String)> {
        self.state.lock().unwrap().pull_requests.clone()
    }
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

fn consume_failure(state: &mut FakeHostState) -> Result<(), GitHostError> {
    if state.transient_failures > 0 {
        state.transient_failures -= 1;
        return Err(GitHostError::transient("injected network failure"));
    }
    Ok(())
}

impl GitHost for FakeHost {
    async fn create_branch(
        &self,
        repo_type: RepoType,
        name: &str,
        base: &str,
    ) -> Result<(), GitHostError> {
        let mut state = self.state.lock().unwrap();
        consume_failure(&mut state)?;
        state
            .branches
            .push((repo_type, name.to_string(), base.to_string()));
        Ok(())
    }

    async fn create_pull_request(
        &self,
        repo_type: RepoType,
        head: &str,
        target: &str,
        title: &str,
    ) -> Result<CreatedPr, GitHostError> {
        let mut state = self.state.lock().unwrap();
        consume_failure(&mut state)?;

        let number = state.next_pr;
        state.next_pr += 1;
        state.pull_requests.push((
            repo_type,
            head.to_string(),
            target.to_string(),
            title.to_string(),
        ));

        Ok(CreatedPr {
            number: PrNumber(number),
            url: format!("https://git.example/{repo_type}/pull/{number}"),
        })
    }

    async fn pull_request_status(
        &self,
        repo_type: RepoType,
        number: PrNumber,
    ) -> Result<PrStatus, GitHostError> {
        let mut state = self.state.lock().unwrap();
        consume_failure(&mut state)?;
        Ok(state
            .statuses
            .get(&(repo_type, number.0))
            .copied()
            .unwrap_or(PrStatus::Open))
    }
}
