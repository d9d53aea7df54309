//! The lifecycle service façade.
//!
//! This is the only entry point other subsystems call. Every operation
//! follows the same shape: serialize on the request id, load the snapshot,
//! authorize through the role gate, run the side effect or transition, and
//! persist the whole aggregate in one versioned save.
//!
//! Operations on a single change request are serialized through a
//! per-request lock; different requests, and the two repository tracks
//! within a request, proceed independently.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::error::{ConflictError, LifecycleError, ValidationError};
use crate::gate::{self, Action};
use crate::git::{GitHost, GitOrchestrator};
use crate::state::{apply, is_replay, Transition};
use crate::tracker::ArtifactSet;
use crate::types::{
    Actor, Branch, ChangeRequest, PrStatus, PullRequest, RepoType, RequestDraft, RequestId, Role,
    TechnicalPlans, UserId,
};

pub mod store;

pub use store::{InMemoryStore, RequestStore, StoreError, StoredRequest};

/// Per-request lock registry. Locks are created lazily and never removed;
/// the number of requests is small relative to their lifetime.
#[derive(Debug, Default)]
struct LockRegistry {
    inner: Mutex<HashMap<RequestId, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    async fn acquire(&self, id: RequestId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// The change-request lifecycle service.
///
/// Composes the role gate, the state machine, the Git orchestrator and the
/// branch/PR tracker over a persistence collaborator.
#[derive(Debug)]
pub struct LifecycleService<S, H> {
    store: S,
    git: GitOrchestrator<H>,
    locks: LockRegistry,
}

fn map_store_err(err: StoreError) -> LifecycleError {
    match err {
        StoreError::VersionConflict { expected, found } => {
            ConflictError::StaleVersion { expected, found }.into()
        }
        StoreError::AlreadyExists { id } => ConflictError::DuplicateRequest { id }.into(),
    }
}

/// Role checks beyond the gate: users act only on their own requests, and a
/// developer may not touch a request assigned to someone else.
fn ensure_principal(
    request: &ChangeRequest,
    action: Action,
    actor: &Actor,
) -> Result<(), LifecycleError> {
    let allowed = match actor.role {
        Role::User => request.created_by == actor.id,
        Role::Developer => match &request.assigned_developer {
            Some(developer) => *developer == actor.id,
            // Not yet assigned; any developer may pick up early branch work.
            None => true,
        },
        Role::Admin | Role::Master => true,
    };

    if allowed {
        Ok(())
    } else {
        Err(LifecycleError::Forbidden {
            state: request.state,
            action,
            role: actor.role,
        })
    }
}

impl<S, H> LifecycleService<S, H>
where
    S: RequestStore + Sync,
    H: GitHost + Sync,
{
    pub fn new(store: S, git: GitOrchestrator<H>) -> Self {
        Self {
            store,
            git,
            locks: LockRegistry::default(),
        }
    }

    // ─── Queries ──────────────────────────────────────────────────────────

    pub async fn get(&self, id: RequestId) -> Result<ChangeRequest, LifecycleError> {
        Ok(self.load(id).await?.request)
    }

    pub async fn artifacts(&self, id: RequestId) -> Result<ArtifactSet, LifecycleError> {
        Ok(self.load(id).await?.artifacts)
    }

    // ─── Authoring ────────────────────────────────────────────────────────

    /// Creates a new draft owned by the calling user.
    pub async fn create_request(
        &self,
        actor: &Actor,
        content: RequestDraft,
    ) -> Result<ChangeRequest, LifecycleError> {
        gate::authorize(crate::types::RequestState::Borrador, Action::Create, actor)?;
        if content.title.trim().is_empty() {
            return Err(ValidationError::BlankTitle.into());
        }

        let id = self.store.allocate_id().await;
        let now = Utc::now();
        let request = ChangeRequest::draft(id, content, actor.id.clone(), now);

        self.store
            .create(StoredRequest {
                request: request.clone(),
                artifacts: ArtifactSet::new(),
                version: 0,
            })
            .await
            .map_err(map_store_err)?;

        info!(request = %id, author = %actor.id, "change request drafted");
        Ok(request)
    }

    /// Replaces the author-editable content of a draft.
    pub async fn update_draft(
        &self,
        actor: &Actor,
        id: RequestId,
        content: RequestDraft,
    ) -> Result<ChangeRequest, LifecycleError> {
        let _guard = self.locks.acquire(id).await;
        let stored = self.load(id).await?;

        gate::authorize(stored.request.state, Action::UpdateDraft, actor)?;
        ensure_principal(&stored.request, Action::UpdateDraft, actor)?;
        if content.title.trim().is_empty() {
            return Err(ValidationError::BlankTitle.into());
        }

        let mut request = stored.request;
        request.title = content.title;
        request.description = content.description;
        request.justification = content.justification;
        request.change_type = content.change_type;
        request.priority = content.priority;
        request.urgency = content.urgency;
        request.deadline = content.deadline;
        request.last_updated_at = Utc::now();

        let saved = self
            .store
            .save(StoredRequest {
                request,
                artifacts: stored.artifacts,
                version: stored.version,
            })
            .await
            .map_err(map_store_err)?;
        Ok(saved.request)
    }

    // ─── Pure state transitions ───────────────────────────────────────────

    /// Owner submits the draft for triage.
    pub async fn submit(&self, actor: &Actor, id: RequestId) -> Result<ChangeRequest, LifecycleError> {
        self.run_transition(actor, id, Transition::Submit, no_precheck).await
    }

    /// Owner withdraws the draft.
    pub async fn cancel(&self, actor: &Actor, id: RequestId) -> Result<ChangeRequest, LifecycleError> {
        self.run_transition(actor, id, Transition::Cancel, no_precheck).await
    }

    /// Admin picks the request up for explicit review.
    pub async fn start_review(
        &self,
        actor: &Actor,
        id: RequestId,
    ) -> Result<ChangeRequest, LifecycleError> {
        self.run_transition(actor, id, Transition::StartReview, no_precheck)
            .await
    }

    /// Admin approves the request.
    pub async fn approve(
        &self,
        actor: &Actor,
        id: RequestId,
        comments: Option<String>,
    ) -> Result<ChangeRequest, LifecycleError> {
        self.run_transition(actor, id, Transition::Approve { comments }, no_precheck)
            .await
    }

    /// Admin rejects the request.
    pub async fn reject(
        &self,
        actor: &Actor,
        id: RequestId,
        comments: String,
    ) -> Result<ChangeRequest, LifecycleError> {
        self.run_transition(actor, id, Transition::Reject { comments }, no_precheck)
            .await
    }

    /// Admin assigns a developer; development starts.
    pub async fn assign_developer(
        &self,
        actor: &Actor,
        id: RequestId,
        developer: UserId,
    ) -> Result<ChangeRequest, LifecycleError> {
        self.run_transition(actor, id, Transition::AssignDeveloper { developer }, no_precheck)
            .await
    }

    /// Assigned developer submits the four technical plans.
    pub async fn submit_plans(
        &self,
        actor: &Actor,
        id: RequestId,
        plans: TechnicalPlans,
    ) -> Result<ChangeRequest, LifecycleError> {
        self.run_transition(actor, id, Transition::SubmitPlans { plans }, no_precheck)
            .await
    }

    /// Admin or master approves the submitted plans.
    pub async fn approve_plans(
        &self,
        actor: &Actor,
        id: RequestId,
    ) -> Result<ChangeRequest, LifecycleError> {
        self.run_transition(actor, id, Transition::ApprovePlans, no_precheck)
            .await
    }

    /// Admin or master sends the plans back for rework.
    pub async fn reject_plans(
        &self,
        actor: &Actor,
        id: RequestId,
        comments: String,
    ) -> Result<ChangeRequest, LifecycleError> {
        self.run_transition(actor, id, Transition::RejectPlans { comments }, no_precheck)
            .await
    }

    /// Developer resumes implementation after plan approval.
    pub async fn resume_development(
        &self,
        actor: &Actor,
        id: RequestId,
    ) -> Result<ChangeRequest, LifecycleError> {
        self.run_transition(actor, id, Transition::ResumeDevelopment, no_precheck)
            .await
    }

    /// Developer hands the request over to testing. Requires every tracked
    /// repository to have an active pull request.
    pub async fn send_to_testing(
        &self,
        actor: &Actor,
        id: RequestId,
    ) -> Result<ChangeRequest, LifecycleError> {
        self.run_transition(actor, id, Transition::SendToTesting, |stored| {
            if stored.artifacts.is_ready_for_testing() {
                Ok(())
            } else {
                Err(ValidationError::NotReadyForTesting.into())
            }
        })
        .await
    }

    /// Master starts the deployment. Requires every pull request to be
    /// approved or merged.
    pub async fn deploy(&self, actor: &Actor, id: RequestId) -> Result<ChangeRequest, LifecycleError> {
        self.run_transition(actor, id, Transition::Deploy, |stored| {
            match stored.artifacts.first_unapproved() {
                None => Ok(()),
                Some(repo_type) => {
                    Err(ValidationError::PullRequestsNotApproved { repo_type }.into())
                }
            }
        })
        .await
    }

    /// Deployment finished successfully.
    pub async fn complete(
        &self,
        actor: &Actor,
        id: RequestId,
    ) -> Result<ChangeRequest, LifecycleError> {
        self.run_transition(actor, id, Transition::Complete, no_precheck)
            .await
    }

    /// Deployment failed.
    pub async fn fail(&self, actor: &Actor, id: RequestId) -> Result<ChangeRequest, LifecycleError> {
        self.run_transition(actor, id, Transition::Fail, no_precheck).await
    }

    // ─── Branch and pull-request work ─────────────────────────────────────

    /// Creates the branch for one repository track.
    ///
    /// The branch is recorded locally only after the provider confirms it;
    /// a provider failure leaves the request exactly as it was.
    pub async fn create_branch(
        &self,
        actor: &Actor,
        id: RequestId,
        repo_type: RepoType,
        base_branch: &str,
    ) -> Result<ChangeRequest, LifecycleError> {
        let _guard = self.locks.acquire(id).await;
        let stored = self.load(id).await?;

        gate::authorize(stored.request.state, Action::CreateBranch, actor)?;
        ensure_principal(&stored.request, Action::CreateBranch, actor)?;

        if stored.artifacts.branch(repo_type).is_some() {
            return Err(ConflictError::BranchAlreadyExists { repo_type }.into());
        }

        let now = Utc::now();
        let name = Branch::name_for(id, repo_type, now);
        self.git.create_branch(repo_type, &name, base_branch).await?;

        let mut artifacts = stored.artifacts;
        artifacts.record_branch(
            repo_type,
            Branch {
                name: name.clone(),
                base_branch: base_branch.to_string(),
                created_at: now,
            },
        )?;

        let mut request = stored.request;
        request.last_updated_at = now;

        let saved = self
            .store
            .save(StoredRequest {
                request,
                artifacts,
                version: stored.version,
            })
            .await
            .map_err(map_store_err)?;

        info!(request = %id, %repo_type, branch = %name, "branch recorded");
        Ok(saved.request)
    }

    /// Opens the pull request for one repository track.
    pub async fn create_pull_request(
        &self,
        actor: &Actor,
        id: RequestId,
        repo_type: RepoType,
        target_branch: &str,
    ) -> Result<ChangeRequest, LifecycleError> {
        let _guard = self.locks.acquire(id).await;
        let stored = self.load(id).await?;

        gate::authorize(stored.request.state, Action::CreatePullRequest, actor)?;
        ensure_principal(&stored.request, Action::CreatePullRequest, actor)?;

        let record = stored
            .artifacts
            .branch(repo_type)
            .ok_or(ValidationError::MissingBranch { repo_type })?;
        if record.current_pr().is_some_and(|pr| !pr.status.is_settled()) {
            return Err(ConflictError::OpenPullRequestExists { repo_type }.into());
        }
        let head = record.branch.name.clone();

        let title = format!("{}: {}", id, stored.request.title);
        let created = self
            .git
            .create_pull_request(repo_type, &head, target_branch, &title)
            .await?;

        let now = Utc::now();
        let mut artifacts = stored.artifacts;
        artifacts.record_pull_request(
            repo_type,
            PullRequest {
                number: created.number,
                url: created.url,
                target_branch: target_branch.to_string(),
                status: PrStatus::Open,
                opened_at: now,
                reviewed_at: None,
            },
        )?;

        let mut request = stored.request;
        request.last_updated_at = now;

        let saved = self
            .store
            .save(StoredRequest {
                request,
                artifacts,
                version: stored.version,
            })
            .await
            .map_err(map_store_err)?;

        info!(request = %id, %repo_type, number = %created.number, "pull request recorded");
        Ok(saved.request)
    }

    /// Master approves one repository track's pull request. The request
    /// stays in testing until every track is signed off and deployed.
    pub async fn approve_pull_request(
        &self,
        actor: &Actor,
        id: RequestId,
        repo_type: RepoType,
    ) -> Result<ChangeRequest, LifecycleError> {
        let _guard = self.locks.acquire(id).await;
        let stored = self.load(id).await?;

        gate::authorize(stored.request.state, Action::ApprovePullRequest, actor)?;

        let now = Utc::now();
        let mut artifacts = stored.artifacts;
        artifacts.update_pr_status(repo_type, PrStatus::Approved, now)?;

        let mut request = stored.request;
        request.last_updated_at = now;

        let saved = self
            .store
            .save(StoredRequest {
                request,
                artifacts,
                version: stored.version,
            })
            .await
            .map_err(map_store_err)?;

        info!(request = %id, %repo_type, "pull request approved");
        Ok(saved.request)
    }

    /// Master rejects one repository track's pull request during testing.
    ///
    /// The request bounces back to development with the reason in
    /// `internal_comments`; the branch stays so the developer can push
    /// rework and open a fresh pull request. The other track is untouched.
    pub async fn reject_pull_request(
        &self,
        actor: &Actor,
        id: RequestId,
        repo_type: RepoType,
        comments: String,
    ) -> Result<ChangeRequest, LifecycleError> {
        let _guard = self.locks.acquire(id).await;
        let stored = self.load(id).await?;

        let transition = Transition::RejectPullRequest { comments };
        if is_replay(&stored.request, &transition)
            && gate::replay_permitted(Action::RejectPullRequest, actor.role)
        {
            let already_rejected = stored
                .artifacts
                .branch(repo_type)
                .and_then(|record| record.current_pr())
                .is_some_and(|pr| pr.status == PrStatus::Rejected);
            if already_rejected {
                debug!(request = %id, %repo_type, "rejection already applied, treating as no-op");
                return Ok(stored.request);
            }
        }

        gate::authorize(stored.request.state, Action::RejectPullRequest, actor)?;

        let now = Utc::now();
        let mut artifacts = stored.artifacts;
        artifacts.update_pr_status(repo_type, PrStatus::Rejected, now)?;

        let updated = apply(&stored.request, &transition, now)?;

        let saved = self
            .store
            .save(StoredRequest {
                request: updated,
                artifacts,
                version: stored.version,
            })
            .await
            .map_err(map_store_err)?;

        info!(request = %id, %repo_type, state = %saved.request.state, "pull request rejected");
        Ok(saved.request)
    }

    /// Reconciles one track's pull-request status from the provider.
    ///
    /// Intended for a status poller; it only moves derived provider state
    /// through the tracker and never touches the request state, so it is
    /// not role-gated.
    pub async fn refresh_pr_status(
        &self,
        id: RequestId,
        repo_type: RepoType,
    ) -> Result<PrStatus, LifecycleError> {
        let _guard = self.locks.acquire(id).await;
        let stored = self.load(id).await?;

        let number = stored
            .artifacts
            .branch(repo_type)
            .ok_or(ValidationError::MissingBranch { repo_type })?
            .current_pr()
            .ok_or(ValidationError::MissingPullRequest { repo_type })?
            .number;

        let status = self.git.pull_request_status(repo_type, number).await?;

        let mut artifacts = stored.artifacts;
        artifacts.update_pr_status(repo_type, status, Utc::now())?;

        self.store
            .save(StoredRequest {
                request: stored.request,
                artifacts,
                version: stored.version,
            })
            .await
            .map_err(map_store_err)?;

        Ok(status)
    }

    // ─── Internals ────────────────────────────────────────────────────────

    async fn load(&self, id: RequestId) -> Result<StoredRequest, LifecycleError> {
        self.store
            .load(id)
            .await
            .ok_or(LifecycleError::NotFound { id })
    }

    /// Shared path for pure state transitions: replay short-circuit, gate,
    /// principal check, precheck, apply, save.
    async fn run_transition<F>(
        &self,
        actor: &Actor,
        id: RequestId,
        transition: Transition,
        precheck: F,
    ) -> Result<ChangeRequest, LifecycleError>
    where
        F: FnOnce(&StoredRequest) -> Result<(), LifecycleError>,
    {
        let _guard = self.locks.acquire(id).await;
        let stored = self.load(id).await?;
        let action = transition.action();

        if is_replay(&stored.request, &transition)
            && gate::replay_permitted(action, actor.role)
            && ensure_principal(&stored.request, action, actor).is_ok()
        {
            debug!(request = %id, %action, "transition already applied, treating as no-op");
            return Ok(stored.request);
        }

        gate::authorize(stored.request.state, action, actor)?;
        ensure_principal(&stored.request, action, actor)?;
        precheck(&stored)?;

        let updated = apply(&stored.request, &transition, Utc::now())?;
        let saved = self
            .store
            .save(StoredRequest {
                request: updated,
                artifacts: stored.artifacts,
                version: stored.version,
            })
            .await
            .map_err(map_store_err)?;

        info!(request = %id, %action, state = %saved.request.state, "transition applied");
        Ok(saved.request)
    }
}

fn no_precheck(_: &StoredRequest) -> Result<(), LifecycleError> {
    Ok(())
}
