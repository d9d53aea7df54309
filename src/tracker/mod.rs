//! Local tracking of branches and pull requests per repository.
//!
//! The tracker is the only writer of Branch and PullRequest records. Callers
//! record an artifact only after the Git-hosting provider has confirmed it,
//! so a tracker entry always has a backing object upstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ConflictError, LifecycleError, ValidationError};
use crate::types::{Branch, PrStatus, PullRequest, RepoType};

/// A tracked branch together with its pull-request history.
///
/// The current pull request is the most recently recorded one. Rejected
/// predecessors stay in the history; the branch itself is never removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRecord {
    pub branch: Branch,
    pub pull_requests: Vec<PullRequest>,
}

impl BranchRecord {
    fn new(branch: Branch) -> Self {
        BranchRecord {
            branch,
            pull_requests: Vec::new(),
        }
    }

    /// The pull request currently attached to this branch, if any.
    pub fn current_pr(&self) -> Option<&PullRequest> {
        self.pull_requests.last()
    }

    fn current_pr_mut(&mut self) -> Option<&mut PullRequest> {
        self.pull_requests.last_mut()
    }
}

/// All branches and pull requests recorded for one change request, keyed by
/// repository type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSet {
    branches: BTreeMap<RepoType, BranchRecord>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    pub fn branch(&self, repo_type: RepoType) -> Option<&BranchRecord> {
        self.branches.get(&repo_type)
    }

    pub fn branches(&self) -> impl Iterator<Item = (RepoType, &BranchRecord)> {
        self.branches.iter().map(|(k, v)| (*k, v))
    }

    /// Records a confirmed branch. At most one branch may exist per
    /// repository type.
    pub fn record_branch(
        &mut self,
        repo_type: RepoType,
        branch: Branch,
    ) -> Result<(), LifecycleError> {
        if self.branches.contains_key(&repo_type) {
            return Err(ConflictError::BranchAlreadyExists { repo_type }.into());
        }
        self.branches.insert(repo_type, BranchRecord::new(branch));
        Ok(())
    }

    /// Records a confirmed pull request for an existing branch.
    ///
    /// Refused while the branch still has a pull request that is neither
    /// rejected nor merged; after a rejection a fresh record is exactly how
    /// the developer re-enters review.
    pub fn record_pull_request(
        &mut self,
        repo_type: RepoType,
        pr: PullRequest,
    ) -> Result<(), LifecycleError> {
        let record = self
            .branches
            .get_mut(&repo_type)
            .ok_or(ValidationError::MissingBranch { repo_type })?;

        if let Some(current) = record.current_pr() {
            if !current.status.is_settled() {
                return Err(ConflictError::OpenPullRequestExists { repo_type }.into());
            }
        }

        record.pull_requests.push(pr);
        Ok(())
    }

    /// Moves the current pull request's status forward.
    ///
    /// A same-status update is a no-op so retried calls and duplicate
    /// provider notifications are harmless. Backward moves are refused.
    pub fn update_pr_status(
        &mut self,
        repo_type: RepoType,
        new_status: PrStatus,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        let record = self
            .branches
            .get_mut(&repo_type)
            .ok_or(ValidationError::MissingBranch { repo_type })?;

        let pr = record
            .current_pr_mut()
            .ok_or(ValidationError::MissingPullRequest { repo_type })?;

        if pr.status == new_status {
            return Ok(());
        }
        if !pr.status.can_advance_to(new_status) {
            return Err(ConflictError::PrStatusRegression {
                from: pr.status,
                to: new_status,
            }
            .into());
        }

        pr.status = new_status;
        if matches!(new_status, PrStatus::Approved | PrStatus::Rejected) {
            pr.reviewed_at = Some(now);
        }
        Ok(())
    }

    /// True iff at least one branch exists and every branch's current pull
    /// request is open, in review, approved or merged. Gates the handover
    /// to testing.
    pub fn is_ready_for_testing(&self) -> bool {
        !self.branches.is_empty()
            && self
                .branches
                .values()
                .all(|record| record.current_pr().is_some_and(|pr| pr.status.is_active()))
    }

    /// The first repository whose current pull request is not yet approved
    /// or merged, if any. Gates deployment.
    pub fn first_unapproved(&self) -> Option<RepoType> {
        self.branches
            .iter()
            .find(|(_, record)| {
                !record
                    .current_pr()
                    .is_some_and(|pr| pr.status.is_signed_off())
            })
            .map(|(repo_type, _)| *repo_type)
    }
}
