//! Branch and pull-request records tracked per repository.
//!
//! These types represent local knowledge of what exists on the Git-hosting
//! provider. They are only written after the provider has confirmed the
//! corresponding operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{PrNumber, RepoType, RequestId};

/// Status of a tracked pull request.
///
/// Movement is one-directional along Pending, Open, InReview, Approved,
/// Merged. Rejected is reachable from any non-settled status; a rejected
/// pull request is never updated again, it is superseded by recording a
/// fresh one after rework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrStatus {
    /// Creation queued on the provider, number not yet final.
    Pending,

    /// Open and receiving commits.
    Open,

    /// A reviewer is on it.
    InReview,

    /// Master approved it.
    Approved,

    /// Master rejected it. A replacement pull request may be recorded.
    Rejected,

    /// Merged into the target branch. Nothing further happens to this PR.
    Merged,
}

impl PrStatus {
    /// Position along the forward path. Rejected sits outside the path.
    fn rank(&self) -> u8 {
        match self {
            PrStatus::Pending => 0,
            PrStatus::Open => 1,
            PrStatus::InReview => 2,
            PrStatus::Approved => 3,
            PrStatus::Merged => 4,
            PrStatus::Rejected => u8::MAX,
        }
    }

    /// Returns true if this PR accepts no further status updates.
    pub fn is_settled(&self) -> bool {
        matches!(self, PrStatus::Merged | PrStatus::Rejected)
    }

    /// Returns true if the status counts toward testing readiness.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PrStatus::Open | PrStatus::InReview | PrStatus::Approved | PrStatus::Merged
        )
    }

    /// Returns true if a master has signed the PR off (or it is already in).
    pub fn is_signed_off(&self) -> bool {
        matches!(self, PrStatus::Approved | PrStatus::Merged)
    }

    /// Whether a status update from `self` to `next` follows the
    /// one-directional graph. Same-status updates are not advances; callers
    /// treat them as no-ops.
    pub fn can_advance_to(&self, next: PrStatus) -> bool {
        if self.is_settled() {
            return false;
        }
        if next == PrStatus::Rejected {
            return true;
        }
        next.rank() > self.rank()
    }

    pub fn name(&self) -> &'static str {
        match self {
            PrStatus::Pending => "PENDING",
            PrStatus::Open => "OPEN",
            PrStatus::InReview => "IN_REVIEW",
            PrStatus::Approved => "APPROVED",
            PrStatus::Rejected => "REJECTED",
            PrStatus::Merged => "MERGED",
        }
    }
}

impl fmt::Display for PrStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A branch created on the provider for one repository track of a request.
///
/// At most one branch exists per (request, repository type). Branches are
/// never deleted; after a pull-request rejection the same branch receives
/// the rework commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub base_branch: String,
    pub created_at: DateTime<Utc>,
}

impl Branch {
    /// Derives the branch name for a request and repository track.
    ///
    /// Deterministic in its inputs; the timestamp is the creation instant,
    /// so retried creations within the same second produce the same name.
    pub fn name_for(request: RequestId, repo_type: RepoType, at: DateTime<Utc>) -> String {
        format!(
            "cambio/{}/{}/{}",
            request.0,
            repo_type.slug(),
            at.format("%Y%m%d%H%M%S")
        )
    }
}

/// A pull request opened from a tracked branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: PrNumber,
    pub url: String,
    pub target_branch: String,
    pub status: PrStatus,
    pub opened_at: DateTime<Utc>,

    /// Set when a master approves or rejects the PR.
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::arb_pr_status;
    use chrono::TimeZone;
    use proptest::prelude::*;

    const ALL_STATUSES: [PrStatus; 6] = [
        PrStatus::Pending,
        PrStatus::Open,
        PrStatus::InReview,
        PrStatus::Approved,
        PrStatus::Rejected,
        PrStatus::Merged,
    ];

    #[test]
    fn forward_path_is_allowed() {
        assert!(PrStatus::Pending.can_advance_to(PrStatus::Open));
        assert!(PrStatus::Open.can_advance_to(PrStatus::InReview));
        assert!(PrStatus::Open.can_advance_to(PrStatus::Approved));
        assert!(PrStatus::InReview.can_advance_to(PrStatus::Approved));
        assert!(PrStatus::Approved.can_advance_to(PrStatus::Merged));
    }

    #[test]
    fn backward_moves_are_rejected() {
        assert!(!PrStatus::Approved.can_advance_to(PrStatus::Open));
        assert!(!PrStatus::InReview.can_advance_to(PrStatus::Pending));
        assert!(!PrStatus::Merged.can_advance_to(PrStatus::Open));
    }

    #[test]
    fn settled_statuses_accept_nothing() {
        for next in ALL_STATUSES {
            assert!(!PrStatus::Merged.can_advance_to(next));
            assert!(!PrStatus::Rejected.can_advance_to(next));
        }
    }

    #[test]
    fn rejection_is_reachable_from_any_unsettled_status() {
        for status in [
            PrStatus::Pending,
            PrStatus::Open,
            PrStatus::InReview,
            PrStatus::Approved,
        ] {
            assert!(status.can_advance_to(PrStatus::Rejected));
        }
    }

    #[test]
    fn active_statuses_gate_testing_readiness() {
        assert!(!PrStatus::Pending.is_active());
        assert!(PrStatus::Open.is_active());
        assert!(PrStatus::InReview.is_active());
        assert!(PrStatus::Approved.is_active());
        assert!(PrStatus::Merged.is_active());
        assert!(!PrStatus::Rejected.is_active());
    }

    #[test]
    fn branch_names_are_deterministic_and_distinct_per_track() {
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        let frontend = Branch::name_for(RequestId(42), RepoType::Frontend, at);
        let backend = Branch::name_for(RequestId(42), RepoType::Backend, at);

        assert_eq!(frontend, "cambio/42/frontend/20260314092653");
        assert_eq!(backend, "cambio/42/backend/20260314092653");
        assert_eq!(
            frontend,
            Branch::name_for(RequestId(42), RepoType::Frontend, at)
        );
    }

    proptest! {
        #[test]
        fn status_serde_roundtrip(status in arb_pr_status()) {
            let json = serde_json::to_string(&status).unwrap();
            let parsed: PrStatus = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(status, parsed);
        }

        /// No status sequence accepted by `can_advance_to` ever revisits a
        /// status or escapes a settled one.
        #[test]
        fn accepted_sequences_are_monotone(
            statuses in proptest::collection::vec(arb_pr_status(), 1..8)
        ) {
            let mut current = PrStatus::Pending;
            for next in statuses {
                if current.can_advance_to(next) {
                    prop_assert!(!current.is_settled());
                    prop_assert!(next == PrStatus::Rejected || next.rank() > current.rank());
                    current = next;
                }
            }
        }
    }
}
