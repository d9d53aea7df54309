//! The Git-hosting collaborator contract.
//!
//! The lifecycle only needs three narrow operations against the provider.
//! The trait-based seam enables a scriptable fake for tests and keeps
//! octocrab out of everything above the orchestrator.

use std::future::Future;

use crate::types::{PrNumber, PrStatus, RepoType};

use super::error::GitHostError;

/// A pull request the provider confirmed it created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPr {
    pub number: PrNumber,
    pub url: String,
}

/// Narrow contract against the Git-hosting provider.
///
/// Implementations are scoped to the two tracked repositories; `repo_type`
/// selects which one a call targets.
///
/// # Example (fake for testing)
///
/// ```ignore
/// struct FakeHost {
///     next_pr: AtomicU64,
/// }
///
/// impl GitHost for FakeHost {
///     async fn create_branch(&self, _: RepoType, _: &str, _: &str) -> Result<(), GitHostError> {
///         Ok(())
///     }
///     // ...
/// }
/// ```
pub trait GitHost {
    /// Creates `name` from the base ref in the given repository.
    ///
    /// Callers must not record the branch locally until this returns Ok.
    fn create_branch(
        &self,
        repo_type: RepoType,
        name: &str,
        base: &str,
    ) -> impl Future<Output = Result<(), GitHostError>> + Send;

    /// Opens a pull request from `head` targeting `target`.
    ///
    /// Same ordering discipline: record locally only after the provider
    /// returns the number and URL.
    fn create_pull_request(
        &self,
        repo_type: RepoType,
        head: &str,
        target: &str,
        title: &str,
    ) -> impl Future<Output = Result<CreatedPr, GitHostError>> + Send;

    /// Queries the provider-side status of a pull request.
    fn pull_request_status(
        &self,
        repo_type: RepoType,
        number: PrNumber,
    ) -> impl Future<Output = Result<PrStatus, GitHostError>> + Send;
}
