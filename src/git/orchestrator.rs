//! Orchestration of Git-hosting side effects.
//!
//! Every provider call goes through here so the retry policy is applied in
//! exactly one place. Results are only returned after the provider has
//! confirmed, which is what lets the service record tracker entries without
//! ever holding an entry with no backing object upstream.

use tracing::{debug, warn};

use crate::types::{PrNumber, PrStatus, RepoType};

use super::error::GitHostError;
use super::host::{CreatedPr, GitHost};
use super::retry::{retry_with_backoff, RetryConfig, RetryPolicy};

/// Wraps a `GitHost` with the retry policy for transient failures.
#[derive(Debug, Clone)]
pub struct GitOrchestrator<H> {
    host: H,
    config: RetryConfig,
    policy: RetryPolicy,
}

impl<H: GitHost + Sync> GitOrchestrator<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            config: RetryConfig::DEFAULT,
            policy: RetryPolicy::RetryTransient,
        }
    }

    /// Overrides the retry behavior (used by tests to avoid real sleeps).
    pub fn with_retry(host: H, config: RetryConfig, policy: RetryPolicy) -> Self {
        Self {
            host,
            config,
            policy,
        }
    }

    /// Creates a branch upstream. Ok means the provider confirmed it.
    pub async fn create_branch(
        &self,
        repo_type: RepoType,
        name: &str,
        base: &str,
    ) -> Result<(), GitHostError> {
        let result = retry_with_backoff(self.config, self.policy, || {
            self.host.create_branch(repo_type, name, base)
        })
        .await
        .into_result();

        match &result {
            Ok(()) => debug!(%repo_type, branch = name, base, "branch created upstream"),
            Err(e) => warn!(%repo_type, branch = name, error = %e, "branch creation failed"),
        }
        result
    }

    /// Opens a pull request upstream and returns its confirmed number/URL.
    pub async fn create_pull_request(
        &self,
        repo_type: RepoType,
        head: &str,
        target: &str,
        title: &str,
    ) -> Result<CreatedPr, GitHostError> {
        let result = retry_with_backoff(self.config, self.policy, || {
            self.host.create_pull_request(repo_type, head, target, title)
        })
        .await
        .into_result();

        match &result {
            Ok(pr) => debug!(%repo_type, number = %pr.number, "pull request opened upstream"),
            Err(e) => warn!(%repo_type, head, error = %e, "pull request creation failed"),
        }
        result
    }

    /// Queries the provider-side status of a pull request.
    pub async fn pull_request_status(
        &self,
        repo_type: RepoType,
        number: PrNumber,
    ) -> Result<PrStatus, GitHostError> {
        retry_with_backoff(self.config, self.policy, || {
            self.host.pull_request_status(repo_type, number)
        })
        .await
        .into_result()
    }
}
