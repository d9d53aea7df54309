//! Octocrab-backed GitHost implementation.
//!
//! One `RepoClient` per tracked repository; every call is scoped to the
//! repository selected by `RepoType`. Provider errors are categorized via
//! `GitHostError::from_octocrab` so the retry layer can tell transient from
//! permanent failures.

use octocrab::params::repos::Reference;
use octocrab::Octocrab;

use crate::types::{PrNumber, PrStatus, RepoId, RepoType};

use super::error::GitHostError;
use super::host::{CreatedPr, GitHost};

/// Connection settings for the two tracked repositories.
#[derive(Debug, Clone)]
pub struct GitHostConfig {
    pub frontend: RepoId,
    pub backend: RepoId,
}

/// An octocrab client scoped to a single repository.
#[derive(Clone)]
pub struct RepoClient {
    client: Octocrab,
    repo: RepoId,
}

impl RepoClient {
    pub fn new(client: Octocrab, repo: RepoId) -> Self {
        Self { client, repo }
    }

    pub fn owner(&self) -> &str {
        &self.repo.owner
    }

    pub fn repo_name(&self) -> &str {
        &self.repo.repo
    }
}

impl std::fmt::Debug for RepoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoClient")
            .field("repo", &self.repo)
            .finish_non_exhaustive()
    }
}

/// GitHost implementation over the real provider.
#[derive(Debug, Clone)]
pub struct OctoHost {
    frontend: RepoClient,
    backend: RepoClient,
}

impl OctoHost {
    pub fn new(frontend: RepoClient, backend: RepoClient) -> Self {
        Self { frontend, backend }
    }

    /// Builds both repo-scoped clients from a single personal token.
    pub fn from_token(
        token: impl Into<String>,
        config: GitHostConfig,
    ) -> Result<Self, octocrab::Error> {
        let client = Octocrab::builder().personal_token(token.into()).build()?;
        Ok(Self {
            frontend: RepoClient::new(client.clone(), config.frontend),
            backend: RepoClient::new(client, config.backend),
        })
    }

    fn client(&self, repo_type: RepoType) -> &RepoClient {
        match repo_type {
            RepoType::Frontend => &self.frontend,
            RepoType::Backend => &self.backend,
        }
    }
}

impl GitHost for OctoHost {
    async fn create_branch(
        &self,
        repo_type: RepoType,
        name: &str,
        base: &str,
    ) -> Result<(), GitHostError> {
        let scoped = self.client(repo_type);
        let repos = scoped.client.repos(scoped.owner(), scoped.repo_name());

        let base_ref = repos
            .get_ref(&Reference::Branch(base.to_string()))
            .await
            .map_err(GitHostError::from_octocrab)?;

        let sha = match base_ref.object {
            octocrab::models::repos::Object::Commit { sha, .. } => sha,
            octocrab::models::repos::Object::Tag { sha, .. } => sha,
            _ => {
                return Err(GitHostError::permanent(format!(
                    "base ref {base} does not resolve to a commit"
                )))
            }
        };

        repos
            .create_ref(&Reference::Branch(name.to_string()), sha)
            .await
            .map_err(GitHostError::from_octocrab)?;

        Ok(())
    }

    async fn create_pull_request(
        &self,
        repo_type: RepoType,
        head: &str,
        target: &str,
        title: &str,
    ) -> Result<CreatedPr, GitHostError> {
        let scoped = self.client(repo_type);

        let pull = scoped
            .client
            .pulls(scoped.owner(), scoped.repo_name())
            .create(title, head, target)
            .send()
            .await
            .map_err(GitHostError::from_octocrab)?;

        Ok(CreatedPr {
            number: PrNumber(pull.number),
            url: pull
                .html_url
                .map(|u| u.to_string())
                .unwrap_or_default(),
        })
    }

    async fn pull_request_status(
        &self,
        repo_type: RepoType,
        number: PrNumber,
    ) -> Result<PrStatus, GitHostError> {
        let scoped = self.client(repo_type);

        let pull = scoped
            .client
            .pulls(scoped.owner(), scoped.repo_name())
            .get(number.0)
            .await
            .map_err(GitHostError::from_octocrab)?;

        // Closed without merging reads as a rejection; merged is terminal.
        let status = if pull.merged_at.is_some() {
            PrStatus::Merged
        } else if pull.state == Some(octocrab::models::IssueState::Closed) {
            PrStatus::Rejected
        } else if pull
            .requested_reviewers
            .as_ref()
            .is_some_and(|reviewers| !reviewers.is_empty())
        {
            PrStatus::InReview
        } else {
            PrStatus::Open
        };

        Ok(status)
    }
}
