//! Git-hosting integration: collaborator contract, provider client, retry
//! policy and the orchestrator the service calls.

pub mod error;
pub mod host;
pub mod octo;
pub mod orchestrator;
pub mod retry;

pub use error::{GitHostError, GitHostErrorKind};
pub use host::{CreatedPr, GitHost};
pub use octo::{GitHostConfig, OctoHost, RepoClient};
pub use orchestrator::GitOrchestrator;
pub use retry::{retry_with_backoff, RetryConfig, RetryPolicy, RetryResult};
