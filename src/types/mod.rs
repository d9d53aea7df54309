//! Core domain types for the change-request lifecycle.

pub mod actor;
pub mod artifacts;
pub mod ids;
pub mod request;

pub use actor::{Actor, Role};
pub use artifacts::{Branch, PrStatus, PullRequest};
pub use ids::{PrNumber, RepoId, RepoType, RequestId, UserId};
pub use request::{
    ChangeRequest, ChangeType, Priority, RequestDraft, RequestState, TechnicalPlans, Urgency,
};
