//! Actor roles and the authenticated principal.
//!
//! Identity resolution happens outside this crate. Every service operation
//! receives an already-authenticated `Actor`; there is no ambient
//! session or context state to read a role from.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::UserId;

/// The role an authenticated principal acts under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Authors and submits change requests.
    User,

    /// Reviews submitted requests and approves or rejects them.
    Admin,

    /// Implements approved requests: plans, branches, pull requests.
    Developer,

    /// Signs off pull requests and drives deployment.
    Master,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::User, Role::Admin, Role::Developer, Role::Master];

    pub fn name(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
            Role::Developer => "DEVELOPER",
            Role::Master => "MASTER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An authenticated principal with a resolved role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<UserId>, role: Role) -> Self {
        Actor {
            id: id.into(),
            role,
        }
    }
}
