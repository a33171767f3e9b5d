use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(anyhow::anyhow!("unknown role: {}", other)),
        }
    }
}

/// The authenticated actor behind a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: i32,
    pub role: Role,
}

impl Principal {
    pub fn new(id: i32, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ReadOrder,
    UpdateOrderStatus,
    ManageCatalog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Order { owner_id: i32 },
    Catalog,
}

/// Single policy predicate consulted for every permission decision.
pub trait AuthorizationGate: Send + Sync {
    fn is_authorized(&self, principal: &Principal, action: Action, resource: &Resource) -> bool;
}

/// Owners may read their orders; everything that mutates shared state is admin-only.
#[derive(Debug, Clone, Copy, Default)]
pub struct RolePolicy;

impl AuthorizationGate for RolePolicy {
    fn is_authorized(&self, principal: &Principal, action: Action, resource: &Resource) -> bool {
        match (action, resource) {
            (Action::ReadOrder, Resource::Order { owner_id }) => {
                principal.id == *owner_id || principal.is_admin()
            }
            (Action::UpdateOrderStatus, Resource::Order { .. }) => principal.is_admin(),
            (Action::ManageCatalog, Resource::Catalog) => principal.is_admin(),
            _ => false,
        }
    }
}
