//! Validated caller context: the `Identity` value threaded explicitly through
//! every call chain instead of being read off ambient/thread-local state.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// A capability granted to an agent by the Identity & Token Store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    Write,
    RefreshToken,
    Admin,
}

impl Permission {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "refresh_token" => Some(Self::RefreshToken),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::RefreshToken => "refresh_token",
            Self::Admin => "admin",
        }
    }
}

/// Validated identity of the agent making a request. Passed explicitly through
/// every engine call — never recovered from ambient/global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub agent_id: String,
    pub agent_type: String,
    pub permissions: HashSet<Permission>,
    pub token_id: String,
}

impl Identity {
    #[must_use]
    pub fn new(
        agent_id: impl Into<String>,
        agent_type: impl Into<String>,
        mut permissions: HashSet<Permission>,
        token_id: impl Into<String>,
    ) -> Self {
        let agent_type = agent_type.into();
        // An `admin` agent type implicitly carries the `admin` permission,
        // even if the caller forgot to list it explicitly at issuance time.
        if agent_type == "admin" {
            permissions.insert(Permission::Admin);
        }
        Self {
            agent_id: agent_id.into(),
            agent_type,
            permissions,
            token_id: token_id.into(),
        }
    }

    #[must_use]
    pub fn has(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission) || self.permissions.contains(&Permission::Admin)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.permissions.contains(&Permission::Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_agent_type_implies_admin_permission() {
        let identity = Identity::new("a1", "admin", HashSet::new(), "tok1");
        assert!(identity.is_admin());
        assert!(identity.has(Permission::Write));
    }

    #[test]
    fn non_admin_requires_explicit_permission() {
        let identity = Identity::new("a1", "generic", HashSet::new(), "tok1");
        assert!(!identity.has(Permission::Write));
        assert!(!identity.is_admin());
    }
}
