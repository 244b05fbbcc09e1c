//! Principal context handed in by the API / CLI layer

use crate::backup::BackupError;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role required for every mutating backup operation
pub const ADMIN_ROLE: &str = "admin";

/// Authenticated principal performing a catalog call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Unique user identifier
    pub user_id: String,

    /// User roles (e.g., "admin", "viewer")
    pub roles: Vec<String>,

    /// When this context was issued
    pub issued_at: DateTime<Utc>,
}

impl AuthContext {
    /// Create a new authentication context
    pub fn new(user_id: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            user_id: user_id.into(),
            roles,
            issued_at: Utc::now(),
        }
    }

    /// Principal holding the admin role
    pub fn admin(user_id: impl Into<String>) -> Self {
        Self::new(user_id, vec![ADMIN_ROLE.to_string()])
    }

    /// Check if context has a specific role
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// `PermissionDenied` unless the context holds [`ADMIN_ROLE`].
    pub fn require_admin(&self, operation: &str) -> Result<()> {
        if self.has_role(ADMIN_ROLE) {
            Ok(())
        } else {
            Err(BackupError::PermissionDenied(format!(
                "{} requires the {} role (user {})",
                operation, ADMIN_ROLE, self.user_id
            )))
        }
    }
}
