//! Security collaborators for the backup catalog
//!
//! Provides the principal context used for admin checks and the audit trail
//! every mutating backup operation writes to.

pub mod audit;
pub mod auth;

pub use audit::{AuditAction, AuditEvent, AuditLogger, AuditSink};
pub use auth::{AuthContext, ADMIN_ROLE};
