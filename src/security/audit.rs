//! Audit logging for backup administration

use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Kind of mutating operation recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// New artifact registered
    BackupCreated,
    /// Database replaced from an artifact
    BackupRestored,
    /// One artifact removed by name
    BackupDeleted,
    /// Retention run removed artifacts
    BackupsCleaned,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BackupCreated => "backup_created",
            Self::BackupRestored => "backup_restored",
            Self::BackupDeleted => "backup_deleted",
            Self::BackupsCleaned => "backups_cleaned",
        };
        f.write_str(name)
    }
}

/// Audit event record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// User ID of the principal that performed the action
    pub actor: String,

    /// What was done
    pub action: AuditAction,

    /// Backup filename the action applied to, if any
    pub target: Option<String>,

    /// State snapshot before the action
    pub before: Option<Value>,

    /// State snapshot after the action
    pub after: Option<Value>,

    /// When the event occurred
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    /// Event stamped with the current time and no target or snapshots.
    pub fn new(actor: impl Into<String>, action: AuditAction) -> Self {
        Self {
            actor: actor.into(),
            action,
            target: None,
            before: None,
            after: None,
            timestamp: Utc::now(),
        }
    }

    /// Set the affected backup.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Attach the state before the action.
    pub fn before(mut self, snapshot: Value) -> Self {
        self.before = Some(snapshot);
        self
    }

    /// Attach the state after the action.
    pub fn after(mut self, snapshot: Value) -> Self {
        self.after = Some(snapshot);
        self
    }
}

/// Destination for audit events (database table, log shipper, ...)
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist one event.
    async fn record(&self, event: AuditEvent) -> Result<()>;
}

/// Audit logger that keeps events in memory and mirrors them to tracing
#[derive(Clone)]
pub struct AuditLogger {
    events: Arc<RwLock<Vec<AuditEvent>>>,
}

impl AuditLogger {
    /// Create a new audit logger
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Get all audit events
    pub async fn get_events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }

    /// Get events recorded for a specific actor
    pub async fn get_actor_events(&self, actor: &str) -> Vec<AuditEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.actor == actor)
            .cloned()
            .collect()
    }

    /// Clear all events (for testing)
    pub async fn clear(&self) {
        self.events.write().await.clear();
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for AuditLogger {
    async fn record(&self, event: AuditEvent) -> Result<()> {
        info!(
            actor = %event.actor,
            action = %event.action,
            target = ?event.target,
            "Audit event at {}",
            event.timestamp
        );

        self.events.write().await.push(event);
        Ok(())
    }
}
