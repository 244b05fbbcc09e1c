// Retention - keep-floor plus age cutoff
//
// The `min_keep` newest artifacts always survive. Older ones are deleted only
// once they exceed `max_age_days`.

use super::types::BackupArtifact;
use chrono::{DateTime, Duration, Utc};

/// Which artifacts a cleanup run may delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Newest artifacts that are never deleted
    pub min_keep: usize,
    /// Age beyond which artifacts outside the floor are deleted
    pub max_age_days: u32,
}

/// Per-artifact outcome of one cleanup evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionDecision {
    /// Inside the newest `min_keep`
    KeepFloor,
    /// Beyond the floor but still within the age window
    KeepRecent,
    /// Beyond the floor and older than the cutoff
    Delete,
}

impl RetentionPolicy {
    /// Keep 5, delete after 30 days.
    pub fn new() -> Self {
        Self {
            min_keep: 5,
            max_age_days: 30,
        }
    }

    /// Set the keep floor.
    pub fn min_keep(mut self, count: usize) -> Self {
        self.min_keep = count;
        self
    }

    /// Set the age cutoff in days.
    pub fn max_age_days(mut self, days: u32) -> Self {
        self.max_age_days = days;
        self
    }

    /// Decisions in newest-first order, paired with each artifact.
    pub fn evaluate<'a>(
        &self,
        artifacts: &'a [BackupArtifact],
        now: DateTime<Utc>,
    ) -> Vec<(&'a BackupArtifact, RetentionDecision)> {
        let cutoff = now - Duration::days(i64::from(self.max_age_days));

        let mut sorted: Vec<&BackupArtifact> = artifacts.iter().collect();
        sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        sorted
            .into_iter()
            .enumerate()
            .map(|(rank, artifact)| {
                let decision = if rank < self.min_keep {
                    RetentionDecision::KeepFloor
                } else if artifact.created_at < cutoff {
                    RetentionDecision::Delete
                } else {
                    RetentionDecision::KeepRecent
                };
                (artifact, decision)
            })
            .collect()
    }

    /// Artifacts with a [`RetentionDecision::Delete`] outcome.
    pub fn select_for_deletion(
        &self,
        artifacts: &[BackupArtifact],
        now: DateTime<Utc>,
    ) -> Vec<BackupArtifact> {
        self.evaluate(artifacts, now)
            .into_iter()
            .filter(|(_, decision)| *decision == RetentionDecision::Delete)
            .map(|(artifact, _)| artifact.clone())
            .collect()
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Free-function form of [`RetentionPolicy::select_for_deletion`].
pub fn select_for_deletion(
    artifacts: &[BackupArtifact],
    min_keep: usize,
    max_age_days: u32,
    now: DateTime<Utc>,
) -> Vec<BackupArtifact> {
    RetentionPolicy::new()
        .min_keep(min_keep)
        .max_age_days(max_age_days)
        .select_for_deletion(artifacts, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn artifact(age_days: i64, now: DateTime<Utc>) -> BackupArtifact {
        let created_at = now - Duration::days(age_days);
        let filename = format!("backup-{}.sql.gz", created_at.format("%Y%m%d-%H%M%S"));
        BackupArtifact {
            absolute_path: PathBuf::from("/backups").join(&filename),
            filename,
            size_bytes: 100,
            checksum: "x".to_string(),
            created_at,
            compressed: true,
        }
    }

    #[test]
    fn test_floor_and_age_cutoff() {
        let now = Utc::now();
        let artifacts: Vec<BackupArtifact> = [1, 5, 10, 20, 31, 40, 50, 60, 70, 80]
            .iter()
            .map(|age| artifact(*age, now))
            .collect();

        let selected = select_for_deletion(&artifacts, 5, 30, now);
        let expected: Vec<BackupArtifact> = artifacts[5..].to_vec();
        assert_eq!(selected, expected);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let now = Utc::now();
        let mut artifacts: Vec<BackupArtifact> = [80, 1, 40, 5, 31, 10, 70, 20, 60, 50]
            .iter()
            .map(|age| artifact(*age, now))
            .collect();
        artifacts.reverse();

        let mut selected: Vec<i64> = select_for_deletion(&artifacts, 5, 30, now)
            .iter()
            .map(|a| (now - a.created_at).num_days())
            .collect();
        selected.sort();
        assert_eq!(selected, vec![40, 50, 60, 70, 80]);
    }

    #[test]
    fn test_recent_beyond_floor_are_kept() {
        let now = Utc::now();
        let artifacts: Vec<BackupArtifact> = (0..8).map(|age| artifact(age, now)).collect();
        let policy = RetentionPolicy::new().min_keep(2).max_age_days(30);

        assert!(policy.select_for_deletion(&artifacts, now).is_empty());
        let decisions: Vec<RetentionDecision> = policy
            .evaluate(&artifacts, now)
            .into_iter()
            .map(|(_, decision)| decision)
            .collect();
        assert_eq!(decisions[..2].to_vec(), vec![RetentionDecision::KeepFloor; 2]);
        assert!(decisions[2..].iter().all(|d| *d == RetentionDecision::KeepRecent));
    }

    #[test]
    fn test_floor_larger_than_set_keeps_everything() {
        let now = Utc::now();
        let artifacts: Vec<BackupArtifact> = [100, 200, 300].iter().map(|a| artifact(*a, now)).collect();
        assert!(select_for_deletion(&artifacts, 10, 1, now).is_empty());
    }

    #[test]
    fn test_zero_floor_deletes_everything_expired() {
        let now = Utc::now();
        let artifacts: Vec<BackupArtifact> = [1, 45].iter().map(|a| artifact(*a, now)).collect();
        let selected = select_for_deletion(&artifacts, 0, 30, now);
        assert_eq!(selected.len(), 1);
        assert_eq!((now - selected[0].created_at).num_days(), 45);
    }
}
