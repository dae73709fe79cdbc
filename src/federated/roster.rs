//! Participant roster providers.

use crate::core::{Error, Result};
use crate::federated::participant::ParticipantRecord;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;

/// Source of participant records, static or discovered at runtime.
#[async_trait]
pub trait ParticipantRoster: Send + Sync {
    /// Current list of participant records.
    async fn records(&self) -> Result<Vec<ParticipantRecord>>;
}

/// Fixed in-memory roster.
#[derive(Clone, Debug, Default)]
pub struct StaticRoster {
    records: Vec<ParticipantRecord>,
}

impl StaticRoster {
    pub fn new(records: Vec<ParticipantRecord>) -> Self {
        Self { records }
    }

    /// Add a record.
    pub fn with_record(mut self, record: ParticipantRecord) -> Self {
        self.records.push(record);
        self
    }
}

#[async_trait]
impl ParticipantRoster for StaticRoster {
    async fn records(&self) -> Result<Vec<ParticipantRecord>> {
        ensure_unique(&self.records)?;
        Ok(self.records.clone())
    }
}

/// Roster read from a JSON array of records on every call.
#[derive(Clone, Debug)]
pub struct JsonRoster {
    path: PathBuf,
}

impl JsonRoster {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ParticipantRoster for JsonRoster {
    async fn records(&self) -> Result<Vec<ParticipantRecord>> {
        let json = tokio::fs::read_to_string(&self.path).await?;
        let records: Vec<ParticipantRecord> = serde_json::from_str(&json)?;
        ensure_unique(&records)?;
        Ok(records)
    }
}

fn ensure_unique(records: &[ParticipantRecord]) -> Result<()> {
    let mut seen = HashSet::new();
    for record in records {
        if !seen.insert(&record.id) {
            return Err(Error::InvalidConfig(format!(
                "participant {} listed twice in roster",
                record.id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federated::participant::{DataHandle, SizeTier};

    fn hospital(id: &str, name: &str, samples: u64) -> ParticipantRecord {
        ParticipantRecord::new(id, name, samples, DataHandle::new(format!("mem://{}", id)))
    }

    #[tokio::test]
    async fn test_static_roster() {
        let roster = StaticRoster::default()
            .with_record(hospital("H001", "Metro General Hospital", 2000))
            .with_record(hospital("H002", "City Medical Center", 1800));

        let records = roster.records().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].samples, 1800);
    }

    #[tokio::test]
    async fn test_static_roster_rejects_duplicates() {
        let roster = StaticRoster::new(vec![
            hospital("H001", "Metro General Hospital", 2000),
            hospital("H001", "Metro General Annex", 100),
        ]);
        assert!(matches!(roster.records().await, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_json_roster_reads_file() {
        let dir = std::env::temp_dir().join(format!("fedcoord-roster-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("hospitals.json");

        let json = r#"[
            {"id": "H003", "name": "Regional Health Institute", "size": "Medium",
             "samples": 1500, "data": "file:///srv/h003"},
            {"id": "H005", "name": "District Clinic", "size": "Small",
             "samples": 800, "data": "file:///srv/h005"}
        ]"#;
        tokio::fs::write(&path, json).await.unwrap();

        let records = JsonRoster::new(&path).records().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].size, Some(SizeTier::Medium));
        assert_eq!(records[1].id.as_str(), "H005");

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_json_roster_missing_file() {
        let roster = JsonRoster::new("/nonexistent/fedcoord/roster.json");
        assert!(matches!(roster.records().await, Err(Error::Io(_))));
    }
}
