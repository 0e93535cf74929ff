//! Last-known-good snapshot persistence.
//!
//! The file is a JSON array of authority entries without status or
//! heartbeat. Writes go to a sibling temp file that is renamed into place, so
//! a crash mid-write never leaves a truncated snapshot behind.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::model::{AuthorityRecord, AuthorityStatus, DiscoverySnapshot, NetworkAddress, Position};

#[derive(Debug, Serialize, Deserialize)]
struct StoredAuthority {
    name: String,
    ip: IpAddr,
    port: u16,
    #[serde(default)]
    position: Option<Position>,
    #[serde(default)]
    committee_members: Vec<String>,
}

impl From<&AuthorityRecord> for StoredAuthority {
    fn from(record: &AuthorityRecord) -> Self {
        Self {
            name: record.name.clone(),
            ip: record.address.ip,
            port: record.address.port,
            position: record.position,
            committee_members: record.committee_members.iter().cloned().collect(),
        }
    }
}

impl StoredAuthority {
    fn into_record(self) -> AuthorityRecord {
        AuthorityRecord {
            name: self.name,
            address: NetworkAddress {
                ip: self.ip,
                port: self.port,
            },
            position: self.position,
            status: AuthorityStatus::Unknown,
            committee_members: self.committee_members.into_iter().collect(),
            performance_metrics: BTreeMap::new(),
            last_heartbeat_ms: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FallbackStore {
    path: PathBuf,
}

impl FallbackStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the stored snapshot.
    pub async fn save(&self, snapshot: &DiscoverySnapshot) -> io::Result<()> {
        let entries: Vec<StoredAuthority> = snapshot.records().map(StoredAuthority::from).collect();
        let json = serde_json::to_vec_pretty(&entries)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!(path = %self.path.display(), authorities = entries.len(), "Saved fallback snapshot");
        Ok(())
    }

    /// Load the stored snapshot with every status reset to `unknown`.
    ///
    /// A missing or empty file yields `None`.
    pub async fn load(&self) -> io::Result<Option<DiscoverySnapshot>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let entries: Vec<StoredAuthority> = serde_json::from_slice(&bytes)?;
        let captured_at_ms = self.modified_ms().await;
        let snapshot = DiscoverySnapshot::new(
            entries.into_iter().map(StoredAuthority::into_record),
            captured_at_ms,
        );

        tracing::info!(
            path = %self.path.display(),
            authorities = snapshot.len(),
            "Loaded fallback snapshot"
        );
        Ok(Some(snapshot))
    }

    async fn modified_ms(&self) -> u64 {
        tokio::fs::metadata(&self.path)
            .await
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn record(name: &str, port: u16, status: AuthorityStatus) -> AuthorityRecord {
        AuthorityRecord {
            name: name.to_string(),
            address: NetworkAddress {
                ip: "10.0.0.11".parse().unwrap(),
                port,
            },
            position: Some(Position {
                x: 45.0,
                y: 40.0,
                z: 0.0,
            }),
            status,
            committee_members: ["auth2", "auth3"].iter().map(|s| s.to_string()).collect(),
            performance_metrics: [("latency_ms".to_string(), 12.5)].into_iter().collect(),
            last_heartbeat_ms: 1_700_000_000_000,
        }
    }

    #[tokio::test]
    async fn test_round_trip_resets_status() {
        let dir = tempfile::tempdir().unwrap();
        let store = FallbackStore::new(dir.path().join("nested").join("snapshot.json"));

        let snapshot = DiscoverySnapshot::new(
            vec![
                record("auth1", 8001, AuthorityStatus::Online),
                record("auth2", 8002, AuthorityStatus::Offline),
            ],
            42,
        );
        store.save(&snapshot).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        for original in snapshot.records() {
            let restored = loaded.get(&original.name).unwrap();
            assert_eq!(restored.address, original.address);
            assert_eq!(restored.position, original.position);
            assert_eq!(restored.committee_members, original.committee_members);
            assert_eq!(restored.status, AuthorityStatus::Unknown);
            assert!(restored.performance_metrics.is_empty());
        }
    }

    #[tokio::test]
    async fn test_missing_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let store = FallbackStore::new(&path);
        assert!(store.load().await.unwrap().is_none());

        tokio::fs::write(&path, b"  \n").await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stored_status_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        tokio::fs::write(
            &path,
            br#"[{"name":"auth1","ip":"10.0.0.11","port":8001,"status":"online","committee_members":["auth2"]}]"#,
        )
        .await
        .unwrap();

        let loaded = FallbackStore::new(&path).load().await.unwrap().unwrap();
        let record = loaded.get("auth1").unwrap();
        assert_eq!(record.status, AuthorityStatus::Unknown);
        assert_eq!(record.committee_members, BTreeSet::from(["auth2".to_string()]));
        assert!(record.position.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        let err = FallbackStore::new(&path).load().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
