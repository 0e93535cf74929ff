//! Authority records and discovery snapshots.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;

use crate::error::{ClientError, ClientResult, FailureKind};
use crate::model::unix_millis;

/// Reachability of an authority as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthorityStatus {
    Online,
    Offline,
    Syncing,
    #[default]
    Unknown,
}

impl fmt::Display for AuthorityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuthorityStatus::Online => "online",
            AuthorityStatus::Offline => "offline",
            AuthorityStatus::Syncing => "syncing",
            AuthorityStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Geographic position in the mesh simulation plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

/// Network address of an authority behind the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkAddress {
    pub ip: IpAddr,
    pub port: u16,
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip {
            IpAddr::V4(ip) => write!(f, "{}:{}", ip, self.port),
            IpAddr::V6(ip) => write!(f, "[{}]:{}", ip, self.port),
        }
    }
}

/// A single authority as known to the client.
///
/// Records are replaced wholesale by discovery; only `status` is ever
/// changed in place, by probe results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorityRecord {
    pub name: String,
    pub address: NetworkAddress,
    pub position: Option<Position>,
    pub status: AuthorityStatus,
    pub committee_members: BTreeSet<String>,
    pub performance_metrics: BTreeMap<String, f64>,
    /// Unix milliseconds of the discovery call that produced this record.
    pub last_heartbeat_ms: u64,
}

/// Authority entry as served by `GET /authorities`.
#[derive(Debug, Deserialize)]
struct AuthorityEntry {
    name: String,
    ip: IpAddr,
    port: u16,
    #[serde(default)]
    position: Option<Position>,
    #[serde(default)]
    status: AuthorityStatus,
    #[serde(default)]
    committee_members: Vec<String>,
    #[serde(default)]
    performance_metrics: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryBody {
    authorities: Vec<serde_json::Value>,
    #[serde(default)]
    count: Option<usize>,
}

/// Immutable set of authorities produced by one discovery call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoverySnapshot {
    records: BTreeMap<String, AuthorityRecord>,
    captured_at_ms: u64,
}

impl DiscoverySnapshot {
    /// Build a snapshot; a later record with a duplicate name replaces the earlier one.
    pub fn new(records: impl IntoIterator<Item = AuthorityRecord>, captured_at_ms: u64) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.name.clone(), record))
            .collect();
        Self {
            records,
            captured_at_ms,
        }
    }

    /// Parse the body of `GET /authorities`.
    ///
    /// Malformed entries are skipped with a warning; a body without an
    /// `authorities` array is a decode failure.
    pub fn from_discovery_body(body: serde_json::Value) -> ClientResult<Self> {
        let body: DiscoveryBody = serde_json::from_value(body).map_err(|e| {
            ClientError::communication("/authorities", FailureKind::Decode(e.to_string()))
        })?;

        let captured_at_ms = unix_millis();
        let mut records = Vec::with_capacity(body.authorities.len());
        for raw in body.authorities {
            match serde_json::from_value::<AuthorityEntry>(raw.clone()) {
                Ok(entry) => records.push(AuthorityRecord {
                    name: entry.name,
                    address: NetworkAddress {
                        ip: entry.ip,
                        port: entry.port,
                    },
                    position: entry.position,
                    status: entry.status,
                    committee_members: entry.committee_members.into_iter().collect(),
                    performance_metrics: entry.performance_metrics,
                    last_heartbeat_ms: captured_at_ms,
                }),
                Err(e) => {
                    tracing::warn!(entry = %raw, error = %e, "Skipping malformed authority entry");
                }
            }
        }

        if let Some(count) = body.count {
            if count != records.len() {
                tracing::debug!(
                    advertised = count,
                    parsed = records.len(),
                    "Discovery count differs from parsed authorities"
                );
            }
        }

        Ok(Self::new(records, captured_at_ms))
    }

    pub fn get(&self, name: &str) -> Option<&AuthorityRecord> {
        self.records.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    /// Records ordered by name.
    pub fn records(&self) -> impl Iterator<Item = &AuthorityRecord> {
        self.records.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<AuthorityRecord> {
        self.records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn count_with_status(&self, status: AuthorityStatus) -> usize {
        self.records.values().filter(|r| r.status == status).count()
    }

    /// Set the status of one record; returns false if the name is unknown.
    pub(crate) fn set_status(&mut self, name: &str, status: AuthorityStatus) -> bool {
        match self.records.get_mut(name) {
            Some(record) => {
                record.status = status;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_discovery_body() {
        let body = json!({
            "authorities": [
                {
                    "name": "auth1",
                    "ip": "10.0.0.11",
                    "port": 8001,
                    "position": {"x": 45.0, "y": 40.0, "z": 0.0},
                    "status": "online",
                    "committee_members": ["auth2", "auth3"]
                },
                {
                    "name": "auth2",
                    "ip": "10.0.0.12",
                    "port": 8002,
                    "position": {"x": 70.0, "y": 40.0},
                    "status": "syncing",
                    "committee_members": ["auth1"]
                }
            ],
            "count": 2
        });

        let snapshot = DiscoverySnapshot::from_discovery_body(body).unwrap();
        assert_eq!(snapshot.len(), 2);

        let auth1 = snapshot.get("auth1").unwrap();
        assert_eq!(auth1.address.to_string(), "10.0.0.11:8001");
        assert_eq!(auth1.status, AuthorityStatus::Online);
        assert!(auth1.committee_members.contains("auth3"));

        let auth2 = snapshot.get("auth2").unwrap();
        assert_eq!(auth2.position.unwrap().z, 0.0);
        assert_eq!(auth2.status, AuthorityStatus::Syncing);
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let body = json!({
            "authorities": [
                {"name": "good", "ip": "10.0.0.1", "port": 8001},
                {"name": "bad-ip", "ip": "not-an-ip", "port": 8002},
                {"name": "bad-status", "ip": "10.0.0.3", "port": 8003, "status": "exploded"},
                {"ip": "10.0.0.4", "port": 8004}
            ]
        });

        let snapshot = DiscoverySnapshot::from_discovery_body(body).unwrap();
        assert_eq!(snapshot.names().collect::<Vec<_>>(), vec!["good"]);
        assert_eq!(snapshot.get("good").unwrap().status, AuthorityStatus::Unknown);
    }

    #[test]
    fn test_missing_authorities_array_is_decode_error() {
        let err = DiscoverySnapshot::from_discovery_body(json!({"count": 0})).unwrap_err();
        assert!(matches!(
            err.failure_kind(),
            Some(FailureKind::Decode(_))
        ));
    }

    #[test]
    fn test_duplicate_names_keep_last() {
        let body = json!({
            "authorities": [
                {"name": "auth1", "ip": "10.0.0.1", "port": 8001},
                {"name": "auth1", "ip": "10.0.0.9", "port": 8009}
            ]
        });
        let snapshot = DiscoverySnapshot::from_discovery_body(body).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("auth1").unwrap().address.port, 8009);
    }

    #[test]
    fn test_set_status_only_touches_status() {
        let body = json!({
            "authorities": [{"name": "auth1", "ip": "10.0.0.1", "port": 8001, "status": "online"}]
        });
        let mut snapshot = DiscoverySnapshot::from_discovery_body(body).unwrap();
        let before = snapshot.get("auth1").unwrap().clone();

        assert!(snapshot.set_status("auth1", AuthorityStatus::Offline));
        assert!(!snapshot.set_status("auth9", AuthorityStatus::Offline));

        let after = snapshot.get("auth1").unwrap();
        assert_eq!(after.status, AuthorityStatus::Offline);
        assert_eq!(after.address, before.address);
        assert_eq!(after.committee_members, before.committee_members);
    }
}
