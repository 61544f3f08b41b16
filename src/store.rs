//! Local record file and remote reference.
//!
//! Both hold a JSON object with the address under a configurable key plus
//! `lastUpdated` and `updatedBy`. The local file is rewritten in place on
//! every update; keys this daemon does not own are preserved.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use reqwest::Client;
use serde_json::{Map, Value};

use crate::error::{RemoteError, StoreError};
use crate::types::AddressRecord;
use crate::util::is_valid_address;

const LAST_UPDATED: &str = "lastUpdated";
const UPDATED_BY: &str = "updatedBy";

/// Extracts the address under `key`. `None` if missing or not a valid
/// address.
fn address_from(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|a| is_valid_address(a))
        .map(str::to_string)
}

#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
    key: String,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key: key.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_object(&self) -> Result<Option<Map<String, Value>>, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(object)) => Ok(Some(object)),
            Ok(_) => Err(StoreError::Malformed {
                path: self.path.clone(),
                reason: "expected a JSON object".into(),
            }),
            Err(e) => Err(StoreError::Malformed {
                path: self.path.clone(),
                reason: e.to_string(),
            }),
        }
    }

    /// Reads the record. A missing file, a missing key or an address that
    /// fails validation all read as `None`.
    pub async fn load(&self) -> Result<Option<AddressRecord>, StoreError> {
        let Some(object) = self.read_object().await? else {
            debug!("No local record at {}", self.path.display());
            return Ok(None);
        };
        let Some(address) = address_from(&object, &self.key) else {
            warn!(
                "Local record {} has no valid `{}` entry",
                self.path.display(),
                self.key
            );
            return Ok(None);
        };
        let last_updated = object
            .get(LAST_UPDATED)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        let updated_by = object
            .get(UPDATED_BY)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(Some(AddressRecord {
            address,
            last_updated,
            updated_by,
        }))
    }

    pub async fn save(&self, record: &AddressRecord) -> Result<(), StoreError> {
        let mut object = self.read_object().await?.unwrap_or_default();
        object.insert(self.key.clone(), Value::String(record.address.clone()));
        object.insert(
            LAST_UPDATED.into(),
            Value::String(record.last_updated.to_rfc3339()),
        );
        object.insert(UPDATED_BY.into(), Value::String(record.updated_by.clone()));

        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };
        let mut body = serde_json::to_string_pretty(&Value::Object(object))
            .map_err(|e| write_err(std::io::Error::other(e)))?;
        body.push('\n');
        tokio::fs::write(&self.path, body).await.map_err(write_err)
    }
}

/// Read-only view of the separately hosted copy of the record.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn fetch(&self) -> Result<String, RemoteError>;
}

pub struct HttpRemote {
    url: Option<String>,
    key: String,
    client: Client,
}

impl HttpRemote {
    pub fn new(
        url: Option<String>,
        key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            url,
            key: key.into(),
            client: Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl RemoteSource for HttpRemote {
    async fn fetch(&self) -> Result<String, RemoteError> {
        let url = self.url.as_deref().ok_or(RemoteError::NotConfigured)?;
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let object = match serde_json::from_str::<Value>(&body) {
            Ok(Value::Object(object)) => object,
            Ok(_) => return Err(RemoteError::Malformed("expected a JSON object".into())),
            Err(e) => return Err(RemoteError::Malformed(e.to_string())),
        };
        address_from(&object, &self.key)
            .ok_or_else(|| RemoteError::Malformed(format!("no valid `{}` entry", self.key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_in(dir: &TempDir) -> LocalStore {
        LocalStore::new(dir.path().join("ip.json"), "ip")
    }

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(store_in(&dir).load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let record = AddressRecord::new("203.0.113.9", "addrwatch");
        store.save(&record).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.address, "203.0.113.9");
        assert_eq!(loaded.updated_by, "addrwatch");
        assert_eq!(loaded.last_updated.timestamp(), record.last_updated.timestamp());

        let raw: Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["ip"], "203.0.113.9");
        assert!(raw["lastUpdated"].is_string());
    }

    #[tokio::test]
    async fn save_preserves_foreign_keys() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), r#"{"ip": "203.0.113.5", "owner": "ops"}"#).unwrap();

        store
            .save(&AddressRecord::new("203.0.113.9", "addrwatch"))
            .await
            .unwrap();

        let raw: Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["ip"], "203.0.113.9");
        assert_eq!(raw["owner"], "ops");
    }

    #[tokio::test]
    async fn invalid_stored_address_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), r#"{"ip": "300.1.1.1"}"#).unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn malformed_file_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "not json").unwrap();
        assert!(matches!(
            store.load().await,
            Err(StoreError::Malformed { .. })
        ));
        assert!(matches!(
            store
                .save(&AddressRecord::new("192.0.2.1", "addrwatch"))
                .await,
            Err(StoreError::Malformed { .. })
        ));
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "not json");
    }

    #[tokio::test]
    async fn write_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path().join("nope").join("ip.json"), "ip");
        let err = store
            .save(&AddressRecord::new("192.0.2.1", "addrwatch"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Write { .. }));
    }

    async fn remote_serving(template: ResponseTemplate) -> (MockServer, HttpRemote) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ip.json"))
            .respond_with(template)
            .mount(&server)
            .await;
        let remote = HttpRemote::new(
            Some(format!("{}/ip.json", server.uri())),
            "ip",
            Duration::from_secs(2),
        )
        .unwrap();
        (server, remote)
    }

    #[tokio::test]
    async fn remote_reads_address() {
        let (_server, remote) = remote_serving(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ip": "203.0.113.5",
                "lastUpdated": "2026-01-01T00:00:00Z"
            })),
        )
        .await;
        assert_eq!(remote.fetch().await.unwrap(), "203.0.113.5");
    }

    #[tokio::test]
    async fn remote_failures_are_errors() {
        let (_server, remote) = remote_serving(ResponseTemplate::new(404)).await;
        assert!(matches!(remote.fetch().await, Err(RemoteError::Transport(_))));

        let (_server, remote) =
            remote_serving(ResponseTemplate::new(200).set_body_string("<html/>")).await;
        assert!(matches!(remote.fetch().await, Err(RemoteError::Malformed(_))));

        let unset = HttpRemote::new(None, "ip", Duration::from_secs(1)).unwrap();
        assert!(matches!(unset.fetch().await, Err(RemoteError::NotConfigured)));
    }
}
