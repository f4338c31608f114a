//! Consent bridge between the endpoint service and the consent surface.
//!
//! Two well-known keys in a shared store:
//! - `consent.request` holds the pending [`ConsentRequest`], written by the
//!   service and read by the surface.
//! - `consent.decision` holds the [`ConsentDecision`], written by the surface
//!   and consumed (read then deleted) by the service.
//!
//! Writes replace whole values. Malformed entries read as absent. Within one
//! process, publishing a request and submitting a decision are serialized so
//! the compare-then-delete in [`ConsentBridge::submit_decision`] cannot
//! interleave with a new request.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use rcs_proto::v1::{ConsentDecision, ConsentRequest};
use rcs_proto::Validate;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::errors::ControlError;

pub const REQUEST_KEY: &str = "consent.request";
pub const DECISION_KEY: &str = "consent.decision";

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("bridge encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid bridge key: {0}")]
    InvalidKey(String),
    #[error("refusing bridge directory {path}: {reason}")]
    InsecureDir { path: PathBuf, reason: &'static str },
}

/// Per-user data directory for the bridge, when the platform has one.
pub fn default_bridge_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io", "rcs", "rcs-agent")
        .map(|dirs| dirs.data_local_dir().join("consent"))
}

/// Create `dir` if it is missing and check that no other user can write to
/// it. Whoever can write the decision key can approve a session.
pub async fn ensure_private_dir(dir: &Path) -> Result<(), BridgeError> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(dir).await?;
    check_private_dir(dir).await
}

#[cfg(unix)]
async fn check_private_dir(dir: &Path) -> Result<(), BridgeError> {
    use std::os::unix::fs::{MetadataExt, PermissionsExt};

    let insecure = |reason| BridgeError::InsecureDir {
        path: dir.to_path_buf(),
        reason,
    };
    let meta = tokio::fs::symlink_metadata(dir).await?;
    if !meta.file_type().is_dir() {
        return Err(insecure("not a directory"));
    }
    // SAFETY: geteuid has no preconditions and cannot fail.
    #[allow(unsafe_code)]
    let euid = unsafe { libc::geteuid() };
    if meta.uid() != euid {
        return Err(insecure("owned by another user"));
    }
    if meta.permissions().mode() & 0o022 != 0 {
        return Err(insecure("writable by group or others"));
    }
    Ok(())
}

#[cfg(not(unix))]
async fn check_private_dir(dir: &Path) -> Result<(), BridgeError> {
    let meta = tokio::fs::symlink_metadata(dir).await?;
    if !meta.file_type().is_dir() {
        return Err(BridgeError::InsecureDir {
            path: dir.to_path_buf(),
            reason: "not a directory",
        });
    }
    Ok(())
}

/// Key-value storage visible to both processes.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, BridgeError>;
    async fn put(&self, key: &str, value: String) -> Result<(), BridgeError>;
    async fn delete(&self, key: &str) -> Result<(), BridgeError>;
}

/// Process-local store, used in tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, BridgeError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> Result<(), BridgeError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BridgeError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// One JSON file per key under a directory. Writes go to a temporary file
/// that is renamed over the target, so readers never see a partial value.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open the store directory, creating it owner-only if needed. A
    /// directory other users can write to is refused.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, BridgeError> {
        let dir = dir.into();
        ensure_private_dir(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, BridgeError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
            && !key.starts_with('.');
        if !valid {
            return Err(BridgeError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, BridgeError> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, value: String) -> Result<(), BridgeError> {
        let path = self.path_for(key)?;
        let tmp = self.dir.join(format!(".{key}.tmp"));
        tokio::fs::write(&tmp, value.as_bytes()).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BridgeError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Typed view over the two bridge keys.
#[derive(Clone)]
pub struct ConsentBridge {
    store: Arc<dyn KeyValueStore>,
    write_lock: Arc<Mutex<()>>,
}

impl ConsentBridge {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    /// Replace the pending request.
    pub async fn publish_request(&self, request: &ConsentRequest) -> Result<(), BridgeError> {
        let json = serde_json::to_string(request)?;
        let _guard = self.write_lock.lock().await;
        self.store.put(REQUEST_KEY, json).await
    }

    /// The pending request, if one is present and well formed. A malformed
    /// entry is deleted.
    pub async fn read_request(&self) -> Result<Option<ConsentRequest>, BridgeError> {
        self.read_typed::<ConsentRequest>(REQUEST_KEY).await
    }

    /// Read and delete the decision in one step. A malformed entry is
    /// dropped and reads as absent.
    pub async fn take_decision(&self) -> Result<Option<ConsentDecision>, BridgeError> {
        let Some(raw) = self.store.get(DECISION_KEY).await? else {
            return Ok(None);
        };
        self.store.delete(DECISION_KEY).await?;
        Ok(decode::<ConsentDecision>(DECISION_KEY, &raw))
    }

    /// Record the user's decision and withdraw the request it answers.
    ///
    /// A request published for a different session stays in place, and a
    /// decision that answers no published request never replaces a stored
    /// one.
    pub async fn submit_decision(&self, decision: &ConsentDecision) -> Result<(), BridgeError> {
        let json = serde_json::to_string(decision)?;
        let _guard = self.write_lock.lock().await;

        let answers_current = matches!(
            self.read_request().await?,
            Some(current) if current.session_id == decision.session_id
        );
        if !answers_current && self.store.get(DECISION_KEY).await?.is_some() {
            debug!(
                session = %decision.session_id.short(),
                "stale decision would replace a pending one, dropping"
            );
            return Ok(());
        }

        self.store.put(DECISION_KEY, json).await?;
        if answers_current {
            self.store.delete(REQUEST_KEY).await?;
        }
        Ok(())
    }

    pub async fn clear_request(&self) -> Result<(), BridgeError> {
        self.store.delete(REQUEST_KEY).await
    }

    pub async fn clear_decision(&self) -> Result<(), BridgeError> {
        self.store.delete(DECISION_KEY).await
    }

    pub async fn clear_all(&self) -> Result<(), BridgeError> {
        self.clear_request().await?;
        self.clear_decision().await
    }

    async fn read_typed<T: DeserializeOwned + Validate>(
        &self,
        key: &str,
    ) -> Result<Option<T>, BridgeError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        match decode::<T>(key, &raw) {
            Some(v) => Ok(Some(v)),
            None => {
                self.store.delete(key).await?;
                Ok(None)
            }
        }
    }
}

fn decode<T: DeserializeOwned + Validate>(key: &str, raw: &str) -> Option<T> {
    let parsed = serde_json::from_str::<T>(raw)
        .map_err(|e| e.to_string())
        .and_then(|v| v.validate().map(|_| v).map_err(|e| e.to_string()));
    match parsed {
        Ok(v) => Some(v),
        Err(reason) => {
            let err = ControlError::BridgeDecode {
                key: key.to_string(),
                reason,
            };
            warn!(error = %err, "discarding bridge entry");
            debug!(raw_len = raw.len(), "malformed bridge payload");
            None
        }
    }
}
