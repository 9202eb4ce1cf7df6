//! Ownership marker for a persisted store file.
//!
//! A long-running process takes the lease next to the store file
//! (`documents.json.lock`). Stores opened by other processes refuse to persist
//! while the marker exists, and read it to find the owner's endpoint.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::StoreError;

const LOG_TARGET: &str = "fieldpulse.store";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseHolder {
    pub pid: u32,
    pub token: String,
    /// Base URL where the owner accepts writes, if it serves HTTP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub acquired_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct StoreLease {
    lock_path: PathBuf,
    holder: LeaseHolder,
}

impl StoreLease {
    pub fn lock_path(store_path: &Path) -> PathBuf {
        let mut name = store_path
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(".lock");
        store_path.with_file_name(name)
    }

    /// Takes the lease, replacing any marker left behind by a process that
    /// exited without releasing it.
    pub fn acquire(store_path: &Path, endpoint: Option<String>) -> Result<Self, StoreError> {
        let lock_path = Self::lock_path(store_path);
        if let Some(parent) = lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|error| StoreError::Persistence {
                message: format!("failed to prepare document store directory: {error}"),
            })?;
        }

        if let Some(previous) = Self::holder(store_path) {
            tracing::warn!(
                target: LOG_TARGET,
                path = %lock_path.display(),
                previous_pid = previous.pid,
                "replacing existing document store lease",
            );
        }

        let holder = LeaseHolder {
            pid: std::process::id(),
            token: Uuid::new_v4().simple().to_string(),
            endpoint,
            acquired_at: Utc::now(),
        };
        let payload = serde_json::to_vec_pretty(&holder).map_err(|error| StoreError::Persistence {
            message: format!("failed to encode document store lease: {error}"),
        })?;
        std::fs::write(&lock_path, payload).map_err(|error| StoreError::Persistence {
            message: format!("failed to write document store lease: {error}"),
        })?;

        tracing::info!(
            target: LOG_TARGET,
            path = %lock_path.display(),
            "document store lease acquired",
        );
        Ok(Self { lock_path, holder })
    }

    /// The current owner of `store_path`, if any.
    pub fn holder(store_path: &Path) -> Option<LeaseHolder> {
        let raw = std::fs::read(Self::lock_path(store_path)).ok()?;
        serde_json::from_slice(&raw).ok()
    }

    pub fn info(&self) -> &LeaseHolder {
        &self.holder
    }

    pub(crate) fn is_current(&self, store_path: &Path) -> bool {
        Self::holder(store_path).is_some_and(|holder| holder.token == self.holder.token)
    }
}

impl Drop for StoreLease {
    fn drop(&mut self) {
        // Another owner may have replaced the marker since.
        let still_ours = std::fs::read(&self.lock_path)
            .ok()
            .and_then(|raw| serde_json::from_slice::<LeaseHolder>(&raw).ok())
            .is_some_and(|holder| holder.token == self.holder.token);
        if still_ours && let Err(error) = std::fs::remove_file(&self.lock_path) {
            tracing::warn!(
                target: LOG_TARGET,
                path = %self.lock_path.display(),
                error = %error,
                "failed to release document store lease",
            );
        }
    }
}
