//! Filesystem policy store.
//!
//! Each policy is one `<hash>.json` file under the store root. Writes go to a
//! temporary sibling first and are renamed into place, so a concurrent reader
//! sees either no file or the complete body. The root directory is created on
//! first write; a missing root reads as an empty store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dataspace_policy::PolicyHash;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::traits::{prepare_policy, PolicyStore};
use crate::{StoreError, StoreResult};

const EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct FilesystemPolicyStore {
    root: PathBuf,
}

impl FilesystemPolicyStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, hash: &PolicyHash) -> PathBuf {
        self.root.join(format!("{hash}.{EXTENSION}"))
    }

    async fn stored_hashes(&self) -> StoreResult<Vec<PolicyHash>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(unavailable("read policy directory", &self.root, e)),
        };

        let mut hashes = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| unavailable("read policy directory", &self.root, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match PolicyHash::parse(stem) {
                Ok(hash) => hashes.push(hash),
                Err(_) => debug!(path = %path.display(), "ignoring non-policy file"),
            }
        }
        hashes.sort();
        Ok(hashes)
    }
}

#[async_trait]
impl PolicyStore for FilesystemPolicyStore {
    async fn add(&self, policy: &Value) -> StoreResult<PolicyHash> {
        let prepared = prepare_policy(policy)?;
        let target = self.path_for(&prepared.hash);

        if tokio::fs::try_exists(&target)
            .await
            .map_err(|e| unavailable("stat policy file", &target, e))?
        {
            return Ok(prepared.hash);
        }

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| unavailable("create policy directory", &self.root, e))?;

        let body = serde_json::to_vec_pretty(&prepared.body)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let staging = self
            .root
            .join(format!(".{}.{}.tmp", prepared.hash, Uuid::new_v4().simple()));
        tokio::fs::write(&staging, body)
            .await
            .map_err(|e| unavailable("write policy file", &staging, e))?;
        if let Err(e) = tokio::fs::rename(&staging, &target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(unavailable("publish policy file", &target, e));
        }

        debug!(hash = %prepared.hash, "policy written");
        Ok(prepared.hash)
    }

    async fn remove(&self, hash: &PolicyHash) -> StoreResult<bool> {
        let path = self.path_for(hash);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(unavailable("remove policy file", &path, e)),
        }
    }

    async fn get(&self, hash: &PolicyHash) -> StoreResult<Option<Value>> {
        let path = self.path_for(hash);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(unavailable("read policy file", &path, e)),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                key: hash.to_string(),
                reason: e.to_string(),
            })
    }

    async fn contains(&self, hash: &PolicyHash) -> StoreResult<bool> {
        let path = self.path_for(hash);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| unavailable("stat policy file", &path, e))
    }

    async fn count(&self) -> StoreResult<usize> {
        Ok(self.stored_hashes().await?.len())
    }

    async fn list_hashes(&self) -> StoreResult<Vec<PolicyHash>> {
        self.stored_hashes().await
    }

    async fn clear(&self) -> StoreResult<usize> {
        let mut removed = 0;
        for hash in self.stored_hashes().await? {
            if self.remove(&hash).await? {
                removed += 1;
            }
        }
        if removed > 0 {
            warn!(removed, root = %self.root.display(), "policy directory cleared");
        }
        Ok(removed)
    }
}

fn unavailable(action: &str, path: &Path, err: std::io::Error) -> StoreError {
    StoreError::Unavailable(format!("failed to {action} {}: {err}", path.display()))
}
