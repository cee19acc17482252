//! Durable descriptors for provider-side context caches
//!
//! The hosted substrate keeps reference documents in a server-side cache
//! with a TTL. This module owns the local record of that remote state: two
//! JSON documents per (role, module) pair (the context handle descriptor
//! and the uploaded-document handle list), written atomically so a crashed
//! process never leaves a half-written descriptor that reads back as valid.

use crate::ai::provider::CacheRole;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const CACHE_INFO_FILE: &str = "cache_info.json";
const UPLOADED_FILES_FILE: &str = "uploaded_files.json";

/// Cache resolution and persistence errors
#[derive(Debug, Error)]
pub enum CacheError {
    /// No usable descriptor exists; the caller must fall back to upload
    #[error("no usable cache descriptor for {role}/{module}")]
    Miss { role: CacheRole, module: String },

    #[error("failed to persist cache descriptor: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode cache descriptor: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Handle to one uploaded reference document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentHandle {
    /// Opaque provider-side identifier (e.g. "files/abc123")
    pub name: String,
    /// Original file name, kept for logging
    pub display_name: String,
    /// Provider URI used when composing cached content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// A provider-side bundle of uploaded reference documents
#[derive(Debug, Clone, PartialEq)]
pub struct CachedContext {
    /// Opaque context handle (e.g. "cachedContents/xyz")
    pub handle: String,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
    /// Documents that must be deleted together with the context
    pub documents: Vec<DocumentHandle>,
}

impl CachedContext {
    /// True once the TTL window has elapsed locally.
    ///
    /// The remote side may still have evicted the handle earlier; adapters
    /// treat an unresolvable handle the same as an expired one.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let deadline = self.created_at + Duration::seconds(self.ttl_secs as i64);
        now >= deadline
    }

    /// TTL in the "1800s" wire format the hosted API expects
    pub fn ttl_string(&self) -> String {
        format!("{}s", self.ttl_secs)
    }
}

/// On-disk shape of cache_info.json (field names match the wire format)
#[derive(Debug, Serialize, Deserialize)]
struct CacheInfoFile {
    cache_name: String,
    created_at: DateTime<Utc>,
    ttl: String,
}

fn parse_ttl(ttl: &str) -> Option<u64> {
    ttl.strip_suffix('s')?.parse().ok()
}

/// Manages cache descriptor files under a root directory.
///
/// Layout: `<root>/<role>/<module>/cache_info.json` plus
/// `uploaded_files.json`, so a generator's cache and a verifier's cache
/// never collide even for the same module.
#[derive(Debug, Clone)]
pub struct CacheManager {
    root: PathBuf,
}

impl CacheManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory owning the descriptors for one (role, module) pair
    pub fn descriptor_dir(&self, role: CacheRole, module: &str) -> PathBuf {
        self.root.join(role.as_str()).join(sanitize(module))
    }

    /// Loads the persisted context for (role, module).
    ///
    /// Returns `CacheError::Miss` when the descriptor is absent, unreadable,
    /// or locally expired. A miss is recovered by re-uploading; it is never
    /// surfaced to stage code.
    pub fn resolve(&self, role: CacheRole, module: &str) -> Result<CachedContext, CacheError> {
        let context = self.peek(role, module).ok_or(CacheError::Miss {
            role,
            module: module.to_string(),
        })?;

        if context.is_expired(Utc::now()) {
            debug!("Cache descriptor for {}/{} expired locally", role, module);
            return Err(CacheError::Miss {
                role,
                module: module.to_string(),
            });
        }

        Ok(context)
    }

    /// Loads the descriptor without the expiry check.
    ///
    /// Cleanup wants the document handles even when the context has lapsed
    /// locally; the remote side is the authority on what still exists.
    pub fn peek(&self, role: CacheRole, module: &str) -> Option<CachedContext> {
        let dir = self.descriptor_dir(role, module);

        let info_raw = fs::read_to_string(dir.join(CACHE_INFO_FILE)).ok()?;
        let info: CacheInfoFile = match serde_json::from_str(&info_raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Corrupt cache descriptor for {}/{}: {}", role, module, e);
                return None;
            }
        };

        let ttl_secs = match parse_ttl(&info.ttl) {
            Some(secs) => secs,
            None => {
                warn!("Unparseable TTL '{}' for {}/{}", info.ttl, role, module);
                return None;
            }
        };

        let documents = match fs::read_to_string(dir.join(UPLOADED_FILES_FILE)) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!("Corrupt uploaded-files list for {}/{}: {}", role, module, e);
                    return None;
                }
            },
            // Context without a document list is still usable for generation
            Err(_) => Vec::new(),
        };

        Some(CachedContext {
            handle: info.cache_name,
            created_at: info.created_at,
            ttl_secs,
            documents,
        })
    }

    /// Writes both descriptor documents atomically (write-temp-then-rename).
    pub fn persist(
        &self,
        role: CacheRole,
        module: &str,
        context: &CachedContext,
    ) -> Result<(), CacheError> {
        let dir = self.descriptor_dir(role, module);
        fs::create_dir_all(&dir)?;

        let info = CacheInfoFile {
            cache_name: context.handle.clone(),
            created_at: context.created_at,
            ttl: context.ttl_string(),
        };

        write_atomic(&dir.join(CACHE_INFO_FILE), &serde_json::to_vec_pretty(&info)?)?;
        write_atomic(
            &dir.join(UPLOADED_FILES_FILE),
            &serde_json::to_vec_pretty(&context.documents)?,
        )?;

        debug!(
            "Persisted cache descriptor {} for {}/{}",
            context.handle, role, module
        );
        Ok(())
    }

    /// Removes both descriptor documents. Idempotent: absent files are fine.
    pub fn remove(&self, role: CacheRole, module: &str) -> Result<(), CacheError> {
        let dir = self.descriptor_dir(role, module);
        for file in [CACHE_INFO_FILE, UPLOADED_FILES_FILE] {
            match fs::remove_file(dir.join(file)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

fn sanitize(name: &str) -> String {
    name.replace(
        ['/', '\\', ':', '*', '?', '"', '<', '>', '|', ' '],
        "_",
    )
}
