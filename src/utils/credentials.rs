//! Picks one of several locally stored credential files (yt-dlp cookie jars) per
//! operation, spreading load across accounts, and records each pick in an audit log.

use chrono::{DateTime, Local};
use rand::seq::IndexedRandom;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::{ResolverError, ResolverResult};

/// Extension a file needs to be considered a credential.
const CREDENTIAL_EXTENSION: &str = "txt";

/// A credential chosen for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialHandle {
    path: PathBuf,
}

impl CredentialHandle {
    /// Path of the credential file, as handed to the extraction tool.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Receives one record per credential acquisition.
///
/// Implementations must not block the caller and must swallow their own failures.
#[cfg_attr(test, mockall::automock)]
pub trait AuditSink: Send + Sync {
    fn record(&self, chosen: &Path, at: DateTime<Local>);
}

/// Appends `timestamp,path` lines to a local file.
pub struct FileAuditSink {
    path: PathBuf,
}

impl FileAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn append(path: &Path, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, chosen: &Path, at: DateTime<Local>) {
        let path = self.path.clone();
        let line = format!("{},{}\n", at.to_rfc3339(), chosen.display());

        let write = move || {
            if let Err(e) = Self::append(&path, &line) {
                warn!("Failed to write credential audit log {:?}: {}", path, e);
            }
        };

        // Fire and forget on the blocking pool when a runtime is around
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(write);
            }
            Err(_) => write(),
        }
    }
}

/// Discards every record.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _chosen: &Path, _at: DateTime<Local>) {}
}

/// Uniform random selection over the credential files of one directory.
///
/// The directory is listed once, on first use, and never re-read afterwards. An empty
/// listing is not cached, so credentials added later are picked up by the next call.
pub struct CredentialRotator {
    dir: PathBuf,
    credentials: OnceCell<Vec<PathBuf>>,
    audit: Arc<dyn AuditSink>,
}

impl CredentialRotator {
    pub fn new(dir: impl Into<PathBuf>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            dir: dir.into(),
            credentials: OnceCell::new(),
            audit,
        }
    }

    /// Directory the credentials are read from.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Chooses a credential uniformly at random, with replacement.
    pub async fn acquire(&self) -> ResolverResult<CredentialHandle> {
        let credentials = self
            .credentials
            .get_or_try_init(|| Self::load(&self.dir))
            .await?;

        let chosen = credentials
            .choose(&mut rand::rng())
            .cloned()
            .ok_or_else(|| ResolverError::NoCredentialsAvailable(self.dir.clone()))?;

        debug!("Chose credential file {:?}", chosen);
        self.audit.record(&chosen, Local::now());

        Ok(CredentialHandle { path: chosen })
    }

    /// Lists the eligible credential files of `dir`, sorted for stable ordering.
    async fn load(dir: &Path) -> ResolverResult<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Unable to read credential directory {:?}: {}", dir, e);
                return Err(ResolverError::NoCredentialsAvailable(dir.to_path_buf()));
            }
        };

        let mut credentials = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let eligible = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(CREDENTIAL_EXTENSION));
            if eligible && entry.file_type().await?.is_file() {
                credentials.push(path);
            }
        }

        if credentials.is_empty() {
            return Err(ResolverError::NoCredentialsAvailable(dir.to_path_buf()));
        }

        credentials.sort();
        info!("Loaded {} credential files from {:?}", credentials.len(), dir);
        Ok(credentials)
    }
}
