//! Durable descriptor cache with a never-fail surface.
//!
//! # Responsibility
//! - Open one connection per logical operation and delegate to
//!   `SqliteDescriptorRepository`.
//! - Apply the cache failure policy: storage errors are logged and the
//!   operation degrades to a no-op or an empty read.
//!
//! # Invariants
//! - No connection outlives the call that opened it.
//! - `replace_all` readers never observe a mix of old and new documents.
//! - Tokens are never written to logs.

use crate::db::{delete_db, open_db};
use crate::model::descriptor::DocumentDescriptor;
use crate::repo::descriptor_repo::{DescriptorRepository, RepoResult, SqliteDescriptorRepository};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Default cache file name inside the application data directory.
pub const DESCRIPTOR_DB_FILE_NAME: &str = "web_example_db.sqlite3";

/// Descriptor cache bound to one SQLite file.
#[derive(Debug, Clone)]
pub struct DescriptorStore {
    db_path: PathBuf,
}

impl DescriptorStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    /// Creates a store using `DESCRIPTOR_DB_FILE_NAME` inside `data_dir`.
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        Self::new(data_dir.as_ref().join(DESCRIPTOR_DB_FILE_NAME))
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Upserts `descriptors`; logs and drops the whole batch on failure.
    pub fn add_all(&self, descriptors: &[DocumentDescriptor]) {
        let started_at = Instant::now();
        match self.try_add_all(descriptors) {
            Ok(()) => log_ok("add_all", descriptors.len(), started_at),
            Err(err) => log_error("add_all", &err, started_at),
        }
    }

    /// Makes the cache match `descriptors` exactly; logs and keeps the
    /// previous contents on failure.
    pub fn replace_all(&self, descriptors: &[DocumentDescriptor]) {
        let started_at = Instant::now();
        match self.try_replace_all(descriptors) {
            Ok(()) => log_ok("replace_all", descriptors.len(), started_at),
            Err(err) => log_error("replace_all", &err, started_at),
        }
    }

    /// Removes every cached document; logs and keeps contents on failure.
    pub fn clear(&self) {
        let started_at = Instant::now();
        match self.try_clear() {
            Ok(()) => log_ok("clear", 0, started_at),
            Err(err) => log_error("clear", &err, started_at),
        }
    }

    /// Reads every cached descriptor; returns an empty list on failure.
    pub fn read_all(&self) -> Vec<DocumentDescriptor> {
        let started_at = Instant::now();
        match self.try_read_all() {
            Ok(descriptors) => {
                log_ok("read_all", descriptors.len(), started_at);
                descriptors
            }
            Err(err) => {
                log_error("read_all", &err, started_at);
                Vec::new()
            }
        }
    }

    pub fn try_add_all(&self, descriptors: &[DocumentDescriptor]) -> RepoResult<()> {
        let mut conn = open_db(&self.db_path)?;
        let mut repo = SqliteDescriptorRepository::try_new(&mut conn)?;
        repo.upsert_descriptors(descriptors)
    }

    pub fn try_replace_all(&self, descriptors: &[DocumentDescriptor]) -> RepoResult<()> {
        let mut conn = open_db(&self.db_path)?;
        let mut repo = SqliteDescriptorRepository::try_new(&mut conn)?;
        repo.replace_descriptors(descriptors)
    }

    pub fn try_clear(&self) -> RepoResult<()> {
        let mut conn = open_db(&self.db_path)?;
        let mut repo = SqliteDescriptorRepository::try_new(&mut conn)?;
        repo.clear_descriptors()
    }

    pub fn try_read_all(&self) -> RepoResult<Vec<DocumentDescriptor>> {
        let mut conn = open_db(&self.db_path)?;
        let repo = SqliteDescriptorRepository::try_new(&mut conn)?;
        repo.list_descriptors()
    }

    /// Deletes the cache file. Used when the user logs out.
    pub fn delete_database(&self) -> RepoResult<()> {
        delete_db(&self.db_path)?;
        Ok(())
    }
}

fn log_ok(op: &str, count: usize, started_at: Instant) {
    info!(
        "event=descriptor_store module=service op={} status=ok count={} duration_ms={}",
        op,
        count,
        started_at.elapsed().as_millis()
    );
}

fn log_error(op: &str, err: &dyn std::error::Error, started_at: Instant) {
    error!(
        "event=descriptor_store module=service op={} status=error duration_ms={} error={}",
        op,
        started_at.elapsed().as_millis(),
        err
    );
}
