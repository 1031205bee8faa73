//! Descriptor repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist documents and their layers in the `documents`/`layers` tables.
//! - Own batch upsert and full replacement with all-or-nothing semantics.
//!
//! # Invariants
//! - Every mutating call runs inside one `IMMEDIATE` transaction.
//! - Upserting a document replaces its whole layer set; rows are never
//!   duplicated.
//! - Read paths return the default layer first for every document.

use crate::db::DbError;
use crate::model::descriptor::{DescriptorValidationError, DocumentDescriptor, LayerDescriptor};
use log::warn;
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for descriptor persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(DescriptorValidationError),
    Db(DbError),
    InvalidData(String),
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted descriptor data: {message}"),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "missing required column `{table}.{column}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DescriptorValidationError> for RepoError {
    fn from(value: DescriptorValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for the descriptor cache.
pub trait DescriptorRepository {
    /// Upserts every descriptor and its layers in one transaction.
    fn upsert_descriptors(&mut self, descriptors: &[DocumentDescriptor]) -> RepoResult<()>;
    /// Clears both tables, then upserts `descriptors`, in one transaction.
    fn replace_descriptors(&mut self, descriptors: &[DocumentDescriptor]) -> RepoResult<()>;
    /// Removes every document and layer in one transaction.
    fn clear_descriptors(&mut self) -> RepoResult<()>;
    /// Reconstructs all stored descriptors, sorted by `document_id`.
    fn list_descriptors(&self) -> RepoResult<Vec<DocumentDescriptor>>;
}

/// SQLite-backed descriptor repository.
pub struct SqliteDescriptorRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteDescriptorRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    ///
    /// # Errors
    /// - `MissingRequiredTable`/`MissingRequiredColumn` when the connection
    ///   was not bootstrapped through `db::open_db`.
    pub fn try_new(conn: &'conn mut Connection) -> RepoResult<Self> {
        ensure_descriptor_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl DescriptorRepository for SqliteDescriptorRepository<'_> {
    fn upsert_descriptors(&mut self, descriptors: &[DocumentDescriptor]) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        upsert_in_tx(&tx, descriptors)?;
        tx.commit()?;
        Ok(())
    }

    fn replace_descriptors(&mut self, descriptors: &[DocumentDescriptor]) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        clear_in_tx(&tx)?;
        upsert_in_tx(&tx, descriptors)?;
        tx.commit()?;
        Ok(())
    }

    fn clear_descriptors(&mut self) -> RepoResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        clear_in_tx(&tx)?;
        tx.commit()?;
        Ok(())
    }

    fn list_descriptors(&self) -> RepoResult<Vec<DocumentDescriptor>> {
        // One read transaction so documents and layers come from one snapshot.
        let tx = self.conn.unchecked_transaction()?;
        let descriptors = list_in_tx(&tx)?;
        tx.commit()?;
        Ok(descriptors)
    }
}

fn list_in_tx(tx: &Transaction<'_>) -> RepoResult<Vec<DocumentDescriptor>> {
    let mut stmt = tx.prepare("SELECT document_id, title FROM documents ORDER BY document_id ASC;")?;
    let mut rows = stmt.query([])?;
    let mut descriptors = Vec::new();

    while let Some(row) = rows.next()? {
        let document_id: String = row.get("document_id")?;
        let title: String = row.get("title")?;
        let layers = load_layers(tx, &document_id)?;
        if layers.is_empty() {
            warn!(
                "event=descriptor_read module=repo status=skipped reason=no_layers document_id={}",
                document_id
            );
            continue;
        }
        descriptors.push(DocumentDescriptor::new(document_id, title, layers)?);
    }

    Ok(descriptors)
}

fn upsert_in_tx(tx: &Transaction<'_>, descriptors: &[DocumentDescriptor]) -> RepoResult<()> {
    for descriptor in descriptors {
        tx.execute(
            "INSERT OR REPLACE INTO documents (document_id, title) VALUES (?1, ?2);",
            params![descriptor.document_id.as_str(), descriptor.title.as_str()],
        )?;
        tx.execute(
            "DELETE FROM layers WHERE document_id = ?1;",
            [descriptor.document_id.as_str()],
        )?;
        for layer in descriptor.layers() {
            tx.execute(
                "INSERT OR REPLACE INTO layers (document_id, layer_name, token)
                 VALUES (?1, ?2, ?3);",
                params![
                    descriptor.document_id.as_str(),
                    layer.layer_name.as_deref(),
                    layer.token.as_str(),
                ],
            )?;
        }
    }
    Ok(())
}

fn clear_in_tx(tx: &Transaction<'_>) -> RepoResult<()> {
    tx.execute("DELETE FROM documents;", [])?;
    tx.execute("DELETE FROM layers;", [])?;
    Ok(())
}

fn load_layers(conn: &Connection, document_id: &str) -> RepoResult<Vec<LayerDescriptor>> {
    let mut stmt = conn.prepare(
        "SELECT layer_name, token
         FROM layers
         WHERE document_id = ?1
         ORDER BY COALESCE(layer_name, '') <> '', rowid ASC;",
    )?;
    let mut rows = stmt.query([document_id])?;
    let mut layers = Vec::new();
    while let Some(row) = rows.next()? {
        // Empty names were written for the default layer by older caches.
        let layer_name = row
            .get::<_, Option<String>>("layer_name")?
            .filter(|name| !name.is_empty());
        layers.push(LayerDescriptor {
            document_id: document_id.to_string(),
            layer_name,
            token: row.get("token")?,
        });
    }
    Ok(layers)
}

fn ensure_descriptor_connection_ready(conn: &Connection) -> RepoResult<()> {
    const REQUIRED: &[(&str, &[&str])] = &[
        ("documents", &["document_id", "title"]),
        ("layers", &["document_id", "layer_name", "token"]),
    ];

    for &(table, columns) in REQUIRED {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(RepoError::MissingRequiredColumn { table, column });
            }
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
