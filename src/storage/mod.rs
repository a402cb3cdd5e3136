/// Storage layer for the note vault
///
/// This module defines the capability interface the tools call into and
/// the errors a backend may report. The filesystem implementation lives
/// in `fs`; any other backend only has to implement `NoteStore`.

pub mod fs;

pub use fs::FsVault;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// File extension required for every note
pub const NOTE_EXTENSION: &str = ".md";

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File not found: {path}")]
    NotFound { path: String },

    #[error("Invalid path: {path}")]
    InvalidPath { path: String },

    #[error("File already exists: {path}")]
    AlreadyExists { path: String },

    #[error("Permission denied: {operation}")]
    PermissionDenied { operation: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata for one file in the vault
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteInfo {
    /// Vault-relative path using `/` separators
    pub path: String,
    pub name: String,
    pub extension: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// A single search match
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub path: String,
    pub snippet: String,
    /// Number of case-insensitive occurrences of the query
    pub score: usize,
}

/// Capability interface over a hierarchical note store
///
/// Implementations must be safe to call from several connections at once.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Read the full text of a note
    async fn read(&self, path: &str) -> Result<String, StorageError>;

    /// Create a note, replacing an existing one only when `overwrite` is set
    async fn write(&self, path: &str, content: &str, overwrite: bool) -> Result<(), StorageError>;

    /// Replace the content of an existing note
    async fn update(&self, path: &str, content: &str) -> Result<(), StorageError>;

    /// Remove an existing note
    async fn delete(&self, path: &str) -> Result<(), StorageError>;

    /// List every file below `folder` (the vault root when empty)
    async fn list(&self, folder: &str) -> Result<Vec<NoteInfo>, StorageError>;

    /// Search note contents, best matches first
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, StorageError>;
}

/// Whether `path` may be passed to a content operation
///
/// Rejects absolute paths, any `..` segment, and anything that is not a
/// markdown note.
pub fn validate_note_path(path: &str) -> bool {
    is_relative_inside_vault(path) && path.ends_with(NOTE_EXTENSION)
}

/// Whether `path` stays inside the vault once joined onto its root
pub fn is_relative_inside_vault(path: &str) -> bool {
    if path.starts_with('/') || path.starts_with('\\') || path.contains(':') {
        return false;
    }
    !path
        .split(|c: char| c == '/' || c == '\\')
        .any(|segment| segment == "..")
}
