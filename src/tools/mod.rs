/// MCP tools for note management
///
/// This module holds the registry of tools exposed to MCP clients. The set
/// of tools is fixed when the registry is built; each call is routed by
/// name to one of the handlers below, which talk to the note store.

pub mod delete;
pub mod list;
pub mod read;
pub mod search;
pub mod update;
pub mod write;

pub use delete::*;
pub use list::*;
pub use read::*;
pub use search::*;
pub use update::*;
pub use write::*;

use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::Settings;
use crate::storage::{validate_note_path, NoteStore, StorageError};

/// Errors a tool can report back to the caller
#[derive(Error, Debug)]
pub enum ToolError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Failed to encode tool result: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Feature switches and approval flags that gate tool calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    pub enable_write: bool,
    pub enable_delete: bool,
    pub enable_search: bool,
    pub require_permission_for_reads: bool,
    pub require_permission_for_writes: bool,
}

impl From<&Settings> for Permissions {
    fn from(settings: &Settings) -> Self {
        Self {
            enable_write: settings.enable_write,
            enable_delete: settings.enable_delete,
            enable_search: settings.enable_search,
            require_permission_for_reads: settings.require_permission_for_reads,
            require_permission_for_writes: settings.require_permission_for_writes,
        }
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl Permissions {
    /// Fail with a permission error unless `enabled`
    fn require(enabled: bool, operation: &str) -> Result<(), ToolError> {
        if enabled {
            Ok(())
        } else {
            Err(StorageError::PermissionDenied {
                operation: operation.to_string(),
            }
            .into())
        }
    }
}

/// Public description of a tool, as returned by `tools/list`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Response for tools that modify a note
#[derive(Debug, Serialize)]
pub struct NoteChangeResponse {
    pub success: bool,
    pub path: String,
}

/// Every tool the server knows how to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    ReadNote,
    WriteNote,
    UpdateNote,
    DeleteNote,
    ListNotes,
    SearchVault,
}

impl ToolKind {
    pub const ALL: [ToolKind; 6] = [
        ToolKind::ReadNote,
        ToolKind::WriteNote,
        ToolKind::UpdateNote,
        ToolKind::DeleteNote,
        ToolKind::ListNotes,
        ToolKind::SearchVault,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::ReadNote => "read_note",
            ToolKind::WriteNote => "write_note",
            ToolKind::UpdateNote => "update_note",
            ToolKind::DeleteNote => "delete_note",
            ToolKind::ListNotes => "list_notes",
            ToolKind::SearchVault => "search_vault",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    fn descriptor(self) -> ToolDescriptor {
        match self {
            ToolKind::ReadNote => {
                describe::<ReadNoteArgs>(self, "Read the content of a note from the vault")
            }
            ToolKind::WriteNote => {
                describe::<WriteNoteArgs>(self, "Write content to a new note in the vault")
            }
            ToolKind::UpdateNote => {
                describe::<UpdateNoteArgs>(self, "Update an existing note in the vault")
            }
            ToolKind::DeleteNote => describe::<DeleteNoteArgs>(self, "Delete a note from the vault"),
            ToolKind::ListNotes => describe::<ListNotesArgs>(
                self,
                "List all notes in the vault or a specific folder",
            ),
            ToolKind::SearchVault => describe::<SearchVaultArgs>(
                self,
                "Search for notes containing specific text in the vault",
            ),
        }
    }
}

fn describe<T: JsonSchema>(kind: ToolKind, description: &str) -> ToolDescriptor {
    let schema = schemars::schema_for!(T);
    ToolDescriptor {
        name: kind.name().to_string(),
        description: description.to_string(),
        input_schema: serde_json::to_value(schema).unwrap_or_else(|_| json!({"type": "object"})),
    }
}

/// Decode tool arguments, treating missing arguments as an empty object
fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Reject paths that escape the vault or are not notes, before any I/O
fn ensure_note_path(path: &str) -> Result<(), ToolError> {
    if validate_note_path(path) {
        Ok(())
    } else {
        Err(StorageError::InvalidPath {
            path: path.to_string(),
        }
        .into())
    }
}

/// Immutable set of tools bound to a note store
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    store: Arc<dyn NoteStore>,
    permissions: Permissions,
}

impl ToolRegistry {
    pub fn new(store: Arc<dyn NoteStore>, permissions: Permissions) -> Self {
        let tools = ToolKind::ALL.into_iter().map(ToolKind::descriptor).collect();
        Self {
            tools,
            store,
            permissions,
        }
    }

    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn permissions(&self) -> &Permissions {
        &self.permissions
    }

    /// Run the tool called `name` with `arguments`
    pub async fn call(&self, name: &str, arguments: Value) -> Result<Value, ToolError> {
        let kind = ToolKind::from_name(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let store = self.store.as_ref();
        let permissions = &self.permissions;

        tracing::debug!("Calling tool {}", kind.name());
        match kind {
            ToolKind::ReadNote => read_note(store, permissions, parse_args(arguments)?).await,
            ToolKind::WriteNote => write_note(store, permissions, parse_args(arguments)?).await,
            ToolKind::UpdateNote => update_note(store, permissions, parse_args(arguments)?).await,
            ToolKind::DeleteNote => delete_note(store, permissions, parse_args(arguments)?).await,
            ToolKind::ListNotes => list_notes(store, parse_args(arguments)?).await,
            ToolKind::SearchVault => search_vault(store, permissions, parse_args(arguments)?).await,
        }
    }
}
