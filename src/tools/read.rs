/// Tool for reading notes
///
/// This module implements the read_note MCP tool.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::storage::NoteStore;
use crate::tools::{ensure_note_path, Permissions, ToolError};

/// Parameters for reading a note
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadNoteArgs {
    /// Path to the note (e.g., "folder/note.md")
    pub path: String,
}

/// Return the full text of a note
pub async fn read_note(
    store: &dyn NoteStore,
    permissions: &Permissions,
    args: ReadNoteArgs,
) -> Result<Value, ToolError> {
    if permissions.require_permission_for_reads {
        tracing::info!("Read approval requested for {}; no approver attached, allowing", args.path);
    }

    ensure_note_path(&args.path)?;
    let content = store.read(&args.path).await?;
    Ok(Value::String(content))
}
