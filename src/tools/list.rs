/// Tool for listing notes
///
/// This module implements the list_notes MCP tool.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::storage::NoteStore;
use crate::tools::ToolError;

/// Parameters for listing notes
#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListNotesArgs {
    /// Optional folder path to list notes from
    pub folder_path: Option<String>,
}

/// List every file in the vault, or below one folder
pub async fn list_notes(store: &dyn NoteStore, args: ListNotesArgs) -> Result<Value, ToolError> {
    let folder = args.folder_path.unwrap_or_default();
    let files = store.list(&folder).await?;
    Ok(serde_json::to_value(files)?)
}
