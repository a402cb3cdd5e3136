/// Tool for full-text search
///
/// This module implements the search_vault MCP tool.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::storage::NoteStore;
use crate::tools::{Permissions, ToolError};

/// Number of results returned when the caller gives no limit
pub const DEFAULT_SEARCH_LIMIT: usize = 50;

/// Parameters for searching the vault
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchVaultArgs {
    /// Search query
    pub query: String,
    /// Maximum number of results (default 50; 0 also means the default)
    pub limit: Option<usize>,
}

/// Find notes containing the query text, best matches first
pub async fn search_vault(
    store: &dyn NoteStore,
    permissions: &Permissions,
    args: SearchVaultArgs,
) -> Result<Value, ToolError> {
    Permissions::require(permissions.enable_search, "search operations")?;

    if args.query.trim().is_empty() {
        return Err(ToolError::InvalidArguments("query must not be empty".to_string()));
    }

    let limit = args.limit.filter(|limit| *limit > 0).unwrap_or(DEFAULT_SEARCH_LIMIT);
    let hits = store.search(&args.query, limit).await?;
    Ok(serde_json::to_value(hits)?)
}
