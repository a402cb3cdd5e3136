/// Dispatcher behaviour against a recording note store
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use vault_mcp::mcp::protocol::error_codes;
use vault_mcp::storage::{NoteInfo, SearchHit};
use vault_mcp::*;

/// Store that counts calls and fails every one of them
#[derive(Default)]
struct CountingStore {
    calls: AtomicUsize,
}

impl CountingStore {
    fn touched(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl NoteStore for CountingStore {
    async fn read(&self, path: &str) -> Result<String, StorageError> {
        self.hit();
        Ok(format!("contents of {}", path))
    }

    async fn write(&self, _path: &str, _content: &str, _overwrite: bool) -> Result<(), StorageError> {
        self.hit();
        Ok(())
    }

    async fn update(&self, _path: &str, _content: &str) -> Result<(), StorageError> {
        self.hit();
        Ok(())
    }

    async fn delete(&self, _path: &str) -> Result<(), StorageError> {
        self.hit();
        Ok(())
    }

    async fn list(&self, _folder: &str) -> Result<Vec<NoteInfo>, StorageError> {
        self.hit();
        Ok(Vec::new())
    }

    async fn search(&self, query: &str, _limit: usize) -> Result<Vec<SearchHit>, StorageError> {
        self.hit();
        Ok(vec![SearchHit {
            path: "hit.md".to_string(),
            snippet: query.to_string(),
            score: 1,
        }])
    }
}

/// Store whose reads blow up
struct PanickingStore;

#[async_trait]
impl NoteStore for PanickingStore {
    async fn read(&self, _path: &str) -> Result<String, StorageError> {
        panic!("disk on fire")
    }

    async fn write(&self, _path: &str, _content: &str, _overwrite: bool) -> Result<(), StorageError> {
        Ok(())
    }

    async fn update(&self, _path: &str, _content: &str) -> Result<(), StorageError> {
        Ok(())
    }

    async fn delete(&self, _path: &str) -> Result<(), StorageError> {
        Ok(())
    }

    async fn list(&self, _folder: &str) -> Result<Vec<NoteInfo>, StorageError> {
        Ok(Vec::new())
    }

    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<SearchHit>, StorageError> {
        Ok(Vec::new())
    }
}

fn dispatcher_with(store: Arc<CountingStore>, permissions: Permissions) -> Dispatcher {
    Dispatcher::new(ToolRegistry::new(store, permissions), 4)
}

async fn call(dispatcher: &Dispatcher, request: Value) -> JsonRpcResponse {
    dispatcher
        .handle_request(&request.to_string())
        .await
        .expect("request with id must be answered")
}

#[cfg(test)]
mod dispatch_tests {
    use super::*;

    #[tokio::test]
    async fn test_traversal_never_reaches_store() {
        let store = Arc::new(CountingStore::default());
        let dispatcher = dispatcher_with(store.clone(), Permissions::default());

        for path in ["../secret.md", "notes/../../secret.md", "/abs.md", "note.txt"] {
            let response = call(
                &dispatcher,
                json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call",
                       "params": {"name": "read_note", "arguments": {"path": path}}}),
            )
            .await;
            let error = response.error_info().expect("error response");
            assert_eq!(error.code, error_codes::TOOL_ERROR);
            assert_eq!(error.message, format!("Invalid path: {}", path));
        }

        assert_eq!(store.touched(), 0);
    }

    #[tokio::test]
    async fn test_tools_list_matches_registry() {
        let store = Arc::new(CountingStore::default());
        let dispatcher = dispatcher_with(store, Permissions::default());

        let response = call(&dispatcher, json!({"jsonrpc": "2.0", "id": "t", "method": "tools/list"})).await;
        let tools = response.result().unwrap()["tools"].as_array().unwrap().clone();

        assert_eq!(tools.len(), dispatcher.registry().len());
        assert_eq!(tools.len(), 6);
        for tool in &tools {
            assert!(!tool["name"].as_str().unwrap().is_empty());
            assert!(tool["inputSchema"].is_object());
            assert!(!tool["description"].as_str().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_initialize_reports_server_identity() {
        let store = Arc::new(CountingStore::default());
        let dispatcher = dispatcher_with(store, Permissions::default());

        let response = call(
            &dispatcher,
            json!({"jsonrpc": "2.0", "id": 0, "method": "initialize",
                   "params": {"protocolVersion": "2024-11-05", "capabilities": {},
                              "clientInfo": {"name": "test", "version": "1"}}}),
        )
        .await;
        let result = response.result().unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], "vault-mcp");
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_disabled_search_is_permission_error() {
        let store = Arc::new(CountingStore::default());
        let permissions = Permissions {
            enable_search: false,
            ..Permissions::default()
        };
        let dispatcher = dispatcher_with(store.clone(), permissions);

        let response = call(
            &dispatcher,
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call",
                   "params": {"name": "search_vault", "arguments": {"query": "x"}}}),
        )
        .await;
        let error = response.error_info().unwrap();
        assert_eq!(error.code, error_codes::TOOL_ERROR);
        assert_eq!(error.message, "Permission denied: search operations");
        assert_eq!(store.touched(), 0);
    }

    #[tokio::test]
    async fn test_search_result_is_pretty_json_text() {
        let store = Arc::new(CountingStore::default());
        let dispatcher = dispatcher_with(store.clone(), Permissions::default());

        let response = call(
            &dispatcher,
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
                   "params": {"name": "search_vault", "arguments": {"query": "rust"}}}),
        )
        .await;
        let text = response.result().unwrap()["content"][0]["text"].as_str().unwrap().to_string();
        let hits: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(hits, json!([{"path": "hit.md", "snippet": "rust", "score": 1}]));
        assert!(text.contains('\n'));
        assert_eq!(store.touched(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_and_bad_arguments() {
        let store = Arc::new(CountingStore::default());
        let dispatcher = dispatcher_with(store.clone(), Permissions::default());

        let unknown = call(
            &dispatcher,
            json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call",
                   "params": {"name": "format_disk", "arguments": {}}}),
        )
        .await;
        assert_eq!(unknown.error_info().unwrap().message, "Unknown tool: format_disk");

        let missing_path = call(
            &dispatcher,
            json!({"jsonrpc": "2.0", "id": 5, "method": "tools/call",
                   "params": {"name": "read_note"}}),
        )
        .await;
        assert_eq!(missing_path.error_info().unwrap().code, error_codes::TOOL_ERROR);
        assert!(missing_path.error_info().unwrap().message.starts_with("Invalid arguments"));
        assert_eq!(store.touched(), 0);
    }

    #[tokio::test]
    async fn test_notification_without_id_yields_nothing() {
        let store = Arc::new(CountingStore::default());
        let dispatcher = dispatcher_with(store, Permissions::default());

        let reply = dispatcher
            .handle_request(r#"{"jsonrpc":"2.0","method":"notifications/progress","params":{"progress":1}}"#)
            .await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_panicking_tool_is_internal_error() {
        let registry = ToolRegistry::new(Arc::new(PanickingStore), Permissions::default());
        let dispatcher = Dispatcher::new(registry, 1);

        let response = call(
            &dispatcher,
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call",
                   "params": {"name": "read_note", "arguments": {"path": "boom.md"}}}),
        )
        .await;
        let error = response.error_info().expect("error response");
        assert_eq!(error.code, error_codes::INTERNAL_ERROR);
        assert_eq!(error.message, "Internal error: disk on fire");

        // The concurrency permit was released and later requests still work
        let ping = call(&dispatcher, json!({"jsonrpc": "2.0", "id": 2, "method": "ping"})).await;
        assert_eq!(
            serde_json::to_string(&ping).unwrap(),
            r#"{"jsonrpc":"2.0","id":2,"result":{}}"#
        );
        let listed = call(
            &dispatcher,
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
                   "params": {"name": "list_notes", "arguments": {}}}),
        )
        .await;
        assert!(listed.result().is_some());
    }
}
