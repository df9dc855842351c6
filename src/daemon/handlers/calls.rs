//! `calls`: call-hierarchy expansion (outgoing/incoming trees) and
//! breadth-first path search between two symbols.
//!
//! Grounded on `leta/daemon/handlers/calls.py`: same recursive
//! expand-with-visited-set shape, same workspace-membership filter for
//! `include_non_workspace`, same BFS-over-outgoing-calls path search.

use std::collections::{HashSet, VecDeque};

use lsp_types::request::{CallHierarchyIncomingCalls, CallHierarchyOutgoingCalls, CallHierarchyPrepare};
use lsp_types::{
    CallHierarchyIncomingCallsParams, CallHierarchyItem, CallHierarchyOutgoingCallsParams,
    CallHierarchyPrepareParams, PartialResultParams, Position, TextDocumentIdentifier,
    TextDocumentPositionParams, WorkDoneProgressParams,
};

use crate::daemon::index::HandlerContext;
use crate::daemon::rpc::{CallNode, CallsMode, CallsParams, CallsResult};
use crate::daemon::session::Workspace;
use crate::error::DaemonError;
use crate::lsp::uri::uri_to_path;

const EXCLUDED_DIRS: &[&str] =
    &[".venv", "venv", "node_modules", "vendor", ".git", "__pycache__", "target", "build", "dist"];

fn is_in_workspace(uri: &lsp_types::Uri, workspace_root: &std::path::Path) -> bool {
    let Ok(file_path) = uri_to_path(uri) else { return false };
    let Ok(rel) = file_path.strip_prefix(workspace_root) else { return false };
    !rel.components().any(|c| EXCLUDED_DIRS.contains(&c.as_os_str().to_string_lossy().as_ref()))
}

fn format_item(ctx: &HandlerContext, item: &CallHierarchyItem, workspace_root: &std::path::Path) -> CallNode {
    let path = uri_to_path(&item.uri).ok();
    let (path_str, line, column) = match path {
        Some(p) => (
            ctx.relative_path(&p, workspace_root),
            item.selection_range.start.line + 1,
            item.selection_range.start.character,
        ),
        None => (item.uri.as_str().to_string(), 0, 0),
    };
    CallNode {
        name: item.name.clone(),
        path: path_str,
        line,
        column,
        children: Vec::new(),
    }
}

async fn prepare(workspace: &Workspace, path: &std::path::Path, line: u32, column: u32) -> anyhow::Result<Option<CallHierarchyItem>> {
    let doc = workspace.ensure_document_open(path).await?;
    let client = workspace.client().await.ok_or_else(|| anyhow::anyhow!("no client"))?;
    let uri: lsp_types::Uri = doc.uri.parse()?;
    let result = client
        .request::<CallHierarchyPrepare>(CallHierarchyPrepareParams {
            text_document_position_params: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri },
                position: Position { line: line.saturating_sub(1), character: column },
            },
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        })
        .await?;
    Ok(result.and_then(|mut items| if items.is_empty() { None } else { Some(items.remove(0)) }))
}

fn item_key(item: &CallHierarchyItem) -> (String, u32) {
    (item.uri.as_str().to_string(), item.selection_range.start.line)
}

async fn expand_outgoing(
    ctx: &HandlerContext,
    workspace: &Workspace,
    workspace_root: &std::path::Path,
    item: &CallHierarchyItem,
    depth: u32,
    visited: &mut HashSet<(String, u32)>,
    include_non_workspace: bool,
) -> anyhow::Result<Vec<CallNode>> {
    if depth == 0 {
        return Ok(Vec::new());
    }
    let key = item_key(item);
    if !visited.insert(key) {
        return Ok(Vec::new());
    }

    let client = workspace.client().await.ok_or_else(|| anyhow::anyhow!("no client"))?;
    let result = client
        .request::<CallHierarchyOutgoingCalls>(CallHierarchyOutgoingCallsParams {
            item: item.clone(),
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        })
        .await?;
    let Some(calls) = result else { return Ok(Vec::new()) };

    let mut out = Vec::new();
    for call in calls {
        if !include_non_workspace && !is_in_workspace(&call.to.uri, workspace_root) {
            continue;
        }
        let mut node = format_item(ctx, &call.to, workspace_root);
        node.children = Box::pin(expand_outgoing(ctx, workspace, workspace_root, &call.to, depth - 1, visited, include_non_workspace)).await?;
        out.push(node);
    }
    Ok(out)
}

async fn expand_incoming(
    ctx: &HandlerContext,
    workspace: &Workspace,
    workspace_root: &std::path::Path,
    item: &CallHierarchyItem,
    depth: u32,
    visited: &mut HashSet<(String, u32)>,
    include_non_workspace: bool,
) -> anyhow::Result<Vec<CallNode>> {
    if depth == 0 {
        return Ok(Vec::new());
    }
    let key = item_key(item);
    if !visited.insert(key) {
        return Ok(Vec::new());
    }

    let client = workspace.client().await.ok_or_else(|| anyhow::anyhow!("no client"))?;
    let result = client
        .request::<CallHierarchyIncomingCalls>(CallHierarchyIncomingCallsParams {
            item: item.clone(),
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        })
        .await?;
    let Some(calls) = result else { return Ok(Vec::new()) };

    let mut out = Vec::new();
    for call in calls {
        let from_item = &call.from;
        if !include_non_workspace && !is_in_workspace(&from_item.uri, workspace_root) {
            continue;
        }
        let mut node = format_item(ctx, from_item, workspace_root);
        node.children = Box::pin(expand_incoming(ctx, workspace, workspace_root, from_item, depth - 1, visited, include_non_workspace)).await?;
        out.push(node);
    }
    Ok(out)
}

async fn bfs_call_path(
    workspace: &Workspace,
    workspace_root: &std::path::Path,
    start: &CallHierarchyItem,
    target: &(String, u32),
    max_depth: u32,
    include_non_workspace: bool,
) -> anyhow::Result<Option<Vec<CallHierarchyItem>>> {
    let client = workspace.client().await.ok_or_else(|| anyhow::anyhow!("no client"))?;
    let mut queue = VecDeque::new();
    queue.push_back((start.clone(), vec![start.clone()], 0u32));
    let mut visited = HashSet::new();
    visited.insert(item_key(start));

    while let Some((current, path, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        let result = client
            .request::<CallHierarchyOutgoingCalls>(CallHierarchyOutgoingCallsParams {
                item: current,
                work_done_progress_params: WorkDoneProgressParams::default(),
                partial_result_params: PartialResultParams::default(),
            })
            .await;
        let Ok(Some(calls)) = result else { continue };

        for call in calls {
            if !include_non_workspace && !is_in_workspace(&call.to.uri, workspace_root) {
                continue;
            }
            let key = item_key(&call.to);
            if &key == target {
                let mut full = path.clone();
                full.push(call.to);
                return Ok(Some(full));
            }
            if visited.insert(key) {
                let mut next_path = path.clone();
                next_path.push(call.to.clone());
                queue.push_back((call.to, next_path, depth + 1));
            }
        }
    }
    Ok(None)
}

/// # Errors
///
/// Returns an error if the mode's required fields are missing, no server
/// is available, or the underlying LSP requests fail.
pub async fn handle_calls(ctx: &HandlerContext, params: &CallsParams) -> Result<CallsResult, DaemonError> {
    let workspace_root = &params.workspace_root;

    match params.mode {
        CallsMode::Outgoing => {
            let (Some(from_path), Some(from_line), Some(from_column)) = (params.from_path.as_ref(), params.from_line, params.from_column) else {
                return Err(DaemonError::Validation(
                    "from_path, from_line, and from_column are required for outgoing mode".to_string(),
                ));
            };

            let workspace = ctx.session.get_or_create_workspace(from_path, workspace_root).await?;
            let Some(item) = prepare(&workspace, from_path, from_line, from_column).await? else {
                return Ok(CallsResult::Tree(Vec::new()));
            };
            let mut root = format_item(ctx, &item, workspace_root);
            let mut visited = HashSet::new();
            root.children = expand_outgoing(ctx, &workspace, workspace_root, &item, params.max_depth, &mut visited, params.include_non_workspace).await?;
            Ok(CallsResult::Tree(vec![root]))
        }
        CallsMode::Incoming => {
            let (Some(to_path), Some(to_line), Some(to_column)) = (params.to_path.as_ref(), params.to_line, params.to_column) else {
                return Err(DaemonError::Validation(
                    "to_path, to_line, and to_column are required for incoming mode".to_string(),
                ));
            };
            let workspace = ctx.session.get_or_create_workspace(to_path, workspace_root).await?;
            let Some(item) = prepare(&workspace, to_path, to_line, to_column).await? else {
                return Ok(CallsResult::Tree(Vec::new()));
            };
            let mut root = format_item(ctx, &item, workspace_root);
            let mut visited = HashSet::new();
            root.children = expand_incoming(ctx, &workspace, workspace_root, &item, params.max_depth, &mut visited, params.include_non_workspace).await?;
            Ok(CallsResult::Tree(vec![root]))
        }
        CallsMode::Path => {
            let (Some(from_path), Some(from_line), Some(from_column), Some(to_path), Some(to_line), Some(to_column)) = (
                params.from_path.as_ref(),
                params.from_line,
                params.from_column,
                params.to_path.as_ref(),
                params.to_line,
                params.to_column,
            ) else {
                return Err(DaemonError::Validation(
                    "from_path, from_line, from_column, to_path, to_line, and to_column are required for path mode".to_string(),
                ));
            };

            let workspace = ctx.session.get_or_create_workspace(from_path, workspace_root).await?;
            let Some(from_item) = prepare(&workspace, from_path, from_line, from_column).await? else {
                return Ok(CallsResult::Path { found: false, vertices: Vec::new(), message: Some("start symbol not callable".to_string()) });
            };
            let Some(to_item) = prepare(&workspace, to_path, to_line, to_column).await? else {
                return Ok(CallsResult::Path { found: false, vertices: Vec::new(), message: Some("target symbol not callable".to_string()) });
            };
            let target = item_key(&to_item);
            let path = bfs_call_path(&workspace, workspace_root, &from_item, &target, params.max_depth, params.include_non_workspace).await?;
            match path {
                Some(items) => {
                    let vertices = items.iter().map(|i| format_item(ctx, i, workspace_root)).collect();
                    Ok(CallsResult::Path { found: true, vertices, message: None })
                }
                None => Ok(CallsResult::Path {
                    found: false,
                    vertices: Vec::new(),
                    message: Some(format!("no call path found within depth {}", params.max_depth)),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri_for(path: &std::path::Path) -> lsp_types::Uri {
        crate::lsp::uri::path_to_uri(path).unwrap()
    }

    #[test]
    fn is_in_workspace_accepts_files_under_root() {
        let root = std::path::Path::new("/tmp/ws");
        let uri = uri_for(&root.join("src/main.rs"));
        assert!(is_in_workspace(&uri, root));
    }

    #[test]
    fn is_in_workspace_rejects_files_outside_root() {
        let root = std::path::Path::new("/tmp/ws");
        let uri = uri_for(std::path::Path::new("/tmp/other/main.rs"));
        assert!(!is_in_workspace(&uri, root));
    }

    #[test]
    fn is_in_workspace_rejects_excluded_dirs() {
        let root = std::path::Path::new("/tmp/ws");
        let uri = uri_for(&root.join("node_modules/pkg/index.js"));
        assert!(!is_in_workspace(&uri, root));
    }
}
