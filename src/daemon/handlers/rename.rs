//! `rename`: `textDocument/rename`, apply the edit to disk, then resync the
//! server's view of any touched files.
//!
//! Grounded on `leta/daemon/handlers/rename.py`: close mirrored documents
//! for files being renamed before notifying the server, notify via
//! `didChangeWatchedFiles`, then reopen.

use lsp_types::request::Rename as RenameRequest;
use lsp_types::{
    FileChangeType, FileEvent, Position, RenameParams as LspRenameParams, TextDocumentIdentifier,
    TextDocumentPositionParams, WorkDoneProgressParams,
};

use crate::daemon::edit::apply_workspace_edit;
use crate::daemon::handlers::proxies::parse_uri;
use crate::daemon::index::HandlerContext;
use crate::daemon::rpc::{RenameParams, RenameResult};
use crate::error::DaemonError;

/// # Errors
///
/// Propagates workspace/LSP failures. A server that returns no edit
/// produces an empty `files_changed` list rather than an error.
pub async fn handle_rename(ctx: &HandlerContext, params: &RenameParams) -> Result<RenameResult, DaemonError> {
    let (workspace, doc, path) = ctx.get_workspace_and_document(&params.path, &params.workspace_root).await?;
    let client = workspace.client().await.ok_or_else(|| DaemonError::Internal(anyhow::anyhow!("no client")))?;
    let (line, column) = ctx.parse_position(params.line, params.column);

    let uri = parse_uri(&doc.uri)?;
    let edit = client
        .request::<RenameRequest>(LspRenameParams {
            text_document_position: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri },
                position: Position { line, character: column },
            },
            new_name: params.new_name.clone(),
            work_done_progress_params: WorkDoneProgressParams::default(),
        })
        .await?;

    let Some(edit) = edit else {
        return Ok(RenameResult { files_changed: Vec::new() });
    };

    let (files_modified, renamed_files) = apply_workspace_edit(&edit, &params.workspace_root)?;

    for (old_path, _) in &renamed_files {
        workspace.close_document(old_path).await.ok();
    }
    let _ = path;

    let mut changes = Vec::new();
    for (old_path, new_path) in &renamed_files {
        changes.push(FileEvent {
            uri: crate::lsp::uri::path_to_uri(old_path).map_err(anyhow::Error::from)?,
            typ: FileChangeType::DELETED,
        });
        changes.push(FileEvent {
            uri: crate::lsp::uri::path_to_uri(new_path).map_err(anyhow::Error::from)?,
            typ: FileChangeType::CREATED,
        });
    }
    let renamed_new: std::collections::HashSet<_> = renamed_files.iter().map(|(_, new)| new.clone()).collect();
    for rel in &files_modified {
        let abs = params.workspace_root.join(rel);
        if !renamed_new.contains(&abs) {
            changes.push(FileEvent {
                uri: crate::lsp::uri::path_to_uri(&abs).map_err(anyhow::Error::from)?,
                typ: FileChangeType::CHANGED,
            });
        }
    }

    if !changes.is_empty() {
        client
            .notify("workspace/didChangeWatchedFiles", &serde_json::json!({"changes": changes}))
            .await?;
    }

    for (_, new_path) in &renamed_files {
        workspace.ensure_document_open(new_path).await.ok();
    }
    for rel in &files_modified {
        let abs = params.workspace_root.join(rel);
        if !renamed_new.contains(&abs) {
            workspace.ensure_document_open(&abs).await.ok();
        }
    }

    Ok(RenameResult { files_changed: files_modified })
}
