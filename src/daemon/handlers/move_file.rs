//! `move-file`: ask the server to compute the import-fixup edit for a file
//! move via `workspace/willRenameFiles`, then perform the move on disk.
//!
//! Grounded on `leta/daemon/handlers/move_file.py`: pre-check
//! source-exists/dest-missing, pre-index sibling source files so the server
//! has seen them before the rename lands, `willRenameFiles` with a
//! method-not-found fallback to "not supported", then the same
//! apply-and-move step `rename.py` uses.

use std::time::Duration;

use lsp_types::request::WillRenameFiles;
use lsp_types::{FileRename, RenameFilesParams};

use crate::daemon::edit::{apply_workspace_edit, dedup_preserve_order};
use crate::daemon::index::HandlerContext;
use crate::daemon::rpc::{MoveFileParams, MoveFileResult};
use crate::error::DaemonError;
use crate::lsp::client::LspResponseError;
use crate::lsp::uri::path_to_uri;

const PRE_INDEX_SETTLE: Duration = Duration::from_millis(500);

/// # Errors
///
/// `DaemonError::Validation` if the source is missing or the destination
/// already exists. `DaemonError::MethodNotSupported` if the server doesn't
/// advertise `workspace.fileOperations.willRename`, or if the request comes
/// back method-not-found.
pub async fn handle_move_file(ctx: &HandlerContext, params: &MoveFileParams) -> Result<MoveFileResult, DaemonError> {
    let old_abs = params.workspace_root.join(&params.old_path);
    let new_abs = params.workspace_root.join(&params.new_path);

    if !old_abs.exists() {
        return Err(DaemonError::Validation(format!("source file does not exist: {}", params.old_path.display())));
    }
    if new_abs.exists() {
        return Err(DaemonError::Validation(format!("destination already exists: {}", params.new_path.display())));
    }

    let workspace = ctx.session.get_or_create_workspace(&old_abs, &params.workspace_root).await?;
    let client = workspace.client().await.ok_or_else(|| DaemonError::Internal(anyhow::anyhow!("no client")))?;

    let caps = client.capabilities().await;
    let supports_will_rename = caps
        .workspace
        .as_ref()
        .and_then(|w| w.file_operations.as_ref())
        .and_then(|ops| ops.will_rename.as_ref())
        .is_some();
    if !supports_will_rename {
        return Err(DaemonError::MethodNotSupported {
            method: "workspace/willRenameFiles".to_string(),
            server: workspace.server_config.name.to_string(),
        });
    }

    if old_abs.extension().and_then(|e| e.to_str()) == Some("py") {
        for entry in ctx.find_all_source_files(&params.workspace_root) {
            if entry.extension().and_then(|e| e.to_str()) == Some("py") && entry != old_abs {
                workspace.ensure_document_open(&entry).await.ok();
            }
        }
        tokio::time::sleep(PRE_INDEX_SETTLE).await;
    }

    let old_uri = path_to_uri(&old_abs).map_err(DaemonError::Internal)?;
    let new_uri = path_to_uri(&new_abs).map_err(DaemonError::Internal)?;

    let edit = match client
        .request::<WillRenameFiles>(RenameFilesParams {
            files: vec![FileRename {
                old_uri: old_uri.as_str().to_string(),
                new_uri: new_uri.as_str().to_string(),
            }],
        })
        .await
    {
        Ok(edit) => edit,
        Err(e) => {
            if e.downcast_ref::<LspResponseError>().is_some_and(LspResponseError::is_method_not_found) {
                return Err(DaemonError::MethodNotSupported {
                    method: "workspace/willRenameFiles".to_string(),
                    server: workspace.server_config.name.to_string(),
                });
            }
            return Err(DaemonError::Internal(e));
        }
    };

    let mut files_changed = Vec::new();
    let mut already_moved = false;

    if let Some(edit) = &edit {
        let (modified, renamed) = apply_workspace_edit(edit, &params.workspace_root)?;
        files_changed.extend(modified);
        already_moved = renamed.iter().any(|(old, new)| old == &old_abs && new == &new_abs);
    }

    if !already_moved {
        if let Some(parent) = new_abs.parent() {
            std::fs::create_dir_all(parent).map_err(DaemonError::Io)?;
        }
        std::fs::rename(&old_abs, &new_abs).map_err(DaemonError::Io)?;
        files_changed.push(ctx.relative_path(&new_abs, &params.workspace_root));
    }

    workspace.close_document(&old_abs).await.ok();
    workspace.ensure_document_open(&new_abs).await.ok();

    let imports_updated = edit.is_some_and(|e| e.changes.is_some_and(|c| !c.is_empty()) || e.document_changes.is_some());

    Ok(MoveFileResult {
        files_changed: dedup_preserve_order(files_changed),
        imports_updated,
    })
}
