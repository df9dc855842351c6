//! `textDocument/declaration`, `/references`, `/implementations`: the three
//! handlers that are a straight capability-gated proxy to one LSP request.
//!
//! Grounded on `leta/daemon/handlers/declaration.py` and
//! `implementations.py` (identical shape, just a different method name and
//! capability field).

use lsp_types::request::{GotoDeclaration, GotoImplementation, References};
use lsp_types::{
    GotoDeclarationParams, GotoImplementationParams, PartialResultParams, Position, ReferenceContext,
    ReferenceParams, TextDocumentIdentifier, TextDocumentPositionParams, WorkDoneProgressParams,
};

use anyhow::Context as _;

use crate::daemon::index::HandlerContext;
use crate::daemon::rpc::{LocationsResult, PositionQueryParams};
use crate::error::DaemonError;

pub(crate) fn parse_uri(uri: &str) -> Result<lsp_types::Uri, DaemonError> {
    uri.parse().context("invalid document uri").map_err(DaemonError::from)
}

fn position_params(uri: lsp_types::Uri, line: u32, column: u32) -> TextDocumentPositionParams {
    TextDocumentPositionParams {
        text_document: TextDocumentIdentifier { uri },
        position: Position { line, character: column },
    }
}

/// # Errors
///
/// `DaemonError::MethodNotSupported` if the server has no declaration
/// provider; otherwise propagates workspace/LSP failures.
pub async fn handle_declaration(
    ctx: &HandlerContext,
    params: &PositionQueryParams,
) -> Result<LocationsResult, DaemonError> {
    let (workspace, doc, _) = ctx.get_workspace_and_document(&params.path, &params.workspace_root).await?;
    let client = workspace.client().await.ok_or_else(|| DaemonError::Internal(anyhow::anyhow!("no client")))?;
    let (line, column) = ctx.parse_position(params.line, params.column);

    if client.capabilities().await.declaration_provider.is_none() {
        return Err(DaemonError::MethodNotSupported {
            method: "textDocument/declaration".to_string(),
            server: workspace.server_config.name.to_string(),
        });
    }

    let request_params = GotoDeclarationParams {
        text_document_position_params: position_params(parse_uri(&doc.uri)?, line, column),
        work_done_progress_params: WorkDoneProgressParams::default(),
        partial_result_params: PartialResultParams::default(),
    };
    let result = client.request::<GotoDeclaration>(request_params).await?;
    let locations = result
        .map(|r| ctx.format_locations(&r, &workspace.root, params.context as usize))
        .unwrap_or_default();
    Ok(LocationsResult { locations })
}

/// # Errors
///
/// Propagates workspace/LSP failures; a missing reference provider is
/// surfaced by the server returning no results rather than raising, per
/// upstream (`references` does not capability-gate).
pub async fn handle_references(
    ctx: &HandlerContext,
    params: &PositionQueryParams,
    include_declaration: bool,
) -> Result<LocationsResult, DaemonError> {
    let (workspace, doc, _) = ctx.get_workspace_and_document(&params.path, &params.workspace_root).await?;
    let client = workspace.client().await.ok_or_else(|| DaemonError::Internal(anyhow::anyhow!("no client")))?;
    let (line, column) = ctx.parse_position(params.line, params.column);

    let request_params = ReferenceParams {
        text_document_position: position_params(parse_uri(&doc.uri)?, line, column),
        work_done_progress_params: WorkDoneProgressParams::default(),
        partial_result_params: PartialResultParams::default(),
        context: ReferenceContext { include_declaration },
    };
    let result = client.request::<References>(request_params).await?;
    let locations = result
        .map(|r| ctx.format_reference_locations(&r, &workspace.root, params.context as usize))
        .unwrap_or_default();
    Ok(LocationsResult { locations })
}

/// # Errors
///
/// `DaemonError::MethodNotSupported` if the server has no implementation
/// provider (common for license-gated servers); otherwise propagates
/// workspace/LSP failures.
pub async fn handle_implementations(
    ctx: &HandlerContext,
    params: &PositionQueryParams,
) -> Result<LocationsResult, DaemonError> {
    let (workspace, doc, _) = ctx.get_workspace_and_document(&params.path, &params.workspace_root).await?;
    let client = workspace.client().await.ok_or_else(|| DaemonError::Internal(anyhow::anyhow!("no client")))?;
    let (line, column) = ctx.parse_position(params.line, params.column);

    if client.capabilities().await.implementation_provider.is_none() {
        return Err(DaemonError::MethodNotSupported {
            method: "textDocument/implementation".to_string(),
            server: workspace.server_config.name.to_string(),
        });
    }

    let request_params = GotoImplementationParams {
        text_document_position_params: position_params(parse_uri(&doc.uri)?, line, column),
        work_done_progress_params: WorkDoneProgressParams::default(),
        partial_result_params: PartialResultParams::default(),
    };
    let result = client.request::<GotoImplementation>(request_params).await?;
    let locations = result
        .map(|r| ctx.format_locations(&r, &workspace.root, params.context as usize))
        .unwrap_or_default();
    Ok(LocationsResult { locations })
}
