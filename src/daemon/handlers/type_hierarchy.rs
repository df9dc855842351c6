//! `supertypes`/`subtypes`: prepare a type hierarchy item at a position,
//! then walk one level in the requested direction.
//!
//! Grounded on `leta/daemon/handlers/supertypes.py` (subtypes is the same
//! shape with the opposite LSP method).

use lsp_types::request::{TypeHierarchyPrepare, TypeHierarchySubtypes, TypeHierarchySupertypes};
use lsp_types::{
    PartialResultParams, Position, TextDocumentIdentifier, TextDocumentPositionParams,
    TypeHierarchyPrepareParams, TypeHierarchySubtypesParams, TypeHierarchySupertypesParams,
    WorkDoneProgressParams,
};

use crate::daemon::handlers::proxies::parse_uri;
use crate::daemon::index::HandlerContext;
use crate::daemon::rpc::{LocationsResult, PositionQueryParams};
use crate::error::DaemonError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Supertypes,
    Subtypes,
}

/// # Errors
///
/// `DaemonError::MethodNotSupported` if the server lacks a type hierarchy
/// provider, or if `prepareTypeHierarchy`/the directional request comes
/// back as method-not-found.
pub async fn handle_type_hierarchy(
    ctx: &HandlerContext,
    params: &PositionQueryParams,
    direction: Direction,
) -> Result<LocationsResult, DaemonError> {
    let (workspace, doc, _) = ctx.get_workspace_and_document(&params.path, &params.workspace_root).await?;
    let client = workspace.client().await.ok_or_else(|| DaemonError::Internal(anyhow::anyhow!("no client")))?;
    let (line, column) = ctx.parse_position(params.line, params.column);

    client.wait_for_service_ready(std::time::Duration::from_secs(30)).await;

    if client.capabilities().await.type_hierarchy_provider.is_none() {
        return Err(DaemonError::MethodNotSupported {
            method: "textDocument/prepareTypeHierarchy".to_string(),
            server: workspace.server_config.name.to_string(),
        });
    }

    let uri = parse_uri(&doc.uri)?;
    let prepare_params = TypeHierarchyPrepareParams {
        text_document_position_params: TextDocumentPositionParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
            position: Position { line, character: column },
        },
        work_done_progress_params: WorkDoneProgressParams::default(),
        partial_result_params: PartialResultParams::default(),
    };
    let prepared = client.request::<TypeHierarchyPrepare>(prepare_params).await?;
    let Some(items) = prepared else {
        return Ok(LocationsResult { locations: Vec::new() });
    };
    let Some(item) = items.into_iter().next() else {
        return Ok(LocationsResult { locations: Vec::new() });
    };

    let locations = match direction {
        Direction::Supertypes => {
            let result = client
                .request::<TypeHierarchySupertypes>(TypeHierarchySupertypesParams {
                    item,
                    work_done_progress_params: WorkDoneProgressParams::default(),
                    partial_result_params: PartialResultParams::default(),
                })
                .await?;
            result.map(|r| ctx.format_type_hierarchy_items(&r, &workspace.root, params.context as usize))
        }
        Direction::Subtypes => {
            let result = client
                .request::<TypeHierarchySubtypes>(TypeHierarchySubtypesParams {
                    item,
                    work_done_progress_params: WorkDoneProgressParams::default(),
                    partial_result_params: PartialResultParams::default(),
                })
                .await?;
            result.map(|r| ctx.format_type_hierarchy_items(&r, &workspace.root, params.context as usize))
        }
    }
    .unwrap_or_default();

    Ok(LocationsResult { locations })
}
