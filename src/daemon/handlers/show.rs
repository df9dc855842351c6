//! `show`: either a bare location (optionally with surrounding context
//! lines) or the full body of the symbol at that location.
//!
//! Grounded on `leta/daemon/handlers/show.py`'s three-way dispatch
//! (`direct_location` / `body` / plain location). Symbol-name resolution,
//! which upstream's MCP facade does in a layer above the daemon, is folded
//! in here instead since no MCP facade ships in this crate.

use std::path::PathBuf;

use lsp_types::request::{DocumentSymbolRequest, GotoDefinition};
use lsp_types::{
    DocumentSymbolParams, GotoDefinitionParams, PartialResultParams, Position,
    TextDocumentIdentifier, TextDocumentPositionParams, WorkDoneProgressParams,
};

use crate::daemon::handlers::proxies::parse_uri;
use crate::daemon::index::{expand_variable_range, find_symbol_at_line, HandlerContext};
use crate::daemon::resolver::{resolve, ResolveOutcome};
use crate::daemon::rpc::{ShowParams, ShowResult};
use crate::error::DaemonError;
use crate::text::lines_around;

struct Target {
    path: PathBuf,
    line: u32,
    column: u32,
    kind: Option<String>,
    symbol_name: Option<String>,
}

async fn resolve_target(ctx: &HandlerContext, params: &ShowParams) -> Result<Target, DaemonError> {
    if let (Some(path), Some(line)) = (&params.path, params.line) {
        return Ok(Target {
            path: path.clone(),
            line,
            column: params.column.unwrap_or(0),
            kind: params.kind.clone(),
            symbol_name: params.symbol.clone(),
        });
    }

    let Some(symbol) = &params.symbol else {
        return Err(DaemonError::Validation("show requires either path+line or symbol".to_string()));
    };

    let symbols = ctx.collect_all_workspace_symbols(&params.workspace_root).await;
    match resolve(symbol, &params.workspace_root, &symbols) {
        Ok(ResolveOutcome::Resolved(resolved)) => Ok(Target {
            path: resolved.path,
            line: resolved.line,
            column: resolved.column,
            kind: resolved.kind,
            symbol_name: Some(resolved.name),
        }),
        Ok(ResolveOutcome::Ambiguous(result)) => Err(DaemonError::Ambiguous(result)),
        Ok(ResolveOutcome::NotFound(message)) | Err(message) => Err(DaemonError::Validation(message)),
    }
}

fn body_result(rel_path: &str, lines: &[&str], start: usize, end: usize, context: u32, head: u32, symbol_name: Option<String>) -> ShowResult {
    let (mut start, mut end) = (start, end);
    if context > 0 {
        start = start.saturating_sub(context as usize);
        end = (end + context as usize).min(lines.len().saturating_sub(1));
    }

    let total_lines = end - start + 1;
    let truncated = total_lines > head as usize;
    if truncated {
        end = start + head as usize - 1;
    }

    let content = lines[start..=end.min(lines.len().saturating_sub(1))].join("\n");
    ShowResult::Body {
        path: rel_path.to_string(),
        start_line: start as u32 + 1,
        end_line: end as u32 + 1,
        content,
        truncated,
        total_lines: total_lines as u32,
        head,
        symbol: symbol_name,
    }
}

/// # Errors
///
/// `DaemonError::Ambiguous` if `symbol` matches more than one candidate,
/// `DaemonError::Validation` if neither `path+line` nor a resolvable
/// `symbol` is given.
pub async fn handle_show(ctx: &HandlerContext, params: &ShowParams) -> Result<ShowResult, DaemonError> {
    let target = resolve_target(ctx, params).await?;

    if params.direct_location {
        return handle_direct(ctx, params, &target).await;
    }
    if params.body {
        return handle_definition_body(ctx, params, &target).await;
    }
    handle_location_request(ctx, params, &target).await
}

async fn handle_direct(ctx: &HandlerContext, params: &ShowParams, target: &Target) -> Result<ShowResult, DaemonError> {
    let rel_path = ctx.relative_path(&target.path, &params.workspace_root);
    let content = std::fs::read_to_string(&target.path).map_err(DaemonError::Io)?;
    let lines: Vec<&str> = content.lines().collect();

    if params.body {
        let (start, end) = match (params.range_start_line, params.range_end_line) {
            (Some(range_start), Some(range_end)) => {
                let start = range_start.saturating_sub(1) as usize;
                let mut end = range_end.saturating_sub(1) as usize;
                if start == end && matches!(target.kind.as_deref(), Some("Constant" | "Variable")) {
                    end = expand_variable_range(&lines, start);
                }
                (start, end)
            }
            _ => {
                let (workspace, doc, _) = ctx.get_workspace_and_document(&target.path, &params.workspace_root).await?;
                match document_symbol_range(&workspace, &doc.uri, target.line.saturating_sub(1)).await {
                    Some((start, end)) => (start as usize, end as usize),
                    None => {
                        let line = target.line.saturating_sub(1) as usize;
                        (line, line)
                    }
                }
            }
        };
        return Ok(body_result(&rel_path, &lines, start, end, params.context, params.head, target.symbol_name.clone()));
    }

    let mut location = crate::daemon::index::LocationDict {
        path: rel_path,
        line: target.line,
        column: target.column,
        context_lines: None,
        context_start: None,
        name: None,
        kind: None,
        detail: None,
    };
    if params.context > 0 && target.path.exists() {
        let (ctx_lines, start, _end) = lines_around(&content, target.line.saturating_sub(1) as usize, params.context as usize);
        location.context_lines = Some(ctx_lines.into_iter().map(str::to_string).collect());
        location.context_start = Some(start as u32 + 1);
    }
    Ok(ShowResult::Locations(vec![location]))
}

async fn document_symbol_range(
    workspace: &crate::daemon::session::Workspace,
    uri: &str,
    line: u32,
) -> Option<(u32, u32)> {
    let client = workspace.client().await?;
    let uri: lsp_types::Uri = uri.parse().ok()?;
    let result = client
        .request::<DocumentSymbolRequest>(DocumentSymbolParams {
            text_document: TextDocumentIdentifier { uri },
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        })
        .await
        .ok()??;
    find_symbol_at_line(&result, line).map(|found| (found.range_start, found.range_end))
}

async fn handle_definition_body(ctx: &HandlerContext, params: &ShowParams, target: &Target) -> Result<ShowResult, DaemonError> {
    let ShowResult::Locations(locations) = handle_location_request(ctx, params, target).await? else {
        unreachable!("handle_location_request always returns Locations")
    };
    let Some(location) = locations.into_iter().next() else {
        return Err(DaemonError::Validation("Definition not found".to_string()));
    };

    let file_path = params.workspace_root.join(&location.path);
    let (workspace, doc, _) = ctx.get_workspace_and_document(&file_path, &params.workspace_root).await?;
    let content = std::fs::read_to_string(&file_path).map_err(DaemonError::Io)?;
    let lines: Vec<&str> = content.lines().collect();
    let target_line = location.line.saturating_sub(1);

    match document_symbol_range(&workspace, &doc.uri, target_line).await {
        Some((start, end)) => Ok(body_result(&location.path, &lines, start as usize, end as usize, params.context, params.head, target.symbol_name.clone())),
        None => Err(DaemonError::Validation("Language server does not provide symbol ranges".to_string())),
    }
}

async fn handle_location_request(ctx: &HandlerContext, params: &ShowParams, target: &Target) -> Result<ShowResult, DaemonError> {
    let (workspace, doc, _) = ctx.get_workspace_and_document(&target.path, &params.workspace_root).await?;
    let client = workspace.client().await.ok_or_else(|| DaemonError::Internal(anyhow::anyhow!("no client")))?;
    let (line, column) = ctx.parse_position(target.line, target.column);

    let uri = parse_uri(&doc.uri)?;
    let result = client
        .request::<GotoDefinition>(GotoDefinitionParams {
            text_document_position_params: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri },
                position: Position { line, character: column },
            },
            work_done_progress_params: WorkDoneProgressParams::default(),
            partial_result_params: PartialResultParams::default(),
        })
        .await?;

    let locations = result
        .map(|r| ctx.format_locations(&r, &workspace.root, params.context as usize))
        .unwrap_or_default();
    Ok(ShowResult::Locations(locations))
}
