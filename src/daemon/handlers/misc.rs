//! The small RPC methods that don't carry their own file: symbol
//! resolution, the raw LSP passthrough, workspace lifecycle, session
//! introspection, and shutdown.

use std::time::Duration;

use serde_json::Value;

use crate::daemon::index::HandlerContext;
use crate::daemon::pidfile;
use crate::daemon::resolver::{resolve, ResolveOutcome};
use crate::daemon::rpc::{
    RawLspRequestParams, RemoveWorkspaceResult, ResolveSymbolParams, RestartWorkspaceResult, ShutdownResult,
    WorkspaceRootParams,
};
use crate::error::DaemonError;
use crate::lsp::client::DEFAULT_REQUEST_TIMEOUT;

/// # Errors
///
/// Propagates the resolver's own parse errors as `DaemonError::Validation`.
pub async fn handle_resolve_symbol(ctx: &HandlerContext, params: &ResolveSymbolParams) -> Result<Value, DaemonError> {
    let symbols = ctx.collect_all_workspace_symbols(&params.workspace_root).await;
    match resolve(&params.symbol_path, &params.workspace_root, &symbols) {
        Ok(ResolveOutcome::Resolved(symbol)) => Ok(serde_json::to_value(symbol).unwrap_or(Value::Null)),
        Ok(ResolveOutcome::Ambiguous(result)) => Err(DaemonError::Ambiguous(result)),
        Ok(ResolveOutcome::NotFound(message)) => Err(DaemonError::Validation(message)),
        Err(message) => Err(DaemonError::Validation(message)),
    }
}

/// Capability-agnostic passthrough: whatever `method` the caller names is
/// sent to the server verbatim, with no gating on advertised capabilities.
///
/// # Errors
///
/// `DaemonError::Validation` if no server is configured for `language`;
/// otherwise whatever the server itself returns.
pub async fn handle_raw_lsp_request(ctx: &HandlerContext, params: &RawLspRequestParams) -> Result<Value, DaemonError> {
    let workspace = ctx
        .session
        .get_or_create_workspace_for_language(&params.language, &params.workspace_root)
        .await?
        .ok_or_else(|| DaemonError::Validation(format!("no language server configured for {}", params.language)))?;
    let client = workspace.client().await.ok_or_else(|| DaemonError::Internal(anyhow::anyhow!("no client")))?;
    client
        .raw_request(&params.method, params.params.clone(), DEFAULT_REQUEST_TIMEOUT)
        .await
        .map_err(DaemonError::Internal)
}

/// # Errors
///
/// Propagates startup failures from respawning any of the root's servers.
pub async fn handle_restart_workspace(
    ctx: &HandlerContext,
    params: &WorkspaceRootParams,
) -> Result<RestartWorkspaceResult, DaemonError> {
    let existing = ctx.session.get_workspaces_for_root(&params.workspace_root).await;
    let languages: Vec<&'static str> = existing.iter().filter_map(|w| w.server_config.languages.first().copied()).collect();

    ctx.session.close_workspace(&params.workspace_root).await;

    let mut servers_started = Vec::new();
    for language in languages {
        if let Some(workspace) = ctx
            .session
            .get_or_create_workspace_for_language(language, &params.workspace_root)
            .await?
        {
            servers_started.push(workspace.server_config.name.to_string());
        }
    }
    Ok(RestartWorkspaceResult { servers_started })
}

pub async fn handle_remove_workspace(ctx: &HandlerContext, params: &WorkspaceRootParams) -> RemoveWorkspaceResult {
    let existing = ctx.session.get_workspaces_for_root(&params.workspace_root).await;
    let servers_stopped = existing.iter().map(|w| w.server_config.name.to_string()).collect();
    ctx.session.close_workspace(&params.workspace_root).await;
    RemoveWorkspaceResult { servers_stopped }
}

pub async fn handle_describe_session(ctx: &HandlerContext, pid_path: &std::path::Path) -> Value {
    let mut result = ctx.session.describe().await;
    if let Value::Object(ref mut map) = result {
        map.insert("daemon_pid".to_string(), serde_json::json!(pidfile::read_pid(pid_path)));
        map.insert("hover_cache_entries".to_string(), serde_json::json!(ctx.hover_cache.len()));
        map.insert("symbol_cache_entries".to_string(), serde_json::json!(ctx.symbol_cache.len()));
    }
    result
}

/// Stop every workspace's server child. Callers are expected to close the
/// listening socket and exit the process shortly after this returns.
pub async fn handle_shutdown(ctx: &HandlerContext) -> ShutdownResult {
    ctx.session.close_all().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    ShutdownResult::default()
}
