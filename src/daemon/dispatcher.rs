//! Unix-domain-socket request dispatcher: one JSON object per connection,
//! decoded, routed to a handler, answered with one JSON response, closed.
//!
//! Grounded on `leta/daemon/server.py::DaemonServer`/`run_daemon`: the
//! lock-then-bind-then-write-pid startup sequence, the read-to-EOF
//! per-connection protocol, and SIGTERM/SIGINT-triggered graceful shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

use crate::config::{self, Config};
use crate::daemon::cache::Cache;
use crate::daemon::handlers::type_hierarchy::Direction;
use crate::daemon::handlers::{calls, files, grep, misc, move_file, proxies, rename, show, type_hierarchy};
use crate::daemon::index::HandlerContext;
use crate::daemon::pidfile::{self, DaemonLock};
use crate::daemon::rpc::{
    CallsParams, FilesParams, GrepParams, MoveFileParams, PositionQueryParams, RawLspRequestParams,
    RenameParams, ResolveSymbolParams, ShowParams, WorkspaceRootParams,
};
use crate::daemon::session::Session;
use crate::error::{DaemonError, ResponseEnvelope};

/// Owns the listening socket, the PID file, and the exclusive startup lock;
/// dropping it (after `run` returns) releases all three.
pub struct Dispatcher {
    ctx: Arc<HandlerContext>,
    pid_path: PathBuf,
    socket_path: PathBuf,
    listener: UnixListener,
    _lock: DaemonLock,
}

impl Dispatcher {
    /// Acquire the daemon lock, bind the socket, and write the PID file.
    ///
    /// # Errors
    ///
    /// Returns an error if another daemon already holds the lock, the
    /// socket can't be bound, or the caches can't be opened.
    pub fn bootstrap(config: Config) -> anyhow::Result<Self> {
        let lock_path = config::lock_path();
        let lock = DaemonLock::try_acquire(&lock_path)?
            .ok_or_else(|| anyhow::anyhow!("another leta-daemon is already running (lock held at {})", lock_path.display()))?;

        let socket_path = config::socket_path();
        if socket_path.exists() {
            std::fs::remove_file(&socket_path)?;
        }
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(&socket_path)?;

        let pid_path = config::pid_path();
        pidfile::write_pid(&pid_path, std::process::id() as i32)?;

        let cache_dir = config::cache_dir();
        let hover_cache = Cache::open(&cache_dir.join("hover.lmdb"), config.daemon.hover_cache_size)?;
        let symbol_cache = Cache::open(&cache_dir.join("symbol.lmdb"), config.daemon.symbol_cache_size)?;

        let mut config = config;
        let removed = config::cleanup_stale_workspace_roots(&mut config)?;
        for root in &removed {
            tracing::info!("dropped stale workspace root {root}");
        }

        let session = Arc::new(Session::new(config, config::log_dir()));
        let ctx = Arc::new(HandlerContext {
            session,
            hover_cache,
            symbol_cache,
        });

        Ok(Self {
            ctx,
            pid_path,
            socket_path,
            listener,
            _lock: lock,
        })
    }

    /// Accept connections until `shutdown` fires, then close every
    /// workspace and clean up the socket/PID file.
    ///
    /// # Errors
    ///
    /// Returns an error only if `accept` fails in a way other than a
    /// transient per-connection error (which is logged and ignored).
    pub async fn run(self, mut shutdown: tokio::sync::watch::Receiver<bool>) -> anyhow::Result<()> {
        tracing::info!("listening on {}", self.socket_path.display());

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => {
                            let ctx = Arc::clone(&self.ctx);
                            let pid_path = self.pid_path.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(ctx, stream, pid_path).await {
                                    tracing::warn!("connection error: {e}");
                                }
                            });
                        }
                        Err(e) => tracing::warn!("accept failed: {e}"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("shutting down");
        self.ctx.session.close_all().await;
        let _ = std::fs::remove_file(&self.socket_path);
        pidfile::remove_pid(&self.pid_path);
        Ok(())
    }
}

async fn handle_connection(ctx: Arc<HandlerContext>, mut stream: UnixStream, pid_path: PathBuf) -> anyhow::Result<()> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;

    let envelope = match serde_json::from_slice::<Value>(&buf) {
        Ok(request) => handle_request(&ctx, request, &pid_path).await,
        Err(e) => ResponseEnvelope::err(format!("invalid JSON ({} bytes read): {e}", buf.len())),
    };

    let response = serde_json::to_vec(&envelope)?;
    stream.write_all(&response).await?;
    stream.shutdown().await?;
    Ok(())
}

async fn handle_request(ctx: &HandlerContext, request: Value, pid_path: &std::path::Path) -> ResponseEnvelope {
    let Some(method) = request.get("method").and_then(Value::as_str).map(str::to_string) else {
        return ResponseEnvelope::err("request is missing a \"method\" field");
    };
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    metrics::counter!("leta_rpc_requests_total", "method" => method.clone()).increment(1);

    match dispatch(ctx, &method, params, pid_path).await {
        Ok(result) => ResponseEnvelope::Ok { result },
        Err(err) => {
            metrics::counter!("leta_rpc_errors_total", "method" => method).increment(1);
            err.into()
        }
    }
}

fn parse_params<P: serde::de::DeserializeOwned>(params: Value) -> Result<P, DaemonError> {
    serde_json::from_value(params).map_err(|e| DaemonError::Validation(format!("invalid params: {e}")))
}

fn to_value(result: impl serde::Serialize) -> Result<Value, DaemonError> {
    serde_json::to_value(result).map_err(|e| DaemonError::Internal(anyhow::anyhow!("failed to serialize result: {e}")))
}

#[allow(clippy::too_many_lines)]
async fn dispatch(ctx: &HandlerContext, method: &str, params: Value, pid_path: &std::path::Path) -> Result<Value, DaemonError> {
    match method {
        "show" => to_value(show::handle_show(ctx, &parse_params::<ShowParams>(params)?).await?),
        "declaration" => to_value(proxies::handle_declaration(ctx, &parse_params::<PositionQueryParams>(params)?).await?),
        "references" => {
            let p = parse_params::<PositionQueryParams>(params)?;
            let include_declaration = p.include_declaration;
            to_value(proxies::handle_references(ctx, &p, include_declaration).await?)
        }
        "implementations" => to_value(proxies::handle_implementations(ctx, &parse_params::<PositionQueryParams>(params)?).await?),
        "supertypes" => {
            to_value(type_hierarchy::handle_type_hierarchy(ctx, &parse_params::<PositionQueryParams>(params)?, Direction::Supertypes).await?)
        }
        "subtypes" => {
            to_value(type_hierarchy::handle_type_hierarchy(ctx, &parse_params::<PositionQueryParams>(params)?, Direction::Subtypes).await?)
        }
        "calls" => to_value(calls::handle_calls(ctx, &parse_params::<CallsParams>(params)?).await?),
        "grep" => to_value(grep::handle_grep(ctx, &parse_params::<GrepParams>(params)?).await?),
        "files" => to_value(files::handle_files(ctx, &parse_params::<FilesParams>(params)?).await?),
        "rename" => to_value(rename::handle_rename(ctx, &parse_params::<RenameParams>(params)?).await?),
        "move-file" => to_value(move_file::handle_move_file(ctx, &parse_params::<MoveFileParams>(params)?).await?),
        "resolve-symbol" => misc::handle_resolve_symbol(ctx, &parse_params::<ResolveSymbolParams>(params)?).await,
        "raw-lsp-request" => misc::handle_raw_lsp_request(ctx, &parse_params::<RawLspRequestParams>(params)?).await,
        "restart-workspace" => to_value(misc::handle_restart_workspace(ctx, &parse_params::<WorkspaceRootParams>(params)?).await?),
        "remove-workspace" => to_value(misc::handle_remove_workspace(ctx, &parse_params::<WorkspaceRootParams>(params)?).await),
        "describe-session" => Ok(misc::handle_describe_session(ctx, pid_path).await),
        "shutdown" => to_value(misc::handle_shutdown(ctx).await),
        other => Err(DaemonError::Validation(format!("Unknown method: {other}"))),
    }
}
