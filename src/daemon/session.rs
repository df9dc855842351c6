//! The root -> server -> `Workspace` map and the per-workspace LSP child
//! lifecycle (spawn, document mirror, shutdown).
//!
//! Grounded on `leta/daemon/session.py`: `Workspace.start_server`'s
//! try/except-into-`LanguageServerStartupError` shape, `ensure_document_open`'s
//! close-and-reopen-on-stale-content rule and its ruby-lsp queue-drain
//! workaround, and `ensure_workspace_indexed`'s clangd-only pre-index sweep.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use lsp_types::request::DocumentSymbolRequest;
use lsp_types::{DocumentSymbolParams, PartialResultParams, TextDocumentIdentifier, WorkDoneProgressParams};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::DaemonError;
use crate::lsp::uri::path_to_uri;
use crate::lsp::LspClient;
use crate::servers::registry::{extended_path, get_server_for_file, get_server_for_language, ServerConfig};
use crate::text::language_id;

#[derive(Debug, Clone)]
pub struct OpenDocument {
    pub uri: String,
    pub version: i32,
    pub content: String,
    pub language_id: String,
}

struct WorkspaceInner {
    client: Option<Arc<LspClient>>,
    open_documents: HashMap<String, OpenDocument>,
}

/// One language server child dedicated to one workspace root.
pub struct Workspace {
    pub root: PathBuf,
    pub server_config: &'static ServerConfig,
    inner: Mutex<WorkspaceInner>,
}

const CLANGD_SOURCE_EXTENSIONS: &[&str] = &["c", "h", "cpp", "hpp", "cc", "cxx", "hxx"];
const CLANGD_EXCLUDED_DIRS: &[&str] = &["build", ".git", "node_modules"];

impl Workspace {
    fn new(root: PathBuf, server_config: &'static ServerConfig) -> Self {
        Self {
            root,
            server_config,
            inner: Mutex::new(WorkspaceInner {
                client: None,
                open_documents: HashMap::new(),
            }),
        }
    }

    pub async fn client(&self) -> Option<Arc<LspClient>> {
        self.inner.lock().await.client.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.client.is_some()
    }

    pub async fn open_document_uris(&self) -> Vec<String> {
        self.inner.lock().await.open_documents.keys().cloned().collect()
    }

    fn init_options(&self) -> serde_json::Value {
        if self.server_config.name == "gopls" {
            serde_json::json!({"linksInHover": false})
        } else {
            serde_json::json!({})
        }
    }

    /// Spawn the server child and run the initialize handshake, if not
    /// already running.
    ///
    /// # Errors
    ///
    /// Returns `DaemonError::LanguageServerNotFound` if the binary is
    /// missing, or `DaemonError::LanguageServerStartup` if the handshake
    /// fails (with the server's recent stderr attached).
    pub async fn start_server(&self, log_dir: &Path) -> Result<(), DaemonError> {
        let mut inner = self.inner.lock().await;
        if inner.client.is_some() {
            return Ok(());
        }

        tracing::info!("starting {} for {}", self.server_config.name, self.root.display());

        if which::which_in(self.server_config.command[0], Some(extended_path()), ".").is_err() {
            return Err(DaemonError::LanguageServerNotFound {
                language: self.server_config.languages.join(", "),
                install_hint: self.server_config.install_cmd.map(str::to_string),
            });
        }

        std::fs::create_dir_all(log_dir).map_err(DaemonError::Io)?;
        let log_path = log_dir.join(format!("{}.log", self.server_config.name));
        let stderr_log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(DaemonError::Io)?;

        let command: Vec<String> = self.server_config.command.iter().map(|s| (*s).to_string()).collect();
        let init_options = Some(self.init_options());

        let client = match LspClient::spawn(
            self.server_config.name,
            &command,
            &self.root,
            init_options,
            &extended_path(),
            stderr_log,
        )
        .await
        {
            Ok(client) => client,
            Err(e) => {
                let log_tail = std::fs::read_to_string(&log_path)
                    .ok()
                    .map(|content| {
                        content
                            .lines()
                            .rev()
                            .take(30)
                            .collect::<Vec<_>>()
                            .into_iter()
                            .rev()
                            .collect::<Vec<_>>()
                            .join("\n")
                    })
                    .unwrap_or_default();
                return Err(DaemonError::LanguageServerStartup {
                    server: self.server_config.name.to_string(),
                    language: self.server_config.languages.join(", "),
                    root: self.root.clone(),
                    cause: e.to_string(),
                    log_tail,
                    log_path,
                    known_solution: self.server_config.install_cmd.map(str::to_string),
                });
            }
        };

        let client = Arc::new(client);
        inner.client = Some(Arc::clone(&client));
        drop(inner);

        client.wait_for_indexing(Duration::from_secs(60)).await;
        self.ensure_workspace_indexed().await;

        tracing::info!("server {} initialized and ready", self.server_config.name);
        Ok(())
    }

    pub async fn stop_server(&self) {
        let mut inner = self.inner.lock().await;
        let Some(client) = inner.client.take() else {
            return;
        };
        tracing::info!("stopping {}", self.server_config.name);
        client.shutdown().await;
        inner.open_documents.clear();
    }

    pub async fn close_document(&self, path: &Path) -> anyhow::Result<()> {
        let uri = path_to_uri(path)?;
        let mut inner = self.inner.lock().await;
        if inner.open_documents.remove(uri.as_str()).is_none() {
            return Ok(());
        }
        if let Some(client) = inner.client.clone() {
            drop(inner);
            client
                .notify(
                    "textDocument/didClose",
                    &serde_json::json!({"textDocument": {"uri": uri.as_str()}}),
                )
                .await?;
        }
        Ok(())
    }

    pub async fn close_all_documents(&self) {
        let mut inner = self.inner.lock().await;
        let Some(client) = inner.client.clone() else {
            return;
        };
        let uris: Vec<String> = inner.open_documents.keys().cloned().collect();
        for uri in uris {
            if let Err(e) = client
                .notify(
                    "textDocument/didClose",
                    &serde_json::json!({"textDocument": {"uri": uri}}),
                )
                .await
            {
                tracing::warn!("didClose failed for {uri}: {e}");
            }
        }
        inner.open_documents.clear();
    }

    /// Open-and-close every source file under the root once, to force
    /// clangd (which indexes lazily) to build its index up front.
    async fn ensure_workspace_indexed(&self) {
        if self.server_config.name != "clangd" {
            return;
        }
        if self.inner.lock().await.client.is_none() {
            return;
        }

        let mut files_to_index = Vec::new();
        for entry in walkdir_skip_excluded(&self.root) {
            if let Some(ext) = entry.extension().and_then(|e| e.to_str()) {
                if CLANGD_SOURCE_EXTENSIONS.contains(&ext) {
                    files_to_index.push(entry);
                }
            }
        }
        if files_to_index.is_empty() {
            return;
        }

        tracing::info!("pre-indexing {} files for clangd", files_to_index.len());
        for file in &files_to_index {
            if let Err(e) = self.ensure_document_open(file).await {
                tracing::warn!("pre-index open failed for {}: {e}", file.display());
            }
        }

        if let Some(client) = self.inner.lock().await.client.clone() {
            client.wait_for_indexing(Duration::from_secs(30)).await;
        }

        let remaining = self.inner.lock().await.open_documents.len();
        tracing::info!("pre-indexing complete, closing {remaining} documents");
        self.close_all_documents().await;
    }

    /// Open `path`, reusing the existing mirror if its content is
    /// unchanged; otherwise close-and-reopen to force a full resync.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or no client is running.
    pub async fn ensure_document_open(&self, path: &Path) -> anyhow::Result<OpenDocument> {
        let uri = path_to_uri(path)?;
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        {
            let inner = self.inner.lock().await;
            if let Some(doc) = inner.open_documents.get(uri.as_str()) {
                if doc.content == content {
                    return Ok(doc.clone());
                }
                drop(inner);
                self.close_document(path).await?;
            }
        }

        let lang_id = language_id(path);
        let doc = OpenDocument {
            uri: uri.as_str().to_string(),
            version: 1,
            content: content.clone(),
            language_id: lang_id.clone(),
        };

        let mut inner = self.inner.lock().await;
        inner.open_documents.insert(doc.uri.clone(), doc.clone());
        let client = inner
            .client
            .clone()
            .context("no LSP client running for this workspace")?;
        drop(inner);

        client
            .notify(
                "textDocument/didOpen",
                &serde_json::json!({
                    "textDocument": {
                        "uri": doc.uri,
                        "languageId": doc.language_id,
                        "version": doc.version,
                        "text": content,
                    }
                }),
            )
            .await?;

        if self.server_config.name == "ruby-lsp" {
            let params = DocumentSymbolParams {
                text_document: TextDocumentIdentifier { uri: uri.clone() },
                work_done_progress_params: WorkDoneProgressParams::default(),
                partial_result_params: PartialResultParams::default(),
            };
            let _ = client
                .request_with_timeout::<DocumentSymbolRequest>(params, Duration::from_secs(10))
                .await;
        }

        Ok(doc)
    }
}

fn walkdir_skip_excluded(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if CLANGD_EXCLUDED_DIRS.contains(&name.as_ref()) {
                continue;
            }
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out
}

/// Nested `root -> server name -> Workspace` map, one per daemon process.
pub struct Session {
    workspaces: Mutex<HashMap<PathBuf, HashMap<&'static str, Arc<Workspace>>>>,
    pub config: Mutex<Config>,
    log_dir: PathBuf,
}

impl Session {
    #[must_use]
    pub fn new(config: Config, log_dir: PathBuf) -> Self {
        Self {
            workspaces: Mutex::new(HashMap::new()),
            config: Mutex::new(config),
            log_dir,
        }
    }

    pub async fn get_or_create_workspace(
        &self,
        file_path: &Path,
        workspace_root: &Path,
    ) -> Result<Arc<Workspace>, DaemonError> {
        let root = workspace_root.canonicalize().unwrap_or_else(|_| workspace_root.to_path_buf());
        let config = self.config.lock().await.clone();
        let server_config = get_server_for_file(file_path, Some(&config)).ok_or_else(|| {
            DaemonError::Validation(format!("no language server found for {}", file_path.display()))
        })?;
        self.get_or_create_for_server(&root, server_config).await
    }

    pub async fn get_or_create_workspace_for_language(
        &self,
        language: &str,
        workspace_root: &Path,
    ) -> Result<Option<Arc<Workspace>>, DaemonError> {
        let root = workspace_root.canonicalize().unwrap_or_else(|_| workspace_root.to_path_buf());
        let config = self.config.lock().await.clone();
        let Some(server_config) = get_server_for_language(language, Some(&config)) else {
            return Ok(None);
        };
        self.get_or_create_for_server(&root, server_config).await.map(Some)
    }

    async fn get_or_create_for_server(
        &self,
        root: &Path,
        server_config: &'static ServerConfig,
    ) -> Result<Arc<Workspace>, DaemonError> {
        {
            let workspaces = self.workspaces.lock().await;
            if let Some(servers) = workspaces.get(root) {
                if let Some(workspace) = servers.get(server_config.name) {
                    let workspace = Arc::clone(workspace);
                    if !workspace.is_running().await {
                        workspace.start_server(&self.log_dir).await?;
                    }
                    return Ok(workspace);
                }
            }
        }

        let workspace = Arc::new(Workspace::new(root.to_path_buf(), server_config));
        workspace.start_server(&self.log_dir).await?;

        let mut workspaces = self.workspaces.lock().await;
        workspaces
            .entry(root.to_path_buf())
            .or_default()
            .insert(server_config.name, Arc::clone(&workspace));

        Ok(workspace)
    }

    pub async fn get_workspaces_for_root(&self, root: &Path) -> Vec<Arc<Workspace>> {
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let workspaces = self.workspaces.lock().await;
        workspaces
            .get(&root)
            .map(|servers| servers.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn get_any_workspace_for_root(&self, root: &Path) -> Option<Arc<Workspace>> {
        self.get_workspaces_for_root(root).await.into_iter().next()
    }

    pub async fn close_workspace(&self, root: &Path) {
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let servers = self.workspaces.lock().await.remove(&root);
        if let Some(servers) = servers {
            for workspace in servers.into_values() {
                workspace.stop_server().await;
            }
        }
    }

    pub async fn close_all(&self) {
        let mut workspaces = self.workspaces.lock().await;
        for servers in workspaces.values() {
            for workspace in servers.values() {
                workspace.stop_server().await;
            }
        }
        workspaces.clear();
    }

    pub async fn get_workspace_for_file(&self, file_path: &Path) -> Option<Arc<Workspace>> {
        let file_path = file_path.canonicalize().unwrap_or_else(|_| file_path.to_path_buf());
        let lang_id = language_id(&file_path);
        let config = self.config.lock().await.clone();
        let server_config = get_server_for_language(&lang_id, Some(&config));

        let workspaces = self.workspaces.lock().await;
        for (root, servers) in &*workspaces {
            if !file_path.starts_with(root) {
                continue;
            }
            if let Some(server_config) = server_config {
                if let Some(workspace) = servers.get(server_config.name) {
                    return Some(Arc::clone(workspace));
                }
            }
            if let Some(workspace) = servers.values().next() {
                return Some(Arc::clone(workspace));
            }
        }
        None
    }

    pub async fn describe(&self) -> serde_json::Value {
        let workspaces = self.workspaces.lock().await;
        let mut out = Vec::new();
        for (root, servers) in &*workspaces {
            for (server_name, workspace) in servers {
                let running = workspace.is_running().await;
                out.push(serde_json::json!({
                    "root": root.display().to_string(),
                    "server": server_name,
                    "open_documents": workspace.open_document_uris().await,
                    "running": running,
                }));
            }
        }
        serde_json::json!({"workspaces": out})
    }
}
