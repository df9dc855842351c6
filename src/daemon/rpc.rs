//! Typed request/result pairs for every method the dispatcher exposes.
//!
//! `leta/daemon/rpc.py` (the upstream module these mirror) wasn't part of
//! the retrieval pack; these shapes are reconstructed from the handler call
//! sites in `lspcmd/daemon/handlers/*.py` and `leta/daemon/handlers/*.py`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::daemon::index::{LocationDict, SymbolDict};

fn default_head() -> u32 {
    200
}

fn default_max_depth() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShowParams {
    pub workspace_root: PathBuf,
    pub path: Option<PathBuf>,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub symbol: Option<String>,
    #[serde(default)]
    pub context: u32,
    #[serde(default)]
    pub body: bool,
    #[serde(default)]
    pub direct_location: bool,
    pub range_start_line: Option<u32>,
    pub range_end_line: Option<u32>,
    #[serde(default = "default_head")]
    pub head: u32,
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ShowResult {
    Locations(Vec<LocationDict>),
    Body {
        path: String,
        start_line: u32,
        end_line: u32,
        content: String,
        truncated: bool,
        total_lines: u32,
        head: u32,
        symbol: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct PositionQueryParams {
    pub workspace_root: PathBuf,
    pub path: PathBuf,
    pub line: u32,
    pub column: u32,
    #[serde(default)]
    pub context: u32,
    /// Only consulted by `references`; ignored by the other handlers that
    /// share this params shape.
    #[serde(default)]
    pub include_declaration: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LocationsResult {
    pub locations: Vec<LocationDict>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GrepParams {
    pub workspace_root: PathBuf,
    pub pattern: String,
    pub kinds: Option<Vec<String>>,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub include_docs: bool,
    pub paths: Option<Vec<PathBuf>>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GrepResult {
    pub symbols: Vec<SymbolDict>,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilesParams {
    pub workspace_root: PathBuf,
    pub subpath: Option<PathBuf>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub include_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub path: String,
    pub is_dir: bool,
    pub size_bytes: Option<u64>,
    pub line_count: Option<u64>,
    pub symbol_counts: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilesResult {
    pub entries: Vec<FileEntry>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallsMode {
    Outgoing,
    Incoming,
    Path,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallsParams {
    pub workspace_root: PathBuf,
    pub mode: CallsMode,
    pub from_path: Option<PathBuf>,
    pub from_line: Option<u32>,
    pub from_column: Option<u32>,
    pub to_path: Option<PathBuf>,
    pub to_line: Option<u32>,
    pub to_column: Option<u32>,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default)]
    pub include_non_workspace: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallNode {
    pub name: String,
    pub path: String,
    pub line: u32,
    pub column: u32,
    pub children: Vec<CallNode>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CallsResult {
    Tree(Vec<CallNode>),
    Path {
        found: bool,
        vertices: Vec<CallNode>,
        message: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenameParams {
    pub workspace_root: PathBuf,
    pub path: PathBuf,
    pub line: u32,
    pub column: u32,
    pub new_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenameResult {
    pub files_changed: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MoveFileParams {
    pub workspace_root: PathBuf,
    pub old_path: PathBuf,
    pub new_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct MoveFileResult {
    pub files_changed: Vec<String>,
    pub imports_updated: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveSymbolParams {
    pub workspace_root: PathBuf,
    pub symbol_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLspRequestParams {
    pub workspace_root: PathBuf,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    pub language: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceRootParams {
    pub workspace_root: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestartWorkspaceResult {
    pub servers_started: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoveWorkspaceResult {
    pub servers_stopped: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShutdownResult {
    pub status: &'static str,
}

impl Default for ShutdownResult {
    fn default() -> Self {
        Self { status: "shutting_down" }
    }
}
