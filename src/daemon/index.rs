//! Symbol flattening, file discovery, and the `HandlerContext` shared by
//! every RPC handler.
//!
//! Grounded on `lspcmd/daemon/handlers/base.py`: `HandlerContext` keeps the
//! same method names and cache-key shapes (content-hash tuples, now JSON
//! strings instead of pickled tuples), `flatten_symbols`/`find_symbol_at_line`/
//! `expand_variable_range`/`is_excluded` are direct translations.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use lsp_types::{
    DocumentSymbol, DocumentSymbolResponse, GotoDefinitionResponse, Location, LocationLink,
    SymbolInformation, SymbolKind, TypeHierarchyItem,
};
use serde::Serialize;
use serde_json::Value;

use crate::daemon::cache::{content_hash, Cache};
use crate::daemon::session::{Session, Workspace};
use crate::lsp::uri::uri_to_path;
use crate::servers::registry::get_server_for_language;
use crate::text::{language_id, lines_around};

pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &[
    ".git", "__pycache__", "node_modules", ".venv", "venv", "target", "build", "dist", ".tox",
    ".mypy_cache", ".pytest_cache", ".eggs", ".cache", ".coverage", ".hypothesis", ".nox",
    ".ruff_cache", "__pypackages__", ".pants.d", ".pyre", ".pytype", "vendor", "third_party",
    ".bundle", ".next", ".nuxt", ".svelte-kit", ".turbo", ".parcel-cache", "coverage",
    ".nyc_output", ".zig-cache",
];

pub const BINARY_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".bmp", ".ico", ".webp", ".tiff", ".tif", ".svg", ".pdf",
    ".eps", ".ps", ".zip", ".tar", ".gz", ".bz2", ".xz", ".7z", ".rar", ".exe", ".dll", ".so",
    ".dylib", ".a", ".o", ".lib", ".woff", ".woff2", ".ttf", ".otf", ".eot", ".mp3", ".mp4",
    ".wav", ".ogg", ".flac", ".avi", ".mov", ".mkv", ".webm", ".pyc", ".pyo", ".class", ".jar",
    ".war", ".ear", ".db", ".sqlite", ".sqlite3", ".bin", ".dat", ".pak", ".bundle", ".lock",
];

const SOURCE_EXTENSIONS: &[&str] = &[
    ".py", ".pyi", ".js", ".jsx", ".ts", ".tsx", ".go", ".rs", ".java", ".c", ".h", ".cpp",
    ".hpp", ".cc", ".cxx", ".rb", ".ex", ".exs", ".hs", ".ml", ".mli", ".lua", ".zig", ".php",
];

const SKIP_DIRS: &[&str] = &[
    "node_modules",
    "__pycache__",
    ".git",
    "venv",
    ".venv",
    "build",
    "dist",
    ".tox",
    ".eggs",
];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SymbolDict {
    pub name: String,
    pub kind: &'static str,
    pub path: String,
    pub line: u32,
    pub column: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_start_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_end_line: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct LocationDict {
    pub path: String,
    pub line: u32,
    pub column: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_lines: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_start: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[must_use]
pub const fn symbol_kind_name(kind: SymbolKind) -> &'static str {
    match kind {
        SymbolKind::FILE => "File",
        SymbolKind::MODULE => "Module",
        SymbolKind::NAMESPACE => "Namespace",
        SymbolKind::PACKAGE => "Package",
        SymbolKind::CLASS => "Class",
        SymbolKind::METHOD => "Method",
        SymbolKind::PROPERTY => "Property",
        SymbolKind::FIELD => "Field",
        SymbolKind::CONSTRUCTOR => "Constructor",
        SymbolKind::ENUM => "Enum",
        SymbolKind::INTERFACE => "Interface",
        SymbolKind::FUNCTION => "Function",
        SymbolKind::VARIABLE => "Variable",
        SymbolKind::CONSTANT => "Constant",
        SymbolKind::STRING => "String",
        SymbolKind::NUMBER => "Number",
        SymbolKind::BOOLEAN => "Boolean",
        SymbolKind::ARRAY => "Array",
        SymbolKind::OBJECT => "Object",
        SymbolKind::KEY => "Key",
        SymbolKind::NULL => "Null",
        SymbolKind::ENUM_MEMBER => "EnumMember",
        SymbolKind::STRUCT => "Struct",
        SymbolKind::EVENT => "Event",
        SymbolKind::OPERATOR => "Operator",
        SymbolKind::TYPE_PARAMETER => "TypeParameter",
        _ => "Unknown",
    }
}

/// Flatten a `documentSymbol` response (hierarchical `DocumentSymbol`s or a
/// flat `SymbolInformation` list) into `SymbolDict`s, one per symbol,
/// threading the enclosing symbol's name through `container`.
pub fn flatten_symbols(response: &DocumentSymbolResponse, file_path: &str, output: &mut Vec<SymbolDict>) {
    match response {
        DocumentSymbolResponse::Flat(items) => {
            for item in items {
                flatten_symbol_information(item, file_path, output);
            }
        }
        DocumentSymbolResponse::Nested(items) => {
            flatten_document_symbols(items, file_path, output, None);
        }
    }
}

fn flatten_symbol_information(item: &SymbolInformation, file_path: &str, output: &mut Vec<SymbolDict>) {
    let range = item.location.range;
    output.push(SymbolDict {
        name: item.name.clone(),
        kind: symbol_kind_name(item.kind),
        path: file_path.to_string(),
        line: range.start.line + 1,
        column: range.start.character,
        container: item.container_name.clone(),
        detail: None,
        range_start_line: Some(range.start.line + 1),
        range_end_line: Some(range.end.line + 1),
    });
}

fn flatten_document_symbols(
    items: &[DocumentSymbol],
    file_path: &str,
    output: &mut Vec<SymbolDict>,
    container: Option<&str>,
) {
    for item in items {
        output.push(SymbolDict {
            name: item.name.clone(),
            kind: symbol_kind_name(item.kind),
            path: file_path.to_string(),
            line: item.selection_range.start.line + 1,
            column: item.selection_range.start.character,
            container: container.map(str::to_string),
            detail: item.detail.clone(),
            range_start_line: Some(item.range.start.line + 1),
            range_end_line: Some(item.range.end.line + 1),
        });
        if let Some(children) = &item.children {
            flatten_document_symbols(children, file_path, output, Some(&item.name));
        }
    }
}

pub struct FoundSymbol {
    pub range_start: u32,
    pub range_end: u32,
    pub has_children: bool,
}

/// Find the innermost symbol whose range contains `line` (`DocumentSymbol`
/// case) or whose start line equals `line` (flat `SymbolInformation` case).
#[must_use]
pub fn find_symbol_at_line(response: &DocumentSymbolResponse, line: u32) -> Option<FoundSymbol> {
    match response {
        DocumentSymbolResponse::Flat(items) => items.iter().find_map(|sym| {
            let sym_line = sym.location.range.start.line;
            (sym_line == line).then(|| FoundSymbol {
                range_start: sym_line,
                range_end: sym.location.range.end.line,
                has_children: false,
            })
        }),
        DocumentSymbolResponse::Nested(items) => find_symbol_at_line_nested(items, line),
    }
}

fn find_symbol_at_line_nested(items: &[DocumentSymbol], line: u32) -> Option<FoundSymbol> {
    for sym in items {
        let start = sym.range.start.line;
        let end = sym.range.end.line;
        if start <= line && line <= end {
            if let Some(children) = &sym.children {
                if let Some(found) = find_symbol_at_line_nested(children, line) {
                    return Some(found);
                }
            }
            return Some(FoundSymbol {
                range_start: start,
                range_end: end,
                has_children: sym.children.is_some(),
            });
        }
    }
    None
}

/// Expand a single-line variable/expression range to cover a multi-line
/// definition, by balancing brackets/parens/braces and triple-quoted
/// strings forward from `start_line`.
#[must_use]
pub fn expand_variable_range(lines: &[&str], start_line: usize) -> usize {
    let Some(first_line) = lines.get(start_line) else {
        return start_line;
    };

    let mut open_parens = count_diff(first_line, '(', ')');
    let mut open_brackets = count_diff(first_line, '[', ']');
    let mut open_braces = count_diff(first_line, '{', '}');
    let mut in_multiline_string =
        first_line.matches("\"\"\"").count() % 2 == 1 || first_line.matches("'''").count() % 2 == 1;

    if open_parens == 0 && open_brackets == 0 && open_braces == 0 && !in_multiline_string {
        return start_line;
    }

    for (offset, line) in lines.iter().enumerate().skip(start_line + 1) {
        if in_multiline_string {
            if line.contains("\"\"\"") || line.contains("'''") {
                in_multiline_string = false;
                if open_parens <= 0 && open_brackets <= 0 && open_braces <= 0 {
                    return offset;
                }
            }
            continue;
        }

        open_parens += count_diff(line, '(', ')');
        open_brackets += count_diff(line, '[', ']');
        open_braces += count_diff(line, '{', '}');

        if line.matches("\"\"\"").count() % 2 == 1 || line.matches("'''").count() % 2 == 1 {
            in_multiline_string = true;
            continue;
        }

        if open_parens <= 0 && open_brackets <= 0 && open_braces <= 0 {
            return offset;
        }
    }

    start_line
}

fn count_diff(line: &str, open: char, close: char) -> i32 {
    i32::try_from(line.matches(open).count()).unwrap_or(i32::MAX)
        - i32::try_from(line.matches(close).count()).unwrap_or(i32::MAX)
}

/// Whether `rel_path` matches any of `exclude_patterns`, checked by full
/// glob match, by directory-component match (for bare names), and by
/// basename match, mirroring `fnmatch`'s three checks in the original.
#[must_use]
pub fn is_excluded(rel_path: &str, exclude_patterns: &[String]) -> bool {
    let path = Path::new(rel_path);
    let parts: Vec<&str> = path.iter().filter_map(|c| c.to_str()).collect();
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or(rel_path);

    for pat in exclude_patterns {
        if glob_match(pat, rel_path) {
            return true;
        }
        if !pat.contains('/') && !pat.contains('*') && !pat.contains('?') && parts.contains(&pat.as_str()) {
            return true;
        }
        if glob_match(pat, name) {
            return true;
        }
    }
    false
}

fn glob_match(pattern: &str, candidate: &str) -> bool {
    globset::Glob::new(pattern)
        .map(|g| g.compile_matcher().is_match(candidate))
        .unwrap_or(false)
}

/// Shared caches and session access used by every RPC handler.
pub struct HandlerContext {
    pub session: Arc<Session>,
    pub hover_cache: Cache,
    pub symbol_cache: Cache,
}

impl HandlerContext {
    #[must_use]
    pub fn relative_path(&self, path: &Path, workspace_root: &Path) -> String {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let root = workspace_root.canonicalize().unwrap_or_else(|_| workspace_root.to_path_buf());
        path.strip_prefix(&root)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| path.to_string_lossy().into_owned())
    }

    #[must_use]
    pub fn parse_position(&self, line: u32, column: u32) -> (u32, u32) {
        (line.saturating_sub(1), column)
    }

    #[must_use]
    pub fn get_file_sha(&self, file_path: &Path) -> String {
        std::fs::read(file_path)
            .map(|bytes| content_hash(&String::from_utf8_lossy(&bytes)))
            .unwrap_or_default()
    }

    pub async fn get_workspace_and_document(
        &self,
        path: &Path,
        workspace_root: &Path,
    ) -> anyhow::Result<(Arc<Workspace>, crate::daemon::session::OpenDocument, PathBuf)> {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let workspace = self
            .session
            .get_or_create_workspace(&path, workspace_root)
            .await
            .map_err(anyhow::Error::from)?;
        let doc = workspace.ensure_document_open(&path).await?;
        Ok((workspace, doc, path))
    }

    pub async fn get_file_symbols_cached(
        &self,
        workspace: &Workspace,
        workspace_root: &Path,
        file_path: &Path,
    ) -> Vec<SymbolDict> {
        let file_sha = self.get_file_sha(file_path);
        let cache_key = format!("{}|{}|{file_sha}", file_path.display(), workspace_root.display());

        if let Ok(Some(cached)) = self.symbol_cache.get(&cache_key) {
            if let Ok(symbols) = serde_json::from_value::<Vec<SymbolDict>>(cached) {
                return symbols;
            }
        }

        let mut symbols = Vec::new();
        let result: anyhow::Result<()> = async {
            let doc = workspace.ensure_document_open(file_path).await?;
            let Some(client) = workspace.client().await else {
                return Ok(());
            };
            let params = lsp_types::DocumentSymbolParams {
                text_document: lsp_types::TextDocumentIdentifier { uri: doc.uri.parse()? },
                work_done_progress_params: lsp_types::WorkDoneProgressParams::default(),
                partial_result_params: lsp_types::PartialResultParams::default(),
            };
            let response = client
                .request::<lsp_types::request::DocumentSymbolRequest>(params)
                .await?;
            if let Some(response) = response {
                let rel_path = self.relative_path(file_path, workspace_root);
                flatten_symbols(&response, &rel_path, &mut symbols);
            }
            Ok(())
        }
        .await;

        if let Err(e) = result {
            tracing::warn!("failed to get symbols for {}: {e}", file_path.display());
        }

        let _ = self
            .symbol_cache
            .set(&cache_key, serde_json::to_value(&symbols).unwrap_or(Value::Null));
        symbols
    }

    pub async fn collect_symbols_from_files(
        &self,
        workspace: &Workspace,
        workspace_root: &Path,
        files: &[PathBuf],
        close_after: bool,
    ) -> Vec<SymbolDict> {
        let mut symbols = Vec::new();
        let mut opened = Vec::new();
        let open_before = workspace.open_document_uris().await;

        for file_path in files {
            symbols.extend(self.get_file_symbols_cached(workspace, workspace_root, file_path).await);
            if let Ok(uri) = crate::lsp::uri::path_to_uri(file_path) {
                if !open_before.contains(&uri.as_str().to_string()) {
                    opened.push(file_path.clone());
                }
            }
        }

        if close_after {
            for file_path in opened {
                let _ = workspace.close_document(&file_path).await;
            }
        }

        symbols
    }

    pub async fn collect_symbols_for_paths(&self, paths: &[PathBuf], workspace_root: &Path) -> Vec<SymbolDict> {
        let mut files_by_language: HashMap<String, Vec<PathBuf>> = HashMap::new();
        for file_path in paths {
            if !file_path.exists() {
                continue;
            }
            let lang = language_id(file_path);
            if lang != "plaintext" {
                files_by_language.entry(lang).or_default().push(file_path.clone());
            }
        }

        let mut all_symbols = Vec::new();
        for files in files_by_language.values() {
            let Some(first) = files.first() else { continue };
            let Ok(workspace) = self.session.get_or_create_workspace(first, workspace_root).await else {
                continue;
            };
            all_symbols.extend(self.collect_symbols_from_files(&workspace, workspace_root, files, true).await);
        }
        all_symbols
    }

    pub async fn collect_all_workspace_symbols(&self, workspace_root: &Path) -> Vec<SymbolDict> {
        let config = self.session.config.lock().await.clone();
        let excluded_languages = &config.workspaces.excluded_languages;

        let mut languages_found: HashMap<String, Vec<PathBuf>> = HashMap::new();
        for file_path in walk_all(workspace_root, SKIP_DIRS) {
            let lang_id = language_id(&file_path);
            if lang_id == "plaintext" || excluded_languages.contains(&lang_id) {
                continue;
            }
            if get_server_for_language(&lang_id, Some(&config)).is_none() {
                continue;
            }
            languages_found.entry(lang_id).or_default().push(file_path);
        }

        let mut all_symbols = Vec::new();
        for (lang_id, files) in languages_found {
            let Ok(Some(workspace)) = self
                .session
                .get_or_create_workspace_for_language(&lang_id, workspace_root)
                .await
            else {
                continue;
            };
            all_symbols.extend(self.collect_symbols_from_files(&workspace, workspace_root, &files, true).await);
        }
        all_symbols
    }

    pub async fn get_symbol_documentation(
        &self,
        workspace_root: &Path,
        rel_path: &str,
        line: u32,
        column: u32,
    ) -> Option<String> {
        let file_path = workspace_root.join(rel_path);
        let workspace = self.session.get_workspace_for_file(&file_path).await?;

        let file_sha = self.get_file_sha(&file_path);
        let cache_key = format!("{}|{line}|{column}|{file_sha}", file_path.display());

        if let Ok(Some(cached)) = self.hover_cache.get(&cache_key) {
            return cached.as_str().filter(|s| !s.is_empty()).map(str::to_string);
        }

        let result: anyhow::Result<Option<String>> = async {
            let doc = workspace.ensure_document_open(&file_path).await?;
            let client = workspace.client().await.context("no client")?;
            let params = lsp_types::HoverParams {
                text_document_position_params: lsp_types::TextDocumentPositionParams {
                    text_document: lsp_types::TextDocumentIdentifier { uri: doc.uri.parse()? },
                    position: lsp_types::Position { line: line.saturating_sub(1), character: column },
                },
                work_done_progress_params: lsp_types::WorkDoneProgressParams::default(),
            };
            let response = client.request::<lsp_types::request::HoverRequest>(params).await?;
            Ok(response.map(|hover| hover_to_string(&hover.contents)))
        }
        .await;

        let doc_str = result.unwrap_or_else(|e| {
            tracing::debug!("failed to get hover for {rel_path}:{line}: {e}");
            None
        });

        let _ = self
            .hover_cache
            .set(&cache_key, Value::String(doc_str.clone().unwrap_or_default()));
        doc_str
    }

    #[must_use]
    pub fn format_locations(
        &self,
        result: &GotoDefinitionResponse,
        workspace_root: &Path,
        context: usize,
    ) -> Vec<LocationDict> {
        let items: Vec<(lsp_types::Uri, lsp_types::Range)> = match result {
            GotoDefinitionResponse::Scalar(loc) => vec![(loc.uri.clone(), loc.range)],
            GotoDefinitionResponse::Array(locs) => {
                locs.iter().map(|l| (l.uri.clone(), l.range)).collect()
            }
            GotoDefinitionResponse::Link(links) => links
                .iter()
                .map(|l| (l.target_uri.clone(), l.target_selection_range))
                .collect(),
        };
        self.locations_to_dicts(&items, workspace_root, context)
    }

    #[must_use]
    pub fn format_reference_locations(
        &self,
        result: &[Location],
        workspace_root: &Path,
        context: usize,
    ) -> Vec<LocationDict> {
        let items: Vec<(lsp_types::Uri, lsp_types::Range)> =
            result.iter().map(|l| (l.uri.clone(), l.range)).collect();
        self.locations_to_dicts(&items, workspace_root, context)
    }

    fn locations_to_dicts(
        &self,
        items: &[(lsp_types::Uri, lsp_types::Range)],
        workspace_root: &Path,
        context: usize,
    ) -> Vec<LocationDict> {
        let mut out = Vec::new();
        for (uri, range) in items {
            let Ok(file_path) = uri_to_path(uri) else { continue };
            let start_line = range.start.line;
            let mut location = LocationDict {
                path: self.relative_path(&file_path, workspace_root),
                line: start_line + 1,
                column: range.start.character,
                context_lines: None,
                context_start: None,
                name: None,
                kind: None,
                detail: None,
            };
            if context > 0 && file_path.exists() {
                if let Ok(content) = std::fs::read_to_string(&file_path) {
                    let (lines, start, _) = lines_around(&content, start_line as usize, context);
                    location.context_lines = Some(lines.into_iter().map(str::to_string).collect());
                    location.context_start = Some(u32::try_from(start + 1).unwrap_or(0));
                }
            }
            out.push(location);
        }
        out
    }

    #[must_use]
    pub fn format_type_hierarchy_items(
        &self,
        result: &[TypeHierarchyItem],
        workspace_root: &Path,
        context: usize,
    ) -> Vec<LocationDict> {
        let mut out = Vec::new();
        for item in result {
            let Ok(file_path) = uri_to_path(&item.uri) else { continue };
            let range = item.selection_range;
            let start_line = range.start.line;
            let mut location = LocationDict {
                path: self.relative_path(&file_path, workspace_root),
                line: start_line + 1,
                column: range.start.character,
                context_lines: None,
                context_start: None,
                name: Some(item.name.clone()),
                kind: Some(symbol_kind_name(item.kind)),
                detail: item.detail.clone(),
            };
            if context > 0 && file_path.exists() {
                if let Ok(content) = std::fs::read_to_string(&file_path) {
                    let (lines, start, _) = lines_around(&content, start_line as usize, context);
                    location.context_lines = Some(lines.into_iter().map(str::to_string).collect());
                    location.context_start = Some(u32::try_from(start + 1).unwrap_or(0));
                }
            }
            out.push(location);
        }
        out
    }

    #[must_use]
    pub fn find_all_files_for_tree(&self, workspace_root: &Path, exclude_dirs: &[&str]) -> Vec<PathBuf> {
        walk_all(workspace_root, exclude_dirs)
    }

    pub async fn group_files_by_language(&self, files: &[PathBuf]) -> HashMap<Option<String>, Vec<PathBuf>> {
        let config = self.session.config.lock().await.clone();
        let mut result: HashMap<Option<String>, Vec<PathBuf>> = HashMap::new();
        for file_path in files {
            let lang_id = language_id(file_path);
            if lang_id == "plaintext" || config.workspaces.excluded_languages.contains(&lang_id) {
                result.entry(None).or_default().push(file_path.clone());
                continue;
            }
            if get_server_for_language(&lang_id, Some(&config)).is_none() {
                result.entry(None).or_default().push(file_path.clone());
            } else {
                result.entry(Some(lang_id)).or_default().push(file_path.clone());
            }
        }
        result
    }

    #[must_use]
    pub fn find_all_source_files(&self, workspace_root: &Path) -> Vec<PathBuf> {
        walk_all(workspace_root, DEFAULT_EXCLUDE_DIRS)
            .into_iter()
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| SOURCE_EXTENSIONS.contains(&format!(".{e}").as_str()))
                    .unwrap_or(false)
            })
            .collect()
    }

    pub async fn discover_languages(&self, workspace_root: &Path) -> Vec<String> {
        let config = self.session.config.lock().await.clone();
        let mut languages = std::collections::HashSet::new();
        for file_path in walk_all(workspace_root, SKIP_DIRS) {
            let lang_id = language_id(&file_path);
            if lang_id == "plaintext" || config.workspaces.excluded_languages.contains(&lang_id) {
                continue;
            }
            if get_server_for_language(&lang_id, Some(&config)).is_some() {
                languages.insert(lang_id);
            }
        }
        languages.into_iter().collect()
    }
}

fn hover_to_string(contents: &lsp_types::HoverContents) -> String {
    match contents {
        lsp_types::HoverContents::Scalar(marked) => marked_string_to_string(marked),
        lsp_types::HoverContents::Array(items) => items
            .iter()
            .map(marked_string_to_string)
            .collect::<Vec<_>>()
            .join("\n"),
        lsp_types::HoverContents::Markup(markup) => markup.value.clone(),
    }
}

fn marked_string_to_string(marked: &lsp_types::MarkedString) -> String {
    match marked {
        lsp_types::MarkedString::String(s) => s.clone(),
        lsp_types::MarkedString::LanguageString(ls) => ls.value.clone(),
    }
}

fn walk_all(root: &Path, exclude_dirs: &[&str]) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || exclude_dirs.contains(&name.as_ref()) || name.ends_with(".egg-info") {
                if path.is_dir() {
                    continue;
                }
            }
            if path.is_dir() {
                if exclude_dirs.contains(&name.as_ref()) || name.ends_with(".egg-info") {
                    continue;
                }
                stack.push(path);
            } else if !name.starts_with('.') {
                out.push(path);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_types::{Position, Range};

    #[test]
    fn expand_variable_range_single_line_unchanged() {
        let lines = vec!["x = 1", "y = 2"];
        assert_eq!(expand_variable_range(&lines, 0), 0);
    }

    #[test]
    fn expand_variable_range_multi_line_call() {
        let lines = vec!["result = foo(", "    1,", "    2,", ")"];
        assert_eq!(expand_variable_range(&lines, 0), 3);
    }

    #[test]
    fn is_excluded_matches_bare_dir_name() {
        assert!(is_excluded("node_modules/foo.js", &vec!["node_modules".to_string()]));
        assert!(!is_excluded("src/foo.js", &vec!["node_modules".to_string()]));
    }

    #[test]
    fn is_excluded_matches_glob() {
        assert!(is_excluded("src/foo.test.js", &vec!["*.test.js".to_string()]));
    }

    #[test]
    fn symbol_kind_name_known() {
        assert_eq!(symbol_kind_name(SymbolKind::FUNCTION), "Function");
        assert_eq!(symbol_kind_name(SymbolKind::STRUCT), "Struct");
    }

    #[test]
    fn find_symbol_at_line_picks_innermost_nested_range() {
        #[allow(deprecated)]
        let outer = DocumentSymbol {
            name: "User".to_string(),
            detail: None,
            kind: SymbolKind::CLASS,
            tags: None,
            deprecated: None,
            range: Range {
                start: Position { line: 0, character: 0 },
                end: Position { line: 5, character: 0 },
            },
            selection_range: Range {
                start: Position { line: 0, character: 6 },
                end: Position { line: 0, character: 10 },
            },
            children: Some(vec![DocumentSymbol {
                name: "__init__".to_string(),
                detail: None,
                kind: SymbolKind::METHOD,
                tags: None,
                deprecated: None,
                range: Range {
                    start: Position { line: 1, character: 4 },
                    end: Position { line: 2, character: 0 },
                },
                selection_range: Range {
                    start: Position { line: 1, character: 8 },
                    end: Position { line: 1, character: 16 },
                },
                children: None,
            }]),
        };
        let response = DocumentSymbolResponse::Nested(vec![outer]);

        let found = find_symbol_at_line(&response, 1).expect("line 1 is inside __init__");
        assert_eq!(found.range_start, 1);
        assert_eq!(found.range_end, 2);
        assert!(!found.has_children);

        let found = find_symbol_at_line(&response, 4).expect("line 4 is inside User but not __init__");
        assert_eq!(found.range_start, 0);
        assert_eq!(found.range_end, 5);
        assert!(found.has_children);
    }
}
