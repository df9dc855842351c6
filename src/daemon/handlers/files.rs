//! `files`: a directory tree annotated with byte size, line count, and
//! per-kind symbol counts for source files.
//!
//! Grounded on SPEC_FULL.md §4.9's `files` description, built on top of
//! `base.py`'s `find_all_files_for_tree`/`group_files_by_language`; no
//! upstream Python handler file for this one was in the retrieval pack.

use std::collections::HashMap;

use crate::daemon::index::{is_excluded, HandlerContext, DEFAULT_EXCLUDE_DIRS};
use crate::daemon::rpc::{FileEntry, FilesParams, FilesResult};
use crate::error::DaemonError;

/// # Errors
///
/// Returns an error if a collected file's symbols can't be resolved; I/O
/// failures on individual files are logged and skipped rather than failing
/// the whole tree.
pub async fn handle_files(ctx: &HandlerContext, params: &FilesParams) -> Result<FilesResult, DaemonError> {
    let root = params.subpath.as_ref().map_or_else(|| params.workspace_root.clone(), |s| params.workspace_root.join(s));

    let exclude_dirs: Vec<&str> = DEFAULT_EXCLUDE_DIRS
        .iter()
        .copied()
        .filter(|dir| !params.include_patterns.iter().any(|p| p == dir))
        .collect();

    let files = ctx.find_all_files_for_tree(&root, &exclude_dirs);
    let by_language = ctx.group_files_by_language(&files).await;

    let mut source_files = Vec::new();
    for (lang, lang_files) in &by_language {
        if lang.is_some() {
            source_files.extend(lang_files.iter().cloned());
        }
    }
    let symbols = ctx.collect_symbols_for_paths(&source_files, &params.workspace_root).await;
    let mut counts_by_path: HashMap<String, HashMap<&'static str, u64>> = HashMap::new();
    for symbol in &symbols {
        *counts_by_path.entry(symbol.path.clone()).or_default().entry(symbol.kind).or_default() += 1;
    }

    let mut entries = Vec::new();
    for file in &files {
        let rel = ctx.relative_path(file, &params.workspace_root);
        if is_excluded(&rel, &params.exclude_patterns) {
            continue;
        }

        let metadata = std::fs::metadata(file).ok();
        let size_bytes = metadata.as_ref().map(|m| m.len());
        let line_count = std::fs::read_to_string(file).ok().map(|content| content.lines().count() as u64);
        let symbol_counts = counts_by_path
            .get(&rel)
            .map(|counts| serde_json::to_value(counts).unwrap_or(serde_json::Value::Null));

        entries.push(FileEntry {
            path: rel,
            is_dir: false,
            size_bytes,
            line_count,
            symbol_counts,
        });
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(FilesResult { entries })
}
