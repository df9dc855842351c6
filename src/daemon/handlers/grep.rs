//! `grep`: regex match over collected symbol names, optionally enriched
//! with cached hover text.
//!
//! Grounded on SPEC_FULL.md §4.9's `grep` description and `base.py`'s
//! `is_excluded`/`collect_symbols_for_paths` helpers that back it; no
//! upstream Python handler file for this one was in the retrieval pack.

use regex::RegexBuilder;

use crate::daemon::index::{is_excluded, HandlerContext};
use crate::daemon::rpc::{GrepParams, GrepResult};
use crate::error::DaemonError;

/// # Errors
///
/// Returns an error if `pattern` is not a valid regex.
pub async fn handle_grep(ctx: &HandlerContext, params: &GrepParams) -> Result<GrepResult, DaemonError> {
    let regex = RegexBuilder::new(&params.pattern)
        .case_insensitive(!params.case_sensitive)
        .build()
        .map_err(|e| DaemonError::Validation(format!("invalid pattern: {e}")))?;

    let all_symbols = match &params.paths {
        Some(paths) => ctx.collect_symbols_for_paths(paths, &params.workspace_root).await,
        None => ctx.collect_all_workspace_symbols(&params.workspace_root).await,
    };

    let mut symbols: Vec<_> = all_symbols
        .into_iter()
        .filter(|s| !is_excluded(&s.path, &params.exclude_patterns))
        .filter(|s| params.kinds.as_ref().is_none_or(|kinds| kinds.iter().any(|k| k == s.kind)))
        .filter(|s| regex.is_match(&s.name))
        .collect();

    if params.include_docs {
        for symbol in &mut symbols {
            symbol.detail = ctx
                .get_symbol_documentation(&params.workspace_root, &symbol.path, symbol.line, symbol.column)
                .await
                .or_else(|| symbol.detail.take());
        }
    }

    let warning = (symbols.is_empty() && params.pattern.contains("\\|"))
        .then(|| "`|` does not need escaping in this pattern syntax; did you mean an unescaped `|`?".to_string());

    Ok(GrepResult { symbols, warning })
}
