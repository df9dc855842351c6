//! Symbol reference parsing (`path:line:pattern` / `path:pattern` /
//! `pattern`), matching against a workspace's collected symbols, and
//! disambiguation when more than one symbol matches.
//!
//! Grounded on `lspcmd/daemon/mcp_server.py::_handle_resolve_symbol` and its
//! `_generate_unambiguous_ref`/`_normalize_symbol_name`/`_normalize_container`
//! helpers: the path-filter glob rules, the Go-style `(*T).Method` special
//! case, the preferred-kind tie-break, and the four-tier ref-generation
//! fallback are all carried over as-is.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::daemon::index::SymbolDict;

macro_rules! static_regex {
    ($fn_name:ident, $pattern:expr) => {
        fn $fn_name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pattern).unwrap())
        }
    };
}

static_regex!(normalize_name_re, r"^(\w+)\([^)]*\)$");
static_regex!(container_paren_re, r"^\(\*?(\w+)\)$");
static_regex!(container_impl_for_re, r"^impl\s+\w+(?:<[^>]+>)?\s+for\s+(\w+)");
static_regex!(container_impl_re, r"^impl\s+(\w+)");
static_regex!(effective_container_from_name_re, r"^\(\*?(\w+)\)\.");

const PREFERRED_KINDS: &[&str] = &["Class", "Struct", "Interface", "Enum", "Module", "Namespace", "Package"];

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedSymbol {
    pub path: PathBuf,
    pub line: u32,
    pub column: u32,
    pub name: String,
    pub kind: Option<String>,
    pub container: Option<String>,
    pub range_start_line: Option<u32>,
    pub range_end_line: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchInfo {
    pub path: String,
    pub line: u32,
    pub name: String,
    pub kind: Option<String>,
    pub container: Option<String>,
    pub detail: Option<String>,
    #[serde(rename = "ref")]
    pub reference: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AmbiguityResult {
    pub symbol_path: String,
    pub matches: Vec<MatchInfo>,
    pub total_matches: usize,
}

pub enum ResolveOutcome {
    Resolved(Box<ResolvedSymbol>),
    Ambiguous(AmbiguityResult),
    NotFound(String),
}

struct ParsedRef<'a> {
    path_filter: Option<&'a str>,
    line_filter: Option<u32>,
    symbol_path: &'a str,
}

fn parse_ref(symbol_path: &str) -> Result<ParsedRef<'_>, String> {
    let colon_count = symbol_path.matches(':').count();
    if colon_count >= 2 {
        let mut parts = symbol_path.splitn(3, ':');
        let path_filter = parts.next().unwrap();
        let line_str = parts.next().unwrap();
        let rest = parts.next().unwrap();
        let line_filter = line_str
            .parse::<u32>()
            .map_err(|_| format!("Invalid line number: '{line_str}'"))?;
        Ok(ParsedRef {
            path_filter: Some(path_filter),
            line_filter: Some(line_filter),
            symbol_path: rest,
        })
    } else if colon_count == 1 {
        let mut parts = symbol_path.splitn(2, ':');
        let path_filter = parts.next().unwrap();
        let rest = parts.next().unwrap();
        Ok(ParsedRef {
            path_filter: Some(path_filter),
            line_filter: None,
            symbol_path: rest,
        })
    } else {
        Ok(ParsedRef {
            path_filter: None,
            line_filter: None,
            symbol_path,
        })
    }
}

fn glob(pattern: &str, candidate: &str) -> bool {
    globset::Glob::new(pattern)
        .map(|g| g.compile_matcher().is_match(candidate))
        .unwrap_or(false)
}

fn matches_path(rel_path: &str, path_filter: &str) -> bool {
    if glob(path_filter, rel_path) {
        return true;
    }
    if glob(&format!("**/{path_filter}"), rel_path) {
        return true;
    }
    if glob(&format!("{path_filter}/**"), rel_path) {
        return true;
    }
    if !path_filter.contains('/') {
        let path = Path::new(rel_path);
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if glob(path_filter, name) {
                return true;
            }
        }
        if path.iter().any(|c| c.to_str() == Some(path_filter)) {
            return true;
        }
    }
    false
}

fn normalize_symbol_name(name: &str) -> String {
    normalize_name_re()
        .captures(name)
        .map_or_else(|| name.to_string(), |c| c[1].to_string())
}

fn normalize_container(container: &str) -> String {
    if let Some(c) = container_paren_re().captures(container) {
        return c[1].to_string();
    }
    if let Some(c) = container_impl_for_re().captures(container) {
        return c[1].to_string();
    }
    if let Some(c) = container_impl_re().captures(container) {
        return c[1].to_string();
    }
    container.to_string()
}

fn effective_container(sym: &SymbolDict) -> String {
    if let Some(container) = &sym.container {
        if !container.is_empty() {
            return normalize_container(container);
        }
    }
    effective_container_from_name_re()
        .captures(&sym.name)
        .map_or_else(String::new, |c| c[1].to_string())
}

fn module_name(rel_path: &str) -> String {
    Path::new(rel_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(rel_path)
        .to_string()
}

fn name_matches(sym_name: &str, target: &str) -> bool {
    sym_name == target || normalize_symbol_name(sym_name) == target
}

/// Resolve `symbol_path` against `all_symbols` collected for
/// `workspace_root`.
#[must_use]
pub fn resolve(symbol_path: &str, workspace_root: &Path, all_symbols: &[SymbolDict]) -> Result<ResolveOutcome, String> {
    let parsed = parse_ref(symbol_path)?;

    let mut candidates: Vec<&SymbolDict> = all_symbols.iter().collect();
    if let Some(path_filter) = parsed.path_filter {
        candidates.retain(|s| matches_path(&s.path, path_filter));
    }
    if let Some(line_filter) = parsed.line_filter {
        candidates.retain(|s| s.line == line_filter);
    }

    let parts: Vec<&str> = parsed.symbol_path.split('.').collect();
    let target_name = *parts.last().unwrap_or(&parsed.symbol_path);

    let mut matches: Vec<&SymbolDict> = Vec::new();
    if parts.len() == 1 {
        for sym in &candidates {
            if name_matches(&sym.name, target_name) || sym.name.ends_with(&format!(").{target_name}")) {
                matches.push(sym);
            }
        }
    } else {
        let container_parts = &parts[..parts.len() - 1];
        let container_str = container_parts.join(".");

        for sym in &candidates {
            let go_style = format!("(*{container_str}).{target_name}");
            let go_style_val = format!("({container_str}).{target_name}");
            if sym.name == go_style || sym.name == go_style_val {
                matches.push(sym);
                continue;
            }

            if !name_matches(&sym.name, target_name) {
                continue;
            }

            let sym_container_normalized = effective_container(sym);
            let sym_container = sym.container.clone().unwrap_or_default();
            let mod_name = module_name(&sym.path);
            let full_container = if sym_container_normalized.is_empty() {
                mod_name.clone()
            } else {
                format!("{mod_name}.{sym_container_normalized}")
            };

            if sym_container_normalized == container_str
                || sym_container == container_str
                || full_container == container_str
                || full_container.ends_with(&format!(".{container_str}"))
                || (container_parts.len() == 1 && container_parts[0] == mod_name)
            {
                matches.push(sym);
            }
        }
    }

    if matches.is_empty() {
        let mut reasons = Vec::new();
        if let Some(path_filter) = parsed.path_filter {
            reasons.push(format!("in files matching '{path_filter}'"));
        }
        if let Some(line_filter) = parsed.line_filter {
            reasons.push(format!("on line {line_filter}"));
        }
        let suffix = if reasons.is_empty() {
            String::new()
        } else {
            format!(" {}", reasons.join(" "))
        };
        return Ok(ResolveOutcome::NotFound(format!(
            "Symbol '{}' not found{suffix}",
            parsed.symbol_path
        )));
    }

    let type_matches: Vec<&&SymbolDict> = matches.iter().filter(|s| PREFERRED_KINDS.contains(&s.kind)).collect();
    if type_matches.len() == 1 && matches.len() > 1 {
        matches = type_matches.into_iter().copied().collect();
    }

    if matches.len() == 1 {
        let sym = matches[0];
        return Ok(ResolveOutcome::Resolved(Box::new(ResolvedSymbol {
            path: workspace_root.join(&sym.path),
            line: sym.line,
            column: sym.column,
            name: sym.name.clone(),
            kind: Some(sym.kind.to_string()),
            container: sym.container.clone(),
            range_start_line: sym.range_start_line,
            range_end_line: sym.range_end_line,
        })));
    }

    let match_infos = matches
        .iter()
        .take(10)
        .map(|sym| MatchInfo {
            path: sym.path.clone(),
            line: sym.line,
            name: sym.name.clone(),
            kind: Some(sym.kind.to_string()),
            container: sym.container.clone(),
            detail: sym.detail.clone(),
            reference: generate_unambiguous_ref(sym, &matches, target_name),
        })
        .collect();

    Ok(ResolveOutcome::Ambiguous(AmbiguityResult {
        symbol_path: parsed.symbol_path.to_string(),
        matches: match_infos,
        total_matches: matches.len(),
    }))
}

fn generate_unambiguous_ref(sym: &SymbolDict, all_matches: &[&SymbolDict], target_name: &str) -> String {
    let filename = Path::new(&sym.path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(&sym.path)
        .to_string();
    let normalized_name = normalize_symbol_name(target_name);
    let sym_container = effective_container(sym);

    if !sym_container.is_empty() {
        let candidate = format!("{sym_container}.{normalized_name}");
        let count = all_matches.iter().filter(|s| effective_container(s) == sym_container).count();
        if count == 1 {
            return candidate;
        }
    }

    let candidate = format!("{filename}:{normalized_name}");
    let count = all_matches
        .iter()
        .filter(|s| Path::new(&s.path).file_name().and_then(|n| n.to_str()) == Some(filename.as_str()))
        .count();
    if count == 1 {
        return candidate;
    }

    if !sym_container.is_empty() {
        let candidate = format!("{filename}:{sym_container}.{normalized_name}");
        let count = all_matches
            .iter()
            .filter(|s| {
                Path::new(&s.path).file_name().and_then(|n| n.to_str()) == Some(filename.as_str())
                    && effective_container(s) == sym_container
            })
            .count();
        if count == 1 {
            return candidate;
        }
    }

    format!("{filename}:{}:{normalized_name}", sym.line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str, kind: &'static str, path: &str, line: u32, container: Option<&str>) -> SymbolDict {
        SymbolDict {
            name: name.to_string(),
            kind,
            path: path.to_string(),
            line,
            column: 0,
            container: container.map(str::to_string),
            detail: None,
            range_start_line: Some(line),
            range_end_line: Some(line),
        }
    }

    #[test]
    fn resolves_unique_name() {
        let symbols = vec![sym("foo", "Function", "a.rs", 1, None)];
        match resolve("foo", Path::new("/root"), &symbols).unwrap() {
            ResolveOutcome::Resolved(r) => assert_eq!(r.name, "foo"),
            _ => panic!("expected resolved"),
        }
    }

    #[test]
    fn reports_ambiguous_with_refs() {
        let symbols = vec![
            sym("run", "Method", "a.rs", 1, Some("Alpha")),
            sym("run", "Method", "b.rs", 2, Some("Beta")),
        ];
        match resolve("run", Path::new("/root"), &symbols).unwrap() {
            ResolveOutcome::Ambiguous(result) => {
                assert_eq!(result.total_matches, 2);
                assert_eq!(result.matches[0].reference, "Alpha.run");
                assert_eq!(result.matches[1].reference, "Beta.run");
            }
            _ => panic!("expected ambiguous"),
        }
    }

    #[test]
    fn not_found_reports_filters() {
        let symbols = vec![sym("foo", "Function", "a.rs", 1, None)];
        match resolve("missing.rs:9:bar", Path::new("/root"), &symbols).unwrap() {
            ResolveOutcome::NotFound(msg) => assert!(msg.contains("on line 9")),
            _ => panic!("expected not found"),
        }
    }

    #[test]
    fn container_dotted_path_matches() {
        let symbols = vec![
            sym("run", "Method", "a.rs", 1, Some("Alpha")),
            sym("run", "Method", "a.rs", 2, Some("Beta")),
        ];
        match resolve("Alpha.run", Path::new("/root"), &symbols).unwrap() {
            ResolveOutcome::Resolved(r) => assert_eq!(r.line, 1),
            _ => panic!("expected resolved"),
        }
    }
}
