//! Language-id detection and line/offset/regex text helpers shared by the
//! symbol resolver and several handlers.
//!
//! Grounded on `lspcmd/utils/text.py`: same extension table, same
//! line/offset conversions, same regex-position resolution (including its
//! ambiguity reporting, which the resolver turns into an `AmbiguityResult`
//! rather than a formatted string).

use std::path::Path;

use regex::Regex;

/// Map a file extension to an LSP language id. Unknown extensions map to
/// `"plaintext"`, matching the Python default.
#[must_use]
pub fn language_id(path: &Path) -> String {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let dotted = format!(".{ext}");
    id_for_extension(&dotted).unwrap_or("plaintext").to_string()
}

fn id_for_extension(ext: &str) -> Option<&'static str> {
    Some(match ext {
        ".py" | ".pyi" => "python",
        ".js" => "javascript",
        ".jsx" => "javascriptreact",
        ".ts" => "typescript",
        ".tsx" => "typescriptreact",
        ".rs" => "rust",
        ".go" => "go",
        ".c" | ".h" => "c",
        ".cpp" | ".cc" | ".cxx" | ".hpp" | ".hxx" => "cpp",
        ".java" => "java",
        ".rb" => "ruby",
        ".php" => "php",
        ".cs" => "csharp",
        ".fs" => "fsharp",
        ".swift" => "swift",
        ".kt" | ".kts" => "kotlin",
        ".scala" => "scala",
        ".lua" => "lua",
        ".sh" | ".bash" | ".zsh" => "shellscript",
        ".json" => "json",
        ".yaml" | ".yml" => "yaml",
        ".toml" => "toml",
        ".xml" => "xml",
        ".html" | ".htm" => "html",
        ".css" => "css",
        ".scss" => "scss",
        ".less" => "less",
        ".md" | ".markdown" => "markdown",
        ".sql" => "sql",
        ".r" | ".R" => "r",
        ".el" => "emacs-lisp",
        ".clj" => "clojure",
        ".cljs" => "clojurescript",
        ".ex" | ".exs" => "elixir",
        ".erl" | ".hrl" => "erlang",
        ".hs" => "haskell",
        ".ml" | ".mli" => "ocaml",
        ".vim" => "vim",
        ".zig" => "zig",
        ".nim" => "nim",
        ".d" => "d",
        ".dart" => "dart",
        ".v" => "v",
        ".vue" => "vue",
        ".svelte" => "svelte",
        _ => return None,
    })
}

#[must_use]
pub fn line_at(content: &str, line: usize) -> &str {
    content.lines().nth(line).unwrap_or("")
}

/// Returns `(lines, start, end)`: the slice of source lines within
/// `context` lines of `line`, and the (0-based) index of the first
/// returned line.
#[must_use]
pub fn lines_around(content: &str, line: usize, context: usize) -> (Vec<&str>, usize, usize) {
    let lines: Vec<&str> = content.lines().collect();
    let start = line.saturating_sub(context);
    let end = (line + context + 1).min(lines.len());
    if start >= end {
        return (Vec::new(), start, start);
    }
    (lines[start..end].to_vec(), start, end)
}

/// Convert a 0-based `(line, character)` position to a UTF-8 byte offset.
#[must_use]
pub fn position_to_offset(content: &str, line: usize, character: usize) -> usize {
    let mut offset = 0;
    for (i, ln) in content.split_inclusive('\n').enumerate() {
        if i == line {
            return offset + character;
        }
        offset += ln.len();
    }
    offset
}

/// Convert a UTF-8 byte offset back to a 0-based `(line, character)` pair.
#[must_use]
pub fn offset_to_position(content: &str, offset: usize) -> (usize, usize) {
    let mut current = 0;
    for (i, ln) in content.split_inclusive('\n').enumerate() {
        if current + ln.len() > offset {
            return (i, offset - current);
        }
        current += ln.len();
    }
    (content.split_inclusive('\n').count(), 0)
}

/// Outcome of resolving a regex pattern to a single `(line, column)`
/// position, mirroring `resolve_regex_position`'s three cases.
#[derive(Debug, Clone)]
pub enum PatternMatch {
    /// 1-based line, 0-based column.
    Found(u32, u32),
    NotFound,
    /// `(line, column, line_text)` for every match, for ambiguity reporting.
    Ambiguous(Vec<(u32, u32, String)>),
}

/// Resolve `pattern` to a position in `content`. If `line` is given
/// (1-based), the search is restricted to that line.
///
/// # Errors
///
/// Returns an error if `pattern` is not a valid regex.
pub fn resolve_regex_position(
    content: &str,
    pattern: &str,
    line: Option<u32>,
) -> Result<PatternMatch, regex::Error> {
    let re = Regex::new(pattern)?;
    let lines: Vec<&str> = content.lines().collect();

    if let Some(line) = line {
        let idx = line.saturating_sub(1) as usize;
        let Some(line_content) = lines.get(idx) else {
            return Ok(PatternMatch::NotFound);
        };
        let matches: Vec<_> = re.find_iter(line_content).collect();
        return Ok(match matches.len() {
            0 => PatternMatch::NotFound,
            #[allow(clippy::cast_possible_truncation)]
            1 => PatternMatch::Found(line, matches[0].start() as u32),
            _ => PatternMatch::Ambiguous(
                matches
                    .iter()
                    .map(|m| (line, u32::try_from(m.start()).unwrap_or(u32::MAX), (*line_content).to_string()))
                    .collect(),
            ),
        });
    }

    let mut all_matches = Vec::new();
    for (idx, line_content) in lines.iter().enumerate() {
        for m in re.find_iter(line_content) {
            #[allow(clippy::cast_possible_truncation)]
            all_matches.push(((idx + 1) as u32, m.start() as u32, (*line_content).to_string()));
        }
    }
    Ok(match all_matches.len() {
        0 => PatternMatch::NotFound,
        1 => PatternMatch::Found(all_matches[0].0, all_matches[0].1),
        _ => PatternMatch::Ambiguous(all_matches),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn language_id_known_extensions() {
        assert_eq!(language_id(&PathBuf::from("a.rs")), "rust");
        assert_eq!(language_id(&PathBuf::from("a.py")), "python");
        assert_eq!(language_id(&PathBuf::from("a.tsx")), "typescriptreact");
    }

    #[test]
    fn language_id_unknown_extension_is_plaintext() {
        assert_eq!(language_id(&PathBuf::from("a.xyz")), "plaintext");
    }

    #[test]
    fn position_offset_round_trip() {
        let content = "fn main() {\n    let x = 1;\n}\n";
        let offset = position_to_offset(content, 1, 8);
        assert_eq!(offset_to_position(content, offset), (1, 8));
    }

    #[test]
    fn resolve_regex_unique_match_on_line() {
        let content = "fn foo() {}\nfn bar() {}\n";
        match resolve_regex_position(content, "fn bar", Some(2)).unwrap() {
            PatternMatch::Found(line, col) => {
                assert_eq!(line, 2);
                assert_eq!(col, 0);
            }
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[test]
    fn resolve_regex_ambiguous_without_line() {
        let content = "fn foo() {}\nfn foo_other() {}\n";
        match resolve_regex_position(content, "fn foo", None).unwrap() {
            PatternMatch::Ambiguous(matches) => assert_eq!(matches.len(), 2),
            other => panic!("expected Ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn resolve_regex_not_found() {
        let content = "fn foo() {}\n";
        assert!(matches!(
            resolve_regex_position(content, "nope", None).unwrap(),
            PatternMatch::NotFound
        ));
    }
}
