//! Applying an LSP `WorkspaceEdit` to disk: text edits, and the
//! create/rename/delete resource operations a rename or move-file request
//! can carry.
//!
//! Grounded on the (duplicated, in the original) `_apply_workspace_edit`/
//! `_apply_text_edits` pair in `rename.py` and `move_file.py`, unified here
//! into one module both handlers call (SPEC_FULL §9 decision).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lsp_types::{DocumentChangeOperation, DocumentChanges, ResourceOp, TextEdit, WorkspaceEdit};

use crate::lsp::uri::uri_to_path;

#[must_use]
pub fn relative_path(path: &Path, workspace_root: &Path) -> String {
    let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let root = workspace_root.canonicalize().unwrap_or_else(|_| workspace_root.to_path_buf());
    path.strip_prefix(&root)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| path.to_string_lossy().into_owned())
}

/// Apply every edit/resource-operation in `edit`, writing files under
/// `workspace_root`. Returns `(files_modified, renamed_files)`: the
/// relative paths touched, and `(old, new)` pairs for file renames.
///
/// # Errors
///
/// Returns an error if a `file://` URI can't be decoded or a file write
/// fails. A `RenameFile` whose source is missing or whose target already
/// exists is skipped rather than erroring, matching upstream (idempotent
/// against duplicate rename operations some servers emit).
pub fn apply_workspace_edit(
    edit: &WorkspaceEdit,
    workspace_root: &Path,
) -> Result<(Vec<String>, Vec<(PathBuf, PathBuf)>)> {
    let mut files_modified = Vec::new();
    let mut renamed_files = Vec::new();

    if let Some(changes) = &edit.changes {
        for (uri, edits) in changes {
            let file_path = uri_to_path(uri)?;
            apply_text_edits(&file_path, edits)?;
            files_modified.push(relative_path(&file_path, workspace_root));
        }
    }

    if let Some(document_changes) = &edit.document_changes {
        match document_changes {
            DocumentChanges::Edits(edits) => {
                for change in edits {
                    let file_path = uri_to_path(&change.text_document.uri)?;
                    apply_text_edits(&file_path, &change.edits.iter().map(edit_only).collect::<Vec<_>>())?;
                    files_modified.push(relative_path(&file_path, workspace_root));
                }
            }
            DocumentChanges::Operations(ops) => {
                for op in ops {
                    match op {
                        DocumentChangeOperation::Op(ResourceOp::Create(create)) => {
                            let file_path = uri_to_path(&create.uri)?;
                            if let Some(parent) = file_path.parent() {
                                std::fs::create_dir_all(parent)?;
                            }
                            std::fs::OpenOptions::new().create(true).write(true).open(&file_path)?;
                            files_modified.push(relative_path(&file_path, workspace_root));
                        }
                        DocumentChangeOperation::Op(ResourceOp::Rename(rename)) => {
                            let old_path = uri_to_path(&rename.old_uri)?;
                            let new_path = uri_to_path(&rename.new_uri)?;
                            if !old_path.exists() {
                                tracing::debug!("skipping rename: source does not exist: {}", old_path.display());
                                continue;
                            }
                            if new_path.exists() {
                                tracing::debug!("skipping rename: target already exists: {}", new_path.display());
                                continue;
                            }
                            if let Some(parent) = new_path.parent() {
                                std::fs::create_dir_all(parent)?;
                            }
                            std::fs::rename(&old_path, &new_path)?;
                            files_modified.push(relative_path(&new_path, workspace_root));
                            renamed_files.push((old_path, new_path));
                        }
                        DocumentChangeOperation::Op(ResourceOp::Delete(delete)) => {
                            let file_path = uri_to_path(&delete.uri)?;
                            if file_path.exists() {
                                std::fs::remove_file(&file_path)?;
                            }
                            files_modified.push(relative_path(&file_path, workspace_root));
                        }
                        DocumentChangeOperation::Edit(change) => {
                            let file_path = uri_to_path(&change.text_document.uri)?;
                            apply_text_edits(&file_path, &change.edits.iter().map(edit_only).collect::<Vec<_>>())?;
                            files_modified.push(relative_path(&file_path, workspace_root));
                        }
                    }
                }
            }
        }
    }

    Ok((files_modified, renamed_files))
}

fn edit_only(edit: &lsp_types::OneOf<TextEdit, lsp_types::AnnotatedTextEdit>) -> TextEdit {
    match edit {
        lsp_types::OneOf::Left(e) => e.clone(),
        lsp_types::OneOf::Right(e) => e.text_edit.clone(),
    }
}

/// Apply `edits` to `file_path`, rewriting the whole file. Edits are
/// applied in descending `(line, character)` order so earlier edits don't
/// invalidate the positions of later ones.
///
/// # Errors
///
/// Returns an error if the file can't be read or written.
pub fn apply_text_edits(file_path: &Path, edits: &[TextEdit]) -> Result<()> {
    let content = std::fs::read_to_string(file_path)
        .with_context(|| format!("failed to read {}", file_path.display()))?;

    let mut lines: Vec<String> = split_keepends(&content);
    if let Some(last) = lines.last_mut() {
        if !last.ends_with('\n') {
            last.push('\n');
        }
    }

    let mut sorted_edits: Vec<&TextEdit> = edits.iter().collect();
    sorted_edits.sort_by(|a, b| {
        (b.range.start.line, b.range.start.character).cmp(&(a.range.start.line, a.range.start.character))
    });

    for edit in sorted_edits {
        let start_line = edit.range.start.line as usize;
        let start_char = edit.range.start.character as usize;
        let end_line = edit.range.end.line as usize;
        let end_char = edit.range.end.character as usize;

        if start_line >= lines.len() {
            lines.resize(start_line + 1, String::new());
        }

        if start_line == end_line {
            let line = lines.get(start_line).cloned().unwrap_or_default();
            let prefix = byte_slice(&line, 0, start_char);
            let suffix = byte_slice(&line, end_char, line.len());
            lines[start_line] = format!("{prefix}{}{suffix}", edit.new_text);
        } else {
            let first = lines.get(start_line).map(|l| byte_slice(l, 0, start_char)).unwrap_or_default();
            let last = lines.get(end_line).map(|l| byte_slice(l, end_char, l.len())).unwrap_or_default();
            let replacement = format!("{first}{}{last}", edit.new_text);
            let end = (end_line + 1).min(lines.len());
            lines.splice(start_line..end, std::iter::once(replacement));
        }
    }

    let mut result = lines.join("");
    if result.ends_with("\n\n") && !content.ends_with("\n\n") {
        result.pop();
    }

    std::fs::write(file_path, result).with_context(|| format!("failed to write {}", file_path.display()))
}

fn byte_slice(s: &str, start: usize, end: usize) -> String {
    let start = start.min(s.len());
    let end = end.clamp(start, s.len());
    s.get(start..end).unwrap_or_default().to_string()
}

fn split_keepends(content: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for ch in content.chars() {
        current.push(ch);
        if ch == '\n' {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Remove duplicates from `items` while keeping the first occurrence's
/// position, matching `dict.fromkeys(...)`'s dedup-preserving-order idiom.
#[must_use]
pub fn dedup_preserve_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items.into_iter().filter(|item| seen.insert(item.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_types::{Position, Range};

    #[test]
    fn apply_single_line_edit() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "hello world\n").unwrap();
        let edit = TextEdit {
            range: Range {
                start: Position { line: 0, character: 6 },
                end: Position { line: 0, character: 11 },
            },
            new_text: "rust".to_string(),
        };
        apply_text_edits(&file, &[edit]).unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "hello rust\n");
    }

    #[test]
    fn apply_edits_in_descending_order_is_position_stable() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "one\ntwo\nthree\n").unwrap();
        let edits = vec![
            TextEdit {
                range: Range {
                    start: Position { line: 0, character: 0 },
                    end: Position { line: 0, character: 3 },
                },
                new_text: "1".to_string(),
            },
            TextEdit {
                range: Range {
                    start: Position { line: 2, character: 0 },
                    end: Position { line: 2, character: 5 },
                },
                new_text: "3".to_string(),
            },
        ];
        apply_text_edits(&file, &edits).unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "1\ntwo\n3\n");
    }

    #[test]
    fn multi_line_edit_joins_lines() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "foo(\n    1,\n)\n").unwrap();
        let edit = TextEdit {
            range: Range {
                start: Position { line: 0, character: 3 },
                end: Position { line: 2, character: 1 },
            },
            new_text: "()".to_string(),
        };
        apply_text_edits(&file, &[edit]).unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "foo()\n");
    }

    #[test]
    fn dedup_preserve_order_keeps_first_occurrence() {
        let items = vec!["a".to_string(), "b".to_string(), "a".to_string(), "c".to_string()];
        assert_eq!(dedup_preserve_order(items), vec!["a", "b", "c"]);
    }
}
