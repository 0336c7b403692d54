use std::fs;
use std::path::{Path, PathBuf};

use forgeflow_core::{EditBody, FileOperation, OperationKind};

const SEARCH_MARKER: &str = "<<<<<<< SEARCH";
const DIVIDER: &str = "=======";
const REPLACE_MARKER: &str = ">>>>>>> REPLACE";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PatchError {
    #[error("SEARCH block does not match")]
    SearchNotFound,
    #[error("Search/Replace failed")]
    SearchReplaceFailed,
    #[error("destructive edit refused: {0}")]
    DestructiveEditGuard(GuardRefusal),
    #[error("io error: {0}")]
    Io(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardRefusal {
    EmptyReplace,
    LargeSearchNoReplace,
    LargeSearchShrunkReplace,
    BulkDeletion,
}

impl std::fmt::Display for GuardRefusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            GuardRefusal::EmptyReplace => "REPLACE is empty",
            GuardRefusal::LargeSearchNoReplace => "SEARCH has more than 3 lines and REPLACE is empty",
            GuardRefusal::LargeSearchShrunkReplace => {
                "SEARCH is 100+ chars and REPLACE is under 30% of its length"
            }
            GuardRefusal::BulkDeletion => "existing file is over 200 bytes and the new body is under half its length",
        };
        f.write_str(msg)
    }
}

/// Outcome of applying a single [`FileOperation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied,
    /// A SEARCH/REPLACE block matched its own SEARCH exactly; treated as a
    /// no-op and skipped silently.
    SkippedNoop,
}

/// Applies file operations against files rooted at `workspace_root`. All
/// paths on [`FileOperation`] are workspace-relative with forward slashes.
pub struct Patcher {
    workspace_root: PathBuf,
}

impl Patcher {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.workspace_root.join(path)
    }

    fn read_existing(&self, path: &str) -> std::io::Result<Option<String>> {
        let full = self.resolve(path);
        match fs::read_to_string(&full) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, path: &str, content: &str) -> Result<(), PatchError> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|e| PatchError::Io(e.to_string()))?;
        }
        fs::write(&full, content).map_err(|e| PatchError::Io(e.to_string()))
    }

    /// Applies a whole batch transactionally: simulates every operation
    /// in-memory first, and only persists any of them if all succeed.
    pub fn apply_batch(&self, ops: &[FileOperation]) -> Result<Vec<PatchOutcome>, PatchError> {
        let mut writes: Vec<(String, Option<String>)> = Vec::new();
        let mut outcomes = Vec::with_capacity(ops.len());

        for op in ops {
            let (outcome, op_writes) = self.simulate(op)?;
            outcomes.push(outcome);
            writes.extend(op_writes);
        }

        self.persist(writes)?;
        Ok(outcomes)
    }

    pub fn apply(&self, op: &FileOperation) -> Result<PatchOutcome, PatchError> {
        let (outcome, writes) = self.simulate(op)?;
        self.persist(writes)?;
        Ok(outcome)
    }

    fn persist(&self, writes: Vec<(String, Option<String>)>) -> Result<(), PatchError> {
        for (path, content) in writes {
            match content {
                Some(body) => self.write(&path, &body)?,
                None => self.delete_file(&path)?,
            }
        }
        Ok(())
    }

    fn delete_file(&self, path: &str) -> Result<(), PatchError> {
        let full = self.resolve(path);
        match fs::remove_file(&full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PatchError::Io(e.to_string())),
        }
    }

    /// Computes the outcome and the list of `(path, new_content)` writes
    /// to persist (`None` content means delete), without touching disk.
    /// A single non-`multi_write` operation yields at most one write; a
    /// `multi_write` yields one per sub-operation that actually mutates a
    /// file.
    fn simulate(&self, op: &FileOperation) -> Result<(PatchOutcome, Vec<(String, Option<String>)>), PatchError> {
        match &op.kind {
            OperationKind::Create { content } => {
                Ok((PatchOutcome::Applied, vec![(op.path.clone(), Some(content.clone()))]))
            }
            OperationKind::WriteFull { content } => {
                let existing = self
                    .read_existing(&op.path)
                    .map_err(|e| PatchError::Io(e.to_string()))?
                    .unwrap_or_default();
                if write_full_guard_trips(&existing, content) {
                    return Err(PatchError::DestructiveEditGuard(GuardRefusal::BulkDeletion));
                }
                Ok((PatchOutcome::Applied, vec![(op.path.clone(), Some(content.clone()))]))
            }
            OperationKind::Prepend { content } => {
                let existing = self
                    .read_existing(&op.path)
                    .map_err(|e| PatchError::Io(e.to_string()))?
                    .unwrap_or_default();
                let new_content = format!("{content}\n\n{existing}");
                Ok((PatchOutcome::Applied, vec![(op.path.clone(), Some(new_content))]))
            }
            OperationKind::Append { content } => {
                let existing = self
                    .read_existing(&op.path)
                    .map_err(|e| PatchError::Io(e.to_string()))?
                    .unwrap_or_default();
                let trimmed = existing.trim_end();
                let new_content = if trimmed.is_empty() {
                    content.clone()
                } else {
                    format!("{trimmed}\n\n{content}")
                };
                Ok((PatchOutcome::Applied, vec![(op.path.clone(), Some(new_content))]))
            }
            OperationKind::Edit(body) | OperationKind::Replace(body) => {
                let existing = self
                    .read_existing(&op.path)
                    .map_err(|e| PatchError::Io(e.to_string()))?
                    .ok_or(PatchError::SearchNotFound)?;
                let (outcome, new_content) = apply_edit_body(&existing, body)?;
                let writes = new_content.map(|c| (op.path.clone(), Some(c))).into_iter().collect();
                Ok((outcome, writes))
            }
            OperationKind::Delete => Ok((PatchOutcome::Applied, vec![(op.path.clone(), None)])),
            OperationKind::Read => Ok((PatchOutcome::Applied, Vec::new())),
            OperationKind::MultiWrite { operations, atomic } => {
                if *atomic {
                    let mut writes = Vec::new();
                    for sub in operations {
                        let (_, sub_writes) = self.simulate(sub)?;
                        writes.extend(sub_writes);
                    }
                    Ok((PatchOutcome::Applied, writes))
                } else {
                    let mut writes = Vec::new();
                    for sub in operations {
                        match self.simulate(sub) {
                            Ok((_, sub_writes)) => writes.extend(sub_writes),
                            Err(_) => continue,
                        }
                    }
                    Ok((PatchOutcome::Applied, writes))
                }
            }
            OperationKind::Run { .. } => Ok((PatchOutcome::Applied, Vec::new())),
        }
    }
}

fn write_full_guard_trips(existing: &str, proposed: &str) -> bool {
    existing.len() > 200 && proposed.len() < existing.len() / 2
}

/// Returns the zero or more SEARCH/REPLACE blocks embedded in `content`,
/// as `(search, replace)` pairs.
fn parse_embedded_diff_blocks(content: &str) -> Vec<(String, String)> {
    let mut blocks = Vec::new();
    let mut rest = content;

    while let Some(search_start) = rest.find(SEARCH_MARKER) {
        let after_marker = &rest[search_start + SEARCH_MARKER.len()..];
        let Some(divider_rel) = after_marker.find(DIVIDER) else {
            break;
        };
        let search_text = after_marker[..divider_rel].trim_matches('\n').to_string();

        let after_divider = &after_marker[divider_rel + DIVIDER.len()..];
        let Some(replace_rel) = after_divider.find(REPLACE_MARKER) else {
            break;
        };
        let replace_text = after_divider[..replace_rel].trim_matches('\n').to_string();

        blocks.push((search_text, replace_text));
        rest = &after_divider[replace_rel + REPLACE_MARKER.len()..];
    }

    blocks
}

fn apply_edit_body(existing: &str, body: &EditBody) -> Result<(PatchOutcome, Option<String>), PatchError> {
    let blocks = if let (Some(search), Some(replace)) = (&body.search, &body.replace) {
        vec![(search.clone(), replace.clone())]
    } else if let Some(content) = &body.content {
        if content.contains(SEARCH_MARKER) {
            let parsed = parse_embedded_diff_blocks(content);
            if parsed.is_empty() {
                return Err(PatchError::SearchReplaceFailed);
            }
            parsed
        } else {
            return apply_snippet_fallback(existing, content);
        }
    } else {
        return Err(PatchError::SearchReplaceFailed);
    };

    let mut current = existing.to_string();
    let mut any_applied = false;

    for (search, replace) in blocks {
        if search == replace {
            continue;
        }
        guard_destructive_edit(&search, &replace)?;

        match apply_single_block(&current, &search, &replace) {
            Some(updated) => {
                current = updated;
                any_applied = true;
            }
            None => return Err(PatchError::SearchNotFound),
        }
    }

    if any_applied {
        Ok((PatchOutcome::Applied, Some(current)))
    } else {
        Ok((PatchOutcome::SkippedNoop, None))
    }
}

fn guard_destructive_edit(search: &str, replace: &str) -> Result<(), PatchError> {
    if replace.is_empty() {
        return Err(PatchError::DestructiveEditGuard(GuardRefusal::EmptyReplace));
    }
    let search_lines = search.lines().count();
    let replace_lines = replace.lines().count();
    if search_lines > 3 && replace_lines == 0 {
        return Err(PatchError::DestructiveEditGuard(GuardRefusal::LargeSearchNoReplace));
    }
    if search.len() >= 100 && replace.len() < (search.len() * 3) / 10 {
        return Err(PatchError::DestructiveEditGuard(GuardRefusal::LargeSearchShrunkReplace));
    }
    Ok(())
}

/// Tier 3: exact match, falling back to line-trimmed window match.
fn apply_single_block(current: &str, search: &str, replace: &str) -> Option<String> {
    if let Some(pos) = current.find(search) {
        let mut updated = String::with_capacity(current.len() - search.len() + replace.len());
        updated.push_str(&current[..pos]);
        updated.push_str(replace);
        updated.push_str(&current[pos + search.len()..]);
        return Some(updated);
    }

    line_trimmed_match(current, search, replace)
}

fn line_trimmed_match(current: &str, search: &str, replace: &str) -> Option<String> {
    let search_lines: Vec<&str> = search.lines().collect();
    if search_lines.is_empty() {
        return None;
    }
    let file_lines: Vec<&str> = current.lines().collect();
    let trimmed_search: Vec<&str> = search_lines.iter().map(|l| l.trim()).collect();

    let window_len = search_lines.len();
    if window_len == 0 || window_len > file_lines.len() {
        return None;
    }

    for start in 0..=(file_lines.len() - window_len) {
        let window = &file_lines[start..start + window_len];
        if window.iter().map(|l| l.trim()).eq(trimmed_search.iter().copied()) {
            let mut new_lines: Vec<&str> = Vec::with_capacity(file_lines.len());
            new_lines.extend_from_slice(&file_lines[..start]);
            for line in replace.lines() {
                new_lines.push(line);
            }
            new_lines.extend_from_slice(&file_lines[start + window_len..]);
            let mut result = new_lines.join("\n");
            if current.ends_with('\n') {
                result.push('\n');
            }
            return Some(result);
        }
    }
    None
}

/// Tier 4: snippet fallback for content with no SEARCH/REPLACE markers —
/// block-anchor matching, then single-line jaccard similarity.
fn apply_snippet_fallback(existing: &str, snippet: &str) -> Result<(PatchOutcome, Option<String>), PatchError> {
    let snippet_lines: Vec<&str> = snippet.lines().collect();
    let file_lines: Vec<&str> = existing.lines().collect();

    if snippet_lines.len() == 1 {
        let line = snippet_lines[0];
        let non_space_count = line.chars().filter(|c| !c.is_whitespace()).count();
        if non_space_count >= 4 {
            if let Some((idx, _)) = best_single_line_match(&file_lines, line) {
                let mut new_lines = file_lines.clone();
                new_lines[idx] = line;
                let mut result = new_lines.join("\n");
                if existing.ends_with('\n') {
                    result.push('\n');
                }
                return Ok((PatchOutcome::Applied, Some(result)));
            }
        }
        return Err(PatchError::SearchNotFound);
    }

    match block_anchor_match(&file_lines, &snippet_lines) {
        Some((start, end)) => {
            let mut new_lines: Vec<&str> = Vec::with_capacity(file_lines.len());
            new_lines.extend_from_slice(&file_lines[..start]);
            new_lines.extend_from_slice(&snippet_lines);
            new_lines.extend_from_slice(&file_lines[end..]);
            let mut result = new_lines.join("\n");
            if existing.ends_with('\n') {
                result.push('\n');
            }
            Ok((PatchOutcome::Applied, Some(result)))
        }
        None => Err(PatchError::SearchNotFound),
    }
}

fn best_single_line_match<'a>(file_lines: &[&'a str], line: &str) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, candidate) in file_lines.iter().enumerate() {
        let sim = strsim::jaro(candidate, line);
        let len_delta = (candidate.len() as i64 - line.len() as i64).unsigned_abs() as usize;
        if sim > 0.8 && len_delta < 15 {
            if best.map(|(_, best_sim)| sim > best_sim).unwrap_or(true) {
                best = Some((idx, sim));
            }
        }
    }
    best
}

/// Scans the first/last 50 lines of `snippet_lines` for anchor candidates
/// (a leading and trailing non-empty line), finds a file window bounded by
/// matching trimmed anchors, and returns the window with the highest score
/// (anchor span minus line-count delta).
fn block_anchor_match(file_lines: &[&str], snippet_lines: &[&str]) -> Option<(usize, usize)> {
    let lead_candidates: Vec<usize> = (0..snippet_lines.len().min(50))
        .filter(|&i| !snippet_lines[i].trim().is_empty())
        .collect();
    let trail_candidates: Vec<usize> = ((snippet_lines.len().saturating_sub(50))..snippet_lines.len())
        .rev()
        .filter(|&i| !snippet_lines[i].trim().is_empty())
        .collect();

    let mut best: Option<(usize, usize, i64)> = None;

    for &lead_idx in &lead_candidates {
        let lead_anchor = snippet_lines[lead_idx].trim();
        for &trail_idx in &trail_candidates {
            if trail_idx < lead_idx {
                continue;
            }
            let trail_anchor = snippet_lines[trail_idx].trim();
            let span = (trail_idx - lead_idx + 1) as i64;

            for (file_start, file_line) in file_lines.iter().enumerate() {
                if file_line.trim() != lead_anchor {
                    continue;
                }
                for (file_end, candidate) in file_lines.iter().enumerate().skip(file_start) {
                    if candidate.trim() != trail_anchor {
                        continue;
                    }
                    let file_span = (file_end - file_start + 1) as i64;
                    let score = span - (file_span - span).abs();
                    if best.map(|(_, _, best_score)| score > best_score).unwrap_or(true) {
                        best = Some((file_start, file_end + 1, score));
                    }
                }
            }
        }
    }

    best.map(|(start, end, _)| (start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_file(root: &Path, path: &str, content: &str) {
        let full = root.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(full, content).unwrap();
    }

    fn read_file(root: &Path, path: &str) -> String {
        fs::read_to_string(root.join(path)).unwrap()
    }

    #[test]
    fn create_writes_new_file() {
        let dir = tempdir().unwrap();
        let patcher = Patcher::new(dir.path());
        let op = FileOperation::new("new.rs", OperationKind::Create { content: "fn main() {}".into() });
        patcher.apply(&op).unwrap();
        assert_eq!(read_file(dir.path(), "new.rs"), "fn main() {}");
    }

    #[test]
    fn write_full_replaces_small_existing_file() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a.rs", "short");
        let patcher = Patcher::new(dir.path());
        let op = FileOperation::new("a.rs", OperationKind::WriteFull { content: "much longer replacement text here".into() });
        patcher.apply(&op).unwrap();
        assert_eq!(read_file(dir.path(), "a.rs"), "much longer replacement text here");
    }

    #[test]
    fn write_full_guard_refuses_bulk_deletion() {
        let dir = tempdir().unwrap();
        let existing = "x".repeat(500);
        write_file(dir.path(), "a.rs", &existing);
        let patcher = Patcher::new(dir.path());
        let op = FileOperation::new("a.rs", OperationKind::WriteFull { content: "short".into() });
        let err = patcher.apply(&op).unwrap_err();
        assert_eq!(err, PatchError::DestructiveEditGuard(GuardRefusal::BulkDeletion));
        assert_eq!(read_file(dir.path(), "a.rs"), existing);
    }

    #[test]
    fn prepend_adds_content_before_existing() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a.rs", "body");
        let patcher = Patcher::new(dir.path());
        let op = FileOperation::new("a.rs", OperationKind::Prepend { content: "header".into() });
        patcher.apply(&op).unwrap();
        assert_eq!(read_file(dir.path(), "a.rs"), "header\n\nbody");
    }

    #[test]
    fn append_adds_content_after_existing_trimmed() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a.rs", "body   \n\n");
        let patcher = Patcher::new(dir.path());
        let op = FileOperation::new("a.rs", OperationKind::Append { content: "tail".into() });
        patcher.apply(&op).unwrap();
        assert_eq!(read_file(dir.path(), "a.rs"), "body\n\ntail");
    }

    #[test]
    fn delete_removes_file_and_is_idempotent() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a.rs", "x");
        let patcher = Patcher::new(dir.path());
        let op = FileOperation::new("a.rs", OperationKind::Delete);
        patcher.apply(&op).unwrap();
        assert!(!dir.path().join("a.rs").exists());
        patcher.apply(&op).unwrap();
    }

    #[test]
    fn explicit_search_replace_fields_apply() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a.rs", "fn foo() { old() }");
        let patcher = Patcher::new(dir.path());
        let op = FileOperation::new(
            "a.rs",
            OperationKind::Edit(EditBody {
                content: None,
                search: Some("old()".into()),
                replace: Some("new_impl()".into()),
            }),
        );
        patcher.apply(&op).unwrap();
        assert_eq!(read_file(dir.path(), "a.rs"), "fn foo() { new_impl() }");
    }

    #[test]
    fn embedded_diff_marker_in_content_applies() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a.rs", "line one\nline two\nline three");
        let patcher = Patcher::new(dir.path());
        let content = format!("{SEARCH_MARKER}\nline two\n{DIVIDER}\nline TWO\n{REPLACE_MARKER}");
        let op = FileOperation::new(
            "a.rs",
            OperationKind::Replace(EditBody {
                content: Some(content),
                search: None,
                replace: None,
            }),
        );
        patcher.apply(&op).unwrap();
        assert_eq!(read_file(dir.path(), "a.rs"), "line one\nline TWO\nline three");
    }

    #[test]
    fn line_trimmed_match_applies_when_whitespace_differs() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a.rs", "fn f() {\n    old_call();\n}");
        let patcher = Patcher::new(dir.path());
        let op = FileOperation::new(
            "a.rs",
            OperationKind::Edit(EditBody {
                content: None,
                search: Some("old_call();".into()),
                replace: Some("new_call();".into()),
            }),
        );
        patcher.apply(&op).unwrap();
        assert_eq!(read_file(dir.path(), "a.rs"), "fn f() {\n    new_call();\n}");
    }

    #[test]
    fn search_not_found_is_refused() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a.rs", "nothing matches");
        let patcher = Patcher::new(dir.path());
        let op = FileOperation::new(
            "a.rs",
            OperationKind::Edit(EditBody {
                content: None,
                search: Some("missing".into()),
                replace: Some("x".into()),
            }),
        );
        let err = patcher.apply(&op).unwrap_err();
        assert_eq!(err, PatchError::SearchNotFound);
    }

    #[test]
    fn identical_search_and_replace_is_silently_skipped() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a.rs", "same thing");
        let patcher = Patcher::new(dir.path());
        let op = FileOperation::new(
            "a.rs",
            OperationKind::Edit(EditBody {
                content: None,
                search: Some("same thing".into()),
                replace: Some("same thing".into()),
            }),
        );
        let outcome = patcher.apply(&op).unwrap();
        assert_eq!(outcome, PatchOutcome::SkippedNoop);
        assert_eq!(read_file(dir.path(), "a.rs"), "same thing");
    }

    #[test]
    fn guard_refuses_empty_replace() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a.rs", "keep me");
        let patcher = Patcher::new(dir.path());
        let op = FileOperation::new(
            "a.rs",
            OperationKind::Edit(EditBody {
                content: None,
                search: Some("keep me".into()),
                replace: Some("".into()),
            }),
        );
        let err = patcher.apply(&op).unwrap_err();
        assert_eq!(err, PatchError::DestructiveEditGuard(GuardRefusal::EmptyReplace));
    }

    #[test]
    fn guard_refuses_large_search_shrunk_to_tiny_replace() {
        let dir = tempdir().unwrap();
        let search = "x".repeat(120);
        write_file(dir.path(), "a.rs", &search);
        let patcher = Patcher::new(dir.path());
        let op = FileOperation::new(
            "a.rs",
            OperationKind::Edit(EditBody {
                content: None,
                search: Some(search),
                replace: Some("y".repeat(10)),
            }),
        );
        let err = patcher.apply(&op).unwrap_err();
        assert_eq!(err, PatchError::DestructiveEditGuard(GuardRefusal::LargeSearchShrunkReplace));
    }

    #[test]
    fn block_anchor_fallback_matches_snippet_by_leading_and_trailing_lines() {
        let dir = tempdir().unwrap();
        write_file(
            dir.path(),
            "a.rs",
            "fn f() {\n    let x = 1;\n    let y = 2;\n    old_body();\n}\n",
        );
        let patcher = Patcher::new(dir.path());
        let snippet = "fn f() {\n    let x = 1;\n    let y = 2;\n    new_body();\n}";
        let op = FileOperation::new(
            "a.rs",
            OperationKind::Edit(EditBody {
                content: Some(snippet.into()),
                search: None,
                replace: None,
            }),
        );
        patcher.apply(&op).unwrap();
        assert!(read_file(dir.path(), "a.rs").contains("new_body();"));
    }

    #[test]
    fn multi_write_atomic_persists_all_sub_operations() {
        let dir = tempdir().unwrap();
        let patcher = Patcher::new(dir.path());
        let op = FileOperation::new(
            "",
            OperationKind::MultiWrite {
                atomic: true,
                operations: vec![
                    FileOperation::new("a.rs", OperationKind::Create { content: "a".into() }),
                    FileOperation::new("b.rs", OperationKind::Create { content: "b".into() }),
                ],
            },
        );
        patcher.apply(&op).unwrap();
        assert_eq!(read_file(dir.path(), "a.rs"), "a");
        assert_eq!(read_file(dir.path(), "b.rs"), "b");
    }

    #[test]
    fn multi_write_non_atomic_applies_best_effort() {
        let dir = tempdir().unwrap();
        let patcher = Patcher::new(dir.path());
        let op = FileOperation::new(
            "",
            OperationKind::MultiWrite {
                atomic: false,
                operations: vec![
                    FileOperation::new("a.rs", OperationKind::Create { content: "a".into() }),
                    FileOperation::new(
                        "missing.rs",
                        OperationKind::Edit(EditBody {
                            content: None,
                            search: Some("nope".into()),
                            replace: Some("x".into()),
                        }),
                    ),
                ],
            },
        );
        patcher.apply(&op).unwrap();
        assert_eq!(read_file(dir.path(), "a.rs"), "a");
        assert!(!dir.path().join("missing.rs").exists());
    }

    #[test]
    fn multi_write_atomic_rolls_back_whole_batch_on_failure() {
        let dir = tempdir().unwrap();
        let patcher = Patcher::new(dir.path());
        let op = FileOperation::new(
            "",
            OperationKind::MultiWrite {
                atomic: true,
                operations: vec![
                    FileOperation::new("a.rs", OperationKind::Create { content: "a".into() }),
                    FileOperation::new(
                        "missing.rs",
                        OperationKind::Edit(EditBody {
                            content: None,
                            search: Some("nope".into()),
                            replace: Some("x".into()),
                        }),
                    ),
                ],
            },
        );
        let err = patcher.apply(&op).unwrap_err();
        assert_eq!(err, PatchError::SearchNotFound);
        assert!(!dir.path().join("a.rs").exists());
    }

    #[test]
    fn batch_apply_is_all_or_nothing() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "a.rs", "value here");
        let patcher = Patcher::new(dir.path());
        let good = FileOperation::new("a.rs", OperationKind::Create { content: "written".into() });
        let bad = FileOperation::new(
            "missing.rs",
            OperationKind::Edit(EditBody {
                content: None,
                search: Some("nope".into()),
                replace: Some("x".into()),
            }),
        );
        let err = patcher.apply_batch(&[good, bad]).unwrap_err();
        assert_eq!(err, PatchError::SearchNotFound);
        assert_eq!(read_file(dir.path(), "a.rs"), "value here");
    }
}
