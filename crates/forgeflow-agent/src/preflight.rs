use forgeflow_core::{CancellationToken, ChatMessage, FileOperation, OperationKind};
use forgeflow_llm::{ChatRequest, LlmCollaborator};

const SEARCH_MARKER: &str = "<<<<<<< SEARCH";
const FILE_CONTENT_CAP: usize = 3000;

/// Verifies that an edit-like operation's SEARCH text exists in the target
/// file (exactly, or with per-line whitespace trimming); on mismatch,
/// requests one inline corrective action from the LLM. Applies recursively
/// to `multi_write` sub-operations. Never panics: an unusable correction
/// leaves the original operation untouched, to fail visibly later via the
/// Patcher.
pub fn run_preflight(
    op: FileOperation,
    read_file: &dyn Fn(&str) -> Option<String>,
    llm: &dyn LlmCollaborator,
    cancel: &CancellationToken,
) -> FileOperation {
    if let OperationKind::MultiWrite { atomic, operations } = op.kind {
        let corrected = operations
            .into_iter()
            .map(|sub| run_preflight(sub, read_file, llm, cancel))
            .collect();
        return FileOperation {
            path: op.path,
            description: op.description,
            kind: OperationKind::MultiWrite { atomic, operations: corrected },
        };
    }

    let Some(search) = search_text_of(&op) else {
        return op;
    };

    let existing = read_file(&op.path).unwrap_or_default();
    if matches_search(&existing, &search) {
        return op;
    }

    request_correction(&op, &existing, &search, llm, cancel).unwrap_or(op)
}

fn search_text_of(op: &FileOperation) -> Option<String> {
    let body = match &op.kind {
        OperationKind::Edit(body) | OperationKind::Replace(body) => body,
        _ => return None,
    };
    if let Some(search) = &body.search {
        return Some(search.clone());
    }
    let content = body.content.as_ref()?;
    if !content.contains(SEARCH_MARKER) {
        return None;
    }
    let after = content.split_once(SEARCH_MARKER)?.1;
    let (search, _) = after.split_once("=======")?;
    Some(search.trim_matches('\n').to_string())
}

fn matches_search(existing: &str, search: &str) -> bool {
    if existing.contains(search) {
        return true;
    }
    let search_lines: Vec<&str> = search.lines().map(str::trim).collect();
    if search_lines.is_empty() {
        return false;
    }
    let file_lines: Vec<&str> = existing.lines().map(str::trim).collect();
    if search_lines.len() > file_lines.len() {
        return false;
    }
    file_lines
        .windows(search_lines.len())
        .any(|window| window == search_lines.as_slice())
}

fn request_correction(
    op: &FileOperation,
    existing: &str,
    rejected_search: &str,
    llm: &dyn LlmCollaborator,
    cancel: &CancellationToken,
) -> Option<FileOperation> {
    let truncated: String = existing.chars().take(FILE_CONTENT_CAP).collect();
    let prompt = format!(
        "The following SEARCH text does not appear in `{}`:\n{}\n\nCurrent file content (truncated):\n{}\n\nRespond with a corrected JSON file operation.",
        op.path, rejected_search, truncated
    );
    let request = ChatRequest::new(vec![ChatMessage::User { content: prompt }], cancel.clone());

    let mut text = String::new();
    llm.stream_chat(request, &mut |chunk| text.push_str(chunk)).ok()?;

    let json = forgeflow_diff::extract_balanced_json(&text).ok()?;
    serde_json::from_str(json).ok()
}
