use forgeflow_core::{EditBody, FileOperation, OperationKind};

use crate::sanitize::sanitize;

const FRAME_OPEN: &str = "<<<FILE_OPERATION>>>";
const FRAME_CLOSE: &str = "<<<END_OPERATION>>>";
const SEARCH_MARKER: &str = "<<<<<<< SEARCH";

/// Parses a single LLM response into an ordered list of [`FileOperation`],
/// trying framed blocks, then tool-invoke XML, then the single-block
/// wrapper fallback. Never fails: unparseable input yields an empty list
/// with the caller expected to log a warning.
pub fn parse_operations(raw: &str) -> Vec<FileOperation> {
    let normalized = normalize_html_escapes(raw);

    let mut ops = parse_framed_blocks(&normalized);

    let without_frames = strip_framed_blocks(&normalized);
    let invoke_ops = parse_invoke_blocks(&without_frames);
    ops.extend(invoke_ops);

    if ops.is_empty() {
        ops.extend(parse_single_block_fallback(&normalized));
    }

    for op in ops.iter_mut() {
        sanitize_operation(op);
    }

    post_process(ops)
}

fn normalize_html_escapes(text: &str) -> String {
    text.replace("&lt;", "<").replace("&gt;", ">")
}

fn sanitize_operation(op: &mut FileOperation) {
    match &mut op.kind {
        OperationKind::Create { content }
        | OperationKind::WriteFull { content }
        | OperationKind::Prepend { content }
        | OperationKind::Append { content } => {
            *content = sanitize(content);
        }
        OperationKind::Edit(body) | OperationKind::Replace(body) => {
            if let Some(content) = &mut body.content {
                *content = sanitize(content);
            }
            if let Some(replace) = &mut body.replace {
                *replace = sanitize(replace);
            }
        }
        _ => {}
    }
}

// ── Framed blocks ──

fn parse_framed_blocks(text: &str) -> Vec<FileOperation> {
    let mut ops = Vec::new();
    let mut search_from = 0usize;

    while let Some(rel_start) = text[search_from..].find(FRAME_OPEN) {
        let block_start = search_from + rel_start + FRAME_OPEN.len();
        let rest = &text[block_start..];

        let (body, next_search) = match rest.find(FRAME_CLOSE) {
            Some(rel_close) => (&rest[..rel_close], block_start + rel_close + FRAME_CLOSE.len()),
            None => match rest.find(FRAME_OPEN) {
                Some(rel_next) => (&rest[..rel_next], block_start + rel_next),
                None => (rest, text.len()),
            },
        };

        if let Some(op) = build_operation_from_framed_body(body) {
            ops.push(op);
        }
        search_from = next_search;
    }

    ops
}

fn strip_framed_blocks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut search_from = 0usize;

    loop {
        match text[search_from..].find(FRAME_OPEN) {
            Some(rel_start) => {
                let start = search_from + rel_start;
                out.push_str(&text[search_from..start]);
                let rest = &text[start..];
                match rest.find(FRAME_CLOSE) {
                    Some(rel_close) => {
                        search_from = start + rel_close + FRAME_CLOSE.len();
                    }
                    None => {
                        search_from = text.len();
                        break;
                    }
                }
            }
            None => {
                out.push_str(&text[search_from..]);
                break;
            }
        }
    }

    out
}

const FIELD_LABELS: &[&str] = &["TYPE:", "PATH:", "DESCRIPTION:", "CONTENT:", "SEARCH:", "REPLACE:"];

fn build_operation_from_framed_body(body: &str) -> Option<FileOperation> {
    let fields = parse_labeled_fields(body);

    let type_str = fields.get("TYPE")?.trim().to_lowercase();
    let path = fields.get("PATH")?.trim().to_string();
    let description = fields.get("DESCRIPTION").map(|d| d.trim().to_string());
    let content = fields.get("CONTENT").map(|c| strip_value_fence(c));
    let search = fields.get("SEARCH").map(|c| strip_value_fence(c));
    let replace = fields.get("REPLACE").map(|c| strip_value_fence(c));

    let kind = operation_kind_for(&type_str, content, search, replace)?;
    let mut op = FileOperation::new(path, kind);
    if let Some(desc) = description {
        op = op.with_description(desc);
    }
    Some(op)
}

fn operation_kind_for(
    type_str: &str,
    content: Option<String>,
    search: Option<String>,
    replace: Option<String>,
) -> Option<OperationKind> {
    match type_str {
        "create" => Some(OperationKind::Create { content: content? }),
        "write_full" => Some(OperationKind::WriteFull { content: content? }),
        "prepend" => Some(OperationKind::Prepend { content: content? }),
        "append" => Some(OperationKind::Append { content: content? }),
        "delete" => Some(OperationKind::Delete),
        "read" => Some(OperationKind::Read),
        "edit" => Some(OperationKind::Edit(EditBody { content, search, replace })),
        "replace" => Some(OperationKind::Replace(EditBody { content, search, replace })),
        _ => None,
    }
}

fn parse_labeled_fields(body: &str) -> std::collections::BTreeMap<&'static str, String> {
    let mut fields: std::collections::BTreeMap<&'static str, String> = std::collections::BTreeMap::new();
    let mut current: Option<&'static str> = None;
    let mut buffer = String::new();

    for line in body.lines() {
        if let Some((label, inline_value)) = match_field_label(line) {
            if let Some(key) = current.take() {
                fields.insert(key, std::mem::take(&mut buffer));
            }
            current = Some(label);
            buffer.clear();
            if !inline_value.is_empty() {
                buffer.push_str(inline_value);
            }
        } else if current.is_some() {
            if !buffer.is_empty() {
                buffer.push('\n');
            }
            buffer.push_str(line);
        }
    }
    if let Some(key) = current.take() {
        fields.insert(key, buffer);
    }

    fields
}

fn match_field_label(line: &str) -> Option<(&'static str, &str)> {
    let trimmed = line.trim_start();
    for label in FIELD_LABELS {
        if trimmed.starts_with(label) {
            let key: &'static str = label.trim_end_matches(':');
            let value = trimmed[label.len()..].trim_start();
            return Some((key, value));
        }
    }
    None
}

fn strip_value_fence(value: &str) -> String {
    let lines: Vec<&str> = value.lines().collect();
    if lines.is_empty() {
        return value.trim().to_string();
    }

    let first_non_blank = lines.iter().position(|l| !l.trim().is_empty());
    let Some(first_idx) = first_non_blank else {
        return String::new();
    };
    if !lines[first_idx].trim_start().starts_with("```") {
        return value.trim_matches('\n').to_string();
    }

    let last_non_blank = lines.iter().rposition(|l| !l.trim().is_empty()).unwrap_or(first_idx);
    if last_non_blank > first_idx && lines[last_non_blank].trim() == "```" {
        lines[first_idx + 1..last_non_blank].join("\n")
    } else {
        lines[first_idx + 1..].join("\n")
    }
}

// ── Tool-invoke XML ──

fn parse_invoke_blocks(text: &str) -> Vec<FileOperation> {
    let mut ops = Vec::new();
    let mut search_from = 0usize;

    while let Some(rel_start) = text[search_from..].find("<invoke ") {
        let start = search_from + rel_start;
        let Some(rel_name_end) = text[start..].find('>') else {
            break;
        };
        let open_tag = &text[start..start + rel_name_end + 1];
        let Some(name) = extract_attr(open_tag, "name") else {
            search_from = start + rel_name_end + 1;
            continue;
        };

        let body_start = start + rel_name_end + 1;
        let Some(rel_end) = text[body_start..].find("</invoke>") else {
            break;
        };
        let body = &text[body_start..body_start + rel_end];

        if let Some(op) = build_operation_from_invoke(&name, body) {
            ops.push(op);
        }
        search_from = body_start + rel_end + "</invoke>".len();
    }

    ops
}

fn extract_attr(tag: &str, attr: &str) -> Option<String> {
    let needle = format!("{attr}=\"");
    let start = tag.find(&needle)? + needle.len();
    let end = tag[start..].find('"')? + start;
    Some(tag[start..end].to_string())
}

fn build_operation_from_invoke(name: &str, body: &str) -> Option<FileOperation> {
    let params = parse_parameters(body);
    let path = params.get("path")?.clone();
    let description = params.get("description").cloned();

    let content = params
        .get("content")
        .or_else(|| params.get("CONTENT"))
        .or_else(|| params.get("diff"))
        .cloned();
    let search = params
        .get("search")
        .or_else(|| params.get("search_text"))
        .cloned();
    let replace = params
        .get("replace")
        .or_else(|| params.get("replace_text"))
        .cloned();

    let kind = match name {
        "write_to_file" => OperationKind::WriteFull { content: content? },
        "replace_in_file" => OperationKind::Replace(EditBody { content, search, replace }),
        "edit" => OperationKind::Edit(EditBody { content, search, replace }),
        "prepend" => OperationKind::Prepend { content: content? },
        "append" => OperationKind::Append { content: content? },
        _ => return None,
    };

    let mut op = FileOperation::new(path, kind);
    if let Some(desc) = description {
        op = op.with_description(desc);
    }
    Some(op)
}

fn parse_parameters(body: &str) -> std::collections::BTreeMap<String, String> {
    let mut params = std::collections::BTreeMap::new();
    let mut search_from = 0usize;

    while let Some(rel_start) = body[search_from..].find("<parameter ") {
        let start = search_from + rel_start;
        let Some(rel_tag_end) = body[start..].find('>') else {
            break;
        };
        let open_tag = &body[start..start + rel_tag_end + 1];
        let Some(name) = extract_attr(open_tag, "name") else {
            search_from = start + rel_tag_end + 1;
            continue;
        };
        let value_start = start + rel_tag_end + 1;
        let Some(rel_end) = body[value_start..].find("</parameter>") else {
            break;
        };
        let value = body[value_start..value_start + rel_end].trim().to_string();
        params.insert(name, value);
        search_from = value_start + rel_end + "</parameter>".len();
    }

    params
}

// ── Single-block wrapper fallback ──

fn parse_single_block_fallback(text: &str) -> Vec<FileOperation> {
    let mut search_from = 0usize;
    while let Some(rel_start) = text[search_from..].find("```") {
        let fence_start = search_from + rel_start;
        let content_start = fence_start + 3;
        let line_end = text[content_start..].find('\n').map(|i| content_start + i + 1).unwrap_or(content_start);
        let Some(rel_close) = text[line_end..].find("```") else {
            break;
        };
        let inner = &text[line_end..line_end + rel_close];
        if inner.contains("<invoke name=\"edit\"") {
            return parse_invoke_blocks(inner);
        }
        search_from = line_end + rel_close + 3;
    }
    Vec::new()
}

// ── Post-processing ──

fn post_process(ops: Vec<FileOperation>) -> Vec<FileOperation> {
    let ops = remove_exact_duplicates(ops);
    let ops = apply_write_full_subsumes(ops);
    merge_edits_per_path(ops)
}

fn remove_exact_duplicates(ops: Vec<FileOperation>) -> Vec<FileOperation> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(ops.len());
    for op in ops {
        if seen.insert(op.dedup_key()) {
            out.push(op);
        }
    }
    out
}

fn apply_write_full_subsumes(ops: Vec<FileOperation>) -> Vec<FileOperation> {
    let write_full_paths: std::collections::HashSet<&str> = ops
        .iter()
        .filter(|op| op.is_write_full())
        .map(|op| op.path.as_str())
        .collect();

    if write_full_paths.is_empty() {
        return ops;
    }

    ops.into_iter()
        .filter(|op| op.is_write_full() || !write_full_paths.contains(op.path.as_str()))
        .collect()
}

fn merge_edits_per_path(ops: Vec<FileOperation>) -> Vec<FileOperation> {
    let mut edit_paths: std::collections::BTreeMap<String, Vec<usize>> = std::collections::BTreeMap::new();
    for (idx, op) in ops.iter().enumerate() {
        if op.is_edit_like() {
            edit_paths.entry(op.path.clone()).or_default().push(idx);
        }
    }

    let to_merge: Vec<(String, Vec<usize>)> = edit_paths.into_iter().filter(|(_, idxs)| idxs.len() > 1).collect();
    if to_merge.is_empty() {
        return ops;
    }

    let mut merged_indices: std::collections::HashSet<usize> = std::collections::HashSet::new();
    let mut replacements: Vec<(usize, FileOperation)> = Vec::new();

    for (path, idxs) in &to_merge {
        let mut snippet = String::new();
        for &idx in idxs {
            let body = match &ops[idx].kind {
                OperationKind::Edit(b) | OperationKind::Replace(b) => b,
                _ => continue,
            };
            snippet.push_str(&diff_block_for(body));
            snippet.push('\n');
            merged_indices.insert(idx);
        }
        let merged_op = FileOperation::new(
            path.clone(),
            OperationKind::Replace(EditBody {
                content: Some(snippet.trim_end().to_string()),
                search: None,
                replace: None,
            }),
        );
        replacements.push((idxs[0], merged_op));
    }

    let replace_at: std::collections::BTreeMap<usize, FileOperation> = replacements.into_iter().collect();

    ops.into_iter()
        .enumerate()
        .filter_map(|(idx, op)| {
            if let Some(replacement) = replace_at.get(&idx) {
                Some(replacement.clone())
            } else if merged_indices.contains(&idx) {
                None
            } else {
                Some(op)
            }
        })
        .collect()
}

fn diff_block_for(body: &EditBody) -> String {
    if let Some(content) = &body.content {
        if content.contains(SEARCH_MARKER) {
            return content.clone();
        }
    }
    let search = body.search.clone().unwrap_or_default();
    let replace = body.replace.clone().unwrap_or_default();
    format!("{SEARCH_MARKER}\n{search}\n=======\n{replace}\n>>>>>>> REPLACE")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_framed_create_block() {
        let text = "<<<FILE_OPERATION>>>\nTYPE: create\nPATH: a.rs\nDESCRIPTION: new file\nCONTENT:\nfn main() {}\n<<<END_OPERATION>>>";
        let ops = parse_operations(text);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].path, "a.rs");
        match &ops[0].kind {
            OperationKind::Create { content } => assert_eq!(content, "fn main() {}"),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn parses_framed_edit_block_with_fenced_search_replace() {
        let text = "<<<FILE_OPERATION>>>\nTYPE: edit\nPATH: a.rs\nSEARCH:\n```\nfoo\n```\nREPLACE:\n```\nbar\n```\n<<<END_OPERATION>>>";
        let ops = parse_operations(text);
        assert_eq!(ops.len(), 1);
        match &ops[0].kind {
            OperationKind::Edit(body) => {
                assert_eq!(body.search.as_deref(), Some("foo"));
                assert_eq!(body.replace.as_deref(), Some("bar"));
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn missing_close_marker_extends_to_next_open() {
        let text = "<<<FILE_OPERATION>>>\nTYPE: create\nPATH: a.rs\nCONTENT:\nhello\n<<<FILE_OPERATION>>>\nTYPE: create\nPATH: b.rs\nCONTENT:\nworld\n<<<END_OPERATION>>>";
        let ops = parse_operations(text);
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].path, "a.rs");
        assert_eq!(ops[1].path, "b.rs");
    }

    #[test]
    fn parses_invoke_xml_dialect() {
        let text = r#"<invoke name="write_to_file"><parameter name="path">a.rs</parameter><parameter name="content">fn main() {}</parameter></invoke>"#;
        let ops = parse_operations(text);
        assert_eq!(ops.len(), 1);
        match &ops[0].kind {
            OperationKind::WriteFull { content } => assert_eq!(content, "fn main() {}"),
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn html_escaped_invoke_tags_are_normalized() {
        let text = "&lt;invoke name=&quot;edit&quot;&gt;".replace("&quot;", "\"");
        let normalized = normalize_html_escapes(&text);
        assert!(normalized.starts_with("<invoke"));
    }

    #[test]
    fn framed_blocks_are_not_double_parsed_by_invoke_parser() {
        let text = "<<<FILE_OPERATION>>>\nTYPE: create\nPATH: a.rs\nCONTENT:\n<invoke name=\"edit\">nonsense</invoke>\n<<<END_OPERATION>>>";
        let ops = parse_operations(text);
        assert_eq!(ops.len(), 1);
    }

    #[test]
    fn single_block_wrapper_fallback_parses_wrapped_invoke() {
        let text = "```\n<invoke name=\"edit\"><parameter name=\"path\">a.rs</parameter><parameter name=\"search\">foo</parameter><parameter name=\"replace\">bar</parameter></invoke>\n```";
        let ops = parse_operations(text);
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].path, "a.rs");
    }

    #[test]
    fn exact_duplicates_collapse_to_one() {
        let text = "<<<FILE_OPERATION>>>\nTYPE: create\nPATH: a.rs\nCONTENT:\nx\n<<<END_OPERATION>>>\n<<<FILE_OPERATION>>>\nTYPE: create\nPATH: a.rs\nCONTENT:\nx\n<<<END_OPERATION>>>";
        let ops = parse_operations(text);
        assert_eq!(ops.len(), 1);
    }

    #[test]
    fn write_full_subsumes_other_ops_on_same_path() {
        let text = "<<<FILE_OPERATION>>>\nTYPE: edit\nPATH: a.rs\nSEARCH:\nfoo\nREPLACE:\nbar\n<<<END_OPERATION>>>\n<<<FILE_OPERATION>>>\nTYPE: write_full\nPATH: a.rs\nCONTENT:\nall new\n<<<END_OPERATION>>>";
        let ops = parse_operations(text);
        assert_eq!(ops.len(), 1);
        assert!(ops[0].is_write_full());
    }

    #[test]
    fn multiple_edits_on_one_path_merge_into_single_replace() {
        let text = "<<<FILE_OPERATION>>>\nTYPE: edit\nPATH: a.rs\nSEARCH:\nfoo\nREPLACE:\nbar\n<<<END_OPERATION>>>\n<<<FILE_OPERATION>>>\nTYPE: edit\nPATH: a.rs\nSEARCH:\nbaz\nREPLACE:\nqux\n<<<END_OPERATION>>>";
        let ops = parse_operations(text);
        assert_eq!(ops.len(), 1);
        match &ops[0].kind {
            OperationKind::Replace(body) => {
                let content = body.content.as_ref().unwrap();
                assert!(content.contains("foo"));
                assert!(content.contains("bar"));
                assert!(content.contains("baz"));
                assert!(content.contains("qux"));
                assert_eq!(content.matches(SEARCH_MARKER).count(), 2);
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn unparseable_text_yields_empty_list() {
        assert!(parse_operations("just some prose with no operations").is_empty());
    }
}
