/// Error raised when no balanced JSON object can be found.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("no balanced JSON object found")]
    NotFound,
}

/// Returns the substring spanning the outermost balanced `{…}` object in
/// `text`, tracking string and escape state so that braces inside string
/// literals (common in LLM JSON carrying embedded code) do not confuse the
/// brace counter.
pub fn extract_balanced_json(text: &str) -> Result<&str, ExtractError> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(|&b| b == b'{').ok_or(ExtractError::NotFound)?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return Ok(&text[start..end]);
                }
            }
            _ => {}
        }
    }

    Err(ExtractError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_simple_object() {
        let text = "prefix {\"a\": 1} suffix";
        assert_eq!(extract_balanced_json(text).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn braces_inside_strings_do_not_count() {
        let text = r#"noise {"code": "fn f() { return 1; }"} trailer"#;
        let extracted = extract_balanced_json(text).unwrap();
        assert_eq!(extracted, r#"{"code": "fn f() { return 1; }"}"#);
    }

    #[test]
    fn escaped_quote_inside_string_does_not_close_it() {
        let text = r#"{"msg": "say \"hi\" please"}"#;
        assert_eq!(extract_balanced_json(text).unwrap(), text);
    }

    #[test]
    fn no_open_brace_is_not_found() {
        assert_eq!(extract_balanced_json("no json here").unwrap_err(), ExtractError::NotFound);
    }

    #[test]
    fn unbalanced_object_is_not_found() {
        assert_eq!(
            extract_balanced_json("prefix {\"a\": 1 unterminated").unwrap_err(),
            ExtractError::NotFound
        );
    }

    #[test]
    fn nested_objects_resolve_to_outermost() {
        let text = r#"{"a": {"b": {"c": 1}}} tail"#;
        assert_eq!(extract_balanced_json(text).unwrap(), r#"{"a": {"b": {"c": 1}}}"#);
    }

    #[test]
    fn picks_first_balanced_object_when_multiple_present() {
        let text = r#"{"first": 1} and then {"second": 2}"#;
        assert_eq!(extract_balanced_json(text).unwrap(), r#"{"first": 1}"#);
    }
}
