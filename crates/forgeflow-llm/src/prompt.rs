/// Response-format contract the engine expects for a given handler phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    /// Planning handler: the LLM must answer with a markdown checklist only.
    Planning,
    /// Executing/Fixing/Reflecting/etc: the LLM must answer with JSON only.
    Action,
}

const DELIMITER_SPEC: &str = "<<<<<<< SEARCH\n…\n=======\n…\n>>>>>>> REPLACE";

/// Builds the system message prepended to every LLM call, unless the caller
/// supplies a role-specific `override_prompt` (reviewer/critic role prompts
/// bypass this entirely).
pub fn system_prompt(mode: PromptMode, override_prompt: Option<&str>) -> String {
    if let Some(custom) = override_prompt {
        return custom.to_string();
    }

    let mut prompt = String::from(
        "You are a coding agent. Never emit tool-call blocks of any kind. \
         Do not wrap responses in XML invoke tags. ",
    );

    match mode {
        PromptMode::Planning => {
            prompt.push_str(
                "Respond with a markdown checklist only, one step per line, \
                 using the exact form `- [ ] <description>`. Do not include \
                 any JSON, code fences around the whole list, or prose \
                 outside the checklist. A step description may end with a \
                 `[depends: step-N, step-M]` hint to declare dependencies.",
            );
        }
        PromptMode::Action => {
            prompt.push_str(
                "Respond with JSON only, no prose before or after. When \
                 proposing an edit, use the exact 7-character delimiters ",
            );
            prompt.push_str(DELIMITER_SPEC);
            prompt.push_str(
                " to bound the existing text to search for and its \
                 replacement. Never truncate the delimiter lines.",
            );
        }
    }

    prompt
}

/// Strips `<think>…</think>` and `[TOOL_CALL]…[/TOOL_CALL]` spans from a
/// chunk of assistant text, returning the visible text. Unterminated spans
/// run to the end of the input, matching the parser's framed-block
/// tolerance for a missing close marker.
pub fn strip_hidden_spans(text: &str) -> String {
    let text = strip_between(text, "<think>", "</think>");
    strip_between(&text, "[TOOL_CALL]", "[/TOOL_CALL]")
}

fn strip_between(text: &str, open: &str, close: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        match rest.find(open) {
            Some(start) => {
                out.push_str(&rest[..start]);
                let after_open = &rest[start + open.len()..];
                match after_open.find(close) {
                    Some(end) => {
                        rest = &after_open[end + close.len()..];
                    }
                    None => {
                        rest = "";
                        break;
                    }
                }
            }
            None => {
                out.push_str(rest);
                break;
            }
        }
    }
    out
}
