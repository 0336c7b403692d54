/// Runs the three idempotent sanitization passes over edit content, in
/// order: auto-execution stripper, trailing-fence stripper, control-
/// character stripper. `sanitize(sanitize(x)) == sanitize(x)` for all `x`.
pub fn sanitize(text: &str) -> String {
    let stripped = strip_auto_execution(text);
    let stripped = strip_trailing_fence(&stripped);
    strip_control_characters(&stripped)
}

/// Strips trailing self-invocations LLMs append to test files: bare
/// `run();`/`main();` lines, `if __name__ == "__main__":` footers,
/// `if require.main === module` footers, and IIFE test-runner tails that
/// contain a `console.` announcement.
fn strip_auto_execution(text: &str) -> String {
    let mut lines: Vec<&str> = text.lines().collect();

    trim_trailing_blank(&mut lines);
    while let Some(last) = lines.last() {
        let trimmed = last.trim();
        if trimmed == "run();" || trimmed == "main();" {
            lines.pop();
            trim_trailing_blank(&mut lines);
            continue;
        }
        break;
    }

    if let Some(idx) = lines
        .iter()
        .position(|l| l.trim_start().starts_with("if __name__ == \"__main__\":"))
    {
        lines.truncate(idx);
    }
    if let Some(idx) = lines
        .iter()
        .position(|l| l.trim_start().starts_with("if require.main === module"))
    {
        lines.truncate(idx);
    }

    trim_trailing_blank(&mut lines);
    if let Some(idx) = trailing_iife_announcement_start(&lines) {
        lines.truncate(idx);
        trim_trailing_blank(&mut lines);
    }

    reassemble(&lines, text.ends_with('\n'))
}

fn trim_trailing_blank(lines: &mut Vec<&str>) {
    while matches!(lines.last(), Some(l) if l.trim().is_empty()) {
        lines.pop();
    }
}

/// Finds the start of a trailing anonymous IIFE block that contains a
/// `console.` call, e.g. `(function () { … console.log(...) … })();` or
/// `(() => { … })();` appended after real code.
fn trailing_iife_announcement_start(lines: &[&str]) -> Option<usize> {
    let start = lines.iter().rposition(|l| {
        let t = l.trim_start();
        t.starts_with("(function") || t.starts_with("(async function") || t.starts_with("(() =>")
    })?;
    let tail = &lines[start..];
    if tail.iter().any(|l| l.contains("console.")) {
        Some(start)
    } else {
        None
    }
}

/// Removes a dangling closing code fence (a line of three or more
/// backticks) that leaked outside its proper block.
fn strip_trailing_fence(text: &str) -> String {
    let mut lines: Vec<&str> = text.lines().collect();
    trim_trailing_blank(&mut lines);
    if matches!(lines.last(), Some(l) if is_fence_line(l)) {
        lines.pop();
        trim_trailing_blank(&mut lines);
    }
    reassemble(&lines, text.ends_with('\n'))
}

fn is_fence_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= 3 && trimmed.chars().all(|c| c == '`')
}

/// Removes the literal `<ctrlNN>` artifact, C0 control bytes other than
/// tab/LF/CR, and collapses runs of 3+ blank lines to 2.
fn strip_control_characters(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '<' {
            if let Some(end) = match_ctrl_tag(&chars[i..]) {
                i += end;
                continue;
            }
        }
        let c = chars[i];
        let is_c0 = (c as u32) < 0x20 && c != '\t' && c != '\n' && c != '\r';
        if !is_c0 {
            out.push(c);
        }
        i += 1;
    }
    collapse_blank_runs(&out)
}

/// If `chars` starts with `<ctrl` followed by one or more ASCII digits and a
/// closing `>`, returns the length of the matched tag.
fn match_ctrl_tag(chars: &[char]) -> Option<usize> {
    let prefix = "<ctrl";
    if chars.len() < prefix.len() {
        return None;
    }
    for (i, expected) in prefix.chars().enumerate() {
        if chars[i] != expected {
            return None;
        }
    }
    let mut idx = prefix.len();
    let digit_start = idx;
    while idx < chars.len() && chars[idx].is_ascii_digit() {
        idx += 1;
    }
    if idx == digit_start {
        return None;
    }
    if idx < chars.len() && chars[idx] == '>' {
        Some(idx + 1)
    } else {
        None
    }
}

fn collapse_blank_runs(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut out_lines: Vec<&str> = Vec::with_capacity(lines.len());
    let mut blank_run = 0;
    for line in &lines {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run <= 2 {
                out_lines.push(line);
            }
        } else {
            blank_run = 0;
            out_lines.push(line);
        }
    }
    out_lines.join("\n")
}

fn reassemble(lines: &[&str], had_trailing_newline: bool) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut result = lines.join("\n");
    if had_trailing_newline {
        result.push('\n');
    }
    result
}
