//! Turns raw model output into directly executable source text.
//!
//! Models frequently wrap code in a markdown fence, sometimes with a
//! language hint (` ```js `, ` ```strudel `). Only fences that open or close
//! the whole reply are removed; fences in the middle of the text are content.

const FENCE: &str = "```";

/// Strip surrounding whitespace and an enclosing code fence.
///
/// Stripping repeats until nothing changes, so the result is stable under a
/// second application.
pub fn sanitize(raw: &str) -> String {
    let mut text = raw.trim();
    loop {
        let stripped = strip_closing_fence(strip_opening_fence(text)).trim();
        if stripped.len() == text.len() {
            break;
        }
        text = stripped;
    }
    text.to_string()
}

fn is_hint_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+' | '.' | '#')
}

fn strip_newline(text: &str) -> Option<&str> {
    text.strip_prefix("\r\n").or_else(|| text.strip_prefix('\n'))
}

fn strip_opening_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix(FENCE) else {
        return text;
    };
    let hint_len = rest.find(|c: char| !is_hint_char(c)).unwrap_or(rest.len());
    let after_hint = &rest[hint_len..];
    let after_blank = after_hint.trim_start_matches([' ', '\t']);
    if after_blank.is_empty() {
        return after_blank;
    }
    if let Some(body) = strip_newline(after_blank) {
        return body;
    }
    // A hint separated from code by blanks is still a hint.
    if hint_len > 0 && after_blank.len() < after_hint.len() {
        return after_blank;
    }
    // A token running straight into other characters is code.
    strip_newline(rest).unwrap_or(rest)
}

fn strip_closing_fence(text: &str) -> &str {
    let Some(body) = text.strip_suffix(FENCE) else {
        return text;
    };
    match body.strip_suffix('\n') {
        Some(body) => body.strip_suffix('\r').unwrap_or(body),
        None => body,
    }
}
