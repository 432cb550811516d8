//! Recover the JSON payload from free-form model output
//!
//! Models wrap JSON in markdown fences or surround it with commentary
//! ("Here is my analysis: {...} Let me know..."). `clean_markdown_wrapper`
//! peels that away without ever failing; the JSON decoder downstream
//! reports the real error when nothing usable was found.

/// Extract the JSON substring embedded in `raw`
pub fn clean_markdown_wrapper(raw: &str) -> &str {
    let content = raw.trim();

    if let Some(inner) = strip_code_fence(content) {
        return inner;
    }

    let Some(start) = content.find(['{', '[']) else {
        return content;
    };

    match balanced_end(&content[start..]) {
        Some(end) => &content[start..start + end],
        None => content,
    }
}

/// Inner content of a fenced block that spans the whole text
fn strip_code_fence(content: &str) -> Option<&str> {
    let rest = content.strip_prefix("```")?;
    let body = rest.strip_suffix("```")?;
    // Drop the language tag (```json) along with the rest of the opening line
    let body = match body.find('\n') {
        Some(newline) => &body[newline + 1..],
        None => strip_language_tag(body),
    };
    Some(body.trim())
}

/// Leading tag of a single-line fence body (```json {...}```)
fn strip_language_tag(body: &str) -> &str {
    let body = body.trim_start();
    let tag_len = body
        .find(|c: char| !c.is_ascii_alphanumeric() && c != '_' && c != '-')
        .unwrap_or(body.len());
    match body[tag_len..].trim_start() {
        rest if tag_len > 0 && rest.starts_with(['{', '[']) => rest,
        _ => body,
    }
}

/// Byte length of the balanced JSON value at the start of `text`
///
/// Tracks brace/bracket depth outside string literals and honors escapes,
/// so braces inside quoted values are ignored.
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth: usize = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + c.len_utf8());
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_fence_drops_tag() {
        assert_eq!(clean_markdown_wrapper("```json {\"a\":1}```"), r#"{"a":1}"#);
        assert_eq!(clean_markdown_wrapper("```{\"a\":1}```"), r#"{"a":1}"#);
        assert_eq!(clean_markdown_wrapper("``` [1, 2] ```"), "[1, 2]");
    }

    #[test]
    fn test_bare_json_unchanged() {
        let json = r#"{"rankings":[{"category":"Dining","score":0.9}]}"#;
        assert_eq!(clean_markdown_wrapper(json), json);
        let array = r#"[{"path":"a","value":1}]"#;
        assert_eq!(clean_markdown_wrapper(array), array);
    }

    #[test]
    fn test_json_fence() {
        assert_eq!(clean_markdown_wrapper("```json\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn test_generic_fence() {
        assert_eq!(clean_markdown_wrapper("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(
            clean_markdown_wrapper("  \n```json\n  {\"a\": [1, 2]}  \n```\n\n"),
            "{\"a\": [1, 2]}"
        );
    }

    #[test]
    fn test_prose_around_json() {
        assert_eq!(
            clean_markdown_wrapper("Here you go:\n{\"a\":1}\nThanks."),
            "{\"a\":1}"
        );
    }

    #[test]
    fn test_prose_with_nested_object() {
        let raw = "Here you go:\n{\"a\":{\"b\":{\"c\":1}},\"d\":2}\nThanks.";
        assert_eq!(clean_markdown_wrapper(raw), "{\"a\":{\"b\":{\"c\":1}},\"d\":2}");
    }

    #[test]
    fn test_escaped_quote_and_braces_in_string() {
        let raw = r#"Analysis: {"note":"she said \"hi}\" then [left","n":1} trailing }"#;
        assert_eq!(
            clean_markdown_wrapper(raw),
            r#"{"note":"she said \"hi}\" then [left","n":1}"#
        );
    }

    #[test]
    fn test_array_before_object() {
        let raw = "Patches: [{\"path\":\"a\"}] and {\"x\":1}";
        assert_eq!(clean_markdown_wrapper(raw), "[{\"path\":\"a\"}]");
    }

    #[test]
    fn test_unbalanced_falls_through() {
        let raw = "Result: {\"a\": {\"b\": 1}";
        assert_eq!(clean_markdown_wrapper(raw), raw);
    }

    #[test]
    fn test_no_json_returns_input() {
        assert_eq!(clean_markdown_wrapper("  no json here  "), "no json here");
    }

    #[test]
    fn test_fence_with_prose_after_is_scanned() {
        // Not a whole-text fence, so the scanner finds the object
        let raw = "```json\n{\"a\":1}\n```\nHope this helps!";
        assert_eq!(clean_markdown_wrapper(raw), "{\"a\":1}");
    }

    #[test]
    fn test_unicode_content() {
        let raw = "Résumé → {\"merchant\":\"Café Olé\"} ✓";
        assert_eq!(clean_markdown_wrapper(raw), "{\"merchant\":\"Café Olé\"}");
    }
}
