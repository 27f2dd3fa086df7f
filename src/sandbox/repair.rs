//! Fixes the usual damage in agent-written fragments: JSON-escaped
//! newlines and quotes, markdown fences, and the target key written where
//! the `ids` binding belongs.

/// Name the target's resolved handles are bound to.
pub const IDS_BINDING: &str = "ids";

fn unescape_transport(code: &str) -> String {
    // Only a fragment with no real line breaks was escaped in transit.
    if code.contains('\n') || !code.contains("\\n") {
        return code.to_string();
    }
    code.replace("\\n", "\n")
        .replace("\\t", "\t")
        .replace("\\\"", "\"")
}

fn strip_fences(code: &str) -> String {
    let trimmed = code.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // Drop the info string (```rust, ```csharp).
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
        .to_string()
}

fn is_ident_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

/// Replaces whole-token occurrences of `key` outside string literals.
fn replace_key(code: &str, key: &str) -> String {
    if key.is_empty() {
        return code.to_string();
    }
    let mut out = String::with_capacity(code.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut rest = code;
    while let Some(ch) = rest.chars().next() {
        if in_string {
            out.push(ch);
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            rest = &rest[ch.len_utf8()..];
            continue;
        }
        if ch == '"' {
            in_string = true;
        } else if let Some(after) = rest.strip_prefix(key) {
            let before_ok = !out.chars().last().is_some_and(is_ident_char)
                || !key.starts_with(is_ident_char);
            let after_ok = !after.chars().next().is_some_and(is_ident_char);
            if before_ok && after_ok {
                out.push_str(IDS_BINDING);
                rest = after;
                continue;
            }
        }
        out.push(ch);
        rest = &rest[ch.len_utf8()..];
    }
    out
}

pub fn repair_fragment(code: &str, target_key: Option<&str>) -> String {
    let code = strip_fences(&unescape_transport(code));
    match target_key.map(str::trim).filter(|key| !key.is_empty()) {
        Some(key) if key != IDS_BINDING => replace_key(&code, key),
        _ => code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escaped_newlines_and_quotes_are_restored() {
        let repaired = repair_fragment(r#"let a = \"x\";\nreport(a);"#, None);
        assert_eq!(repaired, "let a = \"x\";\nreport(a);");
    }

    #[test]
    fn real_newlines_keep_escapes_inside_strings() {
        let source = "report(\"a\\nb\");\nreport(1);";
        assert_eq!(repair_fragment(source, None), source);
    }

    #[test]
    fn fences_with_language_tags_are_stripped() {
        assert_eq!(
            repair_fragment("```csharp\nreport(1);\n```", None),
            "report(1);"
        );
    }

    #[test]
    fn target_key_becomes_ids_only_as_a_whole_token() {
        let repaired = repair_fragment(
            "move($q1, 1ft); report($q10); report(\"$q1\");",
            Some("$q1"),
        );
        assert_eq!(repaired, "move(ids, 1ft); report($q10); report(\"$q1\");");
    }

    #[test]
    fn plain_keys_respect_identifier_boundaries() {
        let repaired = repair_fragment("walls = walls_b;", Some("walls"));
        assert_eq!(repaired, "ids = walls_b;");
    }
}
