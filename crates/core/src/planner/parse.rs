//! Brace-balanced, string-aware scanning of free-form LLM text for
//! JSON object candidates. The most bug-prone piece of the planner:
//! must ignore braces inside quoted strings, respect backslash
//! escapes, and strip trailing commas before parsing.

/// Scans `text` for every syntactically balanced `{...}` span,
/// returning each span verbatim (braces inside single- or
/// double-quoted strings do not count, and a backslash escapes the
/// next character within a string). Candidates are returned in the
/// order they start.
pub fn extract_json_candidates(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut candidates = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '{' {
            if let Some(end) = find_matching_brace(&chars, i) {
                let candidate: String = chars[i..=end].iter().collect();
                candidates.push(candidate);
                i = end + 1;
                continue;
            }
        }
        i += 1;
    }

    candidates
}

fn find_matching_brace(chars: &[char], start: usize) -> Option<usize> {
    let mut depth: i32 = 0;
    let mut in_string: Option<char> = None;
    let mut escaped = false;

    for (idx, &c) in chars.iter().enumerate().skip(start) {
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
            continue;
        }

        match c {
            '"' | '\'' => in_string = Some(c),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Strips trailing commas before a closing `}` or `]`, so
/// near-miss JSON from an LLM still parses. Only commas outside
/// strings are touched.
pub fn strip_trailing_commas(json_text: &str) -> String {
    let chars: Vec<char> = json_text.chars().collect();
    let mut out = String::with_capacity(json_text.len());
    let mut in_string: Option<char> = None;
    let mut escaped = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if let Some(quote) = in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
            i += 1;
            continue;
        }

        match c {
            '"' | '\'' => {
                in_string = Some(c);
                out.push(c);
            }
            ',' => {
                // Lookahead past whitespace for a closing bracket.
                let mut j = i + 1;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                    // drop the comma
                } else {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
        i += 1;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_single_object() {
        let text = "here is the plan: {\"route\": \"data_presenter\"} thanks";
        let candidates = extract_json_candidates(text);
        assert_eq!(candidates, vec!["{\"route\": \"data_presenter\"}"]);
    }

    #[test]
    fn ignores_braces_inside_strings() {
        let text = r#"{"notes": "use { and } carefully", "route": "x"}"#;
        let candidates = extract_json_candidates(text);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0], text);
    }

    #[test]
    fn handles_escaped_quotes_inside_strings() {
        let text = r#"{"notes": "she said \"ok { fine }\"", "route": "x"}"#;
        let candidates = extract_json_candidates(text);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0], text);
    }

    #[test]
    fn finds_multiple_disjoint_candidates() {
        let text = "maybe {\"a\":1} or {\"b\":2}";
        let candidates = extract_json_candidates(text);
        assert_eq!(candidates, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn strips_trailing_comma_before_brace() {
        let text = r#"{"a":1,"b":2,}"#;
        assert_eq!(strip_trailing_commas(text), r#"{"a":1,"b":2}"#);
    }

    #[test]
    fn strips_trailing_comma_before_bracket() {
        let text = r#"{"steps":[1,2,],}"#;
        assert_eq!(strip_trailing_commas(text), r#"{"steps":[1,2]}"#);
    }

    #[test]
    fn leaves_commas_inside_strings_alone() {
        let text = r#"{"note": "a, b,"}"#;
        assert_eq!(strip_trailing_commas(text), text);
    }

    #[test]
    fn unbalanced_braces_yield_no_candidate() {
        let text = "{\"route\": \"x\"";
        assert!(extract_json_candidates(text).is_empty());
    }
}
