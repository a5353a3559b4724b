//! Pull a single JSON object out of free-form completion text
//!
//! Completion answers often wrap JSON in a markdown fence or surround it
//! with prose. Extraction:
//! 1. Trim; drop a leading ```` ```json ```` / ```` ``` ```` fence and cut at the last fence
//! 2. Find the first `{`
//! 3. Decode exactly one JSON value from there with serde_json's streaming
//!    deserializer, so braces inside string literals never truncate the object
//! 4. Decode failure: return everything from the first `{`
//! 5. No `{`: return the trimmed text

use serde::de::IgnoredAny;

pub fn extract_json(response: &str) -> &str {
    let text = strip_code_fence(response.trim());

    let Some(start) = text.find('{') else {
        return text;
    };
    let candidate = &text[start..];

    let mut stream = serde_json::Deserializer::from_str(candidate).into_iter::<IgnoredAny>();
    match stream.next() {
        Some(Ok(_)) => &candidate[..stream.byte_offset()],
        _ => candidate,
    }
}

fn strip_code_fence(text: &str) -> &str {
    let body = if let Some(rest) = text.strip_prefix("```json") {
        rest
    } else if let Some(rest) = text.strip_prefix("```") {
        rest
    } else {
        return text;
    };

    let body = match body.rfind("```") {
        Some(end) => &body[..end],
        None => body,
    };
    body.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_object_is_unchanged() {
        let input = r#"{"key": "value"}"#;
        assert_eq!(extract_json(input), input);
        assert_eq!(extract_json(extract_json(input)), input);
    }

    #[test]
    fn test_braces_inside_strings_survive() {
        let input = r#"{"key": "value with { brace } inside"}"#;
        assert_eq!(extract_json(input), input);

        let unbalanced = r#"{"note": "only an opening { here"} trailing"#;
        assert_eq!(extract_json(unbalanced), r#"{"note": "only an opening { here"}"#);
    }

    #[test]
    fn test_json_fence() {
        let input = "```json\n{\"title\": \"Batman\", \"issue_number\": \"1\"}\n```";
        assert_eq!(extract_json(input), "{\"title\": \"Batman\", \"issue_number\": \"1\"}");
    }

    #[test]
    fn test_plain_fence_with_prose() {
        let input = "```\nHere you go: {\"a\": {\"b\": [1, 2]}} hope that helps\n```";
        assert_eq!(extract_json(input), "{\"a\": {\"b\": [1, 2]}}");
    }

    #[test]
    fn test_leading_prose_and_trailing_text() {
        let input = "Sure! {\"selected_index\": 2} Let me know.";
        assert_eq!(extract_json(input), "{\"selected_index\": 2}");
    }

    #[test]
    fn test_undecodable_returns_from_first_brace() {
        let input = "result: {\"title\": \"Batman\", ";
        assert_eq!(extract_json(input), "{\"title\": \"Batman\",");
    }

    #[test]
    fn test_no_brace_returns_trimmed_text() {
        assert_eq!(extract_json("  no json here  "), "no json here");
        assert_eq!(extract_json(""), "");
    }

    #[test]
    fn test_first_object_only() {
        let input = r#"{"first": 1}{"second": 2}"#;
        assert_eq!(extract_json(input), r#"{"first": 1}"#);
    }
}
