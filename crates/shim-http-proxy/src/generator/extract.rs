//! Pulling a JSON value out of free-form model output.

use super::GenerationError;
use serde_json::Value;

/// Parse a model reply into JSON.
///
/// Tried in order: a ```json fenced block, any fenced block, the whole reply,
/// and finally the span from the first `{`/`[` to the last `}`/`]`.
pub fn parse_mock_payload(text: &str) -> Result<Value, GenerationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(GenerationError::EmptyResponse);
    }

    let mut candidates: Vec<&str> = Vec::with_capacity(4);
    if let Some(block) = fenced_block(trimmed, "```json") {
        candidates.push(block);
    }
    if let Some(block) = fenced_block(trimmed, "```") {
        candidates.push(block);
    }
    candidates.push(trimmed);
    if let Some(span) = outer_json_span(trimmed) {
        candidates.push(span);
    }

    let mut last_error = None;
    for candidate in candidates {
        match serde_json::from_str::<Value>(candidate.trim()) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = Some(e),
        }
    }

    Err(GenerationError::Unparseable(
        last_error.map(|e| e.to_string()).unwrap_or_default(),
    ))
}

fn fenced_block<'a>(text: &'a str, opener: &str) -> Option<&'a str> {
    let start = text.find(opener)? + opener.len();
    let rest = &text[start..];
    // Skip an info string such as "javascript" on the opening fence line
    let body_start = if opener == "```" {
        rest.find('\n').map(|i| i + 1).unwrap_or(0)
    } else {
        0
    };
    let body = &rest[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

fn outer_json_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let end = text.rfind(['}', ']'])?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_json() {
        assert_eq!(
            parse_mock_payload(r#" {"id": 1, "name": "Ada"} "#).unwrap(),
            json!({"id": 1, "name": "Ada"})
        );
    }

    #[test]
    fn test_json_fence_with_prose() {
        let reply = "Here is the mock data:\n```json\n[{\"id\": 1}, {\"id\": 2}]\n```\nLet me know!";
        assert_eq!(
            parse_mock_payload(reply).unwrap(),
            json!([{"id": 1}, {"id": 2}])
        );
    }

    #[test]
    fn test_untagged_fence() {
        let reply = "```\n{\"ok\": true}\n```";
        assert_eq!(parse_mock_payload(reply).unwrap(), json!({"ok": true}));
    }

    #[test]
    fn test_json_embedded_in_prose() {
        let reply = "Sure. {\"code\": 0, \"data\": {\"total\": 3}} Hope that helps.";
        assert_eq!(
            parse_mock_payload(reply).unwrap(),
            json!({"code": 0, "data": {"total": 3}})
        );
    }

    #[test]
    fn test_empty_reply() {
        assert!(matches!(
            parse_mock_payload("   \n"),
            Err(GenerationError::EmptyResponse)
        ));
    }

    #[test]
    fn test_not_json() {
        assert!(matches!(
            parse_mock_payload("I cannot help with that."),
            Err(GenerationError::Unparseable(_))
        ));
        assert!(matches!(
            parse_mock_payload("```json\n{broken\n```"),
            Err(GenerationError::Unparseable(_))
        ));
    }
}
