//! Lenient JSON extraction from model replies.
//!
//! Models wrap JSON in markdown fences or surround it with prose. The reply is
//! stripped of fences, then the outermost `{...}` is tried before the whole text.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::client::MessageSender;
use super::error::LlmError;
use super::types::MessagesRequest;

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line.
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Returns the first JSON object found in `text`, if any.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let body = strip_code_fences(text);

    if let (Some(open), Some(close)) = (body.find('{'), body.rfind('}')) {
        if open < close {
            if let Ok(value) = serde_json::from_str::<Value>(&body[open..=close]) {
                return Some(value);
            }
        }
    }

    serde_json::from_str::<Value>(body)
        .ok()
        .filter(Value::is_object)
}

/// Extracts a JSON object from `text` and deserializes it into `T`.
pub fn parse_json_reply<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    let value = extract_json_object(text)
        .ok_or_else(|| LlmError::ParseError(format!("no JSON object in reply: {}", preview(text))))?;
    serde_json::from_value(value).map_err(|e| LlmError::ParseError(e.to_string()))
}

/// Sends `req` and parses the reply text as a JSON object of type `T`.
pub async fn ask_json<S, T>(sender: &S, req: &MessagesRequest) -> Result<T, LlmError>
where
    S: MessageSender,
    T: DeserializeOwned,
{
    let response = sender.send_message(req).await?;
    parse_json_reply(&response.text())
}

fn preview(text: &str) -> String {
    let snippet: String = text.chars().take(80).collect();
    if snippet.len() < text.len() {
        format!("{snippet}…")
    } else {
        snippet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Verdict {
        accepted: bool,
    }

    #[test]
    fn parses_plain_object() {
        let v: Verdict = parse_json_reply(r#"{"accepted": true}"#).unwrap();
        assert!(v.accepted);
    }

    #[test]
    fn strips_markdown_fences() {
        let reply = "```json\n{\"accepted\": false}\n```";
        let v: Verdict = parse_json_reply(reply).unwrap();
        assert!(!v.accepted);
    }

    #[test]
    fn extracts_object_surrounded_by_prose() {
        let reply = "Here is my answer:\n{\"accepted\": true}\nHope this helps.";
        let v: Verdict = parse_json_reply(reply).unwrap();
        assert!(v.accepted);
    }

    #[test]
    fn non_object_reply_is_parse_error() {
        assert!(extract_json_object("[1, 2, 3]").is_none());
        let err = parse_json_reply::<Verdict>("no json here").unwrap_err();
        assert!(matches!(err, LlmError::ParseError(_)));
    }

    #[test]
    fn missing_key_is_parse_error() {
        let err = parse_json_reply::<Verdict>(r#"{"other": 1}"#).unwrap_err();
        assert!(matches!(err, LlmError::ParseError(_)));
    }
}
