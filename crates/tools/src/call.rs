//! Typed decoding of model tool calls.

use serde_json::Value;
use url::Url;

use crate::catalog::{
    ANSWER_USER, CLICK_LINK, GET_CONTENT, GOTO_URL, LIST_INPUTS, LIST_LINKS, MAKE_PLAN, READ_FILE, SEND_FORM,
    TYPE_TEXT,
};

/// Schemes passed through as-is by [`normalize_url`].
const KNOWN_SCHEMES: &[&str] = &["http", "https", "file", "about", "data"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeEntry {
    pub input_id: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    MakePlan { plan: String },
    ReadFile { path: String },
    GotoUrl { url: String },
    ListLinks,
    ListInputs,
    ClickLink { link_id: u32 },
    TypeText { entries: Vec<TypeEntry>, submit: bool },
    SendForm,
    GetContent,
    AnswerUser { answer: String },
    /// Name not in the catalog.
    Unknown { name: String },
    /// Known name, arguments that do not conform.
    Invalid { name: String, reason: String },
}

impl ToolCall {
    /// Decode `arguments` for the tool `name`. Never fails: unknown names
    /// and malformed payloads become [`ToolCall::Unknown`] and
    /// [`ToolCall::Invalid`] so the model can be told to retry.
    pub fn decode(name: &str, arguments: &Value) -> Self {
        // answer_user is the only tool whose raw encoding is usable as-is.
        if name == ANSWER_USER {
            let answer = match arguments {
                Value::String(raw) => raw.clone(),
                Value::Object(map) => match map.get("answer").and_then(|v| v.as_str()) {
                    Some(answer) => answer.to_string(),
                    None => arguments.to_string(),
                },
                other => other.to_string(),
            };
            return ToolCall::AnswerUser { answer };
        }

        let invalid = |reason: &str| ToolCall::Invalid {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let args = match arguments {
            Value::Object(map) => map,
            Value::String(_) => return invalid("arguments are not valid JSON"),
            _ => return invalid("arguments must be a JSON object"),
        };

        match name {
            MAKE_PLAN => match args.get("plan").and_then(|v| v.as_str()) {
                Some(plan) => ToolCall::MakePlan { plan: plan.to_string() },
                None => invalid("missing 'plan'"),
            },
            READ_FILE => match args.get("path").and_then(|v| v.as_str()).map(str::trim) {
                Some(path) if !path.is_empty() => ToolCall::ReadFile { path: path.to_string() },
                _ => invalid("missing 'path'"),
            },
            GOTO_URL => match args.get("url").and_then(|v| v.as_str()).and_then(normalize_url) {
                Some(url) => ToolCall::GotoUrl { url },
                None => invalid("missing or malformed 'url'"),
            },
            LIST_LINKS => ToolCall::ListLinks,
            LIST_INPUTS => ToolCall::ListInputs,
            CLICK_LINK => match args.get("link_id").and_then(element_id) {
                Some(link_id) => ToolCall::ClickLink { link_id },
                None => invalid("missing or non-numeric 'link_id'"),
            },
            TYPE_TEXT => decode_type_text(args).unwrap_or_else(|reason| invalid(&reason)),
            SEND_FORM => ToolCall::SendForm,
            GET_CONTENT => ToolCall::GetContent,
            _ => ToolCall::Unknown { name: name.to_string() },
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ToolCall::MakePlan { .. } => MAKE_PLAN,
            ToolCall::ReadFile { .. } => READ_FILE,
            ToolCall::GotoUrl { .. } => GOTO_URL,
            ToolCall::ListLinks => LIST_LINKS,
            ToolCall::ListInputs => LIST_INPUTS,
            ToolCall::ClickLink { .. } => CLICK_LINK,
            ToolCall::TypeText { .. } => TYPE_TEXT,
            ToolCall::SendForm => SEND_FORM,
            ToolCall::GetContent => GET_CONTENT,
            ToolCall::AnswerUser { .. } => ANSWER_USER,
            ToolCall::Unknown { name } | ToolCall::Invalid { name, .. } => name,
        }
    }
}

fn decode_type_text(args: &serde_json::Map<String, Value>) -> Result<ToolCall, String> {
    let submit = args.get("submit").and_then(|v| v.as_bool()).unwrap_or(false);

    let entries = match args.get("inputs") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| type_entry(item).ok_or_else(|| "each input needs 'input_id' and 'text'".to_string()))
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err("'inputs' must be an array".to_string()),
        None => vec![type_entry(&Value::Object(args.clone()))
            .ok_or_else(|| "missing 'input_id' or 'text'".to_string())?],
    };

    if entries.is_empty() {
        return Err("no inputs given".to_string());
    }
    Ok(ToolCall::TypeText { entries, submit })
}

fn type_entry(value: &Value) -> Option<TypeEntry> {
    let input_id = value.get("input_id").and_then(element_id)?;
    let text = value.get("text").and_then(|v| v.as_str())?;
    Some(TypeEntry { input_id, text: text.to_string() })
}

/// Element ids arrive as numbers or numeric strings.
fn element_id(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse a navigation target, assuming `https://` when no scheme is given.
pub fn normalize_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(url) = Url::parse(raw) {
        if KNOWN_SCHEMES.contains(&url.scheme()) {
            return Some(url.to_string());
        }
    }
    let url = Url::parse(&format!("https://{}", raw)).ok()?;
    url.host_str()?;
    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_known_tools() {
        assert_eq!(
            ToolCall::decode("goto_url", &json!({"reasoning": "r", "url": "https://example.com"})),
            ToolCall::GotoUrl { url: "https://example.com/".into() }
        );
        assert_eq!(ToolCall::decode("list_links", &json!({"reasoning": "r"})), ToolCall::ListLinks);
        assert_eq!(ToolCall::decode("get_content", &json!({})), ToolCall::GetContent);
        assert_eq!(
            ToolCall::decode("make_plan", &json!({"plan": "1. search"})),
            ToolCall::MakePlan { plan: "1. search".into() }
        );
    }

    #[test]
    fn test_link_id_accepts_number_or_string() {
        assert_eq!(ToolCall::decode("click_link", &json!({"link_id": 7})), ToolCall::ClickLink { link_id: 7 });
        assert_eq!(ToolCall::decode("click_link", &json!({"link_id": "12"})), ToolCall::ClickLink { link_id: 12 });
        assert_eq!(ToolCall::decode("click_link", &json!({"link_id": 3.0})), ToolCall::ClickLink { link_id: 3 });
        assert!(matches!(ToolCall::decode("click_link", &json!({"link_id": "abc"})), ToolCall::Invalid { .. }));
        assert!(matches!(ToolCall::decode("click_link", &json!({})), ToolCall::Invalid { .. }));
    }

    #[test]
    fn test_type_text_single_and_multiple() {
        assert_eq!(
            ToolCall::decode("type_text", &json!({"input_id": 1, "text": "cats"})),
            ToolCall::TypeText { entries: vec![TypeEntry { input_id: 1, text: "cats".into() }], submit: false }
        );
        let call = ToolCall::decode(
            "type_text",
            &json!({"inputs": [{"input_id": 1, "text": "a"}, {"input_id": "2", "text": "b"}], "submit": true}),
        );
        match call {
            ToolCall::TypeText { entries, submit } => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[1].input_id, 2);
                assert!(submit);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(ToolCall::decode("type_text", &json!({"inputs": []})), ToolCall::Invalid { .. }));
        assert!(matches!(ToolCall::decode("type_text", &json!({"input_id": 1})), ToolCall::Invalid { .. }));
    }

    #[test]
    fn test_answer_user_raw_fallback() {
        assert_eq!(
            ToolCall::decode("answer_user", &Value::String("It is 42".into())),
            ToolCall::AnswerUser { answer: "It is 42".into() }
        );
        assert_eq!(
            ToolCall::decode("answer_user", &json!({"answer": "Done"})),
            ToolCall::AnswerUser { answer: "Done".into() }
        );
    }

    #[test]
    fn test_malformed_arguments_are_invalid_not_fatal() {
        let call = ToolCall::decode("goto_url", &Value::String("{url: nope".into()));
        assert!(matches!(call, ToolCall::Invalid { ref name, .. } if name == "goto_url"));
        assert_eq!(call.name(), "goto_url");
    }

    #[test]
    fn test_unknown_tool() {
        let call = ToolCall::decode("delete_everything", &json!({}));
        assert_eq!(call, ToolCall::Unknown { name: "delete_everything".into() });
        assert_eq!(call.name(), "delete_everything");
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("example.com/path").as_deref(), Some("https://example.com/path"));
        assert_eq!(normalize_url(" http://example.com ").as_deref(), Some("http://example.com/"));
        assert_eq!(normalize_url("about:blank").as_deref(), Some("about:blank"));
        assert_eq!(normalize_url(""), None);
    }
}
