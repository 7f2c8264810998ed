//! Conversation store. Keeps full content; redaction is applied only when
//! a transport payload is built.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use webrover_core::config::RedactBy;
use webrover_core::types::{ChatMessage, ToolCallRequest};

use crate::context::estimate_message_tokens;
use crate::observation::Observation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
    /// Stand-in sent when this message no longer describes the current page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacted: Option<String>,
    /// Page the agent was on when the message was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_generation: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
}

impl Message {
    fn plain(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
            redacted: None,
            url: None,
            page_generation: None,
            tool_name: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn system(content: &str) -> Self {
        Self::plain("system", content)
    }

    pub fn user(content: &str) -> Self {
        Self::plain("user", content)
    }

    pub fn assistant(content: Option<&str>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            ..Self::plain("assistant", content.unwrap_or_default())
        }
    }

    /// Tool-role observation tagged with the page it describes.
    pub fn observation(call: &ToolCallRequest, observation: Observation, url: &str, generation: u64) -> Self {
        Self {
            redacted: observation.redacted,
            url: Some(url.to_string()),
            page_generation: Some(generation),
            tool_name: Some(call.name.clone()),
            tool_call_id: Some(call.id.clone()),
            ..Self::plain("tool", &observation.content)
        }
    }

    fn to_chat(&self, content: &str) -> ChatMessage {
        let content = if self.role == "assistant" && content.is_empty() && self.tool_calls.is_some() {
            Value::Null
        } else {
            Value::String(content.to_string())
        };
        ChatMessage {
            role: self.role.clone(),
            content,
            tool_calls: self.tool_calls.clone(),
            tool_call_id: self.tool_call_id.clone(),
            name: self.tool_name.clone(),
        }
    }
}

pub struct Conversation {
    messages: Vec<Message>,
    length_limit: usize,
}

impl Conversation {
    /// Non-system message content is cut to `length_limit` characters on append.
    pub fn new(length_limit: usize) -> Self {
        Self { messages: Vec::new(), length_limit }
    }

    pub fn append(&mut self, mut message: Message) {
        if message.role != "system" {
            message.content = cut(&message.content, self.length_limit);
            message.redacted = message.redacted.map(|r| cut(&r, self.length_limit));
        }
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Payload for the completion API. Messages that have a stand-in and do
    /// not match the most recent page reference are redacted.
    pub fn snapshot(&self, key: RedactBy) -> Vec<ChatMessage> {
        let reference = self.reference(key);
        self.messages
            .iter()
            .map(|m| match &m.redacted {
                Some(stand_in) if Self::page_key(m, key) != reference => m.to_chat(stand_in),
                _ => m.to_chat(&m.content),
            })
            .collect()
    }

    /// Full, unredacted history.
    pub fn full_history(&self) -> Vec<ChatMessage> {
        self.messages.iter().map(|m| m.to_chat(&m.content)).collect()
    }

    pub fn estimated_tokens(&self, key: RedactBy) -> usize {
        self.snapshot(key).iter().map(estimate_message_tokens).sum()
    }

    fn reference(&self, key: RedactBy) -> Option<PageKey> {
        self.messages.iter().rev().find_map(|m| Self::page_key(m, key))
    }

    fn page_key(message: &Message, key: RedactBy) -> Option<PageKey> {
        match key {
            RedactBy::Url => message.url.clone().map(PageKey::Url),
            RedactBy::Generation => message.page_generation.map(PageKey::Generation),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PageKey {
    Url(String),
    Generation(u64),
}

fn cut(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        s.to_string()
    } else {
        s.chars().take(limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation;
    use serde_json::json;

    fn call(id: &str, name: &str) -> ToolCallRequest {
        ToolCallRequest { id: id.into(), name: name.into(), arguments: json!({}) }
    }

    fn content_at(conv: &mut Conversation, id: &str, url: &str, generation: u64, body: &str) {
        let c = call(id, "get_content");
        conv.append(Message::assistant(None, vec![c.clone()]));
        conv.append(Message::observation(&c, observation::page_content(body), url, generation));
    }

    #[test]
    fn test_redacts_other_urls_only() {
        let mut conv = Conversation::new(10_000);
        conv.append(Message::system("sys"));
        conv.append(Message::user("Task: x"));
        content_at(&mut conv, "1", "https://a.example/", 1, "PAGE A");
        content_at(&mut conv, "2", "https://b.example/", 2, "PAGE B");

        let snapshot = conv.snapshot(RedactBy::Url);
        let texts: Vec<&str> = snapshot.iter().map(|m| m.text()).collect();
        assert!(!texts[3].contains("PAGE A"));
        assert!(texts[3].ends_with("<content redacted>"));
        assert!(texts[5].contains("PAGE B"));

        // the store itself keeps everything
        assert!(conv.messages()[3].content.contains("PAGE A"));
    }

    #[test]
    fn test_same_url_kept_unless_keyed_by_generation() {
        let mut conv = Conversation::new(10_000);
        content_at(&mut conv, "1", "https://a.example/", 1, "OLD A");
        content_at(&mut conv, "2", "https://b.example/", 2, "PAGE B");
        content_at(&mut conv, "3", "https://a.example/", 3, "NEW A");

        let by_url = conv.snapshot(RedactBy::Url);
        assert!(by_url[1].text().contains("OLD A"));
        assert!(!by_url[3].text().contains("PAGE B"));

        let by_generation = conv.snapshot(RedactBy::Generation);
        assert!(!by_generation[1].text().contains("OLD A"));
        assert!(by_generation[5].text().contains("NEW A"));
    }

    #[test]
    fn test_messages_without_stand_in_never_redacted() {
        let mut conv = Conversation::new(10_000);
        let c = call("1", "goto_url");
        conv.append(Message::assistant(None, vec![c.clone()]));
        conv.append(Message::observation(&c, observation::clicked("https://a.example/"), "https://a.example/", 1));
        content_at(&mut conv, "2", "https://b.example/", 2, "B");
        assert!(conv.snapshot(RedactBy::Url)[1].text().starts_with("OK. I clicked the link."));
    }

    #[test]
    fn test_append_truncates_to_limit() {
        let mut conv = Conversation::new(10);
        conv.append(Message::system(&"s".repeat(50)));
        conv.append(Message::user(&"u".repeat(50)));
        assert_eq!(conv.messages()[0].content.len(), 50);
        assert_eq!(conv.messages()[1].content.chars().count(), 10);
    }

    #[test]
    fn test_wire_shape_of_tool_messages() {
        let mut conv = Conversation::new(1000);
        let c = call("call_7", "list_links");
        conv.append(Message::assistant(None, vec![c.clone()]));
        conv.append(Message::observation(&c, observation::links_listed(&[]), "u", 0));
        let wire = serde_json::to_value(conv.snapshot(RedactBy::Url)).unwrap();
        assert!(wire[0]["content"].is_null());
        assert_eq!(wire[0]["tool_calls"][0]["id"], "call_7");
        assert_eq!(wire[1]["role"], "tool");
        assert_eq!(wire[1]["tool_call_id"], "call_7");
        assert_eq!(wire[1]["name"], "list_links");
    }
}
