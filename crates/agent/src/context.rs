//! Prompt text and rough token estimates.

use webrover_core::types::ChatMessage;

pub const SYSTEM_PROMPT: &str = "You have been tasked with crawling the internet based on a task given by the user. \
You are connected to a web browser that can navigate to pages and list elements on the page. \
You can also type into search boxes and other input fields and send forms. You can also click links on the page. \
You shall only answer with function calls. \
Start by navigating to the front page of a website (or a direct URL if provided). \
Don't go to a sub URL directly unless provided as the URL might not work. \
However, you are allowed to navigate directly to the Google search results page of a specific query. \
If you encounter a Page Not Found error, try another URL. \
Always read the contents of the page with the get_content function first when going to a new URL or clicking a link. \
If the page doesn't have the content you want, try clicking on a link or navigating to a completely different page.";

pub fn task_message(task: &str) -> String {
    format!("Task: {}", task)
}

/// Rough token count: about 1.3 tokens per English word, one per CJK char.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let mut tokens: usize = 0;
    let mut ascii_word_chars: usize = 0;
    for ch in text.chars() {
        if ch.is_ascii() {
            if ch.is_ascii_whitespace() || ch.is_ascii_punctuation() {
                if ascii_word_chars > 0 {
                    tokens += 1 + ascii_word_chars / 4;
                    ascii_word_chars = 0;
                }
                tokens += 1;
            } else {
                ascii_word_chars += 1;
            }
        } else {
            if ascii_word_chars > 0 {
                tokens += 1 + ascii_word_chars / 4;
                ascii_word_chars = 0;
            }
            tokens += 1;
        }
    }
    if ascii_word_chars > 0 {
        tokens += 1 + ascii_word_chars / 4;
    }
    tokens
}

/// Content plus tool-call payload plus per-message role overhead.
pub fn estimate_message_tokens(msg: &ChatMessage) -> usize {
    let content_tokens = estimate_tokens(msg.text());
    let tool_call_tokens = msg.tool_calls.as_ref().map_or(0, |calls| {
        calls
            .iter()
            .map(|tc| estimate_tokens(&tc.name) + estimate_tokens(&tc.arguments_text()) + 10)
            .sum()
    });
    content_tokens + tool_call_tokens + 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("hello"), 2);
        assert!(estimate_tokens("hello world, this is a test") > estimate_tokens("hello"));
        assert_eq!(estimate_tokens("日本"), 2);
    }

    #[test]
    fn test_message_overhead() {
        let msg = ChatMessage::user("");
        assert_eq!(estimate_message_tokens(&msg), 4);
    }

    #[test]
    fn test_task_message() {
        assert_eq!(task_message("find cats"), "Task: find cats");
    }
}
