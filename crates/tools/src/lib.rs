pub mod browser;
pub mod call;
pub mod catalog;
pub mod distill;
pub mod fs;

pub use call::{normalize_url, ToolCall, TypeEntry};
pub use catalog::{all_schemas, schemas, ToolSchema};
pub use distill::{distill, distill_with_limits};

/// Truncate a string to at most `max_bytes` bytes, respecting UTF-8 char boundaries.
pub fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// First `limit` characters followed by `...` when `s` is longer than `limit` characters.
pub fn truncate_with_ellipsis(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s.to_string();
    }
    let mut out: String = s.chars().take(limit).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_truncate_char_boundary() {
        assert_eq!(safe_truncate("hello", 10), "hello");
        assert_eq!(safe_truncate("hello", 3), "hel");
        // 'é' is two bytes; cutting inside it backs off
        assert_eq!(safe_truncate("aé", 2), "a");
    }

    #[test]
    fn test_truncate_with_ellipsis() {
        assert_eq!(truncate_with_ellipsis("short", 10), "short");
        assert_eq!(truncate_with_ellipsis("exactly", 7), "exactly");
        assert_eq!(truncate_with_ellipsis("abcdef", 3), "abc...");
        assert_eq!(truncate_with_ellipsis("日本語テキスト", 3), "日本語...");
    }
}
