//! Mutable per-session state threaded through the agent loop.

use webrover_core::types::TokenUsage;
use webrover_tools::browser::{IndexedElement, LifecycleFlags};

#[derive(Debug, Default)]
pub struct SessionState {
    pub lifecycle: LifecycleFlags,
    /// Result of the latest links scrape; ids resolve only against this.
    pub links: Vec<IndexedElement>,
    /// Result of the latest inputs scrape.
    pub inputs: Vec<IndexedElement>,
    /// Handle of the element typed into last, used by `send_form`.
    pub last_typed: Option<String>,
    pub current_url: String,
    /// Incremented on every navigation.
    pub page_generation: u64,
    pub usage: TokenUsage,
    /// Model turns taken for the current task.
    pub model_turns: u32,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new document replaced the old one; earlier scrapes are stale.
    pub fn record_navigation(&mut self, url: &str) {
        self.current_url = url.to_string();
        self.page_generation += 1;
        self.links.clear();
        self.inputs.clear();
        self.last_typed = None;
    }

    pub fn link(&self, id: u32) -> Option<&IndexedElement> {
        self.links.iter().find(|e| e.id == id)
    }

    pub fn input(&self, id: u32) -> Option<&IndexedElement> {
        self.inputs.iter().find(|e| e.id == id)
    }

    /// The operator handed over a new task; the page stays open.
    pub fn start_task(&mut self) {
        self.model_turns = 0;
        self.last_typed = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(id: u32) -> IndexedElement {
        IndexedElement {
            id,
            tag_summary: "<a>".into(),
            text: format!("link {}", id),
            visible: true,
            handle: format!("h{}", id),
        }
    }

    #[test]
    fn test_navigation_invalidates_scrapes() {
        let mut state = SessionState::new();
        state.links = vec![element(1), element(2)];
        state.inputs = vec![element(1)];
        state.last_typed = Some("h1".into());
        assert_eq!(state.link(2).map(|e| e.handle.as_str()), Some("h2"));

        state.record_navigation("https://example.com/");
        assert_eq!(state.page_generation, 1);
        assert_eq!(state.current_url, "https://example.com/");
        assert!(state.link(2).is_none());
        assert!(state.input(1).is_none());
        assert!(state.last_typed.is_none());
    }

    #[test]
    fn test_start_task_resets_turns() {
        let mut state = SessionState::new();
        state.model_turns = 7;
        state.links = vec![element(1)];
        state.start_task();
        assert_eq!(state.model_turns, 0);
        assert_eq!(state.links.len(), 1);
    }
}
