//! Element indexing: walk sequential focus order and give each visible,
//! matching element a small integer id.

use std::collections::HashSet;
use tracing::{debug, warn};
use webrover_core::config::{BrowserConfig, FocusStrategy};
use webrover_core::{Error, Result};

use super::driver::{ElementProbe, PageDriver};
use crate::truncate_with_ellipsis;

pub const LINKS_SELECTOR: &str =
    "a, button, [role=button], [role=link], input[type=submit], input[type=button]";

pub const INPUTS_SELECTOR: &str = "input:not([type]), input[type=text], input[type=email], \
     input[type=password], input[type=search], input[type=tel], input[type=url], \
     input[type=number], textarea, select";

/// Attributes kept in tag summaries, in output order.
const ATTRIBUTE_ALLOW_LIST: &[&str] = &["href", "type", "placeholder", "title", "role", "value"];

const FORM_CONTROL_TAGS: &[&str] = &["input", "textarea", "select"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementRole {
    Links,
    Inputs,
}

impl ElementRole {
    pub fn selector(self) -> &'static str {
        match self {
            ElementRole::Links => LINKS_SELECTOR,
            ElementRole::Inputs => INPUTS_SELECTOR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedElement {
    pub id: u32,
    pub tag_summary: String,
    pub text: String,
    pub visible: bool,
    pub handle: String,
}

#[derive(Debug, Clone, Copy)]
pub struct IndexLimits {
    pub max_focus_steps: usize,
    pub text_limit: usize,
    pub attr_limit: usize,
}

impl Default for IndexLimits {
    fn default() -> Self {
        Self::from(&BrowserConfig::default())
    }
}

impl From<&BrowserConfig> for IndexLimits {
    fn from(config: &BrowserConfig) -> Self {
        Self {
            max_focus_steps: config.max_focus_steps,
            text_limit: config.text_limit,
            attr_limit: config.attr_limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Stop,
}

/// Builds an index from a stream of focus probes. Holds no page state, so
/// both traversal strategies share it.
pub struct IndexBuilder {
    limits: IndexLimits,
    steps: usize,
    first_handle: Option<String>,
    seen_handles: HashSet<String>,
    seen_entries: HashSet<(String, String)>,
    elements: Vec<IndexedElement>,
}

impl IndexBuilder {
    pub fn new(limits: IndexLimits) -> Self {
        Self {
            limits,
            steps: 0,
            first_handle: None,
            seen_handles: HashSet::new(),
            seen_entries: HashSet::new(),
            elements: Vec::new(),
        }
    }

    /// Count a focus step that produced nothing usable (stale element).
    pub fn skip(&mut self) -> Step {
        self.steps += 1;
        self.step_budget()
    }

    pub fn push(&mut self, probe: ElementProbe) -> Step {
        self.steps += 1;

        match &self.first_handle {
            Some(first) if *first == probe.handle => {
                debug!(steps = self.steps, "Focus wrapped to the first element");
                return Step::Stop;
            }
            None => self.first_handle = Some(probe.handle.clone()),
            _ => {}
        }

        if self.seen_handles.insert(probe.handle.clone()) {
            self.consider(probe);
        }
        self.step_budget()
    }

    fn step_budget(&self) -> Step {
        if self.steps >= self.limits.max_focus_steps {
            debug!(steps = self.steps, "Focus step ceiling reached");
            Step::Stop
        } else {
            Step::Continue
        }
    }

    fn consider(&mut self, probe: ElementProbe) {
        if !probe.matches || !probe.visible {
            return;
        }

        let text = truncate_with_ellipsis(
            &probe.text.split_whitespace().collect::<Vec<_>>().join(" "),
            self.limits.text_limit,
        );
        if text.is_empty() && !FORM_CONTROL_TAGS.contains(&probe.tag.as_str()) {
            return;
        }

        let tag_summary = summarize_tag(&probe, self.limits.attr_limit);
        if !self.seen_entries.insert((tag_summary.clone(), text.clone())) {
            return;
        }

        self.elements.push(IndexedElement {
            id: self.elements.len() as u32 + 1,
            tag_summary,
            text,
            visible: true,
            handle: probe.handle,
        });
    }

    pub fn finish(self) -> Vec<IndexedElement> {
        self.elements
    }
}

/// `<tag attr="value" ...>` with allow-listed attributes only.
fn summarize_tag(probe: &ElementProbe, attr_limit: usize) -> String {
    let mut summary = format!("<{}", probe.tag);
    for name in ATTRIBUTE_ALLOW_LIST {
        if let Some((_, value)) = probe.attrs.iter().find(|(k, _)| k == name) {
            let value = truncate_with_ellipsis(value.trim(), attr_limit).replace('"', "&quot;");
            summary.push_str(&format!(" {}=\"{}\"", name, value));
        }
    }
    summary.push('>');
    summary
}

/// Walk the page's focus order and index the elements matching `role`.
/// Every indexed element is stamped with `data-wr-id`.
pub async fn scrape(
    driver: &mut dyn PageDriver,
    role: ElementRole,
    strategy: FocusStrategy,
    limits: IndexLimits,
) -> Result<Vec<IndexedElement>> {
    driver.begin_traversal(role.selector(), strategy).await?;

    let mut builder = IndexBuilder::new(limits);
    loop {
        let step = match driver.focus_next().await {
            Ok(Some(probe)) => builder.push(probe),
            Ok(None) => break,
            Err(Error::NotFound(e)) => {
                debug!(error = %e, "Skipping stale element");
                builder.skip()
            }
            Err(e) => return Err(e),
        };
        if step == Step::Stop {
            break;
        }
    }

    let elements = builder.finish();
    for element in &elements {
        if let Err(e) = driver.assign_id(&element.handle, element.id).await {
            warn!(id = element.id, error = %e, "Could not stamp element id");
        }
    }

    debug!(role = ?role, count = elements.len(), "Scrape finished");
    Ok(elements)
}

/// One line per element: `[id] <tag attrs> text`.
pub fn format_elements(elements: &[IndexedElement]) -> String {
    elements
        .iter()
        .map(|e| {
            if e.text.is_empty() {
                format!("[{}] {}", e.id, e.tag_summary)
            } else {
                format!("[{}] {} {}", e.id, e.tag_summary, e.text)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(handle: &str, tag: &str, text: &str) -> ElementProbe {
        ElementProbe {
            handle: handle.to_string(),
            tag: tag.to_string(),
            attrs: vec![],
            text: text.to_string(),
            visible: true,
            matches: true,
        }
    }

    fn limits(max_steps: usize) -> IndexLimits {
        IndexLimits { max_focus_steps: max_steps, text_limit: 60, attr_limit: 60 }
    }

    #[test]
    fn test_ids_contiguous_after_filtering() {
        let mut b = IndexBuilder::new(limits(300));
        b.push(probe("1", "a", "Home"));
        b.push(ElementProbe { visible: false, ..probe("2", "a", "Hidden") });
        b.push(ElementProbe { matches: false, ..probe("3", "input", "") });
        b.push(probe("4", "a", "About"));
        let elements = b.finish();
        assert_eq!(elements.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(elements[1].text, "About");
        assert_eq!(elements[1].handle, "4");
    }

    #[test]
    fn test_cycle_detection_stops_on_first_handle() {
        let mut b = IndexBuilder::new(limits(300));
        assert_eq!(b.push(probe("1", "a", "One")), Step::Continue);
        assert_eq!(b.push(probe("2", "a", "Two")), Step::Continue);
        assert_eq!(b.push(probe("1", "a", "One")), Step::Stop);
        assert_eq!(b.finish().len(), 2);
    }

    #[test]
    fn test_step_ceiling_terminates_focus_trap() {
        let mut b = IndexBuilder::new(limits(3));
        assert_eq!(b.push(probe("1", "a", "x")), Step::Continue);
        assert_eq!(b.push(probe("2", "a", "y")), Step::Continue);
        // A trap bouncing between 2 and 3 never returns to 1.
        assert_eq!(b.push(probe("3", "a", "z")), Step::Stop);
    }

    #[test]
    fn test_skip_counts_toward_ceiling() {
        let mut b = IndexBuilder::new(limits(2));
        assert_eq!(b.skip(), Step::Continue);
        assert_eq!(b.skip(), Step::Stop);
    }

    #[test]
    fn test_empty_text_only_for_form_controls() {
        let mut b = IndexBuilder::new(limits(300));
        b.push(probe("1", "a", "   "));
        b.push(probe("2", "input", ""));
        b.push(probe("3", "button", ""));
        let elements = b.finish();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].tag_summary, "<input>");
    }

    #[test]
    fn test_attribute_allow_list_and_truncation() {
        let long_href = format!("https://example.com/{}", "a".repeat(100));
        let p = ElementProbe {
            attrs: vec![
                ("class".into(), "btn".into()),
                ("role".into(), "button".into()),
                ("href".into(), long_href),
                ("onclick".into(), "evil()".into()),
            ],
            ..probe("1", "a", &"word ".repeat(30))
        };
        let mut b = IndexBuilder::new(limits(300));
        b.push(p);
        let e = &b.finish()[0];
        assert!(e.tag_summary.starts_with("<a href=\"https://example.com/"));
        assert!(e.tag_summary.ends_with("...\" role=\"button\">"));
        assert!(!e.tag_summary.contains("class"));
        assert!(!e.tag_summary.contains("onclick"));
        assert_eq!(e.text.chars().count(), 63);
        assert!(e.text.ends_with("..."));
    }

    #[test]
    fn test_duplicate_entries_listed_once() {
        let mut b = IndexBuilder::new(limits(300));
        b.push(probe("1", "a", "Next"));
        b.push(probe("2", "a", "Next"));
        b.push(probe("3", "a", "Prev"));
        let elements = b.finish();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[1].id, 2);
    }

    #[test]
    fn test_attribute_quotes_escaped() {
        let p = ElementProbe {
            attrs: vec![("title".into(), "say \"hi\"".into())],
            ..probe("1", "button", "Hi")
        };
        assert_eq!(summarize_tag(&p, 60), "<button title=\"say &quot;hi&quot;\">");
    }

    #[test]
    fn test_format_elements() {
        let elements = vec![
            IndexedElement {
                id: 1,
                tag_summary: "<a href=\"https://example.com/\">".into(),
                text: "Home".into(),
                visible: true,
                handle: "9".into(),
            },
            IndexedElement {
                id: 2,
                tag_summary: "<input type=\"search\">".into(),
                text: String::new(),
                visible: true,
                handle: "10".into(),
            },
        ];
        assert_eq!(
            format_elements(&elements),
            "[1] <a href=\"https://example.com/\"> Home\n[2] <input type=\"search\">"
        );
    }
}
