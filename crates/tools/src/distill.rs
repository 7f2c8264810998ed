//! Page markup to compact, model-friendly text.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

use crate::truncate_with_ellipsis;

/// Regions moved to the front of the output, in this order.
const IMPORTANT_REGIONS: &[&str] = &["main", "[role=\"main\"]", "#bodyContent", "#search", ".kp-header"];

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template", "head", "svg", "iframe"];

const PSEUDO_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6", "form"];

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "details", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "header", "hr", "main", "nav", "ol", "p", "pre",
    "section", "summary", "table", "tr", "ul",
];

const MARKER_ATTRS: &[&str] = &["href", "type", "placeholder", "title", "role", "value"];

const MARKER_TEXT_LIMIT: usize = 60;
const MARKER_ATTR_LIMIT: usize = 60;

static IMPORTANT_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    IMPORTANT_REGIONS
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
});

static BODY_SELECTOR: Lazy<Option<Selector>> = Lazy::new(|| Selector::parse("body").ok());

static INLINE_WS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[ \t\u{a0}\r\f\v]+").expect("inline whitespace regex is valid")
});

/// Distill page markup. Output depends only on the markup, including any
/// `data-wr-id` stamps left by the element indexer. The caller truncates.
pub fn distill(html: &str) -> String {
    distill_with_limits(html, MARKER_TEXT_LIMIT, MARKER_ATTR_LIMIT)
}

/// [`distill`] with element markers cut to `text_limit` characters of text
/// and `attr_limit` characters per attribute value.
pub fn distill_with_limits(html: &str, text_limit: usize, attr_limit: usize) -> String {
    let document = Html::parse_document(html);
    let root = BODY_SELECTOR
        .as_ref()
        .and_then(|sel| document.select(sel).next())
        .unwrap_or_else(|| document.root_element());

    let mut regions: Vec<ElementRef> = Vec::new();
    for selector in IMPORTANT_SELECTORS.iter() {
        for el in root.select(selector) {
            if !regions.contains(&el) {
                regions.push(el);
            }
        }
    }

    let mut walker = Walker {
        out: String::new(),
        important: regions.clone(),
        emitted: Vec::new(),
        text_limit,
        attr_limit,
    };

    for region in regions {
        if walker.mark_emitted(region) {
            walker.children(region);
            walker.out.push('\n');
        }
    }
    walker.children(root);

    clean_text(&walker.out)
}

struct Walker<'a> {
    out: String,
    important: Vec<ElementRef<'a>>,
    emitted: Vec<ElementRef<'a>>,
    text_limit: usize,
    attr_limit: usize,
}

impl<'a> Walker<'a> {
    /// `false` when the region was already emitted.
    fn mark_emitted(&mut self, el: ElementRef<'a>) -> bool {
        if self.emitted.contains(&el) {
            return false;
        }
        self.emitted.push(el);
        true
    }

    fn children(&mut self, el: ElementRef<'a>) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => {
                    self.out.push(' ');
                    self.out.push_str(text);
                }
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        self.element(child_el);
                    }
                }
                _ => {}
            }
        }
    }

    fn element(&mut self, el: ElementRef<'a>) {
        let tag = el.value().name();
        if SKIPPED_TAGS.contains(&tag) || el.value().attr("type") == Some("hidden") {
            return;
        }

        if self.important.contains(&el) && !self.mark_emitted(el) {
            return;
        }

        if let Some(id) = el.value().attr("data-wr-id") {
            self.out.push_str(&format!(" {} ", addressable_marker(el, id, self.text_limit, self.attr_limit)));
            return;
        }

        if PSEUDO_TAGS.contains(&tag) {
            self.out.push_str(&format!("\n<{}>", tag));
            self.children(el);
            self.out.push_str(&format!("</{}>\n", tag));
            return;
        }

        if tag == "li" {
            self.out.push_str("\n- ");
            self.children(el);
            return;
        }

        let block = BLOCK_TAGS.contains(&tag);
        if block {
            self.out.push('\n');
        }
        self.children(el);
        if block {
            self.out.push('\n');
        }
    }
}

/// `[#id <tag attrs> text]`
fn addressable_marker(el: ElementRef, id: &str, text_limit: usize, attr_limit: usize) -> String {
    let tag = el.value().name();
    let mut summary = format!("<{}", tag);
    for name in MARKER_ATTRS {
        if let Some(value) = el.value().attr(name) {
            let value = value.trim();
            if !value.is_empty() {
                let value = truncate_with_ellipsis(value, attr_limit).replace('"', "&quot;");
                summary.push_str(&format!(" {}=\"{}\"", name, value));
            }
        }
    }
    summary.push('>');

    let text = el.text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let text = truncate_with_ellipsis(&text, text_limit);
    if text.is_empty() {
        format!("[#{} {}]", id, summary)
    } else {
        format!("[#{} {} {}]", id, summary, text)
    }
}

/// Collapse runs of spaces within lines and keep at most one blank line
/// between content lines.
fn clean_text(raw: &str) -> String {
    let mut result = String::with_capacity(raw.len());
    let mut pending_blank = false;

    for line in raw.lines() {
        let line = INLINE_WS.replace_all(line, " ");
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed == "-" {
            pending_blank = !result.is_empty();
            continue;
        }
        if !result.is_empty() {
            result.push('\n');
            if pending_blank {
                result.push('\n');
            }
        }
        pending_blank = false;
        result.push_str(trimmed);
    }

    result
}
