//! Observation texts fed back to the model after each tool call.

use webrover_tools::browser::{format_elements, IndexedElement};

pub const LIST_REDACTED: &str = "<list redacted>";
pub const CONTENT_REDACTED: &str = "<content redacted>";

/// Full text plus the stand-in sent once the page is no longer current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub content: String,
    pub redacted: Option<String>,
}

impl Observation {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), redacted: None }
    }

    /// `message` followed by a bulky `body`; the stand-in keeps only the message.
    fn with_body(message: &str, body: &str, stand_in: &str) -> Self {
        Self {
            content: format!("{}\n\n{}", message, body),
            redacted: Some(format!("{}\n\n{}", message, stand_in)),
        }
    }

    /// Concatenate observations produced by one compound call.
    pub fn join(parts: Vec<Observation>) -> Self {
        let redacted = parts.iter().any(|p| p.redacted.is_some()).then(|| {
            parts
                .iter()
                .map(|p| p.redacted.as_deref().unwrap_or(&p.content))
                .collect::<Vec<_>>()
                .join("\n\n")
        });
        let content = parts.iter().map(|p| p.content.as_str()).collect::<Vec<_>>().join("\n\n");
        Self { content, redacted }
    }
}

const NEXT_STEP_HINT: &str = "What should I do next? Please call \"list_links\" to list all the links on the page or \"list_inputs\" to list all the input fields on the page. You can also call \"get_content\" to get the content of the page.";

pub fn plan_acknowledged() -> Observation {
    Observation::text("OK. Please continue according to your plan.")
}

/// Arrival after `goto_url`, with the links scraped from the new page.
pub fn arrived(url: &str, links: &[IndexedElement]) -> Observation {
    let message = format!(
        "I'm on {} now. What should I do next? Call list_links to get a list of the links on the page. Call list_inputs to list all the input fields on the page. Call get_content to get the text content of the page.",
        url
    );
    if links.is_empty() {
        Observation::text(message)
    } else {
        Observation::with_body(
            &format!("{} These are the links on the page:", message),
            &format_elements(links),
            LIST_REDACTED,
        )
    }
}

pub fn navigation_failed(url: &str, error: &str) -> Observation {
    Observation::text(format!(
        "Sorry, but I could not open {} ({}). Please try another URL or another command.",
        url, error
    ))
}

pub fn download_notice() -> Observation {
    Observation::text(
        "NOTICE: The connection was aborted. If you clicked on a download link, the file has been downloaded to the default Chrome downloads location.",
    )
}

pub fn no_navigation(url: &str) -> Observation {
    Observation::text(format!(
        "No navigation occurred within the time limit. I'm on {} now. {}",
        url, NEXT_STEP_HINT
    ))
}

pub fn links_listed(links: &[IndexedElement]) -> Observation {
    if links.is_empty() {
        return Observation::text("There are no links on the page.");
    }
    Observation::with_body(
        "Here is the list of links on the page. Please call \"list_inputs\" if you want to see the list of the inputs instead or call \"click_link\" with the ID number of a link to click it.",
        &format_elements(links),
        LIST_REDACTED,
    )
}

pub fn inputs_listed(inputs: &[IndexedElement]) -> Observation {
    if inputs.is_empty() {
        return Observation::text("There are no inputs on the page.");
    }
    Observation::with_body(
        "Here is the list of inputs on the page. Please call \"list_links\" if you want to see the list of the links instead or call \"type_text\" with the ID number of the input field and the text to type.",
        &format_elements(inputs),
        LIST_REDACTED,
    )
}

pub fn clicked(url: &str) -> Observation {
    Observation::text(format!("OK. I clicked the link. I'm on {} now. {}", url, NEXT_STEP_HINT))
}

/// `link_text` is empty when the id was not in the latest scrape.
pub fn not_clickable(link_id: u32, link_text: &str, links: &[IndexedElement]) -> Observation {
    Observation::with_body(
        &format!(
            "Sorry, but link number {} ({}) is not clickable, please select another link or another command. You can also try to go to the link URL directly with \"goto_url\". You can also call \"get_content\" to get the content of the page. Here's the list of links again:",
            link_id, link_text
        ),
        &format_elements(links),
        LIST_REDACTED,
    )
}

pub fn typed(text: &str, input_id: u32) -> Observation {
    Observation::text(format!(
        "OK. I typed \"{}\" to the input box {}. What should I do next? Please call \"send_form\" if you want to submit the form.",
        text, input_id
    ))
}

pub fn command_error() -> Observation {
    Observation::text("Sorry, but there was an error with that command. Please try another command.")
}

pub fn form_sent(url: &str) -> Observation {
    Observation::text(format!("OK. I sent the form. I'm on {} now. {}", url, NEXT_STEP_HINT))
}

pub fn form_not_sent() -> Observation {
    Observation::text(
        "Sorry, but I could not send the form. Please type into an input field with \"type_text\" first, or try another command.",
    )
}

pub fn page_content(content: &str) -> Observation {
    let message = "Here's the current page content. Please call the next function.";
    Observation {
        content: format!("{}{}", message, content_frame(content)),
        redacted: Some(format!("{}\n\n{}", message, CONTENT_REDACTED)),
    }
}

/// Characters taken by the framing around page content.
pub fn page_content_overhead() -> usize {
    page_content("").content.chars().count()
}

fn content_frame(content: &str) -> String {
    format!(
        "\n\n## CONTENT START ##\n{}\n## CONTENT END ##\n\nPlease call the next function or the 'answer_user' function if the user's task has been completed.",
        content
    )
}

/// Characters `file_contents` adds around the file body.
pub fn file_contents_overhead(path: &str) -> usize {
    file_contents(path, "").content.chars().count()
}

pub fn file_contents(path: &str, content: &str) -> Observation {
    let message = format!("Here are the contents of the file {}.", path);
    Observation {
        content: format!(
            "{}\n\n## FILE START ##\n{}\n## FILE END ##\n\nPlease call the next function.",
            message, content
        ),
        redacted: Some(format!("{}\n\n{}", message, CONTENT_REDACTED)),
    }
}

pub fn file_missing(path: &str) -> Observation {
    Observation::text(format!(
        "Sorry, but the file {} does not exist. Please try another command.",
        path
    ))
}

pub fn file_not_permitted(path: &str) -> Observation {
    Observation::text(format!(
        "Sorry, but I am not permitted to read the file {}. Please try another command.",
        path
    ))
}

pub fn unknown_function() -> Observation {
    Observation::text("That is an unknown function. Please call another one")
}

pub fn invalid_arguments(name: &str, reason: &str) -> Observation {
    Observation::text(format!(
        "The arguments for \"{}\" were invalid ({}). Please call it again with valid arguments or call another function.",
        name, reason
    ))
}

/// Recorded against `answer_user` once the answer reached the operator.
pub fn answer_delivered() -> Observation {
    Observation::text("The answer was shown to the user.")
}

/// Answers may wrap the page address in `[url]...[/url]`.
pub fn render_answer(answer: &str, current_url: &str) -> String {
    answer.replacen("[url]", current_url, 1).replacen("[/url]", "", 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(id: u32, text: &str) -> IndexedElement {
        IndexedElement {
            id,
            tag_summary: "<a href=\"https://example.com/\">".into(),
            text: text.into(),
            visible: true,
            handle: id.to_string(),
        }
    }

    #[test]
    fn test_links_listed_has_redacted_form() {
        let obs = links_listed(&[link(1, "Home")]);
        assert!(obs.content.contains("[1] <a href=\"https://example.com/\"> Home"));
        assert!(obs.redacted.as_deref().unwrap().ends_with("\n\n<list redacted>"));

        let empty = links_listed(&[]);
        assert_eq!(empty.content, "There are no links on the page.");
        assert!(empty.redacted.is_none());
    }

    #[test]
    fn test_page_content_framing() {
        let obs = page_content("Hello");
        assert!(obs.content.contains("## CONTENT START ##\nHello\n## CONTENT END ##"));
        assert_eq!(
            obs.redacted.as_deref(),
            Some("Here's the current page content. Please call the next function.\n\n<content redacted>")
        );
        assert_eq!(page_content_overhead() + 5, obs.content.chars().count());
    }

    #[test]
    fn test_file_contents_overhead() {
        let obs = file_contents("notes.txt", "abc");
        assert_eq!(file_contents_overhead("notes.txt") + 3, obs.content.chars().count());
    }

    #[test]
    fn test_join_uses_stand_ins_where_present() {
        let obs = Observation::join(vec![typed("a", 1), typed("b", 2), links_listed(&[link(1, "x")])]);
        assert!(obs.content.starts_with("OK. I typed \"a\" to the input box 1."));
        assert!(obs.content.contains("OK. I typed \"b\" to the input box 2."));
        let redacted = obs.redacted.unwrap();
        assert!(redacted.contains("OK. I typed \"b\""));
        assert!(redacted.ends_with("<list redacted>"));
    }

    #[test]
    fn test_render_answer_replaces_url_markers() {
        assert_eq!(
            render_answer("See [url]here[/url].", "https://example.com/"),
            "See https://example.com/here."
        );
        assert_eq!(render_answer("No markers", "u"), "No markers");
    }

    #[test]
    fn test_not_clickable_mentions_id_and_text() {
        let obs = not_clickable(9, "", &[link(1, "Home")]);
        assert!(obs.content.starts_with("Sorry, but link number 9 () is not clickable"));
        assert!(obs.content.contains("Here's the list of links again:\n\n[1]"));
    }
}
