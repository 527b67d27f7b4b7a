//! DOM helpers shared by link discovery and content extraction.
//!
//! `scraper::Html` is not `Send`, so documents are parsed and dropped inside
//! these synchronous helpers and never held across an `.await`.

use crate::utils::normalize_whitespace;
use itertools::Itertools;
use scraper::{ElementRef, Html, Selector};
use url::Url;

// Elements whose boundaries separate words in rendered text.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav",
    "ol", "p", "pre", "section", "table", "td", "th", "tr", "ul",
];

// Elements whose text children are not visible content.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Attributes checked, in order, for an image URL.
pub const IMAGE_ATTRIBUTES: [&str; 3] = ["data-src", "data-original", "src"];

/// Every `a[href]` on the page resolved against `base`, in document order,
/// duplicates removed. Targets that do not resolve are dropped.
pub fn absolute_links(html: &str, base: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let anchors = Selector::parse("a[href]").unwrap();

    document
        .select(&anchors)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .map(|url| url.to_string())
        .unique()
        .collect()
}

/// Visible text of `element` with whitespace collapsed.
///
/// Descendants matching `exclude` are left out of the text entirely, as if
/// they had been removed from the tree first. Block elements are separated
/// from their neighbours on both sides. Returns `None` when nothing but
/// whitespace remains.
pub fn text_of(element: ElementRef<'_>, exclude: Option<&Selector>) -> Option<String> {
    // Explicit stack so deeply nested markup cannot overflow the call stack.
    let mut stack = Vec::new();
    push_children(element, &mut stack);

    let mut text = String::new();
    while let Some(step) = stack.pop() {
        match step {
            Step::Text(chunk) => text.push_str(chunk),
            Step::Gap => text.push(' '),
            Step::Element(el) => {
                let name = el.value().name();
                if RAW_TEXT_ELEMENTS.contains(&name) || exclude.is_some_and(|sel| sel.matches(&el))
                {
                    continue;
                }
                let block = BLOCK_ELEMENTS.contains(&name);
                if block {
                    text.push(' ');
                    stack.push(Step::Gap);
                }
                push_children(el, &mut stack);
            }
        }
    }

    let text = normalize_whitespace(&text);
    (!text.is_empty()).then_some(text)
}

enum Step<'a> {
    Element(ElementRef<'a>),
    Text(&'a str),
    Gap,
}

// Pushed in reverse so children pop in document order.
fn push_children<'a>(element: ElementRef<'a>, stack: &mut Vec<Step<'a>>) {
    for child in element.children().rev() {
        if let Some(chunk) = child.value().as_text() {
            stack.push(Step::Text(chunk));
        } else if let Some(el) = ElementRef::wrap(child) {
            stack.push(Step::Element(el));
        }
    }
}

/// Image URL of `element`: the first non-blank of `data-src`,
/// `data-original` and `src`, as written in the page.
pub fn image_url(element: ElementRef<'_>) -> Option<String> {
    IMAGE_ATTRIBUTES
        .iter()
        .filter_map(|name| element.value().attr(name))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}
