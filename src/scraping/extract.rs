//! HTML → readable text and link extraction.
//!
//! Two passes compete on static pages: Mozilla-style readability and a
//! block-level heuristic over `<p>`, headings, list items and the like. The
//! longer result wins. Rendered (browser) pages only get the heuristic, since
//! they are usually application shells readability scores poorly.

use readability::extractor;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::{debug, warn};
use url::Url;

const BLOCK_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "pre", "blockquote", "td",
];

const NOISE_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "footer", "header", "aside", "form", "iframe", "svg",
    "button", "template",
];

/// Title and main text of a statically fetched page.
pub fn static_text(html: &str, url: &Url) -> (Option<String>, String) {
    let document = Html::parse_document(html);
    let title = page_title(&document);

    let readability_text = match extractor::extract(&mut html.as_bytes(), url) {
        Ok(product) => collapse_whitespace(&product.text),
        Err(e) => {
            warn!("Readability extraction failed for {}: {}", url, e);
            String::new()
        }
    };
    let heuristic_text = block_text(&document);

    debug!(
        "Extraction passes for {} - Readability: {} chars, Heuristic: {} chars",
        url,
        readability_text.len(),
        heuristic_text.len()
    );

    let text = if heuristic_text.len() > readability_text.len() {
        heuristic_text
    } else {
        readability_text
    };
    (title, text)
}

/// Title and main text of browser-rendered HTML.
pub fn rendered_text(html: &str) -> (Option<String>, String) {
    let document = Html::parse_document(html);
    let title = page_title(&document);
    let mut text = block_text(&document);
    if text.is_empty() {
        text = loose_text(&document);
    }
    (title, text)
}

/// Absolute http(s) links of a page, fragment-free, in document order.
pub fn extract_links(html: &str, base_url: &Url) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();
    let mut seen = HashSet::new();

    let Ok(selector) = Selector::parse("a[href]") else {
        return links;
    };
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
            || href.starts_with("data:")
        {
            continue;
        }
        let Ok(mut absolute) = base_url.join(href) else {
            continue;
        };
        if absolute.scheme() != "http" && absolute.scheme() != "https" {
            continue;
        }
        absolute.set_fragment(None);
        let absolute = absolute.to_string();
        if seen.insert(absolute.clone()) {
            links.push(absolute);
        }
    }
    links
}

fn page_title(document: &Html) -> Option<String> {
    for css in ["title", "h1"] {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };
        if let Some(el) = document.select(&selector).next() {
            let t = collapse_whitespace(&el.text().collect::<String>());
            if !t.is_empty() {
                return Some(t);
            }
        }
    }
    None
}

/// Join the text of outermost block-level elements outside navigation chrome.
fn block_text(document: &Html) -> String {
    let Ok(selector) = Selector::parse(&BLOCK_TAGS.join(", ")) else {
        return String::new();
    };
    let mut parts = Vec::new();
    for element in document.select(&selector) {
        if has_ancestor_in(&element, NOISE_TAGS) || has_ancestor_in(&element, BLOCK_TAGS) {
            continue;
        }
        let t = visible_text(&element);
        if !t.is_empty() {
            parts.push(t);
        }
    }
    parts.join("\n\n")
}

/// Whole-body text for pages without block markup (div soup).
fn loose_text(document: &Html) -> String {
    let Ok(selector) = Selector::parse("body") else {
        return String::new();
    };
    document
        .select(&selector)
        .next()
        .map(|body| visible_text(&body))
        .unwrap_or_default()
}

fn visible_text(element: &ElementRef) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| NOISE_TAGS.contains(&e.name()))
        });
        if !hidden {
            out.push_str(text);
            out.push(' ');
        }
    }
    collapse_whitespace(&out)
}

fn has_ancestor_in(element: &ElementRef, tags: &[&str]) -> bool {
    element.ancestors().any(|a| {
        a.value()
            .as_element()
            .is_some_and(|e| tags.contains(&e.name()))
    })
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
