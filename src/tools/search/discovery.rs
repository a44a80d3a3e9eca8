//! Structural selector discovery from rendered engine HTML.
//!
//! When every known selector for a role misses, the page itself is scanned
//! for elements that look like a search field or a list of outbound result
//! links, and selectors for them are proposed in order of confidence. Only
//! selectors that parse and match something on the page are returned.

use super::urls_in_document;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use url::Url;

const SEARCH_FIELD_NAMES: &[&str] = &["q", "query", "search", "search_query", "p", "text", "k"];
const MAX_RESULT_CANDIDATES: usize = 8;

/// Selectors for elements that look like the engine's search field.
pub fn search_box_candidates(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let ident = css_ident();
    let mut proposed: Vec<String> = Vec::new();

    let Ok(fields) = Selector::parse("input, textarea") else {
        return proposed;
    };
    for field in doc.select(&fields) {
        let el = field.value();
        let tag = el.name();
        let kind = el.attr("type").unwrap_or("text").to_ascii_lowercase();
        if tag == "input" && !matches!(kind.as_str(), "text" | "search") {
            continue;
        }
        let name = el.attr("name").unwrap_or("");
        let role = el.attr("role").unwrap_or("");
        let label = el.attr("aria-label").unwrap_or("").to_ascii_lowercase();
        let placeholder = el.attr("placeholder").unwrap_or("").to_ascii_lowercase();
        let in_search_form = field.ancestors().filter_map(ElementRef::wrap).any(|a| {
            a.value().name() == "form"
                && (a.value().attr("role") == Some("search")
                    || a.value().attr("action").is_some_and(|x| x.contains("search")))
        });

        let looks_like_search = kind == "search"
            || SEARCH_FIELD_NAMES.contains(&name)
            || matches!(role, "searchbox" | "combobox")
            || label.contains("search")
            || placeholder.contains("search")
            || in_search_form;
        if !looks_like_search {
            continue;
        }

        if let Some(id) = el.id().filter(|id| ident.as_ref().is_some_and(|re| re.is_match(id))) {
            proposed.push(format!("#{}", id));
        }
        if !name.is_empty() && !name.contains('"') {
            proposed.push(format!("{}[name=\"{}\"]", tag, name));
        }
        if kind == "search" {
            proposed.push(format!("{}[type=\"search\"]", tag));
        }
        if !role.is_empty() && !role.contains('"') {
            proposed.push(format!("{}[role=\"{}\"]", tag, role));
        }
        if in_search_form {
            proposed.push(format!("form[role=\"search\"] {}", tag));
        }
    }

    keep_matching(&doc, proposed)
}

/// Selectors for the repeated structure holding outbound result links,
/// best first (most result links matched).
pub fn result_list_candidates(html: &str, page_url: &Url) -> Vec<String> {
    let doc = Html::parse_document(html);
    let ident = css_ident();
    let is_ident = |s: &str| ident.as_ref().is_some_and(|re| re.is_match(s));

    let Ok(anchors) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut proposed: Vec<String> = Vec::new();
    for a in doc.select(&anchors) {
        let href = a.value().attr("href").unwrap_or("");
        if super::engines::normalize_result_href(href, page_url).is_none() {
            continue;
        }

        if let Some(class) = a.value().classes().find(|c| is_ident(c)) {
            proposed.push(format!("a.{}", class));
        }

        let mut heading_seen = false;
        for ancestor in a.ancestors().filter_map(ElementRef::wrap) {
            let el = ancestor.value();
            let tag = el.name();
            if matches!(tag, "body" | "html") {
                break;
            }
            if !heading_seen && matches!(tag, "h2" | "h3") {
                heading_seen = true;
                proposed.push(format!("{} a", tag));
                continue;
            }
            if let Some(class) = el.classes().find(|c| is_ident(c)) {
                proposed.push(format!("{}.{} a[href]", tag, class));
            }
            if let Some(id) = el.id().filter(|id| is_ident(id)) {
                proposed.push(format!("#{} a[href]", id));
                break;
            }
        }
    }

    // Rank by how many result links each selector reaches.
    let mut order: Vec<String> = Vec::new();
    let mut hits: HashMap<String, usize> = HashMap::new();
    for css in proposed {
        if hits.contains_key(&css) {
            continue;
        }
        let Ok(sel) = Selector::parse(&css) else {
            continue;
        };
        let n = urls_in_document(&doc, &sel, page_url, usize::MAX).len();
        if n > 0 {
            hits.insert(css.clone(), n);
            order.push(css);
        }
    }
    // Stable: equal counts keep discovery order.
    order.sort_by(|a, b| hits[b].cmp(&hits[a]));
    order.truncate(MAX_RESULT_CANDIDATES);
    order
}

fn keep_matching(doc: &Html, proposed: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for css in proposed {
        if out.contains(&css) {
            continue;
        }
        let Ok(sel) = Selector::parse(&css) else {
            continue;
        };
        if doc.select(&sel).next().is_some() {
            out.push(css);
        }
    }
    out
}

fn css_ident() -> Option<Regex> {
    Regex::new(r"^-?[_a-zA-Z][_a-zA-Z0-9-]*$").ok()
}
