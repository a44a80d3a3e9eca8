//! Search engine records and result-link normalization.
//!
//! Engines are plain data: a start page plus seed selectors for the search
//! box and the result list. Which seed actually works is learned by the
//! selector policy, so markup drift only costs a few penalties.

use crate::core::error::ResearchError;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub name: String,
    /// Page that hosts the search box.
    pub search_url: String,
    #[serde(default)]
    pub search_box_selectors: Vec<String>,
    /// Selectors for result links (or containers holding them).
    #[serde(default)]
    pub result_selectors: Vec<String>,
}

impl EngineConfig {
    pub fn new(name: &str, search_url: &str, search_box: &[&str], results: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            search_url: search_url.to_string(),
            search_box_selectors: search_box.iter().map(|s| s.to_string()).collect(),
            result_selectors: results.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn validate(&self) -> Result<(), ResearchError> {
        if self.name.trim().is_empty() {
            return Err(ResearchError::Config("engine name must not be empty".into()));
        }
        let url = Url::parse(&self.search_url).map_err(|e| {
            ResearchError::Config(format!(
                "engine '{}': invalid search_url '{}': {}",
                self.name, self.search_url, e
            ))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ResearchError::Config(format!(
                "engine '{}': search_url must be http(s)",
                self.name
            )));
        }
        if self.search_box_selectors.iter().all(|s| s.trim().is_empty()) {
            return Err(ResearchError::Config(format!(
                "engine '{}': no search box selectors",
                self.name
            )));
        }
        if self.result_selectors.iter().all(|s| s.trim().is_empty()) {
            return Err(ResearchError::Config(format!(
                "engine '{}': no result selectors",
                self.name
            )));
        }
        Ok(())
    }

    pub fn host(&self) -> Option<String> {
        Url::parse(&self.search_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }
}

/// Google, Bing, DuckDuckGo and Brave with their currently known selectors.
pub fn builtin_engines() -> Vec<EngineConfig> {
    vec![
        EngineConfig::new(
            "google",
            "https://www.google.com/?hl=en",
            &["textarea[name=\"q\"]", "input[name=\"q\"]"],
            &["div.yuRUbf > a", "div.g a[href^=\"http\"]"],
        ),
        EngineConfig::new(
            "bing",
            "https://www.bing.com/",
            &["#sb_form_q", "input[name=\"q\"]"],
            &["li.b_algo h2 a", "#b_results h2 a"],
        ),
        EngineConfig::new(
            "duckduckgo",
            "https://html.duckduckgo.com/html/",
            &["input[name=\"q\"]"],
            &["a.result__a", "h2.result__title a"],
        ),
        EngineConfig::new(
            "brave",
            "https://search.brave.com/",
            &["#searchbox", "input[name=\"q\"]"],
            &["div.snippet a.heading-serpresult", "#results a[href^=\"http\"]"],
        ),
    ]
}

/// Built-in engines matching `names` (case-insensitive), in the given order.
pub fn by_names(names: &[&str]) -> Vec<EngineConfig> {
    let builtins = builtin_engines();
    names
        .iter()
        .filter_map(|n| {
            builtins
                .iter()
                .find(|e| e.name.eq_ignore_ascii_case(n.trim()))
                .cloned()
        })
        .collect()
}

/// Turn a result `href` into the destination url.
///
/// Relative links resolve against the results page; Google `/url?q=`,
/// DuckDuckGo `/l/?uddg=` and Bing `/ck/?u=a1<base64>` redirects are
/// unwrapped. Links that still point at the engine itself, and non-http(s)
/// links, yield `None`.
pub fn normalize_result_href(href: &str, page_url: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    let resolved = page_url.join(href).ok()?;
    let target = unwrap_redirect(&resolved).unwrap_or(resolved);

    if target.scheme() != "http" && target.scheme() != "https" {
        return None;
    }
    let engine_host = page_url.host_str().unwrap_or("");
    let target_host = target.host_str().unwrap_or("");
    if !engine_host.is_empty() && site_domain(target_host) == site_domain(engine_host) {
        return None;
    }
    Some(target.to_string())
}

fn unwrap_redirect(url: &Url) -> Option<Url> {
    let host = url.host_str()?;
    let path = url.path();

    let param = |key: &str| -> Option<String> {
        url.query_pairs()
            .find(|(k, v)| k == key && !v.trim().is_empty())
            .map(|(_, v)| v.to_string())
    };

    if site_domain(host).starts_with("google.") && path == "/url" {
        let dest = param("q").or_else(|| param("url"))?;
        return Url::parse(&dest).ok();
    }
    if site_domain(host) == "duckduckgo.com" && path.starts_with("/l/") {
        return Url::parse(&param("uddg")?).ok();
    }
    if site_domain(host) == "bing.com" && path.starts_with("/ck/") {
        // Observed format: u=a1<base64(url)>
        let raw = param("u")?;
        let raw = raw.strip_prefix("a1").unwrap_or(&raw);
        let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(raw.trim_end_matches('='))
            .or_else(|_| base64::engine::general_purpose::STANDARD.decode(raw))
            .ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        return Url::parse(decoded.trim()).ok();
    }
    None
}

/// Second-level labels used under country-code TLDs (`co.uk`, `com.au`).
const COUNTRY_SECOND_LEVELS: &[&str] = &["co", "com", "net", "org", "gov", "edu", "ac", "ne", "or", "go"];

/// Registrable domain of a host (`html.duckduckgo.com` → `duckduckgo.com`,
/// `www.google.co.uk` → `google.co.uk`).
fn site_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let labels: Vec<&str> = host.split('.').collect();
    let n = labels.len();
    let keep = if n >= 3 && labels[n - 1].len() == 2 && COUNTRY_SECOND_LEVELS.contains(&labels[n - 2]) {
        3
    } else {
        2
    };
    if n <= keep {
        return host;
    }
    labels[n - keep..].join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str) -> Url {
        Url::parse(url).unwrap()
    }

    #[test]
    fn builtins_are_valid() {
        let engines = builtin_engines();
        assert_eq!(engines.len(), 4);
        for e in &engines {
            e.validate().unwrap();
        }
    }

    #[test]
    fn by_names_keeps_requested_order() {
        let picked = by_names(&["Bing", "nope", "google"]);
        let names: Vec<_> = picked.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["bing", "google"]);
    }

    #[test]
    fn engine_without_selectors_is_rejected() {
        let e = EngineConfig::new("empty", "https://e.example/", &[], &["a"]);
        assert!(matches!(e.validate(), Err(ResearchError::Config(_))));
        let e = EngineConfig::new("bad", "not a url", &["#q"], &["a"]);
        assert!(matches!(e.validate(), Err(ResearchError::Config(_))));
    }

    #[test]
    fn google_redirect_is_unwrapped() {
        let got = normalize_result_href(
            "/url?q=https://tokio.rs/tokio/tutorial&sa=U",
            &page("https://www.google.com/search?q=tokio"),
        );
        assert_eq!(got.as_deref(), Some("https://tokio.rs/tokio/tutorial"));
    }

    #[test]
    fn country_code_engines_keep_their_own_domain() {
        let base = page("https://www.google.co.uk/search?q=tokio");
        let got = normalize_result_href("/url?q=https://www.bbc.co.uk/news&sa=U", &base);
        assert_eq!(got.as_deref(), Some("https://www.bbc.co.uk/news"));
        assert_eq!(
            normalize_result_href("https://www.gov.uk/guidance", &base).as_deref(),
            Some("https://www.gov.uk/guidance")
        );
        assert!(normalize_result_href("https://maps.google.co.uk/", &base).is_none());
        assert_eq!(site_domain("www.google.co.uk"), "google.co.uk");
        assert_eq!(site_domain("news.ycombinator.com"), "ycombinator.com");
        assert_eq!(site_domain("localhost"), "localhost");
    }

    #[test]
    fn ddg_redirect_is_unwrapped() {
        let got = normalize_result_href(
            "//duckduckgo.com/l/?uddg=https%3A%2F%2Fdocs.rs%2Ftokio&rut=abc",
            &page("https://html.duckduckgo.com/html/"),
        );
        assert_eq!(got.as_deref(), Some("https://docs.rs/tokio"));
    }

    #[test]
    fn bing_redirect_is_unwrapped() {
        let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode("https://crates.io/crates/tokio");
        let href = format!("https://www.bing.com/ck/a?!&&p=x&u=a1{}&ntb=1", encoded);
        let got = normalize_result_href(&href, &page("https://www.bing.com/search?q=tokio"));
        assert_eq!(got.as_deref(), Some("https://crates.io/crates/tokio"));
    }

    #[test]
    fn links_back_to_engine_are_dropped() {
        let base = page("https://www.google.com/search?q=tokio");
        assert!(normalize_result_href("/search?q=more", &base).is_none());
        assert!(normalize_result_href("https://maps.google.com/", &base).is_none());
        assert!(normalize_result_href("mailto:x@y.z", &base).is_none());
        assert_eq!(
            normalize_result_href("https://tokio.rs/", &base).as_deref(),
            Some("https://tokio.rs/")
        );
    }
}
