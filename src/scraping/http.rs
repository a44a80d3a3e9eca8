use super::session::HttpFetch;
use crate::antibot;
use crate::core::error::FetchError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// [`HttpFetch`] over reqwest with rotating user agents and stealth headers.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::Fatal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

/// Map a non-success status to a fetch error; `None` for 2xx.
pub fn classify_status(status: StatusCode) -> Option<FetchError> {
    if status.is_success() {
        return None;
    }
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        return Some(FetchError::Transient(format!("http_{}", status.as_u16())));
    }
    Some(FetchError::Fatal(format!("http_{}", status.as_u16())))
}

fn classify_transport(e: &reqwest::Error) -> FetchError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        FetchError::Transient(e.to_string())
    } else {
        FetchError::Fatal(e.to_string())
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn get(&self, url: &str) -> Result<String, FetchError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(FetchError::Fatal(format!(
                "Invalid URL: must start with http:// or https:// ({})",
                url
            )));
        }

        let mut req = self
            .client
            .get(url)
            .header("User-Agent", antibot::get_random_user_agent());
        for (k, v) in antibot::get_stealth_headers() {
            req = req.header(k, v);
        }

        let resp = req.send().await.map_err(|e| classify_transport(&e))?;
        let status = resp.status();
        if let Some(err) = classify_status(status) {
            debug!("GET {} → {}", url, status);
            return Err(err);
        }
        resp.text().await.map_err(|e| classify_transport(&e))
    }
}
