//! Pluggable I/O capabilities supplied by the surrounding application.
//!
//! * [`HttpFetch`]: plain HTTP GET returning the response body.
//! * [`BrowserLauncher`] / [`BrowserSession`]: a script-executing browser
//!   that can navigate, locate elements by CSS selector, type into them and
//!   hand back the rendered HTML.
//!
//! Default implementations live in [`super::http`] (reqwest) and
//! [`super::browser_manager`] (chromiumoxide). Tests plug in-memory fakes.

use crate::core::error::{BrowserError, FetchError};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Typing this character as the last key submits the focused form.
pub const SUBMIT_KEY: char = '\n';

#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// GET `url` and return the body as text.
    async fn get(&self, url: &str) -> Result<String, FetchError>;
}

/// An element located on the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// The selector that matched; sessions re-resolve the element through it.
    pub selector: String,
    pub tag: Option<String>,
    pub outer_html: Option<String>,
}

impl Element {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            tag: None,
            outer_html: None,
        }
    }
}

#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    /// Wait up to `timeout` for `selector` to match on the current page.
    ///
    /// `Ok(None)` means the selector located nothing in time; `Err` is
    /// reserved for the session itself failing.
    async fn locate(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Option<Element>, BrowserError>;

    /// Type `text` into `element`. A trailing [`SUBMIT_KEY`] presses Enter.
    async fn send_keys(&mut self, element: &Element, text: &str) -> Result<(), BrowserError>;

    /// Rendered HTML of the current page.
    async fn html(&mut self) -> Result<String, BrowserError>;

    /// Release the underlying browser. Must be safe to call once per session.
    async fn close(&mut self) -> Result<(), BrowserError>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

/// Run one browser step under `limit`; expiry becomes [`BrowserError::Timeout`].
pub async fn within<T, F>(limit: Duration, step: &str, fut: F) -> Result<T, BrowserError>
where
    F: Future<Output = Result<T, BrowserError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(BrowserError::Timeout(format!(
            "{} after {}ms",
            step,
            limit.as_millis()
        ))),
    }
}

/// A browser session with guaranteed release.
///
/// Call [`ScopedSession::release`] on every normal exit path. If the guard is
/// dropped without it (cancellation, timeout, panic unwinding) the session is
/// closed on a background task of the current runtime.
pub struct ScopedSession {
    inner: Option<Box<dyn BrowserSession>>,
}

impl ScopedSession {
    pub async fn acquire(launcher: &dyn BrowserLauncher) -> Result<Self, BrowserError> {
        let session = launcher.launch().await?;
        Ok(Self {
            inner: Some(session),
        })
    }

    pub fn get(&mut self) -> Result<&mut (dyn BrowserSession + 'static), BrowserError> {
        self.inner.as_deref_mut().ok_or(BrowserError::Closed)
    }

    /// Close the session now.
    pub async fn release(mut self) {
        if let Some(mut session) = self.inner.take() {
            if let Err(e) = session.close().await {
                warn!("Browser close error (non-fatal): {}", e);
            }
        }
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        let Some(mut session) = self.inner.take() else {
            return;
        };
        // Drop cannot await; hand the close to the runtime if there is one.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("browser session dropped outside a runtime; relying on process cleanup");
            return;
        };
        debug!("browser session dropped without release, closing in background");
        handle.spawn(async move {
            let _ = session.close().await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSession {
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BrowserSession for CountingSession {
        async fn navigate(&mut self, _url: &str) -> Result<(), BrowserError> {
            Ok(())
        }
        async fn locate(
            &mut self,
            _selector: &str,
            _timeout: Duration,
        ) -> Result<Option<Element>, BrowserError> {
            Ok(None)
        }
        async fn send_keys(&mut self, _element: &Element, _text: &str) -> Result<(), BrowserError> {
            Ok(())
        }
        async fn html(&mut self) -> Result<String, BrowserError> {
            Ok(String::new())
        }
        async fn close(&mut self) -> Result<(), BrowserError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct CountingLauncher {
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BrowserLauncher for CountingLauncher {
        async fn launch(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
            Ok(Box::new(CountingSession {
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    #[tokio::test]
    async fn release_closes_exactly_once() {
        let closed = Arc::new(AtomicUsize::new(0));
        let launcher = CountingLauncher {
            closed: Arc::clone(&closed),
        };
        let mut scoped = ScopedSession::acquire(&launcher).await.unwrap();
        tokio_test::assert_ok!(scoped.get().unwrap().navigate("https://example.com").await);
        scoped.release().await;
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drop_without_release_still_closes() {
        let closed = Arc::new(AtomicUsize::new(0));
        let launcher = CountingLauncher {
            closed: Arc::clone(&closed),
        };
        {
            let _scoped = ScopedSession::acquire(&launcher).await.unwrap();
        }
        for _ in 0..10 {
            if closed.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn step_past_its_limit_times_out() {
        let hung = within(Duration::from_millis(20), "navigate https://a.test/", async {
            std::future::pending::<Result<(), BrowserError>>().await
        })
        .await;
        assert!(matches!(hung, Err(BrowserError::Timeout(ref m)) if m == "navigate https://a.test/ after 20ms"));

        let quick = within(Duration::from_secs(1), "html", async { Ok::<_, BrowserError>(7) }).await;
        tokio_test::assert_ok!(quick);
    }

    #[test]
    fn element_new_keeps_selector() {
        let el = Element::new("input[name=\"q\"]");
        assert_eq!(el.selector, "input[name=\"q\"]");
        assert!(el.tag.is_none());
    }
}
