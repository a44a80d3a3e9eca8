pub mod browser_manager;
pub mod extract;
pub mod fetcher;
pub mod http;
pub mod session;

pub use browser_manager::ChromeLauncher;
pub use fetcher::{FetchedPage, PageFetcher};
pub use http::ReqwestFetcher;
pub use session::{BrowserLauncher, BrowserSession, Element, HttpFetch, ScopedSession};
