pub mod config;
pub mod error;
pub mod types;

pub use config::ResearchConfig;
pub use error::{BrowserError, FetchError, ResearchError};
