//! Source-resolution engine: turns a music query or video link into a playable
//! source, preferring hosted streaming APIs and falling back to local extraction.

use std::sync::LazyLock;
use std::time::Duration;

pub mod audio_sources;
pub mod config;
pub mod error;
pub mod resolver;
pub mod utils;

pub use config::ResolverConfig;
pub use error::{ResolverError, ResolverResult};
pub use resolver::{MediaKind, MediaRequest, ResolutionPolicy, ResolvedSource, SourceLocation};

/// Process-wide HTTP client shared by every provider. Redirects are followed.
pub static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
});
