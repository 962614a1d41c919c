//! Hosted providers able to turn a text query into a streamable audio URL, and the
//! chain that arbitrates between them.
//!
//! Providers never fail from the caller's point of view: anything that goes wrong
//! is logged and reported as an empty [`ProviderResult`].

/// Two-step catalog provider (search, then details).
pub mod catalog_api;
/// Ordered fallthrough across providers.
pub mod provider_chain;
/// Query normalization and link helpers.
pub mod query;
/// Asynchronous render jobs and their polling loop.
pub mod render_job;
/// Job-based stream provider (immediate audio or 202 + polling).
pub mod stream_api;
/// Metadata lookup used to turn links into search titles.
pub mod track_metadata;

use async_trait::async_trait;
use std::time::Duration;
use url::Url;

/// Outcome of asking one provider for a query.
///
/// A missing `stream_url` means the provider could not serve the query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderResult {
    pub stream_url: Option<Url>,
    pub resolved_query: Option<String>,
}

impl ProviderResult {
    /// The provider declined.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A playable remote source.
    pub fn found(stream_url: Url, resolved_query: impl Into<String>) -> Self {
        Self {
            stream_url: Some(stream_url),
            resolved_query: Some(resolved_query.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stream_url.is_none()
    }
}

/// Per-call knobs shared by every provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Desired encoding, e.g. "mp3".
    pub format: String,
    /// Desired bitrate/quality tier, e.g. "320kbps".
    pub quality: String,
    /// Wall-clock budget for one provider, polling included.
    pub timeout: Duration,
    /// Delay between two status polls of a render job.
    pub poll_interval: Duration,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            format: "mp3".to_string(),
            quality: "320kbps".to_string(),
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Makes `url` usable as a join base: endpoints are appended below its path.
pub(crate) fn as_base_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Common interface for every hosted streaming provider.
#[async_trait]
pub trait StreamProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Resolves `query` to a stream URL; never fails, declines with an empty result.
    async fn resolve(&self, query: &str, options: &ResolveOptions) -> ProviderResult;
}
