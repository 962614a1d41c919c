//! Defines the `TrackMetadata` struct returned by the metadata lookup, and the
//! lookup itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::query::Query;
use crate::error::{ResolverError, ResolverResult};
use crate::utils::extractor::ExtractionExecutor;
use crate::utils::ytdlp::VideoInfo;
use crate::utils::{format_duration, parse_duration_string};

/// Unified representation of metadata for a playable track.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackMetadata {
    /// The title of the track.
    pub title: String,
    /// Source identifier (the video id for YouTube).
    pub id: String,
    /// Canonical page URL of the track, if known.
    pub url: Option<String>,
    /// The duration of the track, if available.
    #[serde(with = "humantime_serde")]
    pub duration: Option<Duration>,
    /// Thumbnail URL with its query string removed.
    pub thumbnail: Option<String>,
}

impl Default for TrackMetadata {
    fn default() -> Self {
        Self {
            title: "Unknown Track".to_string(),
            id: String::new(),
            url: None,
            duration: None,
            thumbnail: None,
        }
    }
}

impl TrackMetadata {
    /// Display form of the duration, `None` for streams without one.
    pub fn duration_text(&self) -> Option<String> {
        self.duration.map(format_duration)
    }

    /// Whole seconds, 0 when the duration could not be determined.
    pub fn duration_seconds(&self) -> u64 {
        self.duration.map(|d| d.as_secs()).unwrap_or(0)
    }
}

/// Converts the output of `yt-dlp -j` into `TrackMetadata`.
impl From<VideoInfo> for TrackMetadata {
    fn from(info: VideoInfo) -> Self {
        let duration = info
            .duration
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
            .or_else(|| info.duration_string.as_deref().and_then(parse_duration_string));

        let thumbnail = info
            .thumbnail
            .map(|t| t.split('?').next().unwrap_or_default().to_string());

        TrackMetadata {
            title: info.title.unwrap_or_else(|| "Unknown Title".to_string()),
            id: info.id,
            url: info.webpage_url,
            duration,
            thumbnail,
        }
    }
}

/// Resolves a query or link to track metadata.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    /// Returns the first of at most `limit` matches.
    async fn lookup(&self, query: &Query, limit: usize) -> ResolverResult<TrackMetadata>;
}

/// [`MetadataLookup`] answered by the extraction tool's JSON mode.
///
/// Runs through the executor, so lookups share its pool and credential rotation.
pub struct YtDlpLookup {
    executor: Arc<ExtractionExecutor>,
}

impl YtDlpLookup {
    pub fn new(executor: Arc<ExtractionExecutor>) -> Self {
        Self { executor }
    }

    /// Links are described directly, free text goes through `ytsearch<limit>:`.
    fn target(query: &Query, limit: usize) -> String {
        match query {
            Query::Link(url) => url.to_string(),
            Query::Text(text) => format!("ytsearch{}:{}", limit.max(1), text),
        }
    }
}

#[async_trait]
impl MetadataLookup for YtDlpLookup {
    async fn lookup(&self, query: &Query, limit: usize) -> ResolverResult<TrackMetadata> {
        info!("Looking up metadata for: {}", query);

        let output = self.executor.describe(&Self::target(query, limit)).await?;
        if !output.success && output.first_line().is_none() {
            return Err(ResolverError::ExtractionFailed(format!(
                "Failed to get video metadata: {}",
                output.diagnostic()
            )));
        }

        let metadata = TrackMetadata::from(VideoInfo::from_output(&output)?);
        debug!("Metadata for {}: {:?}", query, metadata);
        Ok(metadata)
    }
}
