//! The top-level decision procedure turning a media request into a playable source.
//!
//! Audio requests try the hosted providers first. Everything else, and any audio
//! request the providers cannot serve, goes through the extraction executor.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::audio_sources::ResolveOptions;
use crate::audio_sources::catalog_api::CatalogApi;
use crate::audio_sources::provider_chain::ProviderChain;
use crate::audio_sources::query::Query;
use crate::audio_sources::stream_api::StreamApi;
use crate::audio_sources::track_metadata::{MetadataLookup, YtDlpLookup};
use crate::config::{DEFAULT_MAX_VIDEO_SIZE_MB, ResolverConfig};
use crate::error::{ResolverError, ResolverResult};
use crate::utils::credentials::{CredentialRotator, FileAuditSink};
use crate::utils::extractor::ExtractionExecutor;
use crate::utils::ytdlp::YtDlpTool;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// What the caller wants out of a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
    /// Audio re-encoded to mp3 and saved under the given title.
    SongAudio { format_id: String, title: String },
    /// The given video format merged with the audio stream, saved under the given title.
    SongVideo { format_id: String, title: String },
}

impl MediaKind {
    pub fn is_song(&self) -> bool {
        matches!(self, MediaKind::SongAudio { .. } | MediaKind::SongVideo { .. })
    }
}

/// A single resolution request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    pub query: Query,
    pub kind: MediaKind,
    /// Title to search providers with, skipping the metadata lookup.
    pub title: Option<String>,
}

impl MediaRequest {
    pub fn new(link: &str, kind: MediaKind) -> Self {
        Self {
            query: Query::parse(link),
            kind,
            title: None,
        }
    }

    pub fn audio(link: &str) -> Self {
        Self::new(link, MediaKind::Audio)
    }

    pub fn video(link: &str) -> Self {
        Self::new(link, MediaKind::Video)
    }

    pub fn song_audio(link: &str, format_id: &str, title: &str) -> Self {
        Self::new(
            link,
            MediaKind::SongAudio {
                format_id: format_id.to_string(),
                title: title.to_string(),
            },
        )
    }

    pub fn song_video(link: &str, format_id: &str, title: &str) -> Self {
        Self::new(
            link,
            MediaKind::SongVideo {
                format_id: format_id.to_string(),
                title: title.to_string(),
            },
        )
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Song kinds need both a format id and a title.
    pub fn validate(&self) -> ResolverResult<()> {
        if self.query.as_str().is_empty() {
            return Err(ResolverError::InvalidRequest("empty query".to_string()));
        }

        match &self.kind {
            MediaKind::SongAudio { format_id, title } | MediaKind::SongVideo { format_id, title } => {
                if format_id.trim().is_empty() {
                    return Err(ResolverError::InvalidRequest(
                        "song downloads need a format id".to_string(),
                    ));
                }
                if title.trim().is_empty() {
                    return Err(ResolverError::InvalidRequest(
                        "song downloads need a title".to_string(),
                    ));
                }
                Ok(())
            }
            MediaKind::Audio | MediaKind::Video => Ok(()),
        }
    }

    /// What the extraction tool is pointed at: the link itself, or a one-hit search.
    fn extraction_target(&self) -> String {
        match &self.query {
            Query::Link(url) => url.to_string(),
            Query::Text(text) => format!("ytsearch1:{}", text),
        }
    }
}

/// Where a resolved source lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Remote(Url),
    Local(PathBuf),
}

/// The produced `(location, is_local_file)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub location: SourceLocation,
}

impl ResolvedSource {
    pub fn remote(url: Url) -> Self {
        Self {
            location: SourceLocation::Remote(url),
        }
    }

    pub fn local(path: PathBuf) -> Self {
        Self {
            location: SourceLocation::Local(path),
        }
    }

    pub fn is_local_file(&self) -> bool {
        matches!(self.location, SourceLocation::Local(_))
    }

    pub fn into_pair(self) -> (String, bool) {
        match self.location {
            SourceLocation::Remote(url) => (url.to_string(), false),
            SourceLocation::Local(path) => (path.display().to_string(), true),
        }
    }
}

impl fmt::Display for ResolvedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            SourceLocation::Remote(url) => write!(f, "({}, false)", url),
            SourceLocation::Local(path) => write!(f, "({}, true)", path.display()),
        }
    }
}

/// Arbitrates between the provider chain and the extraction executor.
pub struct ResolutionPolicy {
    chain: ProviderChain,
    lookup: Arc<dyn MetadataLookup>,
    executor: Arc<ExtractionExecutor>,
    max_video_size_mb: u64,
    force_video_download: bool,
}

impl ResolutionPolicy {
    pub fn new(
        chain: ProviderChain,
        lookup: Arc<dyn MetadataLookup>,
        executor: Arc<ExtractionExecutor>,
    ) -> Self {
        Self {
            chain,
            lookup,
            executor,
            max_video_size_mb: DEFAULT_MAX_VIDEO_SIZE_MB,
            force_video_download: false,
        }
    }

    pub fn with_max_video_size_mb(mut self, max_video_size_mb: u64) -> Self {
        self.max_video_size_mb = max_video_size_mb;
        self
    }

    pub fn with_force_video_download(mut self, force: bool) -> Self {
        self.force_video_download = force;
        self
    }

    /// Wires up the production providers, tool and credentials.
    pub fn from_config(config: &ResolverConfig) -> Self {
        let options = ResolveOptions {
            format: config.stream_api_format.clone(),
            quality: config.stream_api_quality.clone(),
            timeout: config.provider_timeout,
            ..Default::default()
        };

        let mut chain = ProviderChain::new(options);
        if let Some(url) = &config.stream_api_url {
            chain = chain.with_provider(Arc::new(StreamApi::new(url.clone())));
        }
        if let Some(url) = &config.catalog_api_url {
            chain = chain.with_provider(Arc::new(CatalogApi::new(url.clone())));
        }
        info!("Configured {} hosted provider(s)", chain.len());

        let tool = Arc::new(YtDlpTool::new(&config.ytdlp_bin));
        let credentials = Arc::new(CredentialRotator::new(
            &config.cookies_dir,
            Arc::new(FileAuditSink::new(&config.cookies_audit_log)),
        ));
        let executor = Arc::new(ExtractionExecutor::new(
            tool,
            credentials,
            &config.downloads_dir,
            config.extraction_workers,
        ));

        Self::new(chain, Arc::new(YtDlpLookup::new(executor.clone())), executor)
            .with_max_video_size_mb(config.max_video_size_mb)
            .with_force_video_download(config.force_video_download)
    }

    pub fn executor(&self) -> &ExtractionExecutor {
        &self.executor
    }

    /// Resolves `request`; `None` when no source could be produced.
    ///
    /// Failures are logged and never surfaced, and each request stands alone.
    pub async fn resolve(&self, request: &MediaRequest) -> Option<ResolvedSource> {
        match self.try_resolve(request).await {
            Ok(Some(source)) => {
                info!("Resolved {} to {}", request.query, source);
                Some(source)
            }
            Ok(None) => {
                info!("No source produced for {}", request.query);
                None
            }
            Err(e) => {
                error!("Failed to resolve {}: {}", request.query, e);
                None
            }
        }
    }

    async fn try_resolve(&self, request: &MediaRequest) -> ResolverResult<Option<ResolvedSource>> {
        request.validate()?;

        if request.kind == MediaKind::Audio {
            if let Some(url) = self.try_providers(request).await {
                return Ok(Some(ResolvedSource::remote(url)));
            }
            debug!("Falling back to local extraction for {}", request.query);
        }

        self.extract_locally(request).await
    }

    /// Any failure here only means "fall back".
    async fn try_providers(&self, request: &MediaRequest) -> Option<Url> {
        if self.chain.is_empty() {
            return None;
        }

        let search = match (&request.title, &request.query) {
            (Some(title), _) => title.clone(),
            (None, Query::Text(text)) => text.clone(),
            (None, link @ Query::Link(_)) => match self.lookup.lookup(link, 1).await {
                Ok(metadata) => metadata.title,
                Err(e) => {
                    warn!("Metadata lookup failed for {}: {}", link, e);
                    return None;
                }
            },
        };

        self.chain.resolve_first(&search).await.stream_url
    }

    async fn extract_locally(&self, request: &MediaRequest) -> ResolverResult<Option<ResolvedSource>> {
        let target = request.extraction_target();

        if request.kind == MediaKind::Video {
            return self.resolve_video(&target).await;
        }

        let path = self.executor.download_to_file(&target, &request.kind).await?;
        Ok(Some(ResolvedSource::local(path)))
    }

    /// Probe first; download only what fits under the size ceiling.
    async fn resolve_video(&self, link: &str) -> ResolverResult<Option<ResolvedSource>> {
        if self.force_video_download {
            info!("Forced video download for {}", link);
            let path = self.executor.download_to_file(link, &MediaKind::Video).await?;
            return Ok(Some(ResolvedSource::local(path)));
        }

        match self
            .executor
            .probe_stream_url(link, self.executor.video_constraints())
            .await
        {
            Ok(url) => return Ok(Some(ResolvedSource::remote(url))),
            Err(e) => warn!("Probe failed for {}, considering a download: {}", link, e),
        }

        let Some(bytes) = self.executor.estimate_total_size(link).await? else {
            warn!("Size of {} is unknown, refusing download", link);
            return Ok(None);
        };
        if !self.admits(bytes) {
            warn!(
                "{} is {} MB, over the {} MB limit",
                link,
                bytes / BYTES_PER_MB,
                self.max_video_size_mb
            );
            return Ok(None);
        }

        let path = self.executor.download_to_file(link, &MediaKind::Video).await?;
        Ok(Some(ResolvedSource::local(path)))
    }

    /// Exactly at the ceiling is still admitted.
    fn admits(&self, bytes: u64) -> bool {
        bytes <= self.max_video_size_mb.saturating_mul(BYTES_PER_MB)
    }
}
