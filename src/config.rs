//! Process configuration, read from the environment (and `.env` via `dotenv`).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ResolverError, ResolverResult};

/// Default ceiling for a video fallback download, in megabytes.
pub const DEFAULT_MAX_VIDEO_SIZE_MB: u64 = 250;

/// Everything the resolution engine needs to be wired up.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverConfig {
    /// Directory the extraction executor writes into.
    pub downloads_dir: PathBuf,
    /// Directory holding the `*.txt` credential (cookie) files.
    pub cookies_dir: PathBuf,
    /// File receiving one audit line per credential acquisition.
    pub cookies_audit_log: PathBuf,
    /// Extraction tool binary.
    pub ytdlp_bin: PathBuf,
    /// Size of the bounded pool running extraction tool invocations.
    pub extraction_workers: usize,
    /// Base URL of the job-based stream provider, if configured.
    pub stream_api_url: Option<Url>,
    pub stream_api_format: String,
    pub stream_api_quality: String,
    /// Base URL of the two-step catalog provider, if configured.
    pub catalog_api_url: Option<Url>,
    /// Deadline for a single provider resolution, polling included.
    pub provider_timeout: Duration,
    pub max_video_size_mb: u64,
    /// Skip probing for video requests and download directly.
    pub force_video_download: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            downloads_dir: PathBuf::from("downloads"),
            cookies_dir: PathBuf::from("cookies"),
            cookies_audit_log: PathBuf::from("cookies").join("logs.csv"),
            ytdlp_bin: PathBuf::from("yt-dlp"),
            extraction_workers: 4,
            stream_api_url: None,
            stream_api_format: "mp3".to_string(),
            stream_api_quality: "320kbps".to_string(),
            catalog_api_url: None,
            provider_timeout: Duration::from_secs(60),
            max_video_size_mb: DEFAULT_MAX_VIDEO_SIZE_MB,
            force_video_download: false,
        }
    }
}

impl ResolverConfig {
    /// Loads the configuration from environment variables, falling back to defaults.
    pub fn from_env() -> ResolverResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> ResolverResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let cookies_dir = var("COOKIES_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.cookies_dir);
        // The audit log lives next to the credentials unless told otherwise.
        let cookies_audit_log = var("COOKIES_AUDIT_LOG")
            .map(PathBuf::from)
            .unwrap_or_else(|| cookies_dir.join("logs.csv"));

        let config = Self {
            downloads_dir: var("DOWNLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.downloads_dir),
            cookies_dir,
            cookies_audit_log,
            ytdlp_bin: var("YTDLP_BIN")
                .map(PathBuf::from)
                .unwrap_or(defaults.ytdlp_bin),
            extraction_workers: parse_var(&var, "EXTRACTION_WORKERS")?
                .unwrap_or(defaults.extraction_workers),
            stream_api_url: parse_url(&var, "STREAM_API_URL")?,
            stream_api_format: var("STREAM_API_FORMAT").unwrap_or(defaults.stream_api_format),
            stream_api_quality: var("STREAM_API_QUALITY").unwrap_or(defaults.stream_api_quality),
            catalog_api_url: parse_url(&var, "CATALOG_API_URL")?,
            provider_timeout: parse_var::<u64>(&var, "PROVIDER_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.provider_timeout),
            max_video_size_mb: parse_var(&var, "MAX_VIDEO_SIZE_MB")?
                .unwrap_or(defaults.max_video_size_mb),
            force_video_download: parse_var(&var, "FORCE_VIDEO_DOWNLOAD")?
                .unwrap_or(defaults.force_video_download),
        };

        if config.extraction_workers == 0 {
            return Err(ResolverError::ConfigError(
                "EXTRACTION_WORKERS must be at least 1".to_string(),
            ));
        }
        if config.stream_api_url.is_none() && config.catalog_api_url.is_none() {
            warn!("No hosted providers configured, every request will use the extraction tool");
        }

        debug!("Loaded resolver configuration: {:?}", config);
        Ok(config)
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> ResolverResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    var(key)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|e| {
                ResolverError::ConfigError(format!("{} has an invalid value '{}': {}", key, raw, e))
            })
        })
        .transpose()
}

fn parse_url(var: &impl Fn(&str) -> Option<String>, key: &str) -> ResolverResult<Option<Url>> {
    var(key)
        .map(|raw| {
            Url::parse(raw.trim()).map_err(|e| {
                ResolverError::ConfigError(format!("{} is not a valid URL '{}': {}", key, raw, e))
            })
        })
        .transpose()
}
