//! The extraction fallback executor: everything the engine does with the local
//! extraction tool once the hosted providers have given up.
//!
//! Every operation acquires a permit from a bounded pool before running the tool, so
//! slow downloads queue among themselves instead of starving cheap network work.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

use super::credentials::CredentialRotator;
use super::ytdlp::{AudioExtraction, ExtractionTool, ToolInvocation, ToolMode, ToolOutput, VideoInfo};
use crate::audio_sources::query::Query;
use crate::error::{ResolverError, ResolverResult};
use crate::resolver::MediaKind;

/// Audio-only stream paired with explicitly selected video formats.
const SONG_VIDEO_AUDIO_FORMAT: &str = "140";
/// Stderr noise that does not make a playlist listing a failure.
const HIDDEN_VIDEOS_NOTICE: &str = "unavailable videos are hidden";
/// Extensions the audio profile may produce, checked before re-downloading.
const AUDIO_EXTENSIONS: &[&str] = &["m4a", "webm", "opus", "mp3", "ogg", "aac"];

/// Resolution ceiling applied to video probes and downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConstraints {
    pub max_height: u32,
    pub max_width: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            max_height: 720,
            max_width: 1280,
        }
    }
}

impl VideoConstraints {
    /// Single muxed stream at or under the ceiling, for URL probing.
    pub fn probe_selector(&self) -> String {
        format!(
            "best[height<=?{}][width<=?{}]",
            self.max_height, self.max_width
        )
    }

    /// Separate mp4 video and m4a audio merged locally, for downloads.
    pub fn download_selector(&self) -> String {
        format!(
            "(bestvideo[height<=?{}][width<=?{}][ext=mp4])+(bestaudio[ext=m4a])",
            self.max_height, self.max_width
        )
    }
}

/// A downloadable encoding as listed by [`ExtractionExecutor::list_formats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatInfo {
    pub format: String,
    pub filesize: u64,
    pub format_id: String,
    pub ext: String,
    pub format_note: String,
    pub link: String,
}

/// Runs the extraction tool in probe, download and listing modes.
pub struct ExtractionExecutor {
    tool: Arc<dyn ExtractionTool>,
    credentials: Arc<CredentialRotator>,
    downloads_dir: PathBuf,
    video: VideoConstraints,
    workers: Arc<Semaphore>,
}

impl ExtractionExecutor {
    pub fn new(
        tool: Arc<dyn ExtractionTool>,
        credentials: Arc<CredentialRotator>,
        downloads_dir: impl Into<PathBuf>,
        workers: usize,
    ) -> Self {
        Self {
            tool,
            credentials,
            downloads_dir: downloads_dir.into(),
            video: VideoConstraints::default(),
            workers: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub fn with_video_constraints(mut self, video: VideoConstraints) -> Self {
        self.video = video;
        self
    }

    pub fn downloads_dir(&self) -> &Path {
        &self.downloads_dir
    }

    pub fn video_constraints(&self) -> VideoConstraints {
        self.video
    }

    /// Obtains a direct remote URL for `link` without downloading it.
    pub async fn probe_stream_url(
        &self,
        link: &str,
        constraints: VideoConstraints,
    ) -> ResolverResult<Url> {
        let invocation = ToolInvocation::new(link, ToolMode::GetUrl).format(constraints.probe_selector());
        let output = self.invoke(invocation).await?;

        if !output.success {
            return Err(ResolverError::ExtractionFailed(output.diagnostic()));
        }
        let line = output
            .first_line()
            .ok_or_else(|| ResolverError::ExtractionFailed(output.diagnostic()))?;

        Url::parse(line).map_err(|e| {
            ResolverError::ExtractionFailed(format!("Tool returned an unusable URL '{}': {}", line, e))
        })
    }

    /// Materializes `link` as a local file under the downloads directory.
    ///
    /// Nothing is downloaded when the target file already exists.
    pub async fn download_to_file(&self, link: &str, kind: &MediaKind) -> ResolverResult<PathBuf> {
        match kind {
            MediaKind::Audio => self.download_native(link, "bestaudio/best".to_string(), None).await,
            MediaKind::Video => {
                self.download_native(link, self.video.download_selector(), Some("mp4"))
                    .await
            }
            MediaKind::SongVideo { format_id, title } => {
                let target = self.song_path(title, "mp4");
                let mode = ToolMode::Download {
                    merge_output_format: Some("mp4".to_string()),
                    extract_audio: None,
                };
                let format = format!("{}+{}", format_id, SONG_VIDEO_AUDIO_FORMAT);
                self.download_song(link, format, title, mode, target).await
            }
            MediaKind::SongAudio { format_id, title } => {
                let target = self.song_path(title, "mp3");
                let mode = ToolMode::Download {
                    merge_output_format: None,
                    extract_audio: Some(AudioExtraction::mp3()),
                };
                self.download_song(link, format_id.clone(), title, mode, target)
                    .await
            }
        }
    }

    /// Sums the declared size of every candidate encoding of `link`.
    ///
    /// `None` means the tool reported nothing usable, which is not the same as zero.
    pub async fn estimate_total_size(&self, link: &str) -> ResolverResult<Option<u64>> {
        let output = self
            .invoke(ToolInvocation::new(link, ToolMode::DumpJson))
            .await?;

        if !output.success {
            warn!("Unable to read formats for {}: {}", link, output.diagnostic());
            return Ok(None);
        }

        let info = match VideoInfo::from_output(&output) {
            Ok(info) => info,
            Err(e) => {
                warn!("Unreadable format listing for {}: {}", link, e);
                return Ok(None);
            }
        };

        if info.formats.is_empty() {
            debug!("No formats reported for {}", link);
            return Ok(None);
        }

        let sizes: Vec<u64> = info.formats.iter().filter_map(|f| f.filesize).collect();
        if sizes.is_empty() {
            debug!("No format of {} declares a file size", link);
            return Ok(None);
        }

        Ok(Some(sizes.iter().sum()))
    }

    /// Lists up to `limit` entry ids of a playlist, in playlist order.
    ///
    /// Tool failures yield an empty list.
    pub async fn list_flat_playlist_ids(&self, link: &str, limit: usize) -> ResolverResult<Vec<String>> {
        let query = Query::parse(link);
        let link = query.as_str();
        let invocation = ToolInvocation::new(link, ToolMode::FlatPlaylistIds { limit });
        let output = match self.invoke(invocation).await {
            Ok(output) => output,
            Err(ResolverError::NoCredentialsAvailable(dir)) => {
                return Err(ResolverError::NoCredentialsAvailable(dir));
            }
            Err(e) => {
                warn!("Playlist listing failed for {}: {}", link, e);
                return Ok(Vec::new());
            }
        };

        let hidden_only = output.stderr.to_lowercase().contains(HIDDEN_VIDEOS_NOTICE);
        if !output.success && !hidden_only {
            warn!("Playlist listing failed for {}: {}", link, output.diagnostic());
            return Ok(Vec::new());
        }

        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .take(limit)
            .map(String::from)
            .collect())
    }

    /// Raw JSON description of `target` (a link or a `ytsearch` expression).
    pub async fn describe(&self, target: &str) -> ResolverResult<ToolOutput> {
        self.invoke(ToolInvocation::new(target, ToolMode::DumpJson))
            .await
    }

    /// Lists the non-DASH encodings of `link` that declare every descriptive field.
    pub async fn list_formats(&self, link: &str) -> ResolverResult<Vec<FormatInfo>> {
        let output = self
            .invoke(ToolInvocation::new(link, ToolMode::DumpJson))
            .await?;
        if !output.success {
            return Err(ResolverError::ExtractionFailed(output.diagnostic()));
        }
        let info = VideoInfo::from_output(&output)?;

        Ok(info
            .formats
            .into_iter()
            .filter_map(|f| {
                let format = f.format?;
                if format.to_lowercase().contains("dash") {
                    return None;
                }
                Some(FormatInfo {
                    format,
                    filesize: f.filesize?,
                    format_id: f.format_id?,
                    ext: f.ext?,
                    format_note: f.format_note?,
                    link: link.to_string(),
                })
            })
            .collect())
    }

    /// Audio/video downloads, named after the source's own id.
    async fn download_native(
        &self,
        link: &str,
        format: String,
        fixed_ext: Option<&str>,
    ) -> ResolverResult<PathBuf> {
        // A known id lets us find a previous download without asking the tool
        if let Some(id) = Query::parse(link).video_id() {
            let existing = match fixed_ext {
                Some(ext) => self.existing_file(&id, &[ext]).await,
                None => self.existing_file(&id, AUDIO_EXTENSIONS).await,
            };
            if let Some(path) = existing {
                info!("Reusing existing download {:?}", path);
                return Ok(path);
            }
        }

        let output = self
            .invoke(ToolInvocation::new(link, ToolMode::DumpJson).format(format.clone()))
            .await?;
        if !output.success {
            return Err(ResolverError::ExtractionFailed(output.diagnostic()));
        }
        let info = VideoInfo::from_output(&output)?;
        let ext = fixed_ext
            .map(str::to_string)
            .or(info.ext)
            .ok_or_else(|| ResolverError::ExtractionFailed(format!("No extension reported for {}", link)))?;

        let target = self.downloads_dir.join(format!("{}.{}", info.id, ext));
        if tokio::fs::try_exists(&target).await? {
            info!("Reusing existing download {:?}", target);
            return Ok(target);
        }

        let template = self.downloads_dir.join("%(id)s.%(ext)s");
        let mode = ToolMode::Download {
            merge_output_format: fixed_ext.map(str::to_string),
            extract_audio: None,
        };
        self.run_download(link, format, template.display().to_string(), mode)
            .await?;

        info!("Downloaded {} to {:?}", link, target);
        Ok(target)
    }

    /// Song downloads, named after the caller-supplied title.
    async fn download_song(
        &self,
        link: &str,
        format: String,
        title: &str,
        mode: ToolMode,
        target: PathBuf,
    ) -> ResolverResult<PathBuf> {
        if tokio::fs::try_exists(&target).await? {
            info!("Reusing existing download {:?}", target);
            return Ok(target);
        }

        let stem = escape_template(&sanitize_stem(title));
        let template = self.downloads_dir.join(format!("{}.%(ext)s", stem));
        self.run_download(link, format, template.display().to_string(), mode)
            .await?;

        info!("Downloaded {} to {:?}", link, target);
        Ok(target)
    }

    async fn run_download(
        &self,
        link: &str,
        format: String,
        template: String,
        mode: ToolMode,
    ) -> ResolverResult<()> {
        tokio::fs::create_dir_all(&self.downloads_dir).await?;

        let invocation = ToolInvocation::new(link, mode)
            .format(format)
            .output_template(template);
        let output = self.invoke(invocation).await?;

        if output.success {
            Ok(())
        } else {
            Err(ResolverError::ExtractionFailed(output.diagnostic()))
        }
    }

    fn song_path(&self, title: &str, ext: &str) -> PathBuf {
        self.downloads_dir
            .join(format!("{}.{}", sanitize_stem(title), ext))
    }

    async fn existing_file(&self, stem: &str, extensions: &[&str]) -> Option<PathBuf> {
        for ext in extensions {
            let candidate = self.downloads_dir.join(format!("{}.{}", stem, ext));
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Some(candidate);
            }
        }
        None
    }

    /// Runs the tool on the bounded pool with a freshly rotated credential.
    async fn invoke(&self, invocation: ToolInvocation) -> ResolverResult<ToolOutput> {
        let credential = self.credentials.acquire().await?;
        let _permit = self
            .workers
            .acquire()
            .await
            .map_err(|_| ResolverError::ExtractionFailed("Extraction pool is closed".to_string()))?;

        let invocation = invocation.cookies(Some(credential.path().to_path_buf()));
        self.tool.run(invocation).await
    }
}

/// Keeps a caller-supplied title from escaping the downloads directory.
fn sanitize_stem(title: &str) -> String {
    let stem: String = title
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();

    match stem.as_str() {
        "" | "." | ".." => "untitled".to_string(),
        _ => stem,
    }
}

/// `%` starts a field in yt-dlp output templates.
fn escape_template(stem: &str) -> String {
    stem.replace('%', "%%")
}
