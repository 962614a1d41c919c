//! Thin async wrapper around the `yt-dlp` command-line tool.
//!
//! Everything above this module talks to the [`ExtractionTool`] trait, so the
//! executor and the metadata lookup can be exercised without the real binary.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{ResolverError, ResolverResult};

/// What a single tool run should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolMode {
    /// Print the direct media URL(s) without downloading (`-g`).
    GetUrl,
    /// Print the JSON description of the target (`-j`).
    DumpJson,
    /// Download into the output template.
    Download {
        /// Container for merged video+audio downloads.
        merge_output_format: Option<String>,
        /// Re-encode the audio track into this codec after download.
        extract_audio: Option<AudioExtraction>,
    },
    /// Print the ids of a playlist's entries without resolving them.
    FlatPlaylistIds { limit: usize },
}

/// Post-processing step turning a download into a plain audio file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioExtraction {
    pub codec: String,
    pub quality: String,
}

impl AudioExtraction {
    /// 192k MP3, as used for song downloads.
    pub fn mp3() -> Self {
        Self {
            codec: "mp3".to_string(),
            quality: "192K".to_string(),
        }
    }
}

/// A fully described invocation of the extraction tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Link, or search expression such as `ytsearch1:...`.
    pub target: String,
    pub mode: ToolMode,
    /// Format selector expression (`-f`).
    pub format: Option<String>,
    /// Output template (`-o`), only meaningful for downloads.
    pub output_template: Option<String>,
    /// Cookie file handed to the tool.
    pub cookies: Option<PathBuf>,
}

impl ToolInvocation {
    pub fn new(target: impl Into<String>, mode: ToolMode) -> Self {
        Self {
            target: target.into(),
            mode,
            format: None,
            output_template: None,
            cookies: None,
        }
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn output_template(mut self, template: impl Into<String>) -> Self {
        self.output_template = Some(template.into());
        self
    }

    pub fn cookies(mut self, cookies: Option<PathBuf>) -> Self {
        self.cookies = cookies;
        self
    }

    /// Command-line arguments for `yt-dlp`, target last.
    pub fn to_args(&self) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();

        if let Some(cookies) = &self.cookies {
            args.push("--cookies".into());
            args.push(cookies.display().to_string());
        }

        match &self.mode {
            ToolMode::GetUrl => args.push("-g".into()),
            ToolMode::DumpJson => {
                args.push("-j".into());
                args.push("--no-playlist".into());
            }
            ToolMode::Download {
                merge_output_format,
                extract_audio,
            } => {
                args.extend(
                    ["--geo-bypass", "--no-check-certificates", "--quiet", "--no-warnings"]
                        .map(String::from),
                );
                if let Some(container) = merge_output_format {
                    args.push("--merge-output-format".into());
                    args.push(container.clone());
                }
                if let Some(extraction) = extract_audio {
                    args.push("-x".into());
                    args.push("--audio-format".into());
                    args.push(extraction.codec.clone());
                    args.push("--audio-quality".into());
                    args.push(extraction.quality.clone());
                }
            }
            ToolMode::FlatPlaylistIds { limit } => {
                args.extend(["-i", "--get-id", "--flat-playlist"].map(String::from));
                args.push("--playlist-end".into());
                args.push(limit.to_string());
                args.push("--skip-download".into());
            }
        }

        if let Some(format) = &self.format {
            args.push("-f".into());
            args.push(format.clone());
        }
        if let Some(template) = &self.output_template {
            args.push("-o".into());
            args.push(template.clone());
        }

        // Everything after `--` is a target, even if it starts with a dash
        args.push("--".into());
        args.push(self.target.clone());
        args
    }
}

/// Captured result of one tool run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// First non-blank line of stdout.
    pub fn first_line(&self) -> Option<&str> {
        self.stdout.lines().map(str::trim).find(|line| !line.is_empty())
    }

    /// Diagnostic text for logs, preferring stderr.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            "tool exited without output".to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Runs the extraction tool. Implementations must not block the async runtime.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExtractionTool: Send + Sync {
    async fn run(&self, invocation: ToolInvocation) -> ResolverResult<ToolOutput>;
}

/// [`ExtractionTool`] backed by a `yt-dlp` subprocess.
pub struct YtDlpTool {
    binary: PathBuf,
}

impl Default for YtDlpTool {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

impl YtDlpTool {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl ExtractionTool for YtDlpTool {
    async fn run(&self, invocation: ToolInvocation) -> ResolverResult<ToolOutput> {
        let args = invocation.to_args();
        debug!("Running {:?} {:?}", self.binary, args);

        // The child is killed if the owning request is dropped mid-run
        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ResolverError::ExtractionFailed(format!(
                    "Failed to execute {}: {}",
                    self.binary.display(),
                    e
                ))
            })?;

        let output = ToolOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !output.success {
            warn!(
                "{} exited unsuccessfully for {}: {}",
                self.binary.display(),
                invocation.target,
                output.diagnostic()
            );
        }

        Ok(output)
    }
}

/// The subset of `yt-dlp -j` output the engine reads.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct VideoInfo {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub duration_string: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub webpage_url: Option<String>,
    #[serde(default)]
    pub formats: Vec<FormatEntry>,
}

/// One candidate encoding reported by the tool.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct FormatEntry {
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub format_id: Option<String>,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub format_note: Option<String>,
    #[serde(default)]
    pub filesize: Option<u64>,
}

impl VideoInfo {
    /// Parses the first JSON document printed by `yt-dlp -j`.
    pub fn from_output(output: &ToolOutput) -> ResolverResult<Self> {
        let line = output.first_line().ok_or_else(|| {
            ResolverError::ExtractionFailed(format!("No metadata returned: {}", output.diagnostic()))
        })?;
        Ok(serde_json::from_str(line)?)
    }
}
