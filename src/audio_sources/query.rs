//! User queries: either free text or a canonical link.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use url::Url;

/// Base of a YouTube watch page, completed with a video id.
pub const WATCH_BASE: &str = "https://www.youtube.com/watch?v=";
/// Base of a YouTube playlist page, completed with a playlist id.
pub const PLAYLIST_BASE: &str = "https://youtube.com/playlist?list=";

/// Regex to match and capture YouTube video URLs (various formats).
static YOUTUBE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((?:https?:)?//)?((?:www|m|music)\.)?((?:youtube\.com|youtu\.be))(/(?:[\w\-]+\?v=|embed/|v/|shorts/)?)([\w\-]+)(\S+)?$").unwrap()
});

/// A normalized, immutable query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Free text, typically a track title.
    Text(String),
    /// An http(s) link with tracking parameters stripped.
    Link(Url),
}

impl Query {
    /// Classifies and normalizes raw user input.
    ///
    /// Links lose everything from the first `&` on; free text is only trimmed, so
    /// titles such as "Simon & Garfunkel" survive intact.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        let candidate = trimmed.split('&').next().unwrap_or(trimmed);

        match Url::parse(candidate) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Query::Link(url),
            _ => Query::Text(trimmed.to_string()),
        }
    }

    /// Watch link for a bare video id.
    pub fn from_video_id(id: &str) -> Self {
        Self::parse(&format!("{}{}", WATCH_BASE, id.trim()))
    }

    /// Playlist link for a bare playlist id.
    pub fn from_playlist_id(id: &str) -> Self {
        Self::parse(&format!("{}{}", PLAYLIST_BASE, id.trim()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Query::Text(text) => text,
            Query::Link(url) => url.as_str(),
        }
    }

    pub fn is_link(&self) -> bool {
        matches!(self, Query::Link(_))
    }

    /// Whether this is a link to youtube.com or youtu.be.
    pub fn is_youtube_link(&self) -> bool {
        match self {
            Query::Link(url) => url.host_str().is_some_and(|host| {
                host == "youtu.be" || host == "youtube.com" || host.ends_with(".youtube.com")
            }),
            Query::Text(_) => false,
        }
    }

    /// The YouTube video id carried by the link, if any.
    pub fn video_id(&self) -> Option<String> {
        let Query::Link(url) = self else {
            return None;
        };
        if !self.is_youtube_link() {
            return None;
        }

        // watch?v=<id> wins over path-based forms
        if let Some((_, id)) = url.query_pairs().find(|(key, _)| key == "v") {
            return Some(id.into_owned()).filter(|id| !id.is_empty());
        }
        if url.path().starts_with("/playlist") {
            return None;
        }

        YOUTUBE_REGEX
            .captures(url.as_str())
            .and_then(|captures| captures.get(5))
            .map(|m| m.as_str().to_string())
            .filter(|id| id != "watch")
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
