use std::time::Duration;

/// Credential (cookie file) rotation with an audit trail.
pub mod credentials;
/// The extraction fallback executor built on top of the tool.
pub mod extractor;
/// Process-level wrapper around the `yt-dlp` binary.
pub mod ytdlp;

/// Format a duration into a human-readable string (e.g., "3:45" or "1:23:45")
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Parses duration strings such as "5:32" or "1:23:45"
pub fn parse_duration_string(duration_str: &str) -> Option<Duration> {
    let parts: Vec<&str> = duration_str.trim().split(':').collect();

    match parts.len() {
        // SS
        1 => parts[0].parse::<u64>().ok().map(Duration::from_secs),
        // MM:SS
        2 => {
            let minutes = parts[0].parse::<u64>().ok()?;
            let seconds = parts[1].parse::<u64>().ok()?;
            Some(Duration::from_secs(minutes * 60 + seconds))
        }
        // HH:MM:SS
        3 => {
            let hours = parts[0].parse::<u64>().ok()?;
            let minutes = parts[1].parse::<u64>().ok()?;
            let seconds = parts[2].parse::<u64>().ok()?;
            Some(Duration::from_secs(hours * 3600 + minutes * 60 + seconds))
        }
        _ => None,
    }
}
