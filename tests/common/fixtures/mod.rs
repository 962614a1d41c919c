//! Sample tool output and provider payloads.

use serde_json::{Value, json};

pub const VIDEO_ID: &str = "dQw4w9WgXcQ";
pub const VIDEO_LINK: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=RDdQw4w9WgXcQ&index=1";
pub const VIDEO_TITLE: &str = "Rick Astley - Never Gonna Give You Up (Official Music Video)";

const MB: u64 = 1024 * 1024;

/// `yt-dlp -j` output for the sample video, with formats totalling `total_mb` megabytes.
pub fn video_info(total_mb: u64) -> String {
    json!({
        "id": VIDEO_ID,
        "title": VIDEO_TITLE,
        "ext": "mp4",
        "duration": 213,
        "thumbnail": "https://i.ytimg.com/vi/dQw4w9WgXcQ/maxresdefault.jpg?v=1",
        "webpage_url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
        "formats": [
            { "format": "140 - audio only (medium)", "format_id": "140", "ext": "m4a", "format_note": "medium", "filesize": MB },
            { "format": "137 - 1920x1080 (1080p)", "format_id": "137", "ext": "mp4", "format_note": "1080p", "filesize": total_mb * MB - MB },
            { "format": "sb0 - storyboard", "format_id": "sb0", "ext": "mhtml" }
        ]
    })
    .to_string()
}

/// `yt-dlp -j` output when only the chosen format's id and extension matter.
pub fn download_info(ext: &str) -> String {
    json!({ "id": VIDEO_ID, "title": VIDEO_TITLE, "ext": ext }).to_string()
}

pub fn accepted_job(status_path: &str, file_path: &str) -> Value {
    json!({ "statusUrl": status_path, "fileUrl": file_path })
}

pub fn job_status(status: &str) -> Value {
    json!({ "download": { "status": status } })
}

pub fn empty_catalog_search() -> Value {
    json!({ "success": true, "data": { "total": 0, "results": [] } })
}
