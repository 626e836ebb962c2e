use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use serenity::async_trait;
use tokio::process::Command;
use tracing::debug;
use url::Url;

use crate::error::ResolutionError;
use crate::music::track::{StreamRef, Track};

/// Turns a user-supplied URL into something a sink can play.
///
/// Implementations do not retry and never touch playback state.
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<Track, ResolutionError>;
}

/// Resolves through the `yt-dlp` binary, the same way the `bestaudio` format
/// selector would for a single video.
pub struct YtDlpResolver {
    binary: String,
    cookies: Option<PathBuf>,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>, cookies: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            cookies,
        }
    }

    fn command(&self, url: &Url) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .args([
                "--dump-single-json",
                "--no-playlist",
                "--no-warnings",
                "--format",
                "bestaudio[ext=m4a]/bestaudio/best",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cookies) = &self.cookies {
            command.arg("--cookies").arg(cookies);
        }

        command.arg("--").arg(url.as_str());
        command
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, url: &str) -> Result<Track, ResolutionError> {
        let url = validate_url(url)?;
        debug!(%url, "Resolving with yt-dlp");

        let output = self.command(&url).output().await.map_err(|err| {
            ResolutionError::TransientNetwork(format!("could not run {}: {err}", self.binary))
        })?;

        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }

        parse_info(&output.stdout, url.as_str())
    }
}

pub fn validate_url(raw: &str) -> Result<Url, ResolutionError> {
    let url = Url::parse(raw.trim()).map_err(|err| ResolutionError::InvalidUrl(format!("{raw}: {err}")))?;

    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(url),
        _ => Err(ResolutionError::InvalidUrl(raw.to_string())),
    }
}

const AUTH_MARKERS: &[&str] = &[
    "sign in to confirm",
    "--cookies",
    "login required",
    "private video",
    "members-only",
    "confirm your age",
];

const NOT_FOUND_MARKERS: &[&str] = &[
    "video unavailable",
    "unsupported url",
    "http error 404",
    "does not exist",
    "has been removed",
    "no video formats found",
    "requested format is not available",
];

fn classify_failure(stderr: &str) -> ResolutionError {
    let message = stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("yt-dlp exited with an error")
        .to_string();
    let lower = stderr.to_lowercase();

    if AUTH_MARKERS.iter().any(|marker| lower.contains(marker)) {
        ResolutionError::AuthRequired(message)
    } else if NOT_FOUND_MARKERS.iter().any(|marker| lower.contains(marker)) {
        ResolutionError::NotFound(message)
    } else {
        ResolutionError::TransientNetwork(message)
    }
}

#[derive(Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    thumbnail: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    duration: Option<f64>,
    #[serde(default)]
    http_headers: BTreeMap<String, String>,
}

fn parse_info(stdout: &[u8], requested: &str) -> Result<Track, ResolutionError> {
    let info: YtDlpInfo = serde_json::from_slice(stdout).map_err(|err| {
        ResolutionError::TransientNetwork(format!("unreadable yt-dlp output: {err}"))
    })?;

    let stream_url = info
        .url
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ResolutionError::NotFound(format!("no audio stream for {requested}")))?;

    Ok(Track {
        title: info
            .title
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| requested.to_string()),
        thumbnail_url: info.thumbnail.filter(|url| !url.is_empty()),
        source_url: info.webpage_url.unwrap_or_else(|| requested.to_string()),
        duration: info
            .duration
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64),
        stream: StreamRef {
            url: stream_url,
            headers: info.http_headers.into_iter().collect(),
        },
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn accepts_web_urls_only() {
        assert!(validate_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ").is_ok());
        assert!(validate_url("  http://youtu.be/abc  ").is_ok());

        for bad in ["not a url", "file:///etc/passwd", "ftp://example.com/song", ""] {
            assert!(
                matches!(validate_url(bad), Err(ResolutionError::InvalidUrl(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn sign_in_walls_are_auth_errors() {
        let stderr = "WARNING: [youtube] something\n\
            ERROR: [youtube] abc: Sign in to confirm you're not a bot. Use --cookies-from-browser or --cookies for the authentication.\n";

        match classify_failure(stderr) {
            ResolutionError::AuthRequired(message) => assert!(message.starts_with("ERROR:")),
            other => panic!("expected AuthRequired, got {other:?}"),
        }
    }

    #[test]
    fn missing_videos_are_not_found() {
        let stderr = "ERROR: [youtube] abc: Video unavailable\n";
        assert!(matches!(classify_failure(stderr), ResolutionError::NotFound(_)));
    }

    #[test]
    fn everything_else_is_transient() {
        let stderr = "ERROR: Unable to download webpage: <urlopen error [Errno -3] Temporary failure in name resolution>";
        assert!(matches!(
            classify_failure(stderr),
            ResolutionError::TransientNetwork(_)
        ));
        assert!(matches!(
            classify_failure(""),
            ResolutionError::TransientNetwork(message) if message == "yt-dlp exited with an error"
        ));
    }

    #[test]
    fn parses_single_video_json() {
        let stdout = json!({
            "title": "Never Gonna Give You Up",
            "thumbnail": "https://i.ytimg.com/vi/dQw4w9WgXcQ/maxresdefault.jpg",
            "url": "https://rr1---sn.googlevideo.com/videoplayback?id=1",
            "webpage_url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "duration": 212.0,
            "http_headers": {
                "User-Agent": "Mozilla/5.0",
                "Accept": "*/*"
            }
        })
        .to_string();

        let track = parse_info(stdout.as_bytes(), "https://youtu.be/dQw4w9WgXcQ").unwrap();

        assert_eq!(track.title, "Never Gonna Give You Up");
        assert_eq!(track.source_url, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(track.duration, Some(Duration::from_secs(212)));
        assert_eq!(
            track.stream.url,
            "https://rr1---sn.googlevideo.com/videoplayback?id=1"
        );
        assert_eq!(
            track.stream.headers,
            vec![
                ("Accept".to_string(), "*/*".to_string()),
                ("User-Agent".to_string(), "Mozilla/5.0".to_string()),
            ]
        );
    }

    #[test]
    fn missing_stream_url_is_not_found() {
        let stdout = json!({ "title": "Live soon" }).to_string();
        assert!(matches!(
            parse_info(stdout.as_bytes(), "https://youtu.be/x"),
            Err(ResolutionError::NotFound(_))
        ));
    }

    #[test]
    fn garbage_output_is_transient() {
        assert!(matches!(
            parse_info(b"<html>", "https://youtu.be/x"),
            Err(ResolutionError::TransientNetwork(_))
        ));
    }

    #[test]
    fn untitled_tracks_fall_back_to_the_request() {
        let stdout = json!({ "url": "https://cdn.example/a.m4a", "title": "  " }).to_string();
        let track = parse_info(stdout.as_bytes(), "https://cdn.example/page").unwrap();

        assert_eq!(track.title, "https://cdn.example/page");
        assert_eq!(track.source_url, "https://cdn.example/page");
        assert!(track.thumbnail_url.is_none());
        assert!(track.duration.is_none());
    }
}
