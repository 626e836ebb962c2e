use std::time::Duration;

/// Where the audio bytes for a track actually live.
///
/// Only the sink looks inside; everything else passes it through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRef {
    pub url: String,
    /// Headers the upstream expects on the stream request.
    pub headers: Vec<(String, String)>,
}

/// A resolved, playable unit. Immutable once built by a resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub title: String,
    pub thumbnail_url: Option<String>,
    /// The URL the user asked for, not the stream.
    pub source_url: String,
    pub duration: Option<Duration>,
    pub stream: StreamRef,
}

impl Track {
    pub fn summary(&self) -> TrackSummary {
        TrackSummary {
            title: self.title.clone(),
            thumbnail_url: self.thumbnail_url.clone(),
            source_url: self.source_url.clone(),
            duration: self.duration,
        }
    }
}

/// Display-only view of a track, handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSummary {
    pub title: String,
    pub thumbnail_url: Option<String>,
    pub source_url: String,
    pub duration: Option<Duration>,
}

pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    let minutes = seconds / 60;
    let seconds = seconds % 60;

    if minutes >= 60 {
        format!("{}:{:02}:{:02}", minutes / 60, minutes % 60, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
