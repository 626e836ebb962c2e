use thiserror::Error;

/// Why a source URL could not be turned into a playable track.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// The upstream wants credentials (cookies, sign-in) we don't have or that expired.
    #[error("the source requires authentication: {0}")]
    AuthRequired(String),

    #[error("nothing playable was found at that URL: {0}")]
    NotFound(String),

    #[error("network error while resolving: {0}")]
    TransientNetwork(String),

    /// Rejected before any network access.
    #[error("not a valid URL: {0}")]
    InvalidUrl(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The voice destination could not be joined.
    #[error("could not connect to the voice channel: {0}")]
    Connect(String),

    #[error("playback failed: {0}")]
    Playback(String),

    /// A transport command (pause, resume, stop) was rejected by the driver.
    #[error("audio driver rejected the command: {0}")]
    Control(String),
}

/// Top-level error returned by every `PlayerManager` operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MusicError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("nothing is playing")]
    NothingPlaying,

    #[error("nothing is paused")]
    NotPaused,

    #[error("not connected to a voice channel")]
    NotConnected,

    #[error("the queue is full ({0} tracks)")]
    QueueFull(usize),

    /// A leave happened while this request was being resolved.
    #[error("the request was cancelled by a leave")]
    Superseded,

    /// The session shut down before it could handle the request.
    #[error("the playback session has closed")]
    SessionClosed,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: String, value: String },
}
