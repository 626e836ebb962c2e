use serenity::model::id::GuildId;

use crate::error::ResolutionError;
use crate::music::track::TrackSummary;

/// Why a track started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOrigin {
    /// Straight from a play request on an idle guild; the requester already got a reply.
    Request,
    /// Popped off the queue after the previous track finished.
    Queue,
}

/// Things the presentation layer may want to tell a guild about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    NowPlaying {
        guild_id: GuildId,
        track: TrackSummary,
        origin: PlayOrigin,
    },
    QueuedAdded {
        guild_id: GuildId,
        track: TrackSummary,
        position: usize,
    },
    AutoDisconnected {
        guild_id: GuildId,
    },
    ResolutionFailed {
        guild_id: GuildId,
        reason: ResolutionError,
    },
    PlaybackFailed {
        guild_id: GuildId,
        track: TrackSummary,
        reason: String,
    },
    /// The voice connection dropped underneath us (kicked, channel deleted).
    ConnectionLost {
        guild_id: GuildId,
    },
}

impl PlayerEvent {
    pub fn guild_id(&self) -> GuildId {
        match self {
            Self::NowPlaying { guild_id, .. }
            | Self::QueuedAdded { guild_id, .. }
            | Self::AutoDisconnected { guild_id }
            | Self::ResolutionFailed { guild_id, .. }
            | Self::PlaybackFailed { guild_id, .. }
            | Self::ConnectionLost { guild_id } => *guild_id,
        }
    }
}
