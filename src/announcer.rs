use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serenity::all::{ChannelId, CreateEmbed, CreateMessage, GuildId, Http};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::embeds;
use crate::music::{PlayOrigin, PlayerEvent};

/// Posts player events that nobody is waiting on (the next track starting,
/// idle disconnects) to the text channel the guild last used for music.
#[derive(Default)]
pub struct Announcer {
    channels: Mutex<HashMap<GuildId, ChannelId>>,
}

impl Announcer {
    pub fn remember(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.channels.lock().insert(guild_id, channel_id);
    }

    fn channel_for(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.channels.lock().get(&guild_id).copied()
    }

    pub async fn run(self: Arc<Self>, http: Arc<Http>, mut events: UnboundedReceiver<PlayerEvent>) {
        info!("Announcer started");

        while let Some(event) = events.recv().await {
            let guild_id = event.guild_id();
            let Some(embed) = render(&event) else {
                debug!(?event, "Not announcing");
                continue;
            };
            let Some(channel_id) = self.channel_for(guild_id) else {
                debug!(%guild_id, "No announcement channel known");
                continue;
            };

            let message = CreateMessage::new().embed(embed);
            if let Err(why) = channel_id.send_message(&http, message).await {
                warn!(%guild_id, %channel_id, "Error sending announcement: {why:?}");
            }
        }

        info!("Announcer stopped");
    }
}

/// Events answered directly by a command reply render to `None`.
pub fn render(event: &PlayerEvent) -> Option<CreateEmbed> {
    match event {
        PlayerEvent::NowPlaying {
            track,
            origin: PlayOrigin::Queue,
            ..
        } => Some(embeds::now_playing(track)),
        PlayerEvent::AutoDisconnected { .. } => Some(embeds::auto_disconnected()),
        PlayerEvent::ConnectionLost { .. } => Some(embeds::connection_lost()),
        PlayerEvent::PlaybackFailed { track, reason, .. } => {
            Some(embeds::playback_failed(track, reason))
        }
        PlayerEvent::NowPlaying {
            origin: PlayOrigin::Request,
            ..
        }
        | PlayerEvent::QueuedAdded { .. }
        | PlayerEvent::ResolutionFailed { .. } => None,
    }
}
