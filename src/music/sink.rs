use serenity::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::SinkError;
use crate::music::controller::SessionCommand;
use crate::music::track::Track;

pub(crate) type Mailbox = UnboundedSender<SessionCommand>;

/// Opens a voice connection for a guild.
#[async_trait]
pub trait SinkConnector: Send + Sync {
    /// `on_disconnect` must be fired if the connection drops without us asking.
    async fn connect(
        &self,
        guild_id: GuildId,
        destination: ChannelId,
        on_disconnect: DisconnectSignal,
    ) -> Result<Box<dyn PlaybackSink>, SinkError>;
}

/// A connected audio output for one guild.
///
/// Only the guild's controller ever holds it, so transport commands never race.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Starts `track`, replacing anything already playing.
    ///
    /// The sink must fire `on_finished` exactly once when the track ends for any
    /// reason, including `stop`.
    async fn play(&mut self, track: &Track, on_finished: TrackEndSignal) -> Result<(), SinkError>;

    async fn pause(&mut self) -> Result<(), SinkError>;

    async fn resume(&mut self) -> Result<(), SinkError>;

    async fn stop(&mut self) -> Result<(), SinkError>;

    async fn is_playing(&self) -> bool;

    async fn is_paused(&self) -> bool;

    async fn disconnect(&mut self);
}

/// Completion callback handed to the sink with every track.
///
/// Firing it only posts a message into the guild's mailbox; the next track is
/// started later by the controller, never from inside the sink's callback.
#[derive(Debug, Clone)]
pub struct TrackEndSignal {
    generation: u64,
    mailbox: Mailbox,
}

impl TrackEndSignal {
    pub(crate) fn new(generation: u64, mailbox: Mailbox) -> Self {
        Self {
            generation,
            mailbox,
        }
    }

    pub fn finished(&self) {
        self.post(None);
    }

    pub fn failed(&self, reason: impl Into<String>) {
        self.post(Some(reason.into()));
    }

    fn post(&self, error: Option<String>) {
        // A closed mailbox means the session is gone; nothing is waiting for us.
        let _ = self.mailbox.send(SessionCommand::TrackEnded {
            generation: self.generation,
            error,
        });
    }
}

#[derive(Debug, Clone)]
pub struct DisconnectSignal {
    mailbox: Mailbox,
}

impl DisconnectSignal {
    pub(crate) fn new(mailbox: Mailbox) -> Self {
        Self { mailbox }
    }

    pub fn connection_lost(&self) {
        let _ = self.mailbox.send(SessionCommand::ConnectionLost);
    }
}
