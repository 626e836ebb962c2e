use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::MusicError;
use crate::music::controller::{
    PlayOutcome, PlaybackController, QueueSnapshot, Reply, SessionCommand,
};
use crate::music::notification::PlayerEvent;
use crate::music::resolver::TrackResolver;
use crate::music::sink::{Mailbox, SinkConnector};
use crate::music::track::TrackSummary;

#[derive(Debug, Clone)]
pub struct PlayerSettings {
    /// How long a connected but idle session lingers before disconnecting.
    pub idle_timeout: Duration,
    pub max_queue_len: Option<usize>,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            max_queue_len: Some(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlayRequest {
    pub guild_id: GuildId,
    pub url: String,
    /// The requester's voice channel, used if the bot is not connected yet.
    pub destination: ChannelId,
}

#[derive(Clone)]
struct SessionHandle {
    id: u64,
    mailbox: Mailbox,
}

#[derive(Default)]
struct GuildSlot {
    /// Bumped by every leave; plays issued under an older epoch are dropped.
    leave_epoch: u64,
    /// Fair lock, so concurrent plays resolve and enqueue in arrival order.
    intake: Arc<tokio::sync::Mutex<()>>,
    session: Option<SessionHandle>,
}

impl GuildSlot {
    /// No session and no play waiting on the intake lock.
    fn is_vacant(&self) -> bool {
        self.session.is_none() && Arc::strong_count(&self.intake) == 1
    }
}

type Registry = Arc<Mutex<HashMap<GuildId, GuildSlot>>>;

/// Entry point for every music command. Owns at most one playback session per
/// guild and creates it lazily on the first successful play.
pub struct PlayerManager {
    resolver: Arc<dyn TrackResolver>,
    connector: Arc<dyn SinkConnector>,
    settings: PlayerSettings,
    slots: Registry,
    events: mpsc::UnboundedSender<PlayerEvent>,
    next_session_id: AtomicU64,
}

impl PlayerManager {
    pub fn new(
        resolver: Arc<dyn TrackResolver>,
        connector: Arc<dyn SinkConnector>,
        settings: PlayerSettings,
    ) -> (Self, mpsc::UnboundedReceiver<PlayerEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let manager = Self {
            resolver,
            connector,
            settings,
            slots: Arc::new(Mutex::new(HashMap::new())),
            events,
            next_session_id: AtomicU64::new(1),
        };

        (manager, receiver)
    }

    /// Resolves `request.url` and either starts it or queues it behind the
    /// current track.
    ///
    /// Resolution happens before the session is touched, so a failed resolve
    /// leaves the guild exactly as it was.
    pub async fn play(&self, request: PlayRequest) -> Result<PlayOutcome, MusicError> {
        let guild_id = request.guild_id;
        let result = self.submit(request).await;
        prune(&self.slots, guild_id);
        result
    }

    async fn submit(&self, request: PlayRequest) -> Result<PlayOutcome, MusicError> {
        let PlayRequest {
            guild_id,
            url,
            destination,
        } = request;

        let (epoch, intake) = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(guild_id).or_default();
            (slot.leave_epoch, slot.intake.clone())
        };
        let _turn = intake.lock().await;

        if self.leave_epoch(guild_id) != Some(epoch) {
            debug!(%guild_id, %url, "Dropping play queued behind a leave");
            return Err(MusicError::Superseded);
        }

        let track = match self.resolver.resolve(&url).await {
            Ok(track) => track,
            Err(err) => {
                warn!(%guild_id, %url, "Could not resolve track: {err}");
                self.emit(PlayerEvent::ResolutionFailed {
                    guild_id,
                    reason: err.clone(),
                });
                return Err(err.into());
            }
        };

        loop {
            let session = {
                let mut slots = self.slots.lock();
                let slot = slots.entry(guild_id).or_default();
                if slot.leave_epoch != epoch {
                    debug!(%guild_id, title = %track.title, "Dropping play resolved across a leave");
                    return Err(MusicError::Superseded);
                }

                match &slot.session {
                    Some(session) => session.clone(),
                    None => {
                        let session = self.spawn_session(guild_id);
                        slot.session = Some(session.clone());
                        session
                    }
                }
            };

            let (reply, response) = oneshot::channel();
            let command = SessionCommand::Play {
                track: track.clone(),
                destination,
                reply,
            };
            if session.mailbox.send(command).is_err() {
                // The task is gone without having released its slot.
                release(&self.slots, guild_id, session.id);
                continue;
            }

            match response.await {
                Ok(Err(MusicError::SessionClosed)) => {
                    // Raced with a session shutting down; it has released its
                    // slot, so the next pass starts a fresh one.
                    debug!(%guild_id, session = session.id, "Session closed under us, retrying");
                    continue;
                }
                Ok(result) => return result,
                Err(_) => {
                    warn!(%guild_id, session = session.id, "Session died while handling a play");
                    release(&self.slots, guild_id, session.id);
                    return Err(MusicError::SessionClosed);
                }
            }
        }
    }

    pub async fn skip(&self, guild_id: GuildId) -> Result<TrackSummary, MusicError> {
        self.request(guild_id, |reply| SessionCommand::Skip { reply })
            .await
            .unwrap_or(Err(MusicError::NothingPlaying))
    }

    /// Pauses the current track. The session and queue are left alone.
    pub async fn pause(&self, guild_id: GuildId) -> Result<(), MusicError> {
        self.request(guild_id, |reply| SessionCommand::Pause { reply })
            .await
            .unwrap_or(Err(MusicError::NothingPlaying))
    }

    pub async fn resume(&self, guild_id: GuildId) -> Result<(), MusicError> {
        self.request(guild_id, |reply| SessionCommand::Resume { reply })
            .await
            .unwrap_or(Err(MusicError::NotPaused))
    }

    /// Stops playback, clears the queue and disconnects.
    ///
    /// Returns false if there was no session. Plays still resolving when this
    /// is called are discarded once they finish.
    pub async fn leave(&self, guild_id: GuildId) -> bool {
        let session = {
            let mut slots = self.slots.lock();
            let Some(slot) = slots.get_mut(&guild_id) else {
                return false;
            };
            slot.leave_epoch += 1;
            slot.session.clone()
        };

        let Some(session) = session else {
            return false;
        };

        let (reply, response) = oneshot::channel();
        if session.mailbox.send(SessionCommand::Leave { reply }).is_err() {
            return false;
        }
        let left = response.await.unwrap_or(false);
        if left {
            info!(%guild_id, "Session closed by leave");
        }
        left
    }

    pub async fn queue(&self, guild_id: GuildId) -> QueueSnapshot {
        self.request(guild_id, |reply| SessionCommand::Inspect { reply })
            .await
            .unwrap_or_default()
    }

    fn leave_epoch(&self, guild_id: GuildId) -> Option<u64> {
        self.slots.lock().get(&guild_id).map(|slot| slot.leave_epoch)
    }

    /// Sends a command to the guild's session, if there is one, and waits for the answer.
    async fn request<T>(
        &self,
        guild_id: GuildId,
        command: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Option<T> {
        let session = self
            .slots
            .lock()
            .get(&guild_id)
            .and_then(|slot| slot.session.clone())?;

        let (reply, response) = oneshot::channel();
        session.mailbox.send(command(reply)).ok()?;
        response.await.ok()
    }

    fn spawn_session(&self, guild_id: GuildId) -> SessionHandle {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let (mailbox, mut inbox) = mpsc::unbounded_channel();
        let controller = PlaybackController::new(
            guild_id,
            self.connector.clone(),
            self.settings.idle_timeout,
            self.settings.max_queue_len,
            mailbox.clone(),
            self.events.clone(),
        );
        let slot = SlotRelease {
            registry: self.slots.clone(),
            guild_id,
            session_id: id,
        };

        tokio::spawn(async move {
            controller.run(&mut inbox).await;

            // The sink is already disconnected here, so a session created
            // after the release cannot have its connection torn down by us.
            drop(slot);
            inbox.close();
            while let Some(command) = inbox.recv().await {
                command.reject();
            }
            debug!(%guild_id, session = id, "Session ended");
        });

        debug!(%guild_id, session = id, "Session started");
        SessionHandle { id, mailbox }
    }

    fn emit(&self, event: PlayerEvent) {
        let _ = self.events.send(event);
    }
}

fn release(registry: &Registry, guild_id: GuildId, session_id: u64) {
    let mut slots = registry.lock();
    let Some(slot) = slots.get_mut(&guild_id) else {
        return;
    };

    if slot
        .session
        .as_ref()
        .is_some_and(|session| session.id == session_id)
    {
        slot.session = None;
    }
    if slot.is_vacant() {
        slots.remove(&guild_id);
    }
}

/// Forgets a guild that has neither a session nor a play in flight.
fn prune(registry: &Registry, guild_id: GuildId) {
    let mut slots = registry.lock();
    if slots.get(&guild_id).is_some_and(GuildSlot::is_vacant) {
        slots.remove(&guild_id);
    }
}

/// Frees the session's slot when its task ends, even if the task panicked.
struct SlotRelease {
    registry: Registry,
    guild_id: GuildId,
    session_id: u64,
}

impl Drop for SlotRelease {
    fn drop(&mut self) {
        release(&self.registry, self.guild_id, self.session_id);
    }
}
