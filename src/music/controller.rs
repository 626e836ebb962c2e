use std::sync::Arc;
use std::time::Duration;

use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::MusicError;
use crate::music::notification::{PlayOrigin, PlayerEvent};
use crate::music::queue::GuildQueue;
use crate::music::sink::{DisconnectSignal, Mailbox, PlaybackSink, SinkConnector, TrackEndSignal};
use crate::music::track::{Track, TrackSummary};
use crate::music::watchdog::IdleWatchdog;

pub(crate) type Reply<T> = oneshot::Sender<T>;

/// Everything that can change a guild's playback state, applied one at a time.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    Play {
        track: Track,
        destination: ChannelId,
        reply: Reply<Result<PlayOutcome, MusicError>>,
    },
    Skip {
        reply: Reply<Result<TrackSummary, MusicError>>,
    },
    Pause {
        reply: Reply<Result<(), MusicError>>,
    },
    Resume {
        reply: Reply<Result<(), MusicError>>,
    },
    Leave {
        reply: Reply<bool>,
    },
    Inspect {
        reply: Reply<QueueSnapshot>,
    },
    TrackEnded {
        generation: u64,
        error: Option<String>,
    },
    WatchdogExpired {
        arm_id: u64,
    },
    ConnectionLost,
}

impl SessionCommand {
    /// Answers a command that arrived after the session started closing.
    pub(crate) fn reject(self) {
        match self {
            Self::Play { reply, .. } => {
                let _ = reply.send(Err(MusicError::SessionClosed));
            }
            Self::Skip { reply } => {
                let _ = reply.send(Err(MusicError::NotConnected));
            }
            Self::Pause { reply } | Self::Resume { reply } => {
                let _ = reply.send(Err(MusicError::NotConnected));
            }
            Self::Leave { reply } => {
                let _ = reply.send(false);
            }
            Self::Inspect { reply } => {
                let _ = reply.send(QueueSnapshot::default());
            }
            Self::TrackEnded { .. } | Self::WatchdogExpired { .. } | Self::ConnectionLost => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    NowPlaying(TrackSummary),
    Queued { track: TrackSummary, position: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    /// No session.
    #[default]
    Idle,
    /// A track is current, possibly paused.
    Playing,
    /// Connected with nothing to play; the idle watchdog is running.
    Holding,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub state: PlayerState,
    pub now_playing: Option<TrackSummary>,
    pub paused: bool,
    pub upcoming: Vec<TrackSummary>,
}

enum Flow {
    Continue,
    Close,
}

/// The state machine for one guild. Runs as its own task and owns the sink,
/// the queue and the idle watchdog outright.
pub(crate) struct PlaybackController {
    guild_id: GuildId,
    connector: Arc<dyn SinkConnector>,
    sink: Option<Box<dyn PlaybackSink>>,
    queue: GuildQueue,
    current: Option<Track>,
    /// Bumped for every track handed to the sink; completions carrying an
    /// older value belong to a track we have already moved past.
    generation: u64,
    watchdog: IdleWatchdog,
    idle_timeout: Duration,
    mailbox: Mailbox,
    events: mpsc::UnboundedSender<PlayerEvent>,
}

impl PlaybackController {
    pub(crate) fn new(
        guild_id: GuildId,
        connector: Arc<dyn SinkConnector>,
        idle_timeout: Duration,
        max_queue_len: Option<usize>,
        mailbox: Mailbox,
        events: mpsc::UnboundedSender<PlayerEvent>,
    ) -> Self {
        Self {
            guild_id,
            connector,
            sink: None,
            queue: GuildQueue::new(max_queue_len),
            current: None,
            generation: 0,
            watchdog: IdleWatchdog::new(),
            idle_timeout,
            mailbox,
            events,
        }
    }

    /// Handles commands until the session ends. The sink is disconnected by
    /// the time this returns.
    pub(crate) async fn run(mut self, inbox: &mut mpsc::UnboundedReceiver<SessionCommand>) {
        while let Some(command) = inbox.recv().await {
            if let Flow::Close = self.handle(command).await {
                break;
            }
        }

        self.shutdown().await;
    }

    async fn handle(&mut self, command: SessionCommand) -> Flow {
        match command {
            SessionCommand::Play {
                track,
                destination,
                reply,
            } => {
                let (result, flow) = self.play(track, destination).await;
                let _ = reply.send(result);
                flow
            }
            SessionCommand::Skip { reply } => {
                let _ = reply.send(self.skip().await);
                Flow::Continue
            }
            SessionCommand::Pause { reply } => {
                let _ = reply.send(self.pause().await);
                Flow::Continue
            }
            SessionCommand::Resume { reply } => {
                let _ = reply.send(self.resume().await);
                Flow::Continue
            }
            SessionCommand::Leave { reply } => {
                info!(guild_id = %self.guild_id, "Leaving voice channel on request");
                self.shutdown().await;
                let _ = reply.send(true);
                Flow::Close
            }
            SessionCommand::Inspect { reply } => {
                let _ = reply.send(self.snapshot().await);
                Flow::Continue
            }
            SessionCommand::TrackEnded { generation, error } => {
                self.on_track_ended(generation, error).await;
                Flow::Continue
            }
            SessionCommand::WatchdogExpired { arm_id } => self.on_watchdog_expired(arm_id).await,
            SessionCommand::ConnectionLost => {
                warn!(guild_id = %self.guild_id, "Voice connection lost, closing session");
                self.emit(PlayerEvent::ConnectionLost {
                    guild_id: self.guild_id,
                });
                Flow::Close
            }
        }
    }

    async fn play(
        &mut self,
        track: Track,
        destination: ChannelId,
    ) -> (Result<PlayOutcome, MusicError>, Flow) {
        if self.sink.is_none() {
            let on_disconnect = DisconnectSignal::new(self.mailbox.clone());
            match self
                .connector
                .connect(self.guild_id, destination, on_disconnect)
                .await
            {
                Ok(sink) => {
                    debug!(guild_id = %self.guild_id, %destination, "Connected to voice");
                    self.sink = Some(sink);
                }
                Err(err) => {
                    warn!(guild_id = %self.guild_id, "Could not connect sink: {err}");
                    // Nothing was committed; the session never existed.
                    return (Err(err.into()), Flow::Close);
                }
            }
        }

        if self.current.is_some() || !self.queue.is_empty() {
            let summary = track.summary();
            return match self.queue.enqueue(track) {
                Ok(position) => {
                    debug!(guild_id = %self.guild_id, title = %summary.title, position, "Queued track");
                    self.emit(PlayerEvent::QueuedAdded {
                        guild_id: self.guild_id,
                        track: summary.clone(),
                        position,
                    });
                    (
                        Ok(PlayOutcome::Queued {
                            track: summary,
                            position,
                        }),
                        Flow::Continue,
                    )
                }
                Err(err) => (Err(err), Flow::Continue),
            };
        }

        self.watchdog.cancel();
        match self.start(track).await {
            Ok(summary) => {
                self.emit(PlayerEvent::NowPlaying {
                    guild_id: self.guild_id,
                    track: summary.clone(),
                    origin: PlayOrigin::Request,
                });
                (Ok(PlayOutcome::NowPlaying(summary)), Flow::Continue)
            }
            Err(err) => {
                self.arm_watchdog();
                (Err(err), Flow::Continue)
            }
        }
    }

    async fn start(&mut self, track: Track) -> Result<TrackSummary, MusicError> {
        let sink = self.sink.as_mut().ok_or(MusicError::NotConnected)?;

        self.generation += 1;
        let on_finished = TrackEndSignal::new(self.generation, self.mailbox.clone());
        sink.play(&track, on_finished).await?;

        info!(guild_id = %self.guild_id, title = %track.title, "Now playing");
        let summary = track.summary();
        self.current = Some(track);
        Ok(summary)
    }

    /// Starts the next queued track, skipping any the sink refuses. Arms the
    /// watchdog once the queue runs dry.
    async fn advance(&mut self) {
        while let Some(next) = self.queue.dequeue_front() {
            let summary = next.summary();
            match self.start(next).await {
                Ok(summary) => {
                    self.emit(PlayerEvent::NowPlaying {
                        guild_id: self.guild_id,
                        track: summary,
                        origin: PlayOrigin::Queue,
                    });
                    return;
                }
                Err(err) => {
                    warn!(guild_id = %self.guild_id, title = %summary.title, "Skipping unplayable track: {err}");
                    self.emit(PlayerEvent::PlaybackFailed {
                        guild_id: self.guild_id,
                        track: summary,
                        reason: err.to_string(),
                    });
                }
            }
        }

        self.arm_watchdog();
    }

    async fn on_track_ended(&mut self, generation: u64, error: Option<String>) {
        if generation != self.generation {
            debug!(guild_id = %self.guild_id, generation, "Ignoring stale track end");
            return;
        }
        // Songbird can report both an error and an end for the same track.
        let Some(finished) = self.current.take() else {
            return;
        };

        match error {
            Some(reason) => {
                warn!(guild_id = %self.guild_id, title = %finished.title, "Track failed mid-stream: {reason}");
                self.emit(PlayerEvent::PlaybackFailed {
                    guild_id: self.guild_id,
                    track: finished.summary(),
                    reason,
                });
            }
            None => debug!(guild_id = %self.guild_id, title = %finished.title, "Track finished"),
        }

        self.advance().await;
    }

    async fn on_watchdog_expired(&mut self, arm_id: u64) -> Flow {
        if !self.watchdog.claim_expiry(arm_id) {
            debug!(guild_id = %self.guild_id, arm_id, "Ignoring superseded watchdog");
            return Flow::Continue;
        }

        if self.current.is_some() {
            return Flow::Continue;
        }

        if !self.queue.is_empty() {
            self.advance().await;
            return Flow::Continue;
        }

        let sink_busy = match &self.sink {
            Some(sink) => sink.is_playing().await,
            None => false,
        };
        if sink_busy {
            // Something is still coming out of the sink; look again later.
            self.arm_watchdog();
            return Flow::Continue;
        }

        info!(guild_id = %self.guild_id, "Idle for {:?}, disconnecting", self.idle_timeout);
        self.emit(PlayerEvent::AutoDisconnected {
            guild_id: self.guild_id,
        });
        Flow::Close
    }

    async fn skip(&mut self) -> Result<TrackSummary, MusicError> {
        let summary = self
            .current
            .as_ref()
            .map(Track::summary)
            .ok_or(MusicError::NothingPlaying)?;
        let sink = self.sink.as_mut().ok_or(MusicError::NotConnected)?;

        // The sink reports the stop through the usual completion signal, which
        // advances the queue.
        sink.stop().await?;
        info!(guild_id = %self.guild_id, title = %summary.title, "Skipped");
        Ok(summary)
    }

    async fn pause(&mut self) -> Result<(), MusicError> {
        if self.current.is_none() {
            return Err(MusicError::NothingPlaying);
        }
        let sink = self.sink.as_mut().ok_or(MusicError::NotConnected)?;
        if sink.is_paused().await {
            return Err(MusicError::NothingPlaying);
        }

        sink.pause().await?;
        Ok(())
    }

    async fn resume(&mut self) -> Result<(), MusicError> {
        if self.current.is_none() {
            return Err(MusicError::NotPaused);
        }
        let sink = self.sink.as_mut().ok_or(MusicError::NotConnected)?;
        if !sink.is_paused().await {
            return Err(MusicError::NotPaused);
        }

        sink.resume().await?;
        Ok(())
    }

    async fn snapshot(&self) -> QueueSnapshot {
        let state = if self.current.is_some() {
            PlayerState::Playing
        } else if self.sink.is_some() {
            PlayerState::Holding
        } else {
            PlayerState::Idle
        };
        let paused = match (&self.sink, &self.current) {
            (Some(sink), Some(_)) => sink.is_paused().await,
            _ => false,
        };

        QueueSnapshot {
            state,
            now_playing: self.current.as_ref().map(Track::summary),
            paused,
            upcoming: self.queue.peek_all().map(Track::summary).collect(),
        }
    }

    fn arm_watchdog(&mut self) {
        if self.sink.is_some() {
            let arm_id = self.watchdog.arm(self.idle_timeout, self.mailbox.clone());
            debug!(guild_id = %self.guild_id, arm_id, "Armed idle watchdog");
        }
    }

    /// Tears the session down. Safe to call more than once.
    async fn shutdown(&mut self) {
        self.watchdog.cancel();
        if !self.queue.is_empty() {
            debug!(guild_id = %self.guild_id, dropped = self.queue.len(), "Clearing queue");
        }
        self.queue.clear();
        self.current = None;

        if let Some(mut sink) = self.sink.take() {
            if let Err(err) = sink.stop().await {
                debug!(guild_id = %self.guild_id, "Stop before disconnect failed: {err}");
            }
            sink.disconnect().await;
        }
    }

    fn emit(&self, event: PlayerEvent) {
        if self.events.send(event).is_err() {
            debug!(guild_id = %self.guild_id, "No listener for player events");
        }
    }
}
