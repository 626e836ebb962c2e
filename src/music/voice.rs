use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client as HttpClient;
use serenity::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use serenity::prelude::Mutex;
use songbird::input::HttpRequest;
use songbird::error::ControlError;
use songbird::tracks::{PlayMode, Track as SongbirdTrack, TrackHandle};
use songbird::{Call, CoreEvent, Event, EventContext, Songbird, TrackEvent};
use tracing::{debug, warn};

use crate::error::SinkError;
use crate::music::sink::{DisconnectSignal, PlaybackSink, SinkConnector, TrackEndSignal};
use crate::music::track::Track;

/// Joins voice channels through the client's songbird manager.
pub struct SongbirdConnector {
    manager: Arc<Songbird>,
    http: HttpClient,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>, http: HttpClient) -> Self {
        Self { manager, http }
    }
}

#[async_trait]
impl SinkConnector for SongbirdConnector {
    async fn connect(
        &self,
        guild_id: GuildId,
        destination: ChannelId,
        on_disconnect: DisconnectSignal,
    ) -> Result<Box<dyn PlaybackSink>, SinkError> {
        let call = match self.manager.join(guild_id, destination).await {
            Ok(call) => call,
            Err(why) => {
                // A failed join can leave a half-built call behind.
                self.manager.remove(guild_id).await.ok();
                return Err(SinkError::Connect(why.to_string()));
            }
        };

        {
            let mut handler = call.lock().await;
            handler.remove_all_global_events();
            handler.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DriverDisconnectNotifier::new(guild_id, on_disconnect),
            );
        }

        Ok(Box::new(SongbirdSink {
            manager: self.manager.clone(),
            guild_id,
            call,
            http: self.http.clone(),
            current: None,
        }))
    }
}

struct SongbirdSink {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    call: Arc<Mutex<Call>>,
    http: HttpClient,
    current: Option<TrackHandle>,
}

impl SongbirdSink {
    async fn current_mode(&self) -> Option<PlayMode> {
        let handle = self.current.as_ref()?;
        handle.get_info().await.ok().map(|state| state.playing)
    }

    fn current_handle(&self) -> Result<&TrackHandle, SinkError> {
        self.current
            .as_ref()
            .ok_or_else(|| SinkError::Control("no track loaded".into()))
    }
}

#[async_trait]
impl PlaybackSink for SongbirdSink {
    async fn play(&mut self, track: &Track, on_finished: TrackEndSignal) -> Result<(), SinkError> {
        let source = HttpRequest::new_with_headers(
            self.http.clone(),
            track.stream.url.clone(),
            header_map(&track.stream.headers),
        );

        let audio_handle = {
            let mut handler = self.call.lock().await;
            handler.play_only(SongbirdTrack::from(source))
        };

        audio_handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndNotifier::new(on_finished.clone()),
            )
            .map_err(|why| SinkError::Playback(why.to_string()))?;
        audio_handle
            .add_event(
                Event::Track(TrackEvent::Error),
                TrackErrorNotifier::new(on_finished),
            )
            .map_err(|why| SinkError::Playback(why.to_string()))?;

        self.current = Some(audio_handle);
        Ok(())
    }

    async fn pause(&mut self) -> Result<(), SinkError> {
        self.current_handle()?
            .pause()
            .map_err(|why| SinkError::Control(why.to_string()))
    }

    async fn resume(&mut self) -> Result<(), SinkError> {
        self.current_handle()?
            .play()
            .map_err(|why| SinkError::Control(why.to_string()))
    }

    async fn stop(&mut self) -> Result<(), SinkError> {
        match self.current.take() {
            Some(handle) => stopped(handle.stop()),
            None => Ok(()),
        }
    }

    async fn is_playing(&self) -> bool {
        matches!(self.current_mode().await, Some(PlayMode::Play))
    }

    async fn is_paused(&self) -> bool {
        matches!(self.current_mode().await, Some(PlayMode::Pause))
    }

    async fn disconnect(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.stop().ok();
        }

        if let Err(why) = self.manager.remove(self.guild_id).await {
            warn!(guild_id = %self.guild_id, "Failed to leave voice channel: {why}");
        }
    }
}

/// A track that ended on its own before the stop arrived counts as stopped.
/// Its end event is already on the way to the controller.
fn stopped(result: Result<(), ControlError>) -> Result<(), SinkError> {
    match result {
        Ok(()) | Err(ControlError::Finished) => Ok(()),
        Err(why) => Err(SinkError::Control(why.to_string())),
    }
}

fn header_map(headers: &[(String, String)]) -> HeaderMap {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
            let value = HeaderValue::from_str(value).ok()?;
            Some((name, value))
        })
        .collect()
}

pub struct TrackEndNotifier {
    signal: TrackEndSignal,
}

impl TrackEndNotifier {
    pub fn new(signal: TrackEndSignal) -> Self {
        Self { signal }
    }
}

#[async_trait]
impl songbird::events::EventHandler for TrackEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        self.signal.finished();
        None
    }
}

pub struct TrackErrorNotifier {
    signal: TrackEndSignal,
}

impl TrackErrorNotifier {
    pub fn new(signal: TrackEndSignal) -> Self {
        Self { signal }
    }
}

#[async_trait]
impl songbird::events::EventHandler for TrackErrorNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let reason = match ctx {
            EventContext::Track(tracks) => tracks.first().and_then(|(state, _)| match &state.playing {
                PlayMode::Errored(why) => Some(format!("{why:?}")),
                _ => None,
            }),
            _ => None,
        };

        self.signal
            .failed(reason.unwrap_or_else(|| "the audio stream failed".into()));
        None
    }
}

pub struct DriverDisconnectNotifier {
    guild_id: GuildId,
    signal: DisconnectSignal,
}

impl DriverDisconnectNotifier {
    pub fn new(guild_id: GuildId, signal: DisconnectSignal) -> Self {
        Self { guild_id, signal }
    }
}

#[async_trait]
impl songbird::events::EventHandler for DriverDisconnectNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::DriverDisconnect(_data) = ctx {
            debug!(guild_id = %self.guild_id, "Voice driver disconnected");
            self.signal.connection_lost();
        }
        None
    }
}
