//! Recording fakes for the resolver and the sink.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use serenity::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::Notify;

use crate::error::{ResolutionError, SinkError};
use crate::music::resolver::TrackResolver;
use crate::music::sink::{DisconnectSignal, PlaybackSink, SinkConnector, TrackEndSignal};
use crate::music::track::{StreamRef, Track};

pub fn track(title: &str) -> Track {
    Track {
        title: title.into(),
        thumbnail_url: Some(format!("https://img.example/{title}.jpg")),
        source_url: format!("https://video.example/{title}"),
        duration: None,
        stream: StreamRef {
            url: format!("https://stream.example/{title}"),
            headers: Vec::new(),
        },
    }
}

/// Lets spawned session tasks run to their next suspension point.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

/// Resolves every URL to a track titled after the URL, unless told otherwise.
#[derive(Default)]
pub struct FakeResolver {
    failures: Mutex<HashMap<String, ResolutionError>>,
    held: Mutex<HashMap<String, Arc<Notify>>>,
    entered: Notify,
    calls: Mutex<Vec<String>>,
}

impl FakeResolver {
    pub fn fail(&self, url: &str, err: ResolutionError) {
        self.failures.lock().insert(url.into(), err);
    }

    /// Blocks resolution of `url` until the returned gate is notified.
    pub fn hold(&self, url: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.held.lock().insert(url.into(), gate.clone());
        gate
    }

    /// Waits until a held resolution has started.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl TrackResolver for FakeResolver {
    async fn resolve(&self, url: &str) -> Result<Track, ResolutionError> {
        self.calls.lock().push(url.into());

        let gate = self.held.lock().get(url).cloned();
        if let Some(gate) = gate {
            self.entered.notify_one();
            gate.notified().await;
        }

        if let Some(err) = self.failures.lock().get(url).cloned() {
            return Err(err);
        }
        Ok(track(url))
    }
}

#[derive(Default)]
pub struct SinkLog {
    pub connects: Vec<(GuildId, ChannelId)>,
    pub played: Vec<String>,
    pub stops: usize,
    pub disconnects: usize,
    current: Option<TrackEndSignal>,
    paused: bool,
    /// Reports audio still playing even with no track loaded.
    lingering: bool,
    on_disconnect: Option<DisconnectSignal>,
}

/// Hands out sinks that share one log, so a test can watch every session.
#[derive(Default)]
pub struct FakeConnector {
    log: Arc<Mutex<SinkLog>>,
    next_connect_error: Mutex<Option<SinkError>>,
    refused: Arc<Mutex<HashSet<String>>>,
    explosive: Arc<Mutex<HashSet<String>>>,
}

impl FakeConnector {
    pub fn log(&self) -> MutexGuard<'_, SinkLog> {
        self.log.lock()
    }

    pub fn played(&self) -> Vec<String> {
        self.log.lock().played.clone()
    }

    pub fn fail_next_connect(&self, err: SinkError) {
        *self.next_connect_error.lock() = Some(err);
    }

    /// Makes `play` fail for tracks with this title.
    pub fn refuse(&self, title: &str) {
        self.refused.lock().insert(title.into());
    }

    /// Makes `play` panic for tracks with this title.
    pub fn panic_on(&self, title: &str) {
        self.explosive.lock().insert(title.into());
    }

    pub fn set_lingering(&self, lingering: bool) {
        self.log.lock().lingering = lingering;
    }

    pub fn current_signal(&self) -> Option<TrackEndSignal> {
        self.log.lock().current.clone()
    }

    /// Plays the current track to its end. False if nothing was playing.
    pub fn finish_current(&self) -> bool {
        self.end_current(None)
    }

    pub fn fail_current(&self, reason: &str) -> bool {
        self.end_current(Some(reason))
    }

    pub fn drop_connection(&self) {
        if let Some(signal) = self.log.lock().on_disconnect.clone() {
            signal.connection_lost();
        }
    }

    fn end_current(&self, error: Option<&str>) -> bool {
        let signal = {
            let mut log = self.log.lock();
            log.paused = false;
            log.current.take()
        };

        match (signal, error) {
            (Some(signal), None) => {
                signal.finished();
                true
            }
            (Some(signal), Some(reason)) => {
                signal.failed(reason);
                true
            }
            (None, _) => false,
        }
    }
}

#[async_trait]
impl SinkConnector for FakeConnector {
    async fn connect(
        &self,
        guild_id: GuildId,
        destination: ChannelId,
        on_disconnect: DisconnectSignal,
    ) -> Result<Box<dyn PlaybackSink>, SinkError> {
        if let Some(err) = self.next_connect_error.lock().take() {
            return Err(err);
        }

        let mut log = self.log.lock();
        log.connects.push((guild_id, destination));
        log.on_disconnect = Some(on_disconnect);

        Ok(Box::new(FakeSink {
            log: self.log.clone(),
            refused: self.refused.clone(),
            explosive: self.explosive.clone(),
        }))
    }
}

struct FakeSink {
    log: Arc<Mutex<SinkLog>>,
    refused: Arc<Mutex<HashSet<String>>>,
    explosive: Arc<Mutex<HashSet<String>>>,
}

#[async_trait]
impl PlaybackSink for FakeSink {
    async fn play(&mut self, track: &Track, on_finished: TrackEndSignal) -> Result<(), SinkError> {
        let explodes = self.explosive.lock().contains(&track.title);
        if explodes {
            panic!("sink blew up on {}", track.title);
        }
        if self.refused.lock().contains(&track.title) {
            return Err(SinkError::Playback(format!("cannot open {}", track.title)));
        }

        let mut log = self.log.lock();
        log.played.push(track.title.clone());
        log.current = Some(on_finished);
        log.paused = false;
        Ok(())
    }

    async fn pause(&mut self) -> Result<(), SinkError> {
        self.log.lock().paused = true;
        Ok(())
    }

    async fn resume(&mut self) -> Result<(), SinkError> {
        self.log.lock().paused = false;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SinkError> {
        let signal = {
            let mut log = self.log.lock();
            log.stops += 1;
            log.paused = false;
            log.current.take()
        };
        // A real driver reports a stopped track as ended.
        if let Some(signal) = signal {
            signal.finished();
        }
        Ok(())
    }

    async fn is_playing(&self) -> bool {
        let log = self.log.lock();
        (log.current.is_some() && !log.paused) || log.lingering
    }

    async fn is_paused(&self) -> bool {
        self.log.lock().paused
    }

    async fn disconnect(&mut self) {
        let mut log = self.log.lock();
        log.disconnects += 1;
        log.current = None;
        log.paused = false;
    }
}
