//! Per-guild music playback.
//!
//! Each guild with an active voice connection gets one [`controller`] task that
//! owns its queue, sink and idle watchdog. All changes to that guild's playback
//! go through the task's mailbox, so play requests, track completions, watchdog
//! expiries and leaves are applied one at a time and never interleave.
//! [`PlayerManager`] routes requests to those tasks and creates them on demand.

pub mod controller;
pub mod manager;
pub mod notification;
pub mod queue;
pub mod resolver;
pub mod sink;
pub mod track;
pub mod voice;
pub mod watchdog;

#[cfg(test)]
pub mod testing;

pub use controller::{PlayOutcome, QueueSnapshot};
pub use manager::{PlayRequest, PlayerManager, PlayerSettings};
pub use notification::{PlayOrigin, PlayerEvent};
pub use resolver::YtDlpResolver;
pub use track::{format_duration, TrackSummary};
pub use voice::SongbirdConnector;
