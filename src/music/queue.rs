use std::collections::VecDeque;

use crate::error::MusicError;
use crate::music::track::Track;

/// Tracks waiting to be played in one guild, in the order they were requested.
///
/// No locking of its own: only the guild's controller task ever holds one.
#[derive(Debug, Default)]
pub struct GuildQueue {
    tracks: VecDeque<Track>,
    capacity: Option<usize>,
}

impl GuildQueue {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            tracks: VecDeque::new(),
            capacity,
        }
    }

    /// Appends a track and returns its 1-based position.
    pub fn enqueue(&mut self, track: Track) -> Result<usize, MusicError> {
        if let Some(capacity) = self.capacity {
            if self.tracks.len() >= capacity {
                return Err(MusicError::QueueFull(capacity));
            }
        }

        self.tracks.push_back(track);
        Ok(self.tracks.len())
    }

    pub fn dequeue_front(&mut self) -> Option<Track> {
        self.tracks.pop_front()
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    pub fn peek_all(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
