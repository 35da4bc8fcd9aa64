use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::broadcast::EndpointId;
use crate::error::{Result, SpeakerError};
use crate::hooks::{Hooks, TrackFinished, TrackSelecting};

/// Which entry a play request refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueuePos {
    /// Replay the current track without touching the playlist.
    Direct,
    Index(usize),
}

impl QueuePos {
    pub fn is_direct(self) -> bool {
        self == QueuePos::Direct
    }
}

/// What happens once a track has finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Continuation {
    Play(QueuePos),
    Stop,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    pub track: String,
    pub position: QueuePos,
    pub direct_play: bool,
}

pub struct Playlist {
    entries: Vec<String>,
    pub looping: bool,
    pub shuffle: bool,
    pub continue_after_finish: bool,
}

impl Playlist {
    pub fn new() -> Self {
        Playlist {
            entries: vec![],
            looping: false,
            shuffle: false,
            continue_after_finish: true,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Inserts `track` at `position`, or appends it when `position` is `None`.
    pub fn enqueue(&mut self, track: String, position: Option<usize>) -> Result<&mut Self> {
        match position {
            None => self.entries.push(track),
            Some(index) if index <= self.entries.len() => self.entries.insert(index, track),
            Some(index) => {
                return Err(SpeakerError::InvalidPosition {
                    index,
                    len: self.entries.len(),
                })
            }
        }
        Ok(self)
    }

    pub fn clear(&mut self) -> &mut Self {
        self.entries.clear();
        self
    }

    /// Checks a request before any playback work starts.
    pub fn validate(&self, requested: QueuePos) -> Result<()> {
        match requested {
            QueuePos::Direct => Ok(()),
            QueuePos::Index(_) if self.entries.is_empty() => Err(SpeakerError::EmptyPlaylist),
            QueuePos::Index(index) if index >= self.entries.len() => {
                Err(SpeakerError::InvalidPosition {
                    index,
                    len: self.entries.len(),
                })
            }
            QueuePos::Index(_) => Ok(()),
        }
    }

    /// Resolves a play request to a concrete track.
    ///
    /// Direct play reuses `current` and leaves the playlist alone. A queue pop
    /// shuffles first when enabled, removes the entry, and re-appends it when
    /// looping.
    pub fn select_next(
        &mut self,
        requested: QueuePos,
        current: Option<&str>,
        hooks: &Hooks,
        endpoint: EndpointId,
    ) -> Result<Selection> {
        let position = hooks.track_selecting(TrackSelecting {
            endpoint,
            direct_play: requested.is_direct(),
            position: requested,
        });

        let track = match position {
            QueuePos::Direct => current
                .map(str::to_owned)
                .ok_or(SpeakerError::NoCurrentTrack)?,
            QueuePos::Index(index) => {
                self.validate(position)?;
                if self.shuffle {
                    self.entries.shuffle(&mut rand::rng());
                }
                let track = self.entries.remove(index);
                if self.looping {
                    self.entries.push(track.clone());
                }
                track
            }
        };

        let direct_play = position.is_direct();
        let track = hooks.track_selected(endpoint, direct_play, position, track);
        Ok(Selection {
            track,
            position,
            direct_play,
        })
    }

    /// Decides what follows a finished track.
    ///
    /// A looping direct play is committed to replay before the hooks run, and
    /// a halted session always stops; hook overrides are ignored for both.
    pub fn on_track_finished(
        &self,
        track: &str,
        direct_play: bool,
        halted: bool,
        hooks: &Hooks,
        endpoint: EndpointId,
    ) -> Continuation {
        let replay = !halted && self.continue_after_finish && self.looping && direct_play;
        let computed = if halted {
            Continuation::Stop
        } else if replay {
            Continuation::Play(QueuePos::Direct)
        } else if self.continue_after_finish && !self.entries.is_empty() {
            Continuation::Play(QueuePos::Index(0))
        } else {
            Continuation::Stop
        };

        let overridden = hooks.track_finished(TrackFinished {
            endpoint,
            track,
            direct_play,
            next: computed,
        });
        if halted || replay {
            computed
        } else {
            overridden
        }
    }
}

impl Default for Playlist {
    fn default() -> Self {
        Playlist::new()
    }
}
