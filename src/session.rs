use serde::Serialize;

use crate::decoder::TrackDecoder;
use crate::error::{Result, SpeakerError};
use crate::playlist::{QueuePos, Selection};
use crate::{TARGET_CHANNELS, TARGET_SAMPLE_RATE};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Selecting,
    Acquiring,
    Validating,
    Streaming,
    Finishing,
    Destroyed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Destroyed, _) => false,
            // a new play request may interrupt anything
            (_, Selecting) | (_, Destroyed) => true,
            (Selecting, Acquiring) | (Selecting, Idle) => true,
            (Acquiring, Validating) | (Acquiring, Finishing) => true,
            (Validating, Streaming) | (Validating, Finishing) => true,
            (Streaming, Finishing) => true,
            (Finishing, Idle) => true,
            _ => false,
        }
    }

    /// Whether a track is in flight.
    pub fn is_active(self) -> bool {
        !matches!(self, SessionState::Idle | SessionState::Destroyed)
    }
}

/// The track a session is playing, fixed once the decoder has been validated.
#[derive(Clone, Debug, Serialize)]
pub struct Session {
    pub track: String,
    pub position: QueuePos,
    pub direct_play: bool,
    pub channels: usize,
    pub sample_rate: u32,
}

impl Session {
    /// Accepts only mono 48kHz decoders.
    pub fn validate(selection: &Selection, decoder: &dyn TrackDecoder) -> Result<Session> {
        if decoder.channels() != TARGET_CHANNELS {
            return Err(SpeakerError::Format(format!(
                "{} has {} channels, audio files must be mono",
                selection.track,
                decoder.channels()
            )));
        }
        if decoder.sample_rate() != TARGET_SAMPLE_RATE {
            return Err(SpeakerError::Format(format!(
                "{} has a sample rate of {}, audio files must be {}",
                selection.track,
                decoder.sample_rate(),
                TARGET_SAMPLE_RATE
            )));
        }
        Ok(Session {
            track: selection.track.clone(),
            position: selection.position,
            direct_play: selection.direct_play,
            channels: decoder.channels(),
            sample_rate: decoder.sample_rate(),
        })
    }
}
