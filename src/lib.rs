//! Streams decoded tracks to network listeners as fixed-size mono frames.
//!
//! A [`Speaker`] owns a playlist and a cooperative playback task that decodes
//! into a bounded FIFO. The host drives [`Speaker::tick`] with elapsed time;
//! each tick moves the owed number of samples into a ring buffer and
//! broadcasts every complete 10ms frame.

pub mod audio_source;
pub mod broadcast;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod fifo;
pub mod hooks;
pub mod playlist;
pub mod ring_buffer;
pub mod scheduler;
pub mod session;
pub mod speaker;
pub mod udp;

#[cfg(test)]
mod sine;

pub use error::{Result, SpeakerError};
pub use playlist::{Continuation, QueuePos};
pub use session::SessionState;
pub use speaker::{Speaker, SpeakerBuilder, SpeakerStatus};

pub const TARGET_SAMPLE_RATE: u32 = 48000;
pub const TARGET_CHANNELS: usize = 1;

/// Samples per broadcast frame (10ms).
pub const FRAME_SAMPLES: usize = 480;
pub const HEAD_SAMPLES: usize = 1920;

/// Samples decoded per read: 200ms plus head room.
pub const READ_QUANTUM: usize =
    TARGET_SAMPLE_RATE as usize * TARGET_CHANNELS / 5 + HEAD_SAMPLES;
