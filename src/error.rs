use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeakerError {
    /// Missing file, unsupported container extension or a failed fetch.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// Container could not be opened, or it is not mono 48kHz.
    #[error("format error: {0}")]
    Format(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("fetch error: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("queue position {index} is out of bounds for a playlist of {len}")]
    InvalidPosition { index: usize, len: usize },

    #[error("playlist is empty")]
    EmptyPlaylist,

    #[error("no current track to play directly")]
    NoCurrentTrack,

    #[error("speaker has been destroyed")]
    Destroyed,

    #[error("speaker must be built inside a tokio runtime")]
    NoRuntime,

    #[error("config error: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SpeakerError {
    /// Errors that skip the affected track instead of surfacing to the caller.
    pub fn is_track_failure(&self) -> bool {
        matches!(
            self,
            SpeakerError::SourceUnavailable(_)
                | SpeakerError::Format(_)
                | SpeakerError::Io(_)
                | SpeakerError::Fetch(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SpeakerError>;

#[cfg(test)]
mod tests {
    use super::SpeakerError;

    #[test]
    fn classifies_track_failures() {
        assert!(SpeakerError::SourceUnavailable("a.ogg".into()).is_track_failure());
        assert!(SpeakerError::Format("stereo".into()).is_track_failure());
        assert!(SpeakerError::Io(std::io::ErrorKind::UnexpectedEof.into()).is_track_failure());
        assert!(!SpeakerError::InvalidPosition { index: 3, len: 1 }.is_track_failure());
        assert!(!SpeakerError::EmptyPlaylist.is_track_failure());
    }
}
