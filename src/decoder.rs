use std::io::Cursor;

use log::warn;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{Result, SpeakerError};

/// An opened container, yielding interleaved f32 samples.
pub trait TrackDecoder: Send {
    fn channels(&self) -> usize;

    fn sample_rate(&self) -> u32;

    /// Fills `buf` from the current position. Returns 0 at end of stream.
    fn read_samples(&mut self, buf: &mut [f32]) -> Result<usize>;

    /// Moves the read position to end of stream, so the next read returns 0.
    fn seek_to_end(&mut self) -> Result<()>;
}

/// Opens resolved track bytes into a decoder.
pub trait Codec: Send + Sync {
    fn open(&self, bytes: Vec<u8>, extension: Option<&str>) -> Result<Box<dyn TrackDecoder>>;
}

#[derive(Default)]
pub struct SymphoniaCodec;

impl Codec for SymphoniaCodec {
    fn open(&self, bytes: Vec<u8>, extension: Option<&str>) -> Result<Box<dyn TrackDecoder>> {
        Ok(Box::new(SymphoniaDecoder::new(bytes, extension)?))
    }
}

pub struct SymphoniaDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    channels: usize,
    sample_rate: u32,
    pending: Vec<f32>,
    cursor: usize,
    finished: bool,
}

fn format_error(err: Error) -> SpeakerError {
    SpeakerError::Format(err.to_string())
}

impl SymphoniaDecoder {
    pub fn new(bytes: Vec<u8>, extension: Option<&str>) -> Result<SymphoniaDecoder> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let format_opts: FormatOptions = Default::default();
        let metadata_opts: MetadataOptions = Default::default();
        let decoder_opts: DecoderOptions = Default::default();

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &metadata_opts)
            .map_err(format_error)?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| SpeakerError::Format("no decodable audio track".into()))?;

        let channels = track
            .codec_params
            .channels
            .map(|c| c.count())
            .ok_or_else(|| SpeakerError::Format("unknown channel layout".into()))?;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| SpeakerError::Format("unknown sample rate".into()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &decoder_opts)
            .map_err(format_error)?;
        let track_id = track.id;

        Ok(SymphoniaDecoder {
            format,
            decoder,
            track_id,
            channels,
            sample_rate,
            pending: Vec::new(),
            cursor: 0,
            finished: false,
        })
    }

    /// Decodes the next packet of our track into `pending`. Returns false at end of stream.
    fn decode_next(&mut self) -> Result<bool> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    self.finished = true;
                    return Ok(false);
                }
                Err(Error::ResetRequired) => {
                    self.finished = true;
                    return Ok(false);
                }
                Err(Error::IoError(e)) => return Err(SpeakerError::Io(e)),
                Err(e) => return Err(format_error(e)),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(audio_buf) => {
                    let spec = *audio_buf.spec();
                    let duration = audio_buf.capacity() as u64;
                    let mut sample_buf = SampleBuffer::<f32>::new(duration, spec);
                    sample_buf.copy_interleaved_ref(audio_buf);

                    self.pending.clear();
                    self.pending.extend_from_slice(sample_buf.samples());
                    self.cursor = 0;
                    return Ok(true);
                }
                Err(Error::DecodeError(e)) => {
                    warn!("skipping undecodable packet: {}", e);
                }
                Err(e) => return Err(format_error(e)),
            }
        }
    }
}

impl TrackDecoder for SymphoniaDecoder {
    fn channels(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_samples(&mut self, buf: &mut [f32]) -> Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            if self.cursor < self.pending.len() {
                let count = (buf.len() - written).min(self.pending.len() - self.cursor);
                buf[written..written + count]
                    .copy_from_slice(&self.pending[self.cursor..self.cursor + count]);
                written += count;
                self.cursor += count;
                continue;
            }
            if self.finished || !self.decode_next()? {
                break;
            }
        }
        Ok(written)
    }

    fn seek_to_end(&mut self) -> Result<()> {
        self.pending.clear();
        self.cursor = 0;
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Codec, SymphoniaCodec};
    use crate::error::SpeakerError;
    use crate::sine::wav_bytes;

    #[test]
    fn decodes_every_sample_of_a_mono_wav() {
        let bytes = wav_bytes(1, 48000, 3000);
        let mut decoder = SymphoniaCodec.open(bytes, Some("wav")).unwrap();
        assert_eq!(decoder.channels(), 1);
        assert_eq!(decoder.sample_rate(), 48000);

        let mut buf = vec![0.0; 1024];
        let mut total = 0;
        let mut non_zero = 0;
        loop {
            let n = decoder.read_samples(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            non_zero += buf[..n].iter().filter(|s| **s != 0.0).count();
            total += n;
        }
        assert_eq!(total, 3000);
        assert!(non_zero > 2500);
    }

    #[test]
    fn reports_stereo_layout() {
        let bytes = wav_bytes(2, 48000, 480);
        let decoder = SymphoniaCodec.open(bytes, Some("wav")).unwrap();
        assert_eq!(decoder.channels(), 2);
    }

    #[test]
    fn reports_foreign_sample_rate() {
        let bytes = wav_bytes(1, 44100, 480);
        let decoder = SymphoniaCodec.open(bytes, Some("wav")).unwrap();
        assert_eq!(decoder.sample_rate(), 44100);
    }

    #[test]
    fn rejects_unreadable_containers() {
        let result = SymphoniaCodec.open(b"definitely not audio".to_vec(), Some("ogg"));
        assert!(matches!(result, Err(SpeakerError::Format(_))));
    }

    #[test]
    fn seek_to_end_stops_reads() {
        let bytes = wav_bytes(1, 48000, 4800);
        let mut decoder = SymphoniaCodec.open(bytes, Some("wav")).unwrap();
        let mut buf = vec![0.0; 480];
        assert_eq!(decoder.read_samples(&mut buf).unwrap(), 480);
        decoder.seek_to_end().unwrap();
        assert_eq!(decoder.read_samples(&mut buf).unwrap(), 0);
    }
}
