//! Test tones standing in for real containers.

use std::f32::consts::PI;
use std::io::Cursor;

use crate::decoder::{Codec, TrackDecoder};
use crate::error::Result;

pub struct SineDecoder {
    pub freq: f32,
    channels: usize,
    sample_rate: u32,
    total: usize,
    position: usize,
}

impl SineDecoder {
    pub fn new(channels: usize, sample_rate: u32, total: usize) -> SineDecoder {
        SineDecoder {
            freq: 440.0,
            channels,
            sample_rate,
            total,
            position: 0,
        }
    }
}

impl TrackDecoder for SineDecoder {
    fn channels(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_samples(&mut self, buf: &mut [f32]) -> Result<usize> {
        let count = buf.len().min(self.total - self.position);
        sine_wave(self.freq, self.sample_rate, self.position, &mut buf[..count]);
        self.position += count;
        Ok(count)
    }

    fn seek_to_end(&mut self) -> Result<()> {
        self.position = self.total;
        Ok(())
    }
}

/// Opens every track as a tone of the configured shape, ignoring the bytes.
pub struct SineCodec {
    pub channels: usize,
    pub sample_rate: u32,
    pub samples: usize,
}

impl SineCodec {
    pub fn mono(samples: usize) -> SineCodec {
        SineCodec {
            channels: 1,
            sample_rate: 48000,
            samples,
        }
    }
}

impl Codec for SineCodec {
    fn open(&self, _bytes: Vec<u8>, _extension: Option<&str>) -> Result<Box<dyn TrackDecoder>> {
        Ok(Box::new(SineDecoder::new(
            self.channels,
            self.sample_rate,
            self.samples,
        )))
    }
}

fn sine_wave(freq: f32, sample_rate: u32, offset: usize, out: &mut [f32]) {
    let amplitude = 0.1;
    for (i, sample) in out.iter_mut().enumerate() {
        let t = (i + offset) as f32 / sample_rate as f32;
        *sample = amplitude * (2.0 * PI * freq * t).sin();
    }
}

/// 16-bit PCM WAV bytes holding `frames` frames of a tone.
pub fn wav_bytes(channels: u16, sample_rate: u32, frames: usize) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut tone = vec![0.0; frames];
    sine_wave(440.0, sample_rate, 1, &mut tone);

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for sample in tone {
            for _ in 0..channels {
                writer
                    .write_sample((sample * i16::MAX as f32) as i16)
                    .unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}
