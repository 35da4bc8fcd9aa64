use crate::error::Result;

/// Turns one quantum of PCM into a compressed frame.
pub trait FrameEncoder: Send {
    /// Replaces the contents of `out` with the encoded frame.
    fn encode(&mut self, pcm: &[f32], out: &mut Vec<u8>) -> Result<()>;
}

/// s16le passthrough, for peers that take raw PCM.
#[derive(Default)]
pub struct Pcm16Encoder;

impl FrameEncoder for Pcm16Encoder {
    fn encode(&mut self, pcm: &[f32], out: &mut Vec<u8>) -> Result<()> {
        out.clear();
        out.reserve(pcm.len() * 2);
        for sample in pcm {
            let value = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
            out.extend_from_slice(&value.to_le_bytes());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{FrameEncoder, Pcm16Encoder};
    use crate::FRAME_SAMPLES;

    #[test]
    fn encodes_a_frame_as_s16le() {
        let mut pcm = [0.0; FRAME_SAMPLES];
        pcm[0] = 1.0;
        pcm[1] = -1.0;
        pcm[2] = 2.5;

        let mut out = vec![0xAA; 7];
        Pcm16Encoder.encode(&pcm, &mut out).unwrap();
        assert_eq!(out.len(), FRAME_SAMPLES * 2);
        assert_eq!(i16::from_le_bytes([out[0], out[1]]), 32767);
        assert_eq!(i16::from_le_bytes([out[2], out[3]]), -32767);
        assert_eq!(i16::from_le_bytes([out[4], out[5]]), 32767);
        assert_eq!(i16::from_le_bytes([out[6], out[7]]), 0);
    }
}
