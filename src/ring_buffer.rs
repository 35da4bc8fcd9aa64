use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;

/// Fixed-capacity circular buffer of PCM samples.
///
/// Writes never overwrite unread samples: `write` stores as many samples as
/// there is free space for and reports how many it took.
pub struct SampleRingBuffer {
    samples: HeapRb<f32>,
    written: u64,
}

impl SampleRingBuffer {
    pub fn new(capacity: usize) -> SampleRingBuffer {
        SampleRingBuffer {
            samples: HeapRb::new(capacity.max(1)),
            written: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.samples.capacity().get()
    }

    /// Samples available to read.
    pub fn len(&self) -> usize {
        self.samples.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn free(&self) -> usize {
        self.samples.vacant_len()
    }

    /// Total samples accepted since creation or the last `clear`.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn write(&mut self, data: &[f32]) -> usize {
        let count = self.samples.push_slice(data);
        self.written += count as u64;
        count
    }

    /// Copies up to `out.len()` samples into `out`, advancing the read cursor.
    pub fn read_to(&mut self, out: &mut [f32]) -> usize {
        self.samples.pop_slice(out)
    }

    pub fn clear(&mut self) {
        Consumer::clear(&mut self.samples);
        self.written = 0;
    }
}
