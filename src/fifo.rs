use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::ring_buffer::SampleRingBuffer;

struct FifoState {
    samples: VecDeque<f32>,
    ready: bool,
}

/// Intermediate sample queue between the decode task and the tick.
///
/// The decode task is the only producer and parks in `push` while the queue
/// holds at least one read quantum. The tick is the only consumer and wakes
/// the producer whenever it drains samples.
pub struct SampleFifo {
    state: Mutex<FifoState>,
    drained: Notify,
    quantum: usize,
}

impl SampleFifo {
    pub fn new(quantum: usize) -> SampleFifo {
        SampleFifo {
            state: Mutex::new(FifoState {
                samples: VecDeque::with_capacity(quantum * 2),
                ready: false,
            }),
            drained: Notify::new(),
            quantum,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FifoState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn quantum(&self) -> usize {
        self.quantum
    }

    pub fn len(&self) -> usize {
        self.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().samples.is_empty()
    }

    /// Whether the tick may start consuming this session's samples.
    pub fn is_ready(&self) -> bool {
        self.lock().ready
    }

    pub fn mark_ready(&self) {
        self.lock().ready = true;
    }

    /// Drops queued samples and readiness, for a new session.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.samples.clear();
        state.ready = false;
    }

    /// Appends `chunk`, first waiting until fewer than one quantum is queued.
    pub async fn push(&self, chunk: &[f32]) {
        loop {
            {
                let mut state = self.lock();
                if state.samples.len() < self.quantum {
                    state.samples.extend(chunk.iter().copied());
                    return;
                }
                state.ready = true;
            }
            self.drained.notified().await;
        }
    }

    /// Waits until the tick has consumed every queued sample.
    pub async fn wait_drained(&self) {
        loop {
            if self.is_empty() {
                return;
            }
            self.drained.notified().await;
        }
    }

    /// Moves up to `max` samples into `ring`, bounded by what is queued and by
    /// the ring's free space. Returns the number moved.
    pub fn drain_into(&self, max: usize, ring: &mut SampleRingBuffer) -> usize {
        let moved = {
            let mut state = self.lock();
            let count = max.min(state.samples.len()).min(ring.free());
            let (front, back) = state.samples.as_slices();
            let head = count.min(front.len());
            ring.write(&front[..head]);
            ring.write(&back[..count - head]);
            state.samples.drain(..count);
            count
        };
        if moved > 0 {
            self.drained.notify_one();
        }
        moved
    }
}
