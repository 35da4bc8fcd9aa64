use std::time::Duration;

use log::debug;

use crate::broadcast::Broadcaster;
use crate::fifo::SampleFifo;
use crate::ring_buffer::SampleRingBuffer;
use crate::FRAME_SAMPLES;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Samples the FIFO held when the tick started; bounds `transferred`.
    pub available: usize,
    /// Samples moved from the FIFO into the ring buffer.
    pub transferred: usize,
    /// Frames encoded and handed to the broadcaster.
    pub frames: usize,
}

/// Per-tick consumer: turns elapsed time into a sample budget, moves that many
/// samples out of the FIFO and emits every full frame the ring buffer holds.
pub struct PlaybackScheduler {
    ring: SampleRingBuffer,
    broadcaster: Broadcaster,
    budget: f64,
    samples_per_second: u32,
    send_buffer: Box<[f32]>,
}

impl PlaybackScheduler {
    pub fn new(
        ring_capacity: usize,
        samples_per_second: u32,
        broadcaster: Broadcaster,
    ) -> PlaybackScheduler {
        PlaybackScheduler {
            ring: SampleRingBuffer::new(ring_capacity.max(FRAME_SAMPLES)),
            broadcaster,
            budget: 0.0,
            samples_per_second,
            send_buffer: vec![0.0; FRAME_SAMPLES].into_boxed_slice(),
        }
    }

    pub fn budget(&self) -> f64 {
        self.budget
    }

    pub fn ring(&self) -> &SampleRingBuffer {
        &self.ring
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn broadcaster_mut(&mut self) -> &mut Broadcaster {
        &mut self.broadcaster
    }

    pub fn reset(&mut self) {
        self.ring.clear();
        self.budget = 0.0;
    }

    /// Does nothing until the FIFO is ready and holds samples, so a starved or
    /// idle pipeline does not build up a backlog of owed samples.
    pub fn tick(&mut self, dt: Duration, fifo: &SampleFifo) -> TickReport {
        let mut report = TickReport::default();
        if !fifo.is_ready() {
            return report;
        }
        report.available = fifo.len();
        if report.available == 0 {
            return report;
        }

        self.budget += dt.as_secs_f64() * self.samples_per_second as f64;
        // the producer may refill between rounds; only what was queued at the start counts
        while report.transferred < report.available {
            let owed = (self.budget.floor() as usize).min(report.available - report.transferred);
            let moved = fifo.drain_into(owed, &mut self.ring);
            self.budget -= moved as f64;
            report.transferred += moved;
            report.frames += self.emit_frames();
            if moved == 0 {
                break;
            }
        }

        debug!(
            "tick {:?}: moved {} frames {} budget {:.2} fifo {} ring {} written {}",
            dt,
            report.transferred,
            report.frames,
            self.budget,
            fifo.len(),
            self.ring.len(),
            self.ring.written()
        );
        report
    }

    fn emit_frames(&mut self) -> usize {
        let mut frames = 0;
        while self.ring.len() >= FRAME_SAMPLES {
            self.ring.read_to(&mut self.send_buffer);
            self.broadcaster.broadcast(&self.send_buffer);
            frames += 1;
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::PlaybackScheduler;
    use crate::broadcast::tests::{FakeListeners, RecordingTransport};
    use crate::broadcast::{Broadcaster, EndpointId};
    use crate::encoder::Pcm16Encoder;
    use crate::fifo::SampleFifo;
    use crate::{FRAME_SAMPLES, TARGET_SAMPLE_RATE};

    fn scheduler(ring_capacity: usize) -> (PlaybackScheduler, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let broadcaster = Broadcaster::new(
            EndpointId(1),
            Box::new(Pcm16Encoder),
            Arc::new(FakeListeners::ready(&[1])),
            transport.clone(),
        );
        (
            PlaybackScheduler::new(ring_capacity, TARGET_SAMPLE_RATE, broadcaster),
            transport,
        )
    }

    fn ready_fifo(samples: usize) -> SampleFifo {
        let fifo = SampleFifo::new(samples + 1);
        futures::executor::block_on(fifo.push(&vec![0.1; samples]));
        fifo.mark_ready();
        fifo
    }

    #[test]
    fn ten_milliseconds_is_one_frame() {
        let (mut scheduler, transport) = scheduler(48000);
        let fifo = ready_fifo(2000);

        let report = scheduler.tick(Duration::from_millis(10), &fifo);
        assert_eq!(report.transferred, FRAME_SAMPLES);
        assert_eq!(report.frames, 1);
        assert_eq!(scheduler.budget(), 0.0);
        assert_eq!(fifo.len(), 2000 - FRAME_SAMPLES);
        assert_eq!(transport.frames_to(1), 1);
    }

    #[test]
    fn fractional_budget_carries_between_ticks() {
        let (mut scheduler, _) = scheduler(48000);
        let fifo = ready_fifo(20000);

        let mut frames = 0;
        let mut transferred = 0;
        for _ in 0..15 {
            let before = scheduler.budget();
            let dt = Duration::from_micros(15_300);
            let owed = before + dt.as_secs_f64() * TARGET_SAMPLE_RATE as f64;
            let report = scheduler.tick(dt, &fifo);

            assert!(report.transferred as f64 <= owed.floor());
            assert!((scheduler.budget() - (owed - report.transferred as f64)).abs() < 1e-6);
            assert!(scheduler.budget() >= 0.0 && scheduler.budget() < 1.0);
            frames += report.frames;
            transferred += report.transferred;
        }
        // 15 ticks of 734.4 samples each
        assert!(transferred == 11015 || transferred == 11016);
        assert_eq!(frames, 22);
        assert_eq!(scheduler.ring().len(), transferred - frames * FRAME_SAMPLES);
    }

    #[test]
    fn transfer_is_capped_by_what_the_fifo_holds() {
        let (mut scheduler, transport) = scheduler(48000);
        let fifo = ready_fifo(100);

        let report = scheduler.tick(Duration::from_millis(10), &fifo);
        assert_eq!(report.transferred, 100);
        assert_eq!(report.frames, 0);
        assert_eq!(scheduler.budget(), 380.0);
        assert_eq!(scheduler.ring().len(), 100);
        assert_eq!(transport.frames_to(1), 0);
    }

    #[test]
    fn waits_for_readiness() {
        let (mut scheduler, _) = scheduler(48000);
        let fifo = SampleFifo::new(4096);
        futures::executor::block_on(fifo.push(&[0.1; 1000]));

        let report = scheduler.tick(Duration::from_millis(50), &fifo);
        assert_eq!(report.transferred, 0);
        assert_eq!(scheduler.budget(), 0.0);
        assert_eq!(fifo.len(), 1000);
    }

    #[test]
    fn long_tick_never_overruns_a_small_ring() {
        let (mut scheduler, transport) = scheduler(960);
        let fifo = ready_fifo(5000);

        let report = scheduler.tick(Duration::from_secs(1), &fifo);
        assert_eq!(report.transferred, 5000);
        assert_eq!(report.frames, 10);
        assert_eq!(scheduler.ring().len(), 200);
        assert_eq!(scheduler.budget(), 43000.0);
        assert_eq!(transport.frames_to(1), 10);
    }

    #[test]
    fn concurrent_producer_never_inflates_a_tick() {
        let (mut scheduler, _) = scheduler(48000);
        let fifo = Arc::new(SampleFifo::new(960));
        fifo.mark_ready();

        let producer = {
            let fifo = fifo.clone();
            std::thread::spawn(move || {
                for _ in 0..400 {
                    futures::executor::block_on(fifo.push(&[0.1; FRAME_SAMPLES]));
                }
            })
        };

        let mut transferred = 0;
        for _ in 0..1_000_000 {
            let report = scheduler.tick(Duration::from_secs(1), &fifo);
            assert!(report.transferred <= report.available);
            transferred += report.transferred;
            if producer.is_finished() && fifo.is_empty() {
                break;
            }
            std::thread::yield_now();
        }
        producer.join().unwrap();
        transferred += scheduler.tick(Duration::from_secs(1), &fifo).transferred;
        assert_eq!(transferred, 400 * FRAME_SAMPLES);
    }

    #[test]
    fn reset_drops_ring_and_budget() {
        let (mut scheduler, _) = scheduler(48000);
        let fifo = ready_fifo(100);
        scheduler.tick(Duration::from_millis(10), &fifo);
        scheduler.reset();
        assert_eq!(scheduler.budget(), 0.0);
        assert!(scheduler.ring().is_empty());
    }
}
