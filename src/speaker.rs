use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;

use log::{error, info, warn};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::audio_source::{self, Fetcher, HttpFetcher};
use crate::broadcast::{Broadcaster, EndpointId, ListenerId, ListenerSet, Transport};
use crate::config::SpeakerConfig;
use crate::decoder::{Codec, SymphoniaCodec, TrackDecoder};
use crate::encoder::{FrameEncoder, Pcm16Encoder};
use crate::error::{Result, SpeakerError};
use crate::fifo::SampleFifo;
use crate::hooks::{Hooks, TrackLoaded};
use crate::playlist::{Continuation, Playlist, QueuePos};
use crate::scheduler::{PlaybackScheduler, TickReport};
use crate::session::{Session, SessionState};
use crate::{READ_QUANTUM, TARGET_CHANNELS, TARGET_SAMPLE_RATE};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Settings {
    volume: f32,
    spatial: bool,
    position: [f32; 3],
    allow_url: bool,
    clear_on_finish: bool,
    allowed_extensions: Vec<String>,
    failure_delay: Duration,
}

struct State {
    session_state: SessionState,
    playlist: Playlist,
    current_track: Option<String>,
    session: Option<Session>,
    is_finished: bool,
    settings: Settings,
    /// Bumped by every accepted `play`; a task holding an older value is stale.
    generation: u64,
}

struct Control {
    stop: AtomicBool,
    halt: AtomicBool,
    should_play: AtomicBool,
    resumed: Notify,
}

struct Inner {
    id: EndpointId,
    state: Mutex<State>,
    control: Control,
    fifo: SampleFifo,
    scheduler: Mutex<PlaybackScheduler>,
    hooks: RwLock<Hooks>,
    codec: Arc<dyn Codec>,
    fetcher: Arc<dyn Fetcher>,
}

#[derive(Serialize, Debug, Clone)]
pub struct SpeakerStatus {
    pub id: EndpointId,
    pub state: SessionState,
    pub current_track: Option<String>,
    pub session: Option<Session>,
    pub playlist: Vec<String>,
    pub is_finished: bool,
    pub should_play: bool,
    pub volume: f32,
    pub spatial: bool,
    pub position: [f32; 3],
    pub looping: bool,
    pub shuffle: bool,
    pub continue_after_finish: bool,
    pub broadcast_to: Vec<ListenerId>,
    pub buffered: usize,
}

/// One audio endpoint: a playlist, a cooperative playback task that decodes
/// into the FIFO, and the tick that turns buffered samples into frames.
pub struct Speaker {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
    runtime: Handle,
}

pub struct SpeakerBuilder {
    config: SpeakerConfig,
    listeners: Arc<dyn ListenerSet>,
    transport: Arc<dyn Transport>,
    codec: Arc<dyn Codec>,
    encoder: Box<dyn FrameEncoder>,
    fetcher: Arc<dyn Fetcher>,
    hooks: Hooks,
    id: Option<EndpointId>,
}

impl SpeakerBuilder {
    pub fn config(mut self, config: SpeakerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn encoder(mut self, encoder: Box<dyn FrameEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn id(mut self, id: EndpointId) -> Self {
        self.id = Some(id);
        self
    }

    /// Must be called from within a tokio runtime; playback tasks are spawned on it.
    pub fn build(self) -> Result<Speaker> {
        let runtime = Handle::try_current().map_err(|_| SpeakerError::NoRuntime)?;
        let id = self.id.unwrap_or_else(EndpointId::next);
        let config = self.config;

        let mut broadcaster = Broadcaster::new(id, self.encoder, self.listeners, self.transport);
        broadcaster.set_allow_list(config.broadcast_to.clone());
        let scheduler = PlaybackScheduler::new(
            config.ring_capacity,
            TARGET_SAMPLE_RATE * TARGET_CHANNELS as u32,
            broadcaster,
        );

        let mut playlist = Playlist::new();
        playlist.looping = config.looping;
        playlist.shuffle = config.shuffle;
        playlist.continue_after_finish = config.continue_after_finish;

        let state = State {
            session_state: SessionState::Idle,
            playlist,
            current_track: None,
            session: None,
            is_finished: false,
            generation: 0,
            settings: Settings {
                volume: config.volume.clamp(0.0, 1.0),
                spatial: config.spatial,
                position: config.position,
                allow_url: config.allow_url,
                clear_on_finish: config.clear_on_finish,
                allowed_extensions: config.allowed_extensions,
                failure_delay: Duration::from_millis(config.failure_delay_ms),
            },
        };

        let inner = Inner {
            id,
            state: Mutex::new(state),
            control: Control {
                stop: AtomicBool::new(false),
                halt: AtomicBool::new(false),
                should_play: AtomicBool::new(config.should_play),
                resumed: Notify::new(),
            },
            fifo: SampleFifo::new(READ_QUANTUM),
            scheduler: Mutex::new(scheduler),
            hooks: RwLock::new(self.hooks),
            codec: self.codec,
            fetcher: self.fetcher,
        };

        info!("speaker {} created", id.0);
        Ok(Speaker {
            inner: Arc::new(inner),
            task: Mutex::new(None),
            runtime,
        })
    }
}

impl Speaker {
    pub fn builder(listeners: Arc<dyn ListenerSet>, transport: Arc<dyn Transport>) -> SpeakerBuilder {
        SpeakerBuilder {
            config: SpeakerConfig::default(),
            listeners,
            transport,
            codec: Arc::new(SymphoniaCodec),
            encoder: Box::new(Pcm16Encoder),
            fetcher: Arc::new(HttpFetcher::default()),
            hooks: Hooks::new(),
            id: None,
        }
    }

    pub fn id(&self) -> EndpointId {
        self.inner.id
    }

    /// Starts playing `position`, cancelling whatever is currently playing.
    pub fn play(&self, position: QueuePos) -> Result<()> {
        let mut task = lock(&self.task);
        let generation = {
            let mut state = lock(&self.inner.state);
            if state.session_state == SessionState::Destroyed {
                return Err(SpeakerError::Destroyed);
            }
            if position.is_direct() && state.current_track.is_none() {
                return Err(SpeakerError::NoCurrentTrack);
            }
            state.playlist.validate(position)?;
            // validated under the same lock that retires the previous task
            state.generation += 1;
            state.generation
        };

        let previous = task.take();
        if let Some(previous) = &previous {
            previous.abort();
        }
        self.inner.control.halt.store(false, Ordering::SeqCst);
        self.inner.reset_buffers();

        let inner = self.inner.clone();
        *task = Some(self.runtime.spawn(run(inner, previous, position, generation)));
        Ok(())
    }

    /// Makes `track` the current track and plays it without touching the playlist.
    pub fn play_direct(&self, track: impl Into<String>) -> Result<()> {
        lock(&self.inner.state).current_track = Some(track.into());
        self.play(QueuePos::Direct)
    }

    /// Fast-forwards the current track to its end. With `clear`, also empties
    /// the playlist and keeps anything from playing afterwards.
    pub fn stop(&self, clear: bool) {
        if clear {
            lock(&self.inner.state).playlist.clear();
            self.inner.control.halt.store(true, Ordering::SeqCst);
        }
        self.inner.control.stop.store(true, Ordering::SeqCst);
    }

    pub fn enqueue(&self, track: impl Into<String>, position: Option<usize>) -> Result<()> {
        lock(&self.inner.state)
            .playlist
            .enqueue(track.into(), position)?;
        Ok(())
    }

    /// Cancels playback for good.
    pub fn destroy(&self) {
        let mut task = lock(&self.task);
        if let Some(task) = task.take() {
            task.abort();
        }
        self.inner.reset_buffers();
        {
            let mut state = lock(&self.inner.state);
            state.generation += 1;
            transition(self.inner.id, &mut state, SessionState::Destroyed);
        }
        info!("speaker {} destroyed", self.inner.id.0);
    }

    /// Host tick: never blocks on the playback task.
    pub fn tick(&self, dt: Duration) -> TickReport {
        if !self.inner.control.should_play.load(Ordering::SeqCst) {
            return TickReport::default();
        }
        lock(&self.inner.scheduler).tick(dt, &self.inner.fifo)
    }

    pub fn with_hooks(&self, f: impl FnOnce(&mut Hooks)) {
        let mut hooks = self.inner.hooks.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut hooks);
    }

    pub fn state(&self) -> SessionState {
        lock(&self.inner.state).session_state
    }

    pub fn is_finished(&self) -> bool {
        lock(&self.inner.state).is_finished
    }

    pub fn current_track(&self) -> Option<String> {
        lock(&self.inner.state).current_track.clone()
    }

    pub fn playlist(&self) -> Vec<String> {
        lock(&self.inner.state).playlist.entries().to_vec()
    }

    /// Samples decoded but not yet moved to the ring buffer.
    pub fn buffered(&self) -> usize {
        self.inner.fifo.len()
    }

    pub fn should_play(&self) -> bool {
        self.inner.control.should_play.load(Ordering::SeqCst)
    }

    /// Pauses or resumes both the tick and the decode task.
    pub fn set_should_play(&self, should_play: bool) {
        self.inner.control.should_play.store(should_play, Ordering::SeqCst);
        if should_play {
            self.inner.control.resumed.notify_one();
        }
    }

    pub fn volume(&self) -> f32 {
        lock(&self.inner.state).settings.volume
    }

    pub fn set_volume(&self, volume: f32) {
        lock(&self.inner.state).settings.volume = volume.clamp(0.0, 1.0);
    }

    pub fn spatial(&self) -> bool {
        lock(&self.inner.state).settings.spatial
    }

    pub fn set_spatial(&self, spatial: bool) {
        lock(&self.inner.state).settings.spatial = spatial;
    }

    pub fn position(&self) -> [f32; 3] {
        lock(&self.inner.state).settings.position
    }

    pub fn set_position(&self, position: [f32; 3]) {
        lock(&self.inner.state).settings.position = position;
    }

    pub fn looping(&self) -> bool {
        lock(&self.inner.state).playlist.looping
    }

    pub fn set_looping(&self, looping: bool) {
        lock(&self.inner.state).playlist.looping = looping;
    }

    pub fn shuffle(&self) -> bool {
        lock(&self.inner.state).playlist.shuffle
    }

    pub fn set_shuffle(&self, shuffle: bool) {
        lock(&self.inner.state).playlist.shuffle = shuffle;
    }

    pub fn continue_after_finish(&self) -> bool {
        lock(&self.inner.state).playlist.continue_after_finish
    }

    pub fn set_continue_after_finish(&self, continue_after_finish: bool) {
        lock(&self.inner.state).playlist.continue_after_finish = continue_after_finish;
    }

    pub fn allow_url(&self) -> bool {
        lock(&self.inner.state).settings.allow_url
    }

    pub fn set_allow_url(&self, allow_url: bool) {
        lock(&self.inner.state).settings.allow_url = allow_url;
    }

    pub fn clear_on_finish(&self) -> bool {
        lock(&self.inner.state).settings.clear_on_finish
    }

    pub fn set_clear_on_finish(&self, clear_on_finish: bool) {
        lock(&self.inner.state).settings.clear_on_finish = clear_on_finish;
    }

    pub fn broadcast_to(&self) -> Vec<ListenerId> {
        lock(&self.inner.scheduler).broadcaster().allow_list().to_vec()
    }

    pub fn set_broadcast_to(&self, listeners: Vec<ListenerId>) {
        lock(&self.inner.scheduler)
            .broadcaster_mut()
            .set_allow_list(listeners);
    }

    pub fn status(&self) -> SpeakerStatus {
        let broadcast_to = self.broadcast_to();
        let buffered = self.buffered();
        let state = lock(&self.inner.state);
        SpeakerStatus {
            id: self.inner.id,
            state: state.session_state,
            current_track: state.current_track.clone(),
            session: state.session.clone(),
            playlist: state.playlist.entries().to_vec(),
            is_finished: state.is_finished,
            should_play: self.should_play(),
            volume: state.settings.volume,
            spatial: state.settings.spatial,
            position: state.settings.position,
            looping: state.playlist.looping,
            shuffle: state.playlist.shuffle,
            continue_after_finish: state.playlist.continue_after_finish,
            broadcast_to,
            buffered,
        }
    }
}

impl Drop for Speaker {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }
}

/// The cooperative playback task: plays tracks until the queue policy says stop.
async fn run(
    inner: Arc<Inner>,
    previous: Option<JoinHandle<()>>,
    mut request: QueuePos,
    generation: u64,
) {
    if let Some(previous) = previous {
        // an aborted task resolves once its future (and its decoder) is dropped
        let _ = previous.await;
        inner.reset_buffers();
    }

    loop {
        match inner.play_track(request, generation).await {
            Ok(None) => return,
            Ok(Some(Continuation::Play(next))) => request = next,
            Ok(Some(Continuation::Stop)) => {
                inner.finish(generation);
                return;
            }
            Err(err) if err.is_track_failure() => {
                error!("speaker {}: {}", inner.id.0, err);
                inner.set_state(SessionState::Finishing);
                let delay = lock(&inner.state).settings.failure_delay;
                tokio::time::sleep(delay).await;
                let halted = inner.control.halt.load(Ordering::SeqCst);
                if halted || lock(&inner.state).playlist.is_empty() {
                    inner.finish(generation);
                    return;
                }
                request = QueuePos::Index(0);
            }
            Err(err) => {
                error!("speaker {}: cannot play {:?}: {}", inner.id.0, request, err);
                inner.settle(generation, SessionState::Idle);
                return;
            }
        }
    }
}

fn transition(id: EndpointId, state: &mut State, next: SessionState) {
    if !state.session_state.can_transition_to(next) {
        warn!(
            "speaker {}: unexpected transition {:?} -> {:?}",
            id.0, state.session_state, next
        );
    }
    state.session_state = next;
}

impl Inner {
    fn hooks(&self) -> RwLockReadGuard<'_, Hooks> {
        self.hooks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: SessionState) {
        transition(self.id, &mut lock(&self.state), next);
    }

    /// Final state of a task's run; a stale task leaves the speaker alone.
    fn settle(&self, generation: u64, next: SessionState) {
        let mut state = lock(&self.state);
        if state.generation != generation {
            return;
        }
        self.control.halt.store(false, Ordering::SeqCst);
        transition(self.id, &mut state, next);
    }

    fn reset_buffers(&self) {
        self.fifo.reset();
        lock(&self.scheduler).reset();
    }

    /// Terminal completion: back to idle, or gone when clear-on-finish is set.
    fn finish(&self, generation: u64) {
        let clear_on_finish = lock(&self.state).settings.clear_on_finish;
        if clear_on_finish {
            self.settle(generation, SessionState::Destroyed);
            info!("speaker {} finished its queue and was cleared", self.id.0);
        } else {
            self.settle(generation, SessionState::Idle);
        }
    }

    /// Plays one track. `None` means a newer `play` has taken over.
    async fn play_track(&self, request: QueuePos, generation: u64) -> Result<Option<Continuation>> {
        self.control.stop.store(false, Ordering::SeqCst);
        self.fifo.reset();
        {
            let mut state = lock(&self.state);
            state.is_finished = false;
            state.session = None;
        }

        self.set_state(SessionState::Selecting);
        let (selection, allow_url, allowed_extensions) = {
            let hooks = self.hooks();
            let mut state = lock(&self.state);
            if state.generation != generation {
                return Ok(None);
            }
            let current = state.current_track.clone();
            let selection =
                state
                    .playlist
                    .select_next(request, current.as_deref(), &hooks, self.id)?;
            state.current_track = Some(selection.track.clone());
            (
                selection,
                state.settings.allow_url,
                state.settings.allowed_extensions.clone(),
            )
        };
        info!("speaker {}: loading {}", self.id.0, selection.track);

        self.set_state(SessionState::Acquiring);
        let resolved = audio_source::resolve(
            &selection.track,
            allow_url,
            &allowed_extensions,
            self.fetcher.as_ref(),
        )
        .await?;

        self.set_state(SessionState::Validating);
        let mut decoder = self
            .codec
            .open(resolved.bytes, resolved.extension.as_deref())?;
        let session = Session::validate(&selection, decoder.as_ref())?;
        lock(&self.state).session = Some(session.clone());

        self.hooks().track_loaded(&TrackLoaded {
            endpoint: self.id,
            direct_play: session.direct_play,
            position: session.position,
            track: &session.track,
        });
        info!(
            "speaker {}: playing {} with sample rate {}",
            self.id.0, session.track, session.sample_rate
        );

        self.set_state(SessionState::Streaming);
        self.stream(decoder.as_mut()).await?;
        drop(decoder);

        self.set_state(SessionState::Finishing);
        info!("speaker {}: track complete", self.id.0);
        let halted = self.control.halt.swap(false, Ordering::SeqCst);
        let hooks = self.hooks();
        let mut state = lock(&self.state);
        state.is_finished = true;
        state.session = None;
        Ok(Some(state.playlist.on_track_finished(
            &session.track,
            session.direct_play,
            halted,
            &hooks,
            self.id,
        )))
    }

    /// Decodes into the FIFO one read quantum at a time, then waits for the
    /// tick to consume the tail of the track.
    async fn stream(&self, decoder: &mut dyn TrackDecoder) -> Result<()> {
        let mut read_buffer = vec![0.0; READ_QUANTUM];
        loop {
            if self.control.stop.swap(false, Ordering::SeqCst) {
                info!("speaker {}: stopping track", self.id.0);
                decoder.seek_to_end()?;
            }
            self.wait_until_playing().await;

            let count = decoder.read_samples(&mut read_buffer)?;
            if count == 0 {
                break;
            }
            self.fifo.push(&read_buffer[..count]).await;
        }

        // tracks shorter than a quantum never engage backpressure
        self.fifo.mark_ready();
        self.fifo.wait_drained().await;
        Ok(())
    }

    async fn wait_until_playing(&self) {
        loop {
            if self.control.should_play.load(Ordering::SeqCst) {
                return;
            }
            self.control.resumed.notified().await;
        }
    }
}
