//! Extension points around track selection and completion.
//!
//! Each list runs in registration order. A hook returning `Some` replaces the
//! value the following hooks (and the caller) see.

use crate::broadcast::EndpointId;
use crate::playlist::{Continuation, QueuePos};

pub struct TrackSelecting {
    pub endpoint: EndpointId,
    /// Whether the original request was a direct play.
    pub direct_play: bool,
    pub position: QueuePos,
}

pub struct TrackSelected<'a> {
    pub endpoint: EndpointId,
    pub direct_play: bool,
    pub position: QueuePos,
    pub track: &'a str,
}

pub struct TrackLoaded<'a> {
    pub endpoint: EndpointId,
    pub direct_play: bool,
    pub position: QueuePos,
    pub track: &'a str,
}

pub struct TrackFinished<'a> {
    pub endpoint: EndpointId,
    pub track: &'a str,
    pub direct_play: bool,
    pub next: Continuation,
}

type SelectingHook = Box<dyn Fn(&TrackSelecting) -> Option<QueuePos> + Send + Sync>;
type SelectedHook = Box<dyn Fn(&TrackSelected) -> Option<String> + Send + Sync>;
type LoadedHook = Box<dyn Fn(&TrackLoaded) + Send + Sync>;
type FinishedHook = Box<dyn Fn(&TrackFinished) -> Option<Continuation> + Send + Sync>;

/// Hooks run while the speaker's playlist is locked; they must not call back
/// into the speaker.
#[derive(Default)]
pub struct Hooks {
    selecting: Vec<SelectingHook>,
    selected: Vec<SelectedHook>,
    loaded: Vec<LoadedHook>,
    finished: Vec<FinishedHook>,
}

impl Hooks {
    pub fn new() -> Self {
        Hooks::default()
    }

    pub fn on_track_selecting(
        &mut self,
        hook: impl Fn(&TrackSelecting) -> Option<QueuePos> + Send + Sync + 'static,
    ) -> &mut Self {
        self.selecting.push(Box::new(hook));
        self
    }

    pub fn on_track_selected(
        &mut self,
        hook: impl Fn(&TrackSelected) -> Option<String> + Send + Sync + 'static,
    ) -> &mut Self {
        self.selected.push(Box::new(hook));
        self
    }

    pub fn on_track_loaded(&mut self, hook: impl Fn(&TrackLoaded) + Send + Sync + 'static) -> &mut Self {
        self.loaded.push(Box::new(hook));
        self
    }

    pub fn on_track_finished(
        &mut self,
        hook: impl Fn(&TrackFinished) -> Option<Continuation> + Send + Sync + 'static,
    ) -> &mut Self {
        self.finished.push(Box::new(hook));
        self
    }

    pub(crate) fn track_selecting(&self, mut event: TrackSelecting) -> QueuePos {
        for hook in &self.selecting {
            if let Some(position) = hook(&event) {
                event.position = position;
            }
        }
        event.position
    }

    pub(crate) fn track_selected(
        &self,
        endpoint: EndpointId,
        direct_play: bool,
        position: QueuePos,
        mut track: String,
    ) -> String {
        for hook in &self.selected {
            let replaced = hook(&TrackSelected {
                endpoint,
                direct_play,
                position,
                track: &track,
            });
            if let Some(replacement) = replaced {
                track = replacement;
            }
        }
        track
    }

    pub(crate) fn track_loaded(&self, event: &TrackLoaded) {
        for hook in &self.loaded {
            hook(event);
        }
    }

    pub(crate) fn track_finished(&self, mut event: TrackFinished) -> Continuation {
        for hook in &self.finished {
            if let Some(next) = hook(&event) {
                event.next = next;
            }
        }
        event.next
    }
}
