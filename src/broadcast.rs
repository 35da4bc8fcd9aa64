use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::encoder::FrameEncoder;

pub type ListenerId = i32;

/// Tag carried by every frame so listeners know which speaker it came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointId(pub u8);

static NEXT_ENDPOINT_ID: AtomicU8 = AtomicU8::new(0);

impl EndpointId {
    /// Allocates the next process-wide id, starting at 1.
    pub fn next() -> EndpointId {
        EndpointId(NEXT_ENDPOINT_ID.fetch_add(1, Ordering::Relaxed).wrapping_add(1))
    }
}

pub trait Listener: Send + Sync {
    fn id(&self) -> ListenerId;

    fn is_connected(&self) -> bool;

    /// Whether the listener's session is fully established.
    fn is_ready(&self) -> bool;
}

/// Read-only view of the listeners known to the host.
pub trait ListenerSet: Send + Sync {
    fn for_each_listener(&self, f: &mut dyn FnMut(&dyn Listener));
}

/// Fire-and-forget frame delivery.
pub trait Transport: Send + Sync {
    fn send(&self, listener: &dyn Listener, endpoint: EndpointId, frame: &[u8]);
}

pub struct Broadcaster {
    endpoint: EndpointId,
    encoder: Box<dyn FrameEncoder>,
    listeners: Arc<dyn ListenerSet>,
    transport: Arc<dyn Transport>,
    allow_list: Vec<ListenerId>,
    encoded: Vec<u8>,
}

impl Broadcaster {
    pub fn new(
        endpoint: EndpointId,
        encoder: Box<dyn FrameEncoder>,
        listeners: Arc<dyn ListenerSet>,
        transport: Arc<dyn Transport>,
    ) -> Broadcaster {
        Broadcaster {
            endpoint,
            encoder,
            listeners,
            transport,
            allow_list: Vec::new(),
            encoded: Vec::with_capacity(512),
        }
    }

    pub fn allow_list(&self) -> &[ListenerId] {
        &self.allow_list
    }

    /// An empty list lets every eligible listener through.
    pub fn set_allow_list(&mut self, allow_list: Vec<ListenerId>) {
        self.allow_list = allow_list;
    }

    /// Encodes one quantum and sends it to every eligible listener.
    /// Returns the number of deliveries attempted.
    pub fn broadcast(&mut self, pcm: &[f32]) -> usize {
        if let Err(err) = self.encoder.encode(pcm, &mut self.encoded) {
            warn!("dropping frame for speaker {}: {}", self.endpoint.0, err);
            return 0;
        }

        let endpoint = self.endpoint;
        let allow_list = &self.allow_list;
        let frame = &self.encoded;
        let transport = &self.transport;
        let mut delivered = 0;
        self.listeners.for_each_listener(&mut |listener: &dyn Listener| {
            if !listener.is_connected() || !listener.is_ready() {
                return;
            }
            if !allow_list.is_empty() && !allow_list.contains(&listener.id()) {
                return;
            }
            transport.send(listener, endpoint, frame);
            delivered += 1;
        });
        delivered
    }
}
