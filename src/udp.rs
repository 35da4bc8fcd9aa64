use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use log::{debug, warn};

use crate::broadcast::{EndpointId, Listener, ListenerId, ListenerSet, Transport};
use crate::config::PeerConfig;
use crate::error::{Result, SpeakerError};

/// A listener reachable at a fixed address, always considered connected.
pub struct UdpPeer {
    pub id: ListenerId,
    pub addr: SocketAddr,
}

impl Listener for UdpPeer {
    fn id(&self) -> ListenerId {
        self.id
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn is_ready(&self) -> bool {
        true
    }
}

pub struct StaticListeners {
    peers: Vec<UdpPeer>,
}

impl StaticListeners {
    pub fn from_config(peers: &[PeerConfig]) -> Result<StaticListeners> {
        let peers = peers
            .iter()
            .map(|peer| {
                let addr = peer
                    .addr
                    .to_socket_addrs()?
                    .next()
                    .ok_or_else(|| SpeakerError::Config(format!("no address for {}", peer.addr)))?;
                Ok(UdpPeer { id: peer.id, addr })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(StaticListeners { peers })
    }

    pub fn peers(&self) -> &[UdpPeer] {
        &self.peers
    }

    pub fn addresses(&self) -> HashMap<ListenerId, SocketAddr> {
        self.peers.iter().map(|peer| (peer.id, peer.addr)).collect()
    }
}

impl ListenerSet for StaticListeners {
    fn for_each_listener(&self, f: &mut dyn FnMut(&dyn Listener)) {
        for peer in &self.peers {
            f(peer);
        }
    }
}

/// Sends each frame as one datagram: the endpoint id byte, then the payload.
pub struct UdpTransport {
    socket: UdpSocket,
    addresses: HashMap<ListenerId, SocketAddr>,
}

impl UdpTransport {
    pub fn bind(addr: &str, addresses: HashMap<ListenerId, SocketAddr>) -> io::Result<UdpTransport> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        debug!("udp transport bound to {}", socket.local_addr()?);
        Ok(UdpTransport { socket, addresses })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Transport for UdpTransport {
    fn send(&self, listener: &dyn Listener, endpoint: EndpointId, frame: &[u8]) {
        let Some(addr) = self.addresses.get(&listener.id()) else {
            warn!("no address for listener {}", listener.id());
            return;
        };
        let mut packet = Vec::with_capacity(frame.len() + 1);
        packet.push(endpoint.0);
        packet.extend_from_slice(frame);
        if let Err(err) = self.socket.send_to(&packet, addr) {
            // a full socket buffer only costs this frame
            debug!("dropping frame to listener {}: {}", listener.id(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::UdpSocket;
    use std::sync::Arc;
    use std::time::Duration;

    use super::{StaticListeners, UdpTransport};
    use crate::broadcast::{Broadcaster, EndpointId};
    use crate::config::PeerConfig;
    use crate::encoder::Pcm16Encoder;
    use crate::FRAME_SAMPLES;

    #[test]
    fn frames_arrive_tagged_with_the_endpoint() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let peers = [PeerConfig {
            id: 5,
            addr: receiver.local_addr().unwrap().to_string(),
        }];

        let listeners = StaticListeners::from_config(&peers).unwrap();
        let transport = UdpTransport::bind("127.0.0.1:0", listeners.addresses()).unwrap();
        let mut broadcaster = Broadcaster::new(
            EndpointId(9),
            Box::new(Pcm16Encoder),
            Arc::new(listeners),
            Arc::new(transport),
        );

        assert_eq!(broadcaster.broadcast(&[0.5; FRAME_SAMPLES]), 1);

        let mut packet = [0u8; 2048];
        let len = receiver.recv(&mut packet).unwrap();
        assert_eq!(len, 1 + FRAME_SAMPLES * 2);
        assert_eq!(packet[0], 9);
        let first = i16::from_le_bytes([packet[1], packet[2]]);
        assert_eq!(first, (0.5 * 32767.0) as i16);
    }

    #[test]
    fn unresolvable_peers_are_config_errors() {
        let peers = [PeerConfig {
            id: 1,
            addr: "not an address".into(),
        }];
        assert!(StaticListeners::from_config(&peers).is_err());
    }
}
