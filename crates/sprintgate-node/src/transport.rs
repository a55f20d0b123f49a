//! Peer transport and the simulated radio medium.
//!
//! A [`Transport`] carries one [`Message`] to the configured peer. Frames
//! arriving for this unit enter through its [`Inbox`], which decodes them
//! into the input queue. [`RadioMedium`] connects simulated units: it looks
//! up the destination by hardware address and loses frames with a seeded,
//! reproducible probability.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sprintgate_core::{wire, Event, MacAddr, Message};
use tracing::{trace, warn};

use crate::router::Router;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("peer {0} is not reachable")]
    PeerUnreachable(MacAddr),

    #[error("frame lost in transit")]
    Dropped,

    #[error("transport closed")]
    Closed,
}

pub trait Transport: Send {
    fn send(&mut self, message: &Message) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        (**self).send(message)
    }
}

/// Receive path of a unit.
#[derive(Debug, Clone)]
pub struct Inbox {
    router: Router,
}

impl Inbox {
    /// Inbox feeding frames into `router`'s input queue.
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    /// Decode a received frame into the input queue. Malformed frames are
    /// logged and discarded.
    pub fn deliver(&self, frame: &[u8]) -> bool {
        match wire::decode(frame) {
            Ok(message) => {
                trace!(event = %message.event, time = message.time, "frame received");
                self.router.to_machine(message)
            }
            Err(e) => {
                warn!(error = %e, "discarding malformed frame");
                false
            }
        }
    }

    /// Report that an outbound frame could not be delivered.
    pub fn send_failed(&self) {
        self.router.to_machine(Message::new(Event::SendError));
    }
}

// ── Simulated medium ─────────────────────────────────────────────────

#[derive(Debug)]
struct Air {
    stations: HashMap<MacAddr, Inbox>,
    rng: ChaCha8Rng,
    loss: f64,
    closed: bool,
}

/// Shared broadcast domain for simulated units.
#[derive(Debug, Clone)]
pub struct RadioMedium {
    air: Arc<Mutex<Air>>,
}

impl RadioMedium {
    /// `loss` is the probability that any single frame is lost.
    pub fn new(seed: u64, loss: f64) -> Self {
        Self {
            air: Arc::new(Mutex::new(Air {
                stations: HashMap::new(),
                rng: ChaCha8Rng::seed_from_u64(seed),
                loss: loss.clamp(0.0, 1.0),
                closed: false,
            })),
        }
    }

    pub fn register(&self, address: MacAddr, inbox: Inbox) {
        self.air.lock().stations.insert(address, inbox);
    }

    pub fn unregister(&self, address: MacAddr) {
        self.air.lock().stations.remove(&address);
    }

    pub fn set_loss(&self, loss: f64) {
        self.air.lock().loss = loss.clamp(0.0, 1.0);
    }

    /// Every later send fails with [`TransportError::Closed`].
    pub fn close(&self) {
        self.air.lock().closed = true;
    }

    /// Endpoint for `address` that sends to `peer`.
    pub fn link(&self, address: MacAddr, peer: MacAddr) -> RadioLink {
        RadioLink {
            medium: self.clone(),
            address,
            peer,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RadioLink {
    medium: RadioMedium,
    address: MacAddr,
    peer: MacAddr,
}

impl RadioLink {
    /// Local station address.
    pub fn address(&self) -> MacAddr {
        self.address
    }

    /// Address every frame is sent to.
    pub fn peer(&self) -> MacAddr {
        self.peer
    }
}

impl Transport for RadioLink {
    fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        let frame = wire::encode(message);
        let inbox = {
            let mut air = self.medium.air.lock();
            if air.closed {
                return Err(TransportError::Closed);
            }
            let inbox = air
                .stations
                .get(&self.peer)
                .cloned()
                .ok_or(TransportError::PeerUnreachable(self.peer))?;
            let loss = air.loss;
            if loss > 0.0 && air.rng.gen_bool(loss) {
                return Err(TransportError::Dropped);
            }
            inbox
        };
        trace!(from = %self.address, to = %self.peer, event = %message.event, "frame sent");
        // Delivery happens outside the lock; a full receive queue is the
        // receiver's overflow, not a send failure.
        inbox.deliver(&frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprintgate_core::config::RouterConfig;

    const A: MacAddr = MacAddr([2, 0, 0, 0, 0, 1]);
    const B: MacAddr = MacAddr([2, 0, 0, 0, 0, 2]);

    #[test]
    fn test_link_delivers_to_peer_inbox() {
        let medium = RadioMedium::new(1, 0.0);
        let (router, rx) = Router::new(&RouterConfig::default());
        medium.register(B, Inbox::new(router));
        let mut link = medium.link(A, B);
        link.send(&Message::with_time(Event::MessageFinish, 4_000))
            .unwrap();
        assert_eq!(
            rx.input.try_recv().ok(),
            Some(Message::with_time(Event::MessageFinish, 4_000))
        );
    }

    #[test]
    fn test_unknown_peer_is_unreachable() {
        let medium = RadioMedium::new(1, 0.0);
        let mut link = medium.link(A, B);
        assert!(matches!(
            link.send(&Message::new(Event::MessageInit)),
            Err(TransportError::PeerUnreachable(addr)) if addr == B
        ));
    }

    #[test]
    fn test_full_loss_drops_every_frame() {
        let medium = RadioMedium::new(7, 1.0);
        let (router, _rx) = Router::new(&RouterConfig::default());
        medium.register(B, Inbox::new(router));
        let mut link = medium.link(A, B);
        for _ in 0..5 {
            assert!(matches!(
                link.send(&Message::new(Event::MessageInit)),
                Err(TransportError::Dropped)
            ));
        }
    }

    #[test]
    fn test_malformed_frame_is_discarded() {
        let (router, rx) = Router::new(&RouterConfig::default());
        let inbox = Inbox::new(router);
        assert!(!inbox.deliver(&[1, 2, 3]));
        assert!(!inbox.deliver(&[0xee, 0, 0, 0, 0, 0, 0, 0]));
        assert!(rx.input.try_recv().is_err());
    }
}
