//! In-process signaling hub.
//!
//! Every [`LoopbackSignaling`] endpoint created from one [`LoopbackHub`]
//! shares its rooms.  Envelopes are serialized to JSON text and parsed again
//! on delivery, so the wire codec is exercised exactly as with a real relay.
//!
//! [`LoopbackHub::drop_peer`] simulates an abrupt network loss: the dropped
//! client hears `ConnectionLost`, everyone else hears `PresenceLeave`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mentor_core::{Envelope, Peer, PeerId};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::application::session_facade::{SignalingError, SignalingEvent, SignalingPort};

/// Per-subscriber queue depth.
const CHANNEL_CAPACITY: usize = 256;

struct Member {
    peer: Peer,
    tx: mpsc::Sender<SignalingEvent>,
}

/// Shared state of all loopback endpoints.
#[derive(Default)]
pub struct LoopbackHub {
    rooms: Mutex<HashMap<String, HashMap<PeerId, Member>>>,
}

impl LoopbackHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates a new client endpoint on this hub.
    pub fn endpoint(self: &Arc<Self>) -> LoopbackSignaling {
        LoopbackSignaling {
            hub: Arc::clone(self),
            membership: Mutex::new(None),
        }
    }

    /// Peers currently in `room`.
    pub async fn members(&self, room: &str) -> Vec<Peer> {
        let rooms = self.rooms.lock().await;
        rooms
            .get(room)
            .map(|m| m.values().map(|member| member.peer.clone()).collect())
            .unwrap_or_default()
    }

    /// Cuts `peer_id` off without a graceful leave.
    pub async fn drop_peer(&self, peer_id: PeerId) {
        let mut notify = Vec::new();
        {
            let mut rooms = self.rooms.lock().await;
            for members in rooms.values_mut() {
                if let Some(dropped) = members.remove(&peer_id) {
                    notify.push((dropped.tx, SignalingEvent::ConnectionLost));
                    for other in members.values() {
                        notify.push((other.tx.clone(), SignalingEvent::PresenceLeave { peer_id }));
                    }
                }
            }
        }
        warn!(%peer_id, "loopback peer dropped");
        deliver(notify).await;
    }

    async fn join(&self, room: &str, me: Peer) -> mpsc::Receiver<SignalingEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut notify = Vec::new();
        {
            let mut rooms = self.rooms.lock().await;
            let members = rooms.entry(room.to_string()).or_default();
            for other in members.values() {
                notify.push((tx.clone(), SignalingEvent::PresenceJoin(other.peer.clone())));
                notify.push((other.tx.clone(), SignalingEvent::PresenceJoin(me.clone())));
            }
            members.insert(me.id, Member { peer: me, tx });
        }
        deliver(notify).await;
        rx
    }

    async fn leave(&self, room: &str, peer_id: PeerId) {
        let mut notify = Vec::new();
        {
            let mut rooms = self.rooms.lock().await;
            if let Some(members) = rooms.get_mut(room) {
                if members.remove(&peer_id).is_some() {
                    for other in members.values() {
                        notify.push((other.tx.clone(), SignalingEvent::PresenceLeave { peer_id }));
                    }
                }
            }
        }
        deliver(notify).await;
    }

    async fn route(&self, room: &str, text: String) -> Result<(), SignalingError> {
        let envelope = Envelope::from_json(&text).map_err(|e| SignalingError::Closed(e.to_string()))?;
        let targets: Vec<mpsc::Sender<SignalingEvent>> = {
            let rooms = self.rooms.lock().await;
            let members = rooms.get(room).ok_or(SignalingError::NotConnected)?;
            if !members.contains_key(&envelope.from) {
                return Err(SignalingError::NotConnected);
            }
            members
                .values()
                .filter(|m| envelope.is_for(m.peer.id))
                .map(|m| m.tx.clone())
                .collect()
        };
        let notify = targets
            .into_iter()
            .map(|tx| (tx, SignalingEvent::Message(envelope.clone())))
            .collect();
        deliver(notify).await;
        Ok(())
    }
}

async fn deliver(notify: Vec<(mpsc::Sender<SignalingEvent>, SignalingEvent)>) {
    for (tx, event) in notify {
        if tx.send(event).await.is_err() {
            debug!("loopback subscriber gone, event discarded");
        }
    }
}

/// One client's connection to a [`LoopbackHub`].
pub struct LoopbackSignaling {
    hub: Arc<LoopbackHub>,
    membership: Mutex<Option<(String, PeerId)>>,
}

#[async_trait]
impl SignalingPort for LoopbackSignaling {
    async fn connect(
        &self,
        room: &str,
        me: Peer,
    ) -> Result<mpsc::Receiver<SignalingEvent>, SignalingError> {
        let mut membership = self.membership.lock().await;
        if let Some((current, _)) = membership.as_ref() {
            return Err(SignalingError::AlreadyConnected(current.clone()));
        }
        *membership = Some((room.to_string(), me.id));
        Ok(self.hub.join(room, me).await)
    }

    async fn publish(&self, envelope: Envelope) -> Result<(), SignalingError> {
        let room = match self.membership.lock().await.as_ref() {
            Some((room, _)) => room.clone(),
            None => return Err(SignalingError::NotConnected),
        };
        let text = envelope
            .to_json()
            .map_err(|e| SignalingError::Closed(e.to_string()))?;
        self.hub.route(&room, text).await
    }

    async fn disconnect(&self) -> Result<(), SignalingError> {
        if let Some((room, id)) = self.membership.lock().await.take() {
            self.hub.leave(&room, id).await;
        }
        Ok(())
    }
}
