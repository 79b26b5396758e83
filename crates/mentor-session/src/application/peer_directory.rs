//! PeerDirectory: the clients currently visible on the signaling channel.
//!
//! The directory is a mirror of presence information supplied by the
//! signaling layer.  It is not authoritative about anything else; in
//! particular, a peer listed here has no rights over this client until a
//! control handshake with it reaches `Active`.
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//! presence join  ──►  upsert (online = true)
//! presence leave ──►  remove
//! connection lost ──► clear
//! ```
//!
//! The directory is also the place the session consults to decide whether a
//! message sender is a mentor at all: a `control:request` from a peer that
//! announced itself as a child is ignored.

use std::collections::HashMap;

use mentor_core::{Peer, PeerId, Role};

/// In-memory registry of peers seen on the signaling channel.
///
/// `HashMap` gives O(1) lookup by id; [`PeerDirectory::all`] sorts by display
/// name so the list is stable for the UI.
#[derive(Debug, Default)]
pub struct PeerDirectory {
    peers: HashMap<PeerId, Peer>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or refreshes a peer.
    ///
    /// Returns `true` if the peer was not known before.
    pub fn upsert(&mut self, peer: Peer) -> bool {
        self.peers.insert(peer.id, peer).is_none()
    }

    /// Removes a peer, returning its last known record.
    pub fn remove(&mut self, id: PeerId) -> Option<Peer> {
        self.peers.remove(&id)
    }

    /// Marks a peer offline without forgetting it.
    pub fn set_online(&mut self, id: PeerId, online: bool) {
        if let Some(peer) = self.peers.get_mut(&id) {
            peer.online = online;
        }
    }

    pub fn get(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(&id)
    }

    /// Returns the announced role of `id`, if the peer is known and online.
    pub fn role_of(&self, id: PeerId) -> Option<Role> {
        self.peers.get(&id).filter(|p| p.online).map(|p| p.role)
    }

    /// Returns `true` if `id` is an online peer announced with `role`.
    pub fn is_online_with_role(&self, id: PeerId, role: Role) -> bool {
        self.role_of(id) == Some(role)
    }

    /// Snapshot of every known peer, sorted by display name.
    pub fn all(&self) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self.peers.values().cloned().collect();
        peers.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        peers
    }

    /// Online peers with the given role (e.g. children a mentor may assist).
    pub fn online_with_role(&self, role: Role) -> Vec<Peer> {
        self.all()
            .into_iter()
            .filter(|p| p.online && p.role == role)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Forgets every peer (signaling connection lost or closed).
    pub fn clear(&mut self) {
        self.peers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_starts_empty() {
        assert!(PeerDirectory::new().is_empty());
    }

    #[test]
    fn test_upsert_reports_new_peers_only() {
        // Arrange
        let mut dir = PeerDirectory::new();
        let peer = Peer::new("Sam", Role::Child);

        // Act / Assert
        assert!(dir.upsert(peer.clone()));
        assert!(!dir.upsert(peer));
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_all_is_sorted_by_display_name() {
        let mut dir = PeerDirectory::new();
        dir.upsert(Peer::new("Zoe", Role::Child));
        dir.upsert(Peer::new("Ada", Role::Child));
        dir.upsert(Peer::new("Mo", Role::Mentor));

        let names: Vec<String> = dir.all().into_iter().map(|p| p.display_name).collect();
        assert_eq!(names, vec!["Ada", "Mo", "Zoe"]);
    }

    #[test]
    fn test_offline_peer_has_no_role() {
        let mut dir = PeerDirectory::new();
        let mentor = Peer::new("Mo", Role::Mentor);
        let id = mentor.id;
        dir.upsert(mentor);

        assert!(dir.is_online_with_role(id, Role::Mentor));
        dir.set_online(id, false);
        assert_eq!(dir.role_of(id), None);
        assert!(dir.get(id).is_some(), "offline peers stay listed");
    }

    #[test]
    fn test_online_with_role_filters_children() {
        let mut dir = PeerDirectory::new();
        dir.upsert(Peer::new("Sam", Role::Child));
        dir.upsert(Peer::new("Mo", Role::Mentor));

        let children = dir.online_with_role(Role::Child);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].display_name, "Sam");
    }

    #[test]
    fn test_remove_and_clear() {
        let mut dir = PeerDirectory::new();
        let sam = Peer::new("Sam", Role::Child);
        let id = sam.id;
        dir.upsert(sam);
        dir.upsert(Peer::new("Ada", Role::Child));

        assert_eq!(dir.remove(id).map(|p| p.display_name), Some("Sam".into()));
        assert!(dir.remove(id).is_none());
        dir.clear();
        assert!(dir.is_empty());
    }
}
