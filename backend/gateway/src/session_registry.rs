//! Session Registry.
//!
//! Tracks logical sessions (one per `(name, zone)` pair), the zones that
//! group them, and the transports currently bound to each session. All
//! outbound traffic is routed through [`SessionRegistry::deliver`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use lisa_core::{Destinations, SessionId, ZoneId};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::protocol::{OutboundFrame, ServerCommand, ServerMessage};

/// Zone name reserved for broadcast addressing.
pub const ALL_ZONE: &str = "all";

pub type FrameSender = mpsc::UnboundedSender<OutboundFrame>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("zone name '{0}' is reserved")]
    ReservedZone(String),
    #[error("session name must not be empty")]
    EmptyName,
}

/// Identity of one logical client session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    pub zone: String,
    pub zone_id: ZoneId,
}

#[derive(Debug, Clone)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    pub members: HashSet<SessionId>,
}

/// One live connection's outbound side.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    id: Uuid,
    tx: FrameSender,
}

impl TransportHandle {
    pub fn new(tx: FrameSender) -> Self {
        Self { id: Uuid::new_v4(), tx }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue a frame; false when the connection is gone.
    pub fn send(&self, frame: OutboundFrame) -> bool {
        self.tx.send(frame).is_ok()
    }
}

struct SessionEntry {
    session: Session,
    transports: HashMap<Uuid, TransportHandle>,
}

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<SessionId, SessionEntry>,
    by_key: HashMap<(String, String), SessionId>,
    zones: HashMap<ZoneId, Zone>,
    zone_by_name: HashMap<String, ZoneId>,
}

impl RegistryState {
    fn zone_for(&mut self, name: &str) -> ZoneId {
        if let Some(id) = self.zone_by_name.get(name) {
            return *id;
        }
        let id = ZoneId::new();
        self.zones.insert(
            id,
            Zone {
                id,
                name: name.to_string(),
                members: HashSet::new(),
            },
        );
        self.zone_by_name.insert(name.to_string(), id);
        info!(zone = %name, zone_id = %id, "Zone created");
        id
    }
}

/// Shared registry of sessions and zones.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find or create the session for `(name, zone)`.
    ///
    /// Repeated calls with the same pair return the same session; the zone
    /// is created on first use and gains the session as a member.
    pub async fn resolve_session(&self, name: &str, zone: &str) -> Result<Session, RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if zone.eq_ignore_ascii_case(ALL_ZONE) {
            return Err(RegistryError::ReservedZone(zone.to_string()));
        }

        let mut state = self.state.write().await;
        let key = (name.to_string(), zone.to_string());
        if let Some(id) = state.by_key.get(&key) {
            if let Some(entry) = state.sessions.get(id) {
                return Ok(entry.session.clone());
            }
        }

        let zone_id = state.zone_for(zone);
        let session = Session {
            id: SessionId::new(),
            name: name.to_string(),
            zone: zone.to_string(),
            zone_id,
        };
        if let Some(z) = state.zones.get_mut(&zone_id) {
            z.members.insert(session.id);
        }
        state.by_key.insert(key, session.id);
        state.sessions.insert(
            session.id,
            SessionEntry {
                session: session.clone(),
                transports: HashMap::new(),
            },
        );
        info!(session_id = %session.id, name = %name, zone = %zone, "Session created");
        Ok(session)
    }

    pub async fn attach_transport(&self, session_id: SessionId, handle: TransportHandle) -> bool {
        let mut state = self.state.write().await;
        match state.sessions.get_mut(&session_id) {
            Some(entry) => {
                debug!(session_id = %session_id, transport = %handle.id, "Transport attached");
                entry.transports.insert(handle.id, handle);
                true
            }
            None => false,
        }
    }

    /// Unbind a transport. The session itself persists.
    pub async fn detach_transport(&self, session_id: SessionId, transport_id: Uuid) {
        let mut state = self.state.write().await;
        if let Some(entry) = state.sessions.get_mut(&session_id) {
            if entry.transports.remove(&transport_id).is_some() {
                debug!(session_id = %session_id, transport = %transport_id, "Transport detached");
            }
        }
    }

    pub async fn session(&self, id: SessionId) -> Option<Session> {
        let state = self.state.read().await;
        state.sessions.get(&id).map(|e| e.session.clone())
    }

    pub async fn zone(&self, id: ZoneId) -> Option<Zone> {
        self.state.read().await.zones.get(&id).cloned()
    }

    pub async fn zone_id(&self, name: &str) -> Option<ZoneId> {
        self.state.read().await.zone_by_name.get(name).copied()
    }

    /// Build destinations from zone names; `"all"` selects every session.
    /// Unknown zone names are ignored.
    pub async fn zones_by_name(&self, names: &[&str]) -> Destinations {
        if names.iter().any(|n| n.eq_ignore_ascii_case(ALL_ZONE)) {
            return Destinations::all();
        }
        let state = self.state.read().await;
        Destinations::zones(
            names
                .iter()
                .filter_map(|n| state.zone_by_name.get(*n).copied()),
        )
    }

    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }

    pub async fn zone_count(&self) -> usize {
        self.state.read().await.zones.len()
    }

    pub async fn transport_count(&self, session_id: SessionId) -> usize {
        let state = self.state.read().await;
        state
            .sessions
            .get(&session_id)
            .map_or(0, |e| e.transports.len())
    }

    /// Send `message` to every live transport of every matching session.
    ///
    /// Returns the number of transports reached. Closed transports are
    /// skipped with a warning.
    pub async fn deliver(&self, message: &ServerMessage, to: &Destinations) -> usize {
        let state = self.state.read().await;
        let mut delivered = 0;
        for entry in state.sessions.values() {
            let session = &entry.session;
            if !to.matches(&session.id, &session.zone_id) {
                continue;
            }
            for handle in entry.transports.values() {
                let frame = OutboundFrame::addressed(message.clone(), &session.name, &session.zone);
                if handle.send(frame) {
                    delivered += 1;
                } else {
                    warn!(
                        session_id = %session.id,
                        transport = %handle.id,
                        "Transport closed, skipping delivery"
                    );
                }
            }
        }
        debug!(delivered, "Message delivered");
        delivered
    }

    /// Tell every client in the given zones to stop speaking.
    pub async fn mute(&self, zones: &Destinations) -> usize {
        self.deliver(&ServerMessage::Command(ServerCommand::Mute), zones).await
    }

    /// Drop every session, zone and transport.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        let sessions = state.sessions.len();
        *state = RegistryState::default();
        info!(sessions, "Session registry cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> (TransportHandle, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TransportHandle::new(tx), rx)
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let registry = SessionRegistry::new();
        let a = registry.resolve_session("Kitchen", "Home").await.unwrap();
        let b = registry.resolve_session("Kitchen", "Home").await.unwrap();
        assert_eq!(a.id, b.id);

        let c = registry.resolve_session("Bedroom", "Home").await.unwrap();
        assert_ne!(a.id, c.id);
        assert_eq!(a.zone_id, c.zone_id);

        let zone = registry.zone(a.zone_id).await.unwrap();
        assert_eq!(zone.members.len(), 2);
        assert_eq!(registry.session_count().await, 2);
        assert_eq!(registry.zone_count().await, 1);
    }

    #[tokio::test]
    async fn test_reserved_zone_rejected() {
        let registry = SessionRegistry::new();
        assert_eq!(
            registry.resolve_session("x", "all").await,
            Err(RegistryError::ReservedZone("all".into()))
        );
        assert_eq!(registry.resolve_session("", "Home").await, Err(RegistryError::EmptyName));
    }

    #[tokio::test]
    async fn test_deliver_by_zone_and_session() {
        let registry = SessionRegistry::new();
        let kitchen = registry.resolve_session("Kitchen", "Home").await.unwrap();
        let office = registry.resolve_session("Desk", "Office").await.unwrap();
        let (h1, mut rx1) = transport();
        let (h2, mut rx2) = transport();
        registry.attach_transport(kitchen.id, h1).await;
        registry.attach_transport(office.id, h2).await;

        let msg = ServerMessage::chat("hello");
        let n = registry.deliver(&msg, &Destinations::zones(vec![kitchen.zone_id])).await;
        assert_eq!(n, 1);
        let frame = rx1.try_recv().unwrap();
        assert_eq!(frame.to.as_deref(), Some("Kitchen"));
        assert_eq!(frame.zone.as_deref(), Some("Home"));
        assert!(rx2.try_recv().is_err());

        let n = registry.deliver(&msg, &Destinations::session(office.id)).await;
        assert_eq!(n, 1);
        assert!(rx2.try_recv().is_ok());

        assert_eq!(registry.deliver(&msg, &Destinations::all()).await, 2);
    }

    #[tokio::test]
    async fn test_multiple_transports_per_session() {
        let registry = SessionRegistry::new();
        let s = registry.resolve_session("Kitchen", "Home").await.unwrap();
        let (h1, mut rx1) = transport();
        let (h2, mut rx2) = transport();
        let h2_id = h2.id();
        registry.attach_transport(s.id, h1).await;
        registry.attach_transport(s.id, h2).await;

        assert_eq!(registry.deliver(&ServerMessage::chat("hi"), &Destinations::all()).await, 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());

        registry.detach_transport(s.id, h2_id).await;
        assert_eq!(registry.transport_count(s.id).await, 1);
        assert!(registry.session(s.id).await.is_some());
    }

    #[tokio::test]
    async fn test_dead_transport_is_skipped() {
        let registry = SessionRegistry::new();
        let s = registry.resolve_session("Kitchen", "Home").await.unwrap();
        let (dead, rx) = transport();
        drop(rx);
        let (live, mut live_rx) = transport();
        registry.attach_transport(s.id, dead).await;
        registry.attach_transport(s.id, live).await;

        assert_eq!(registry.deliver(&ServerMessage::chat("hi"), &Destinations::all()).await, 1);
        assert!(live_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_zones_by_name_and_mute() {
        let registry = SessionRegistry::new();
        let s = registry.resolve_session("Kitchen", "Home").await.unwrap();
        let (h, mut rx) = transport();
        registry.attach_transport(s.id, h).await;

        let dest = registry.zones_by_name(&["Home", "Nowhere"]).await;
        assert_eq!(dest.zones, vec![s.zone_id]);
        assert!(registry.zones_by_name(&["all"]).await.all);

        assert_eq!(registry.mute(&dest).await, 1);
        assert_eq!(
            rx.try_recv().unwrap().message,
            ServerMessage::Command(ServerCommand::Mute)
        );
    }

    #[tokio::test]
    async fn test_clear() {
        let registry = SessionRegistry::new();
        registry.resolve_session("Kitchen", "Home").await.unwrap();
        registry.clear().await;
        assert_eq!(registry.session_count().await, 0);
        assert_eq!(registry.zone_count().await, 0);
    }
}
