use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_id!(
    /// Stable identity of a (name, zone) session, kept across reconnects.
    SessionId
);
uuid_id!(
    /// Identity of a zone (a named group of sessions).
    ZoneId
);
uuid_id!(
    /// Identity of a registered handler instance.
    HandlerUid
);

/// Delivery target set for a payload.
///
/// `all` replaces the `"all"` pseudo-id: it matches every session and is
/// never materialized as a zone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destinations {
    #[serde(default)]
    pub all: bool,
    #[serde(default)]
    pub sessions: Vec<SessionId>,
    #[serde(default)]
    pub zones: Vec<ZoneId>,
}

impl Destinations {
    pub fn all() -> Self {
        Self { all: true, ..Self::default() }
    }

    pub fn session(id: SessionId) -> Self {
        Self { sessions: vec![id], ..Self::default() }
    }

    pub fn sessions(ids: impl IntoIterator<Item = SessionId>) -> Self {
        Self { sessions: ids.into_iter().collect(), ..Self::default() }
    }

    pub fn zones(ids: impl IntoIterator<Item = ZoneId>) -> Self {
        Self { zones: ids.into_iter().collect(), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        !self.all && self.sessions.is_empty() && self.zones.is_empty()
    }

    /// Whether a session living in `zone` is addressed by this target set.
    pub fn matches(&self, session: &SessionId, zone: &ZoneId) -> bool {
        self.all || self.sessions.contains(session) || self.zones.contains(zone)
    }
}
