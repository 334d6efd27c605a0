use std::collections::{BTreeMap, BTreeSet};

/// Transport-assigned connection identifier. Ephemeral: a client that
/// reconnects gets a fresh ConnId and reclaims its room slot via its
/// durable player id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u64);

#[derive(Debug, Clone)]
pub struct SessionOutput {
    pub conn_id: ConnId,
    pub text: String,
    /// When true, the output router drops the connection's write channel
    /// after delivering this message, closing the WebSocket.
    pub disconnect: bool,
}

impl SessionOutput {
    pub fn new(conn_id: ConnId, text: impl Into<String>) -> Self {
        Self {
            conn_id,
            text: text.into(),
            disconnect: false,
        }
    }

    /// Create a final message that will disconnect the connection after delivery.
    pub fn with_disconnect(conn_id: ConnId, text: impl Into<String>) -> Self {
        Self {
            conn_id,
            text: text.into(),
            disconnect: true,
        }
    }
}

/// Where a live connection is bound: which room it belongs to and which
/// durable player identity it speaks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomBinding {
    pub room_code: String,
    pub player_id: String,
}

/// Explicit broadcast-group membership: room code -> set of live connections,
/// plus the reverse binding per connection and one grace-timer token per room.
///
/// Grace tokens implement race-free timer cancellation: arming returns a
/// fresh token, re-arming or disarming invalidates the previous one, and an
/// expiry event is only honored if its token is still current.
#[derive(Debug, Default)]
pub struct Presence {
    members: BTreeMap<String, BTreeSet<ConnId>>,
    bindings: BTreeMap<ConnId, RoomBinding>,
    grace: BTreeMap<String, u64>,
    next_token: u64,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection to a room's broadcast group. A connection bound
    /// elsewhere is moved, never duplicated.
    pub fn bind(&mut self, conn_id: ConnId, room_code: &str, player_id: &str) {
        if let Some(prev) = self.bindings.remove(&conn_id) {
            if let Some(set) = self.members.get_mut(&prev.room_code) {
                set.remove(&conn_id);
                if set.is_empty() {
                    self.members.remove(&prev.room_code);
                }
            }
        }
        self.members
            .entry(room_code.to_string())
            .or_default()
            .insert(conn_id);
        self.bindings.insert(
            conn_id,
            RoomBinding {
                room_code: room_code.to_string(),
                player_id: player_id.to_string(),
            },
        );
    }

    /// Remove a connection from its broadcast group, returning the binding
    /// it held (if any). Does not touch the room's grace token.
    pub fn unbind(&mut self, conn_id: ConnId) -> Option<RoomBinding> {
        let binding = self.bindings.remove(&conn_id)?;
        if let Some(set) = self.members.get_mut(&binding.room_code) {
            set.remove(&conn_id);
            if set.is_empty() {
                self.members.remove(&binding.room_code);
            }
        }
        Some(binding)
    }

    /// The binding a connection currently holds.
    pub fn binding(&self, conn_id: ConnId) -> Option<&RoomBinding> {
        self.bindings.get(&conn_id)
    }

    /// All live connections in a room, in ConnId order.
    pub fn members(&self, room_code: &str) -> Vec<ConnId> {
        self.members
            .get(room_code)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// All live connections in a room except `sender`.
    pub fn others(&self, room_code: &str, sender: ConnId) -> Vec<ConnId> {
        self.members
            .get(room_code)
            .map(|set| set.iter().copied().filter(|c| *c != sender).collect())
            .unwrap_or_default()
    }

    /// Drop a room's broadcast group entirely: members, their bindings, and
    /// any armed grace token.
    pub fn drop_room(&mut self, room_code: &str) {
        if let Some(set) = self.members.remove(room_code) {
            for conn_id in set {
                self.bindings.remove(&conn_id);
            }
        }
        self.grace.remove(room_code);
    }

    /// Arm the room's grace timer, returning a fresh token. Replaces any
    /// previously armed token for the same room (one timer per room).
    pub fn arm_grace(&mut self, room_code: &str) -> u64 {
        self.next_token += 1;
        let token = self.next_token;
        self.grace.insert(room_code.to_string(), token);
        token
    }

    /// Cancel the room's grace timer. Returns whether one was armed.
    /// Disarming twice is a no-op, not an error.
    pub fn disarm_grace(&mut self, room_code: &str) -> bool {
        self.grace.remove(room_code).is_some()
    }

    /// Whether `token` is still the room's live grace token. An expiry event
    /// carrying a stale token lost a race against recovery or a later loss.
    pub fn grace_is_current(&self, room_code: &str, token: u64) -> bool {
        self.grace.get(room_code) == Some(&token)
    }

    /// Number of live connections across all rooms.
    pub fn bound_count(&self) -> usize {
        self.bindings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_and_members() {
        let mut p = Presence::new();
        p.bind(ConnId(1), "AB12CD", "alice");
        p.bind(ConnId(2), "AB12CD", "bob");

        assert_eq!(p.members("AB12CD"), vec![ConnId(1), ConnId(2)]);
        assert_eq!(p.others("AB12CD", ConnId(1)), vec![ConnId(2)]);
        assert_eq!(p.binding(ConnId(1)).unwrap().player_id, "alice");
    }

    #[test]
    fn rebind_moves_connection() {
        let mut p = Presence::new();
        p.bind(ConnId(1), "ROOM01", "alice");
        p.bind(ConnId(1), "ROOM02", "alice");

        assert!(p.members("ROOM01").is_empty());
        assert_eq!(p.members("ROOM02"), vec![ConnId(1)]);
    }

    #[test]
    fn unbind_returns_binding() {
        let mut p = Presence::new();
        p.bind(ConnId(7), "AB12CD", "alice");

        let b = p.unbind(ConnId(7)).unwrap();
        assert_eq!(b.room_code, "AB12CD");
        assert_eq!(b.player_id, "alice");
        assert!(p.members("AB12CD").is_empty());
        assert!(p.unbind(ConnId(7)).is_none());
    }

    #[test]
    fn drop_room_clears_everything() {
        let mut p = Presence::new();
        p.bind(ConnId(1), "AB12CD", "alice");
        p.bind(ConnId(2), "AB12CD", "bob");
        let token = p.arm_grace("AB12CD");

        p.drop_room("AB12CD");
        assert!(p.members("AB12CD").is_empty());
        assert!(p.binding(ConnId(1)).is_none());
        assert!(p.binding(ConnId(2)).is_none());
        assert!(!p.grace_is_current("AB12CD", token));
    }

    #[test]
    fn rearming_replaces_token() {
        let mut p = Presence::new();
        let t1 = p.arm_grace("AB12CD");
        let t2 = p.arm_grace("AB12CD");

        assert_ne!(t1, t2);
        assert!(!p.grace_is_current("AB12CD", t1));
        assert!(p.grace_is_current("AB12CD", t2));
    }

    #[test]
    fn disarm_is_idempotent() {
        let mut p = Presence::new();
        let token = p.arm_grace("AB12CD");

        assert!(p.disarm_grace("AB12CD"));
        assert!(!p.disarm_grace("AB12CD"));
        assert!(!p.grace_is_current("AB12CD", token));
    }

    #[test]
    fn output_disconnect_flag() {
        let out = SessionOutput::new(ConnId(1), "hello");
        assert!(!out.disconnect);
        let out = SessionOutput::with_disconnect(ConnId(1), "bye");
        assert!(out.disconnect);
    }
}
