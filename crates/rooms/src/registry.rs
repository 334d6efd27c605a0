use std::collections::HashMap;

use rand::Rng;
use session::ConnId;

use crate::error::RoomError;
use crate::room::{PlayerId, Room, RoomCode};

/// Room codes are 6 characters from a 36-symbol alphabet: ~2.2 billion
/// combinations, so a collision against live rooms is a regenerate-and-retry
/// event, not something to engineer around.
pub const CODE_LEN: usize = 6;
pub const MAX_CODE_ATTEMPTS: usize = 64;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Sole owner of all live rooms, keyed by code. Every mutation of a room
/// goes through a lookup here; nothing else holds an owning reference.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomCode, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a room with a freshly generated unique code, seating the
    /// creator as Setter.
    pub fn create(
        &mut self,
        name: impl Into<String>,
        player_id: PlayerId,
        conn: ConnId,
        now_ms: u64,
    ) -> Result<&Room, RoomError> {
        let code = self.alloc_code(&mut rand::thread_rng())?;
        let room = Room::new(code.clone(), name, player_id, conn, now_ms);
        Ok(self.rooms.entry(code).or_insert(room))
    }

    /// Seat the second player in an existing room.
    pub fn join(
        &mut self,
        code: &RoomCode,
        name: impl Into<String>,
        player_id: PlayerId,
        conn: ConnId,
    ) -> Result<&Room, RoomError> {
        let room = self.rooms.get_mut(code).ok_or(RoomError::NotFound)?;
        room.join(name, player_id, conn)?;
        Ok(room)
    }

    pub fn get(&self, code: &RoomCode) -> Option<&Room> {
        self.rooms.get(code)
    }

    pub fn get_mut(&mut self, code: &RoomCode) -> Option<&mut Room> {
        self.rooms.get_mut(code)
    }

    /// Remove a room permanently. Grace-timer bookkeeping lives in the
    /// presence table and is cleared by the caller.
    pub fn remove(&mut self, code: &RoomCode) -> Option<Room> {
        self.rooms.remove(code)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    fn alloc_code<R: Rng>(&self, rng: &mut R) -> Result<RoomCode, RoomError> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = generate_code(rng);
            if !self.rooms.contains_key(&code) {
                return Ok(code);
            }
        }
        Err(RoomError::CodesExhausted)
    }
}

fn generate_code<R: Rng>(rng: &mut R) -> RoomCode {
    let code: String = (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect();
    RoomCode(code)
}
