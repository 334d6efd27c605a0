mod error;
mod registry;
mod room;

pub use error::RoomError;
pub use registry::{RoomRegistry, CODE_LEN, MAX_CODE_ATTEMPTS};
pub use room::{Clue, GameState, Guess, Player, PlayerId, Role, Room, RoomCode};
