/// Everything that can go wrong while coordinating a room.
///
/// Display strings double as the wire-level `error` messages, so the ones
/// clients branch on ("Room not found", "Room is full", "Session could not
/// be recovered", "Room no longer exists") are stable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("Room not found")]
    NotFound,

    /// A recovery attempt against a room that was deleted (grace expiry or
    /// permanent departure). Distinct wording from NotFound on purpose.
    #[error("Room no longer exists")]
    RoomGone,

    #[error("Room is full")]
    Full,

    #[error("That move is not allowed right now")]
    WrongState,

    #[error("That move is not allowed for your role")]
    WrongRole,

    #[error("Number must be between 1 and 100")]
    OutOfRange,

    #[error("You are not a member of this room")]
    NotInRoom,

    #[error("Session could not be recovered")]
    SessionNotRecoverable,

    #[error("Could not allocate a room code")]
    CodesExhausted,
}
