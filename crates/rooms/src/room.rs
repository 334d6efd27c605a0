use session::ConnId;

use crate::error::RoomError;

/// Client-supplied durable player identity. Survives reconnects; the
/// transport-level ConnId does not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Six uppercase alphanumeric characters, unique among live rooms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomCode(pub String);

impl RoomCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Setter,
    Guesser,
}

impl Role {
    pub fn other(self) -> Self {
        match self {
            Self::Setter => Self::Guesser,
            Self::Guesser => Self::Setter,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Setter => "setter",
            Self::Guesser => "guesser",
        }
    }
}

/// Room lifecycle: Waiting -> Setting -> Guessing -> Finished -> Setting ...
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    Waiting,
    Setting,
    Guessing,
    Finished,
}

impl GameState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Setting => "setting",
            Self::Guessing => "guessing",
            Self::Finished => "finished",
        }
    }
}

/// Directional feedback on a guess, relative to the secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clue {
    Below,
    Above,
    Correct,
}

impl Clue {
    /// Strict ternary comparison of a guess against the secret. This is the
    /// whole of the server-side game logic; picking good guesses is the
    /// guesser's problem.
    pub fn compare(guess: u32, secret: u32) -> Self {
        if guess < secret {
            Self::Below
        } else if guess > secret {
            Self::Above
        } else {
            Self::Correct
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Below => "Below",
            Self::Above => "Above",
            Self::Correct => "Correct",
        }
    }
}

/// One entry in a round's guess log. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guess {
    pub value: u32,
    pub clue: Clue,
    /// 1-based position within the current round.
    pub number: u32,
    pub submitted_at_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub role: Role,
    /// Live connection handle, or None while the player is in a grace window.
    pub conn: Option<ConnId>,
}

/// Authoritative state of one two-player match. All mutations validate their
/// preconditions up front and only then write, so a rejected command leaves
/// the room exactly as it was.
#[derive(Debug, Clone)]
pub struct Room {
    pub code: RoomCode,
    pub player1: Player,
    pub player2: Option<Player>,
    pub state: GameState,
    secret: Option<u32>,
    pub guesses: Vec<Guess>,
    pub guess_count: u32,
    pub created_at_ms: u64,
}

pub(crate) const SECRET_MIN: u32 = 1;
pub(crate) const SECRET_MAX: u32 = 100;

fn in_range(n: u32) -> bool {
    (SECRET_MIN..=SECRET_MAX).contains(&n)
}

impl Room {
    /// A fresh room with its creator seated as Setter, waiting for the
    /// second player.
    pub fn new(
        code: RoomCode,
        name: impl Into<String>,
        player_id: PlayerId,
        conn: ConnId,
        now_ms: u64,
    ) -> Self {
        Self {
            code,
            player1: Player {
                id: player_id,
                name: name.into(),
                role: Role::Setter,
                conn: Some(conn),
            },
            player2: None,
            state: GameState::Waiting,
            secret: None,
            guesses: Vec::new(),
            guess_count: 0,
            created_at_ms: now_ms,
        }
    }

    /// Seat the second player as Guesser and move to Setting.
    pub fn join(
        &mut self,
        name: impl Into<String>,
        player_id: PlayerId,
        conn: ConnId,
    ) -> Result<(), RoomError> {
        if self.player2.is_some() {
            return Err(RoomError::Full);
        }
        if self.state != GameState::Waiting {
            return Err(RoomError::WrongState);
        }
        self.player2 = Some(Player {
            id: player_id,
            name: name.into(),
            role: self.player1.role.other(),
            conn: Some(conn),
        });
        self.state = GameState::Setting;
        Ok(())
    }

    /// Store the round's secret. Only the Setter, only while Setting.
    pub fn set_secret(&mut self, player_id: &PlayerId, number: u32) -> Result<(), RoomError> {
        if self.state != GameState::Setting {
            return Err(RoomError::WrongState);
        }
        if !in_range(number) {
            return Err(RoomError::OutOfRange);
        }
        match self.player(player_id) {
            None => return Err(RoomError::NotInRoom),
            Some(p) if p.role != Role::Setter => return Err(RoomError::WrongRole),
            Some(_) => {}
        }
        self.secret = Some(number);
        self.guesses.clear();
        self.guess_count = 0;
        self.state = GameState::Guessing;
        Ok(())
    }

    /// Evaluate one guess. A Correct guess finishes the round; no further
    /// guesses are accepted until next_round.
    pub fn submit_guess(
        &mut self,
        player_id: &PlayerId,
        value: u32,
        now_ms: u64,
    ) -> Result<Clue, RoomError> {
        if self.state != GameState::Guessing {
            return Err(RoomError::WrongState);
        }
        if !in_range(value) {
            return Err(RoomError::OutOfRange);
        }
        match self.player(player_id) {
            None => return Err(RoomError::NotInRoom),
            Some(p) if p.role != Role::Guesser => return Err(RoomError::WrongRole),
            Some(_) => {}
        }
        // Guessing implies a secret is stored; join/set_secret enforce it.
        let secret = self.secret.ok_or(RoomError::WrongState)?;

        let clue = Clue::compare(value, secret);
        self.guess_count += 1;
        self.guesses.push(Guess {
            value,
            clue,
            number: self.guess_count,
            submitted_at_ms: now_ms,
        });
        if clue == Clue::Correct {
            self.state = GameState::Finished;
        }
        Ok(clue)
    }

    /// Swap both players' roles and start a fresh round.
    pub fn next_round(&mut self, player_id: &PlayerId) -> Result<(), RoomError> {
        if self.state != GameState::Finished {
            return Err(RoomError::WrongState);
        }
        if self.player(player_id).is_none() {
            return Err(RoomError::NotInRoom);
        }
        self.player1.role = self.player1.role.other();
        if let Some(p2) = self.player2.as_mut() {
            p2.role = p2.role.other();
        }
        self.secret = None;
        self.guesses.clear();
        self.guess_count = 0;
        self.state = GameState::Setting;
        Ok(())
    }

    /// The secret, present only while Guessing or Finished.
    pub fn secret(&self) -> Option<u32> {
        self.secret
    }

    pub fn player(&self, player_id: &PlayerId) -> Option<&Player> {
        if self.player1.id == *player_id {
            return Some(&self.player1);
        }
        self.player2.as_ref().filter(|p| p.id == *player_id)
    }

    fn player_mut(&mut self, player_id: &PlayerId) -> Option<&mut Player> {
        if self.player1.id == *player_id {
            return Some(&mut self.player1);
        }
        self.player2.as_mut().filter(|p| p.id == *player_id)
    }

    /// Rebind a known player's slot to a new connection. Rebinding an
    /// already-live slot is allowed (idempotent recovery).
    pub fn bind_conn(&mut self, player_id: &PlayerId, conn: ConnId) -> Result<(), RoomError> {
        match self.player_mut(player_id) {
            Some(p) => {
                p.conn = Some(conn);
                Ok(())
            }
            None => Err(RoomError::SessionNotRecoverable),
        }
    }

    /// Mark whichever slot holds `conn` as absent, returning that player's
    /// durable id.
    pub fn unbind_conn(&mut self, conn: ConnId) -> Option<PlayerId> {
        if self.player1.conn == Some(conn) {
            self.player1.conn = None;
            return Some(self.player1.id.clone());
        }
        if let Some(p2) = self.player2.as_mut() {
            if p2.conn == Some(conn) {
                p2.conn = None;
                return Some(p2.id.clone());
            }
        }
        None
    }

    /// Whether the given player's slot currently has a live connection.
    pub fn is_connected(&self, player_id: &PlayerId) -> bool {
        self.player(player_id).is_some_and(|p| p.conn.is_some())
    }
}
