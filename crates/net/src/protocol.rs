use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client-to-server command (internally tagged JSON, kebab-case tags and
/// camelCase fields to match the browser client's wire format).
///
/// Signaling payloads (`offer`, `answer`, `candidate`, `caller`, `player`)
/// are opaque `Value`s: the server routes them between room members and must
/// never interpret their contents.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    CreateRoom {
        player_name: String,
        player_id: String,
    },
    JoinRoom {
        player_name: String,
        player_id: String,
        room_code: String,
    },
    SetSecret {
        room_code: String,
        number: i64,
    },
    SubmitGuess {
        room_code: String,
        guess: i64,
    },
    NextRound {
        room_code: String,
    },
    RecoverSession {
        player_id: String,
        room_code: String,
    },
    MicStatusUpdate {
        room_code: String,
        status: String,
        player: Value,
    },
    CallOffer {
        room_code: String,
        offer: Value,
        caller: Value,
    },
    CallAnswer {
        room_code: String,
        answer: Value,
    },
    IceCandidate {
        room_code: String,
        candidate: Value,
    },
    EndCall {
        room_code: String,
    },
}

/// Server-to-client message (internally tagged JSON).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    RoomCreated {
        room: RoomWire,
    },
    RoomUpdated {
        room: RoomWire,
    },
    SessionRecovered {
        room: RoomWire,
    },
    PlayerReconnecting {
        player_id: String,
    },
    PlayerDisconnected,
    Error {
        message: String,
    },
    IncomingCall {
        offer: Value,
        caller: Value,
    },
    CallAnswered {
        answer: Value,
    },
    RemoteIceCandidate {
        candidate: Value,
    },
    CallEnded,
    RemoteMicUpdate {
        status: String,
        player: Value,
    },
}

/// Full room snapshot as broadcast to both members after every accepted
/// mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomWire {
    pub code: String,
    pub player1: PlayerWire,
    pub player2: Option<PlayerWire>,
    pub game_state: String,
    pub secret_number: Option<u32>,
    pub guesses: Vec<GuessWire>,
    pub guess_count: u32,
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerWire {
    pub id: String,
    pub name: String,
    pub role: String,
    pub connected: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuessWire {
    pub guess: u32,
    pub clue: String,
    pub guess_number: u32,
    pub timestamp: u64,
}
