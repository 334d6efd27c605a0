use std::time::{Duration, SystemTime, UNIX_EPOCH};

use net::channels::{CoordEvent, CoordRx, CoordTx, OutputTx};
use net::protocol::{ClientMessage, GuessWire, PlayerWire, RoomWire, ServerMessage};
use rooms::{Player, PlayerId, Room, RoomCode, RoomError, RoomRegistry};
use session::{ConnId, Presence, SessionOutput};

use crate::relay;
use crate::shutdown::ShutdownRx;

/// The authoritative room coordinator. Owns the registry and the presence
/// table; every command for every room is applied here, one event at a time,
/// so no room mutation ever races another.
pub struct Coordinator {
    registry: RoomRegistry,
    presence: Presence,
    output_tx: OutputTx,
    /// Looped back into the coordinator's own event channel by grace timers.
    timer_tx: CoordTx,
    grace_period: Duration,
}

impl Coordinator {
    pub fn new(timer_tx: CoordTx, output_tx: OutputTx, grace_period: Duration) -> Self {
        Self {
            registry: RoomRegistry::new(),
            presence: Presence::new(),
            output_tx,
            timer_tx,
            grace_period,
        }
    }

    /// Number of live rooms.
    pub fn room_count(&self) -> usize {
        self.registry.len()
    }

    pub fn handle(&mut self, event: CoordEvent) {
        match event {
            CoordEvent::Connected { conn_id } => {
                tracing::debug!(?conn_id, "Connection ready");
            }
            CoordEvent::Command { conn_id, msg } => self.handle_command(conn_id, msg),
            CoordEvent::Disconnected { conn_id } => self.handle_disconnect(conn_id),
            CoordEvent::GraceExpired {
                room_code,
                player_id,
                token,
            } => self.handle_grace_expired(&room_code, player_id, token),
        }
    }

    fn handle_command(&mut self, conn_id: ConnId, msg: ClientMessage) {
        // Signaling short-circuits around the state machine entirely.
        if let Some((room_code, outbound)) = relay::signal_response(&msg) {
            self.forward_signal(conn_id, &room_code, &outbound);
            return;
        }

        match msg {
            ClientMessage::CreateRoom {
                player_name,
                player_id,
            } => self.create_room(conn_id, player_name, player_id),
            ClientMessage::JoinRoom {
                player_name,
                player_id,
                room_code,
            } => self.join_room(conn_id, player_name, player_id, room_code),
            ClientMessage::SetSecret { room_code, number } => {
                self.set_secret(conn_id, room_code, number)
            }
            ClientMessage::SubmitGuess { room_code, guess } => {
                self.submit_guess(conn_id, room_code, guess)
            }
            ClientMessage::NextRound { room_code } => self.next_round(conn_id, room_code),
            ClientMessage::RecoverSession {
                player_id,
                room_code,
            } => self.recover_session(conn_id, player_id, room_code),
            // Signaling variants were handled above.
            _ => {}
        }
    }

    fn create_room(&mut self, conn_id: ConnId, player_name: String, player_id: String) {
        let pid = PlayerId(player_id);
        let result = self
            .registry
            .create(player_name, pid.clone(), conn_id, now_ms())
            .map(|room| (room.code.clone(), room_wire(room)));

        match result {
            Ok((code, wire)) => {
                self.release_binding(conn_id, code.as_str());
                self.presence.bind(conn_id, code.as_str(), pid.as_str());
                tracing::info!(code = %code, ?conn_id, "Room created");
                self.send(conn_id, &ServerMessage::RoomCreated { room: wire });
            }
            Err(e) => self.send_error(conn_id, &e),
        }
    }

    fn join_room(
        &mut self,
        conn_id: ConnId,
        player_name: String,
        player_id: String,
        room_code: String,
    ) {
        let pid = PlayerId(player_id);
        let code = RoomCode(room_code.clone());
        let result = self
            .registry
            .join(&code, player_name, pid.clone(), conn_id)
            .map(room_wire);

        match result {
            Ok(wire) => {
                self.release_binding(conn_id, &room_code);
                self.presence.bind(conn_id, &room_code, pid.as_str());
                tracing::info!(code = %room_code, ?conn_id, "Player joined room");
                self.broadcast(&room_code, &ServerMessage::RoomUpdated { room: wire });
            }
            Err(e) => self.send_error(conn_id, &e),
        }
    }

    fn set_secret(&mut self, conn_id: ConnId, room_code: String, number: i64) {
        let result = self.apply_game_command(conn_id, &room_code, |room, pid| {
            let n = checked_number(number)?;
            room.set_secret(pid, n)
        });
        match result {
            Ok(wire) => {
                tracing::info!(code = %room_code, "Secret set, guessing begins");
                self.broadcast(&room_code, &ServerMessage::RoomUpdated { room: wire });
            }
            Err(e) => self.send_error(conn_id, &e),
        }
    }

    fn submit_guess(&mut self, conn_id: ConnId, room_code: String, guess: i64) {
        let result = self.apply_game_command(conn_id, &room_code, |room, pid| {
            let g = checked_number(guess)?;
            room.submit_guess(pid, g, now_ms()).map(|_| ())
        });
        match result {
            Ok(wire) => {
                tracing::debug!(code = %room_code, state = %wire.game_state, "Guess evaluated");
                self.broadcast(&room_code, &ServerMessage::RoomUpdated { room: wire });
            }
            Err(e) => self.send_error(conn_id, &e),
        }
    }

    fn next_round(&mut self, conn_id: ConnId, room_code: String) {
        let result =
            self.apply_game_command(conn_id, &room_code, |room, pid| room.next_round(pid));
        match result {
            Ok(wire) => {
                tracing::info!(code = %room_code, "Roles swapped for next round");
                self.broadcast(&room_code, &ServerMessage::RoomUpdated { room: wire });
            }
            Err(e) => self.send_error(conn_id, &e),
        }
    }

    /// Resolve the issuer's identity from its binding, run one state-machine
    /// command, and return the fresh snapshot on success. A rejected command
    /// has provably not touched the room (the state machine validates before
    /// it writes).
    fn apply_game_command(
        &mut self,
        conn_id: ConnId,
        room_code: &str,
        f: impl FnOnce(&mut Room, &PlayerId) -> Result<(), RoomError>,
    ) -> Result<RoomWire, RoomError> {
        let pid = match self.presence.binding(conn_id) {
            Some(b) if b.room_code == room_code => PlayerId(b.player_id.clone()),
            _ => return Err(RoomError::NotInRoom),
        };
        let room = self
            .registry
            .get_mut(&RoomCode(room_code.to_string()))
            .ok_or(RoomError::NotFound)?;
        f(room, &pid)?;
        Ok(room_wire(room))
    }

    fn recover_session(&mut self, conn_id: ConnId, player_id: String, room_code: String) {
        let pid = PlayerId(player_id);
        let code = RoomCode(room_code.clone());

        let result = match self.registry.get_mut(&code) {
            None => Err(RoomError::RoomGone),
            Some(room) => room.bind_conn(&pid, conn_id).map(|()| {
                let other_absent = room_players(room)
                    .find(|p| p.id != pid && p.conn.is_none())
                    .map(|p| p.id.clone());
                (room_wire(room), other_absent)
            }),
        };

        match result {
            Ok((wire, other_absent)) => {
                self.release_binding(conn_id, &room_code);
                let cancelled = self.presence.disarm_grace(&room_code);
                self.presence.bind(conn_id, &room_code, pid.as_str());
                // At most one timer per room: if the opposite slot is still
                // vacant, its grace window restarts now.
                if let Some(other) = other_absent {
                    self.arm_grace(&room_code, &other);
                }
                tracing::info!(code = %room_code, player = %pid, cancelled, "Session recovered");
                self.send(
                    conn_id,
                    &ServerMessage::SessionRecovered { room: wire.clone() },
                );
                self.broadcast(&room_code, &ServerMessage::RoomUpdated { room: wire });
            }
            Err(e) => self.send_error(conn_id, &e),
        }
    }

    /// A connection seating itself in a new room abandons the seat it held
    /// elsewhere. The old room goes through the ordinary loss path: its slot
    /// is marked absent, the surviving member is notified, and the grace
    /// window starts, exactly as if the socket had closed. Without this, a
    /// rebind would strand the old room with neither a live member nor a
    /// timer, and it would never be deleted.
    fn release_binding(&mut self, conn_id: ConnId, new_room_code: &str) {
        let Some(binding) = self.presence.binding(conn_id).cloned() else {
            return;
        };
        if binding.room_code == new_room_code {
            return;
        }
        self.presence.unbind(conn_id);
        let code = RoomCode(binding.room_code.clone());
        let Some(room) = self.registry.get_mut(&code) else {
            return;
        };
        let Some(pid) = room.unbind_conn(conn_id) else {
            return;
        };

        tracing::info!(
            code = %binding.room_code,
            player = %pid,
            "Seat abandoned for another room, grace window armed"
        );
        self.broadcast(
            &binding.room_code,
            &ServerMessage::PlayerReconnecting {
                player_id: pid.0.clone(),
            },
        );
        self.arm_grace(&binding.room_code, &pid);
    }

    fn handle_disconnect(&mut self, conn_id: ConnId) {
        let Some(binding) = self.presence.unbind(conn_id) else {
            tracing::debug!(?conn_id, "Disconnect from unbound connection");
            return;
        };
        let code = RoomCode(binding.room_code.clone());
        let Some(room) = self.registry.get_mut(&code) else {
            return;
        };
        // A stale connection (already replaced by recovery) unbinds nothing.
        let Some(pid) = room.unbind_conn(conn_id) else {
            tracing::debug!(?conn_id, code = %binding.room_code, "Stale connection closed");
            return;
        };

        tracing::info!(
            code = %binding.room_code,
            player = %pid,
            grace_secs = self.grace_period.as_secs(),
            "Connection lost, grace window armed"
        );
        self.broadcast(
            &binding.room_code,
            &ServerMessage::PlayerReconnecting {
                player_id: pid.0.clone(),
            },
        );
        self.arm_grace(&binding.room_code, &pid);
    }

    /// Arm (or re-arm) the room's grace timer. The spawned task does nothing
    /// but sleep and post the expiry event; whether that event still means
    /// anything is decided back on the coordinator with the token.
    fn arm_grace(&mut self, room_code: &str, pid: &PlayerId) {
        let token = self.presence.arm_grace(room_code);
        let tx = self.timer_tx.clone();
        let room_code = room_code.to_string();
        let player_id = pid.0.clone();
        let grace = self.grace_period;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = tx.send(CoordEvent::GraceExpired {
                room_code,
                player_id,
                token,
            });
        });
    }

    fn handle_grace_expired(&mut self, room_code: &str, player_id: String, token: u64) {
        if !self.presence.grace_is_current(room_code, token) {
            tracing::debug!(code = %room_code, "Stale grace timer ignored");
            return;
        }
        self.presence.disarm_grace(room_code);

        let code = RoomCode(room_code.to_string());
        let pid = PlayerId(player_id);
        // Token was current, but double-check the slot: recovery and expiry
        // may sit in the queue together.
        let still_absent = self
            .registry
            .get(&code)
            .map(|room| room.player(&pid).is_some_and(|p| p.conn.is_none()));

        match still_absent {
            Some(true) => {
                tracing::info!(code = %room_code, player = %pid, "Grace period expired, match over");
                self.broadcast(room_code, &ServerMessage::PlayerDisconnected);
                self.registry.remove(&code);
                self.presence.drop_room(room_code);
            }
            Some(false) => {
                tracing::debug!(code = %room_code, "Slot rebound before expiry, room kept");
            }
            None => {
                self.presence.drop_room(room_code);
            }
        }
    }

    /// Forward an opaque signaling notification to everyone in the room
    /// except the sender. No payload validation beyond the room existing.
    fn forward_signal(&mut self, conn_id: ConnId, room_code: &str, outbound: &ServerMessage) {
        if self.registry.get(&RoomCode(room_code.to_string())).is_none() {
            tracing::debug!(code = %room_code, "Signal for unknown room dropped");
            return;
        }
        let text = encode(outbound);
        for other in self.presence.others(room_code, conn_id) {
            let _ = self.output_tx.send(SessionOutput::new(other, text.clone()));
        }
    }

    fn send(&self, conn_id: ConnId, msg: &ServerMessage) {
        let _ = self.output_tx.send(SessionOutput::new(conn_id, encode(msg)));
    }

    fn send_error(&self, conn_id: ConnId, err: &RoomError) {
        tracing::debug!(?conn_id, %err, "Command rejected");
        self.send(
            conn_id,
            &ServerMessage::Error {
                message: err.to_string(),
            },
        );
    }

    fn broadcast(&self, room_code: &str, msg: &ServerMessage) {
        let text = encode(msg);
        for conn_id in self.presence.members(room_code) {
            let _ = self.output_tx.send(SessionOutput::new(conn_id, text.clone()));
        }
    }
}

/// Drive a coordinator from its event channel until shutdown or until every
/// sender is gone.
pub async fn run_coordinator(
    mut rx: CoordRx,
    timer_tx: CoordTx,
    output_tx: OutputTx,
    grace_period: Duration,
    mut shutdown_rx: ShutdownRx,
) {
    let mut coordinator = Coordinator::new(timer_tx, output_tx, grace_period);
    tracing::info!(grace_secs = grace_period.as_secs(), "Coordinator running");

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => coordinator.handle(event),
                None => break,
            },
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("Coordinator stopped");
}

fn room_players(room: &Room) -> impl Iterator<Item = &Player> {
    std::iter::once(&room.player1).chain(room.player2.as_ref())
}

fn checked_number(n: i64) -> Result<u32, RoomError> {
    u32::try_from(n).map_err(|_| RoomError::OutOfRange)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn encode(msg: &ServerMessage) -> String {
    serde_json::to_string(msg).unwrap()
}

/// Convert the authoritative room into its wire snapshot.
fn room_wire(room: &Room) -> RoomWire {
    RoomWire {
        code: room.code.as_str().to_string(),
        player1: player_wire(&room.player1),
        player2: room.player2.as_ref().map(player_wire),
        game_state: room.state.as_str().to_string(),
        secret_number: room.secret(),
        guesses: room
            .guesses
            .iter()
            .map(|g| GuessWire {
                guess: g.value,
                clue: g.clue.as_str().to_string(),
                guess_number: g.number,
                timestamp: g.submitted_at_ms,
            })
            .collect(),
        guess_count: room.guess_count,
        created_at: room.created_at_ms,
    }
}

fn player_wire(p: &Player) -> PlayerWire {
    PlayerWire {
        id: p.id.0.clone(),
        name: p.name.clone(),
        role: p.role.as_str().to_string(),
        connected: p.conn.is_some(),
    }
}
