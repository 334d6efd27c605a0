use net::protocol::{ClientMessage, ServerMessage};

/// Map an inbound signaling command to the notification forwarded to the
/// other room member(s). Payloads are cloned verbatim; this is routing, not
/// interpretation. Returns None for game commands.
pub fn signal_response(msg: &ClientMessage) -> Option<(String, ServerMessage)> {
    match msg {
        ClientMessage::CallOffer {
            room_code,
            offer,
            caller,
        } => Some((
            room_code.clone(),
            ServerMessage::IncomingCall {
                offer: offer.clone(),
                caller: caller.clone(),
            },
        )),
        ClientMessage::CallAnswer { room_code, answer } => Some((
            room_code.clone(),
            ServerMessage::CallAnswered {
                answer: answer.clone(),
            },
        )),
        ClientMessage::IceCandidate {
            room_code,
            candidate,
        } => Some((
            room_code.clone(),
            ServerMessage::RemoteIceCandidate {
                candidate: candidate.clone(),
            },
        )),
        ClientMessage::EndCall { room_code } => {
            Some((room_code.clone(), ServerMessage::CallEnded))
        }
        ClientMessage::MicStatusUpdate {
            room_code,
            status,
            player,
        } => Some((
            room_code.clone(),
            ServerMessage::RemoteMicUpdate {
                status: status.clone(),
                player: player.clone(),
            },
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn offer_becomes_incoming_call() {
        let msg = ClientMessage::CallOffer {
            room_code: "AB12CD".to_string(),
            offer: json!({"sdp": "v=0...", "type": "offer"}),
            caller: json!({"id": "p1", "name": "Alice"}),
        };
        let (code, out) = signal_response(&msg).unwrap();
        assert_eq!(code, "AB12CD");
        match out {
            ServerMessage::IncomingCall { offer, caller } => {
                assert_eq!(offer["sdp"], "v=0...");
                assert_eq!(caller["id"], "p1");
            }
            _ => panic!("Expected IncomingCall"),
        }
    }

    #[test]
    fn mic_status_is_relayed_with_player_blob() {
        let msg = ClientMessage::MicStatusUpdate {
            room_code: "AB12CD".to_string(),
            status: "OFF".to_string(),
            player: json!({"id": "p2", "name": "Bob"}),
        };
        let (_, out) = signal_response(&msg).unwrap();
        match out {
            ServerMessage::RemoteMicUpdate { status, player } => {
                assert_eq!(status, "OFF");
                assert_eq!(player["name"], "Bob");
            }
            _ => panic!("Expected RemoteMicUpdate"),
        }
    }

    #[test]
    fn end_call_has_no_payload() {
        let msg = ClientMessage::EndCall {
            room_code: "AB12CD".to_string(),
        };
        let (_, out) = signal_response(&msg).unwrap();
        assert!(matches!(out, ServerMessage::CallEnded));
    }

    #[test]
    fn game_commands_are_not_signaling() {
        let msg = ClientMessage::NextRound {
            room_code: "AB12CD".to_string(),
        };
        assert!(signal_response(&msg).is_none());
    }
}
