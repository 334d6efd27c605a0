use session::{ConnId, SessionOutput};
use tokio::sync::mpsc;

use crate::protocol::ClientMessage;

/// Events feeding the coordinator's single sequential loop. Commands for all
/// rooms serialize through one channel, which is what makes room mutations
/// race-free without per-room locks.
#[derive(Debug)]
pub enum CoordEvent {
    /// A WebSocket finished its upgrade.
    Connected { conn_id: ConnId },
    /// A parsed client command.
    Command {
        conn_id: ConnId,
        msg: ClientMessage,
    },
    /// The WebSocket closed or errored.
    Disconnected { conn_id: ConnId },
    /// A grace-period timer fired. Honored only if `token` is still the
    /// room's live grace token and the player's slot is still unbound.
    GraceExpired {
        room_code: String,
        player_id: String,
        token: u64,
    },
}

/// Sender from network tasks (and grace timers) to the coordinator.
pub type CoordTx = mpsc::UnboundedSender<CoordEvent>;
/// Receiver in the coordinator loop.
pub type CoordRx = mpsc::UnboundedReceiver<CoordEvent>;

/// Sender from the coordinator to the output router.
pub type OutputTx = mpsc::UnboundedSender<SessionOutput>;
/// Receiver in the output router.
pub type OutputRx = mpsc::UnboundedReceiver<SessionOutput>;

/// Per-connection write channel (coordinator -> output router -> socket task).
pub type ConnWriteTx = mpsc::UnboundedSender<String>;
pub type ConnWriteRx = mpsc::UnboundedReceiver<String>;

/// Routing-table updates for the output router. Register and Unregister
/// share one channel so a connection's removal can never be reordered ahead
/// of its registration.
#[derive(Debug)]
pub enum RouterControl {
    Register {
        conn_id: ConnId,
        write_tx: ConnWriteTx,
    },
    Unregister {
        conn_id: ConnId,
    },
}

pub type RouterControlTx = mpsc::UnboundedSender<RouterControl>;
pub type RouterControlRx = mpsc::UnboundedReceiver<RouterControl>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_send_order() {
        let (tx, mut rx) = mpsc::unbounded_channel::<CoordEvent>();

        tx.send(CoordEvent::Connected {
            conn_id: ConnId(1),
        })
        .unwrap();
        tx.send(CoordEvent::Command {
            conn_id: ConnId(1),
            msg: ClientMessage::CreateRoom {
                player_name: "Alice".to_string(),
                player_id: "p1".to_string(),
            },
        })
        .unwrap();
        tx.send(CoordEvent::Disconnected {
            conn_id: ConnId(1),
        })
        .unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            CoordEvent::Connected { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            CoordEvent::Command { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            CoordEvent::Disconnected { .. }
        ));
    }

    #[tokio::test]
    async fn grace_event_carries_token() {
        let (tx, mut rx) = mpsc::unbounded_channel::<CoordEvent>();
        tx.send(CoordEvent::GraceExpired {
            room_code: "AB12CD".to_string(),
            player_id: "p2".to_string(),
            token: 7,
        })
        .unwrap();

        match rx.recv().await.unwrap() {
            CoordEvent::GraceExpired {
                room_code, token, ..
            } => {
                assert_eq!(room_code, "AB12CD");
                assert_eq!(token, 7);
            }
            _ => panic!("Expected GraceExpired"),
        }
    }
}
