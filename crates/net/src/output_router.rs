use std::collections::HashMap;

use session::ConnId;

use crate::channels::{ConnWriteTx, OutputRx, RouterControl, RouterControlRx};

/// Routes SessionOutput messages to the correct per-connection write channel.
///
/// The coordinator emits outputs in command-acceptance order and each write
/// channel is FIFO, so a room's members observe broadcasts in the order the
/// mutations were accepted.
pub async fn run_output_router(mut output_rx: OutputRx, mut control_rx: RouterControlRx) {
    let mut writers: HashMap<ConnId, ConnWriteTx> = HashMap::new();

    loop {
        tokio::select! {
            Some(control) = control_rx.recv() => match control {
                RouterControl::Register { conn_id, write_tx } => {
                    tracing::debug!(?conn_id, "Output router: connection registered");
                    writers.insert(conn_id, write_tx);
                }
                RouterControl::Unregister { conn_id } => {
                    tracing::debug!(?conn_id, "Output router: connection unregistered");
                    writers.remove(&conn_id);
                }
            },
            Some(output) = output_rx.recv() => {
                if let Some(tx) = writers.get(&output.conn_id) {
                    if tx.send(output.text).is_err() {
                        tracing::debug!(conn_id = ?output.conn_id, "Output router: write channel closed");
                        writers.remove(&output.conn_id);
                    } else if output.disconnect {
                        tracing::debug!(conn_id = ?output.conn_id, "Output router: disconnect requested, dropping writer");
                        writers.remove(&output.conn_id);
                    }
                }
            }
            else => break,
        }
    }

    tracing::info!("Output router shutting down");
}
