use guess_server::{config, coordinator, shutdown};

#[tokio::main]
async fn main() {
    guess_server::init_logging();

    let config = config::parse_cli_args();
    tracing::info!("Guess server starting...");

    let (shutdown_tx, shutdown_rx) = shutdown::shutdown_channel();

    // Channels between the network layer and the coordinator.
    let (coord_tx, coord_rx) = tokio::sync::mpsc::unbounded_channel();
    let (output_tx, output_rx) = tokio::sync::mpsc::unbounded_channel();
    let (router_tx, router_rx) = tokio::sync::mpsc::unbounded_channel();

    // Output router
    tokio::spawn(net::output_router::run_output_router(output_rx, router_rx));

    // Coordinator: owns all room and presence state.
    let coord_handle = tokio::spawn(coordinator::run_coordinator(
        coord_rx,
        coord_tx.clone(),
        output_tx,
        config.game.grace_period(),
        shutdown_rx.clone(),
    ));

    // Web server: WebSocket endpoint plus the static browser client.
    let static_dir = {
        let p = std::path::PathBuf::from(&config.net.web_static_dir);
        if p.is_dir() {
            Some(p)
        } else {
            None
        }
    };
    let ws_addr = config.net.ws_addr.clone();
    let web_handle = tokio::spawn(async move {
        if let Err(e) = net::web_server::run_web_server_with_shutdown(
            ws_addr,
            coord_tx,
            router_tx,
            static_dir,
            shutdown_rx,
        )
        .await
        {
            tracing::error!("Web server error: {}", e);
        }
    });

    shutdown::wait_for_signal().await;
    tracing::info!("Shutdown signal received, stopping server...");
    let _ = shutdown_tx.send(true);

    let _ = web_handle.await;
    let _ = coord_handle.await;
    tracing::info!("Server stopped.");
}
