//! Wires the three channel hubs (zoom, chat, screenshare) to their
//! routes and runs the server to completion.
//!
//! Grounded on the teacher's `run(port)`
//! (`warp::serve(routes).run(([127, 0, 0, 1], port))`), generalized from one
//! `chat` filter composed with a shared `Rooms` map to three
//! independently-lived `Hub`s composed with the config-selected
//! `TokenValidator`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{broadcast, mpsc, oneshot};
use warp::ws::Ws;
use warp::Filter;

use crate::auth::{Auth0Validator, ClientInfo, DevValidator, TokenValidator};
use crate::client::{run_reader, run_writer, OUTBOUND_QUEUE_CAP};
use crate::config::Config;
use crate::hub::Hub;
use crate::routes::{self, OriginForbidden, Unauthorized};
use crate::shutdown::Shutdown;

/// How long `run` waits for in-flight connections to drain once a shutdown
/// signal arrives before exiting anyway.
const DRAIN_DEADLINE: Duration = Duration::from_secs(10);

/// Runs the server to completion, binding `config.bind_addr` exactly.
pub async fn run(config: Config) {
    serve(config, None).await;
}

/// Same as `run`, but reports the address it actually bound on `ready_tx`
/// before accepting connections. Binding `config.bind_addr` with port `0`
/// lets the OS assign a free ephemeral port, which integration tests use so
/// they can run concurrently instead of fighting over a hardcoded port.
pub async fn serve(config: Config, ready_tx: Option<oneshot::Sender<SocketAddr>>) {
    let validator: Arc<dyn TokenValidator> = if config.skip_auth {
        tracing::warn!("SKIP_AUTH enabled: accepting any non-empty bearer token");
        Arc::new(DevValidator)
    } else {
        let domain = config
            .auth0_domain
            .as_deref()
            .expect("AUTH0_DOMAIN must be set unless SKIP_AUTH=true");
        Arc::new(Auth0Validator::new(domain))
    };

    let zoom_hub = Hub::new();
    let chat_hub = Hub::new();
    let screenshare_hub = Hub::new();

    let (notify_shutdown, _) = broadcast::channel(1);
    let (shutdown_complete_tx, mut shutdown_complete_rx) = mpsc::channel(1);

    let routes = channel_route(
        "zoom",
        Arc::clone(&zoom_hub),
        Arc::clone(&validator),
        config.clone(),
        notify_shutdown.clone(),
        shutdown_complete_tx.clone(),
    )
    .or(channel_route(
        "chat",
        Arc::clone(&chat_hub),
        Arc::clone(&validator),
        config.clone(),
        notify_shutdown.clone(),
        shutdown_complete_tx.clone(),
    ))
    .or(channel_route(
        "screenshare",
        Arc::clone(&screenshare_hub),
        Arc::clone(&validator),
        config.clone(),
        notify_shutdown.clone(),
        shutdown_complete_tx.clone(),
    ))
    .recover(routes::recover);

    let (addr, server) = warp::serve(routes).bind_with_graceful_shutdown(config.bind_addr, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    });
    tracing::info!(%addr, "session hub listening");
    if let Some(ready_tx) = ready_tx {
        let _ = ready_tx.send(addr);
    }

    server.await;

    tracing::info!("draining rooms");
    zoom_hub.shutdown_all().await;
    chat_hub.shutdown_all().await;
    screenshare_hub.shutdown_all().await;

    let _ = notify_shutdown.send(());
    drop(shutdown_complete_tx);
    tokio::select! {
        _ = shutdown_complete_rx.recv() => {
            tracing::info!("all connections drained");
        }
        _ = tokio::time::sleep(DRAIN_DEADLINE) => {
            tracing::warn!("drain deadline exceeded, exiting with connections still open");
        }
    }
}

fn channel_route(
    channel: &'static str,
    hub: Arc<Hub>,
    validator: Arc<dyn TokenValidator>,
    config: Config,
    notify_shutdown: broadcast::Sender<()>,
    shutdown_complete_tx: mpsc::Sender<()>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    routes::ws_route(channel)
        .and(routes::origin())
        .and_then(move |ws: Ws, room_id: String, token: String, origin: Option<String>| {
            let validator = Arc::clone(&validator);
            let config = config.clone();
            async move {
                let info = validator.validate(&token).await.map_err(|e| {
                    tracing::warn!(error = %e, channel, "rejected: auth failed");
                    warp::reject::custom(Unauthorized)
                })?;
                if !config.origin_allowed(origin.as_deref()) {
                    tracing::warn!(?origin, channel, "rejected: origin not allowed");
                    return Err(warp::reject::custom(OriginForbidden));
                }
                Ok((ws, room_id, info))
            }
        })
        .map(move |(ws, room_id, info): (Ws, String, ClientInfo)| {
            let hub = Arc::clone(&hub);
            let shutdown = Shutdown::new(notify_shutdown.subscribe(), shutdown_complete_tx.clone());
            ws.on_upgrade(move |socket| handle_connection(socket, room_id, info, hub, shutdown))
        })
}

async fn handle_connection(
    socket: warp::ws::WebSocket,
    room_id: String,
    info: ClientInfo,
    hub: Arc<Hub>,
    shutdown: Shutdown,
) {
    let client_id = info.client_id.clone();
    tracing::info!(room = %room_id, client = %client_id, "connection established");

    let (ws_tx, ws_rx) = socket.split();
    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAP);

    tokio::spawn(run_writer(ws_tx, rx));

    let room_tx = hub.register(&room_id, info, tx).await;
    run_reader(client_id, ws_rx, room_tx, shutdown).await;
}
