//! Upgrade endpoint and per-connection event loop
//!
//! Admission order is fixed: origin check, per-address rate limit,
//! authentication, then the per-user ceiling at registration. The first
//! three run before the upgrade completes, so rejected attempts never
//! get a connection object.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Instant;

use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use log::{debug, error, info, warn};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;
use warp::http::{HeaderMap, StatusCode};
use warp::ws::{Message, WebSocket};
use warp::{Filter, Rejection, Reply};

use crate::auth::token::Identity;
use crate::constants::REALTIME_PATH;
use crate::core::connection::ConnectionHandle;
use crate::core::events::{ClientEvent, ServerEvent};
use crate::core::server::SharedRealtimeServer;
use crate::error::TripSyncError;

/// Rejection wrapper carrying the admission failure out of the filter
#[derive(Debug)]
pub struct AdmissionError(pub TripSyncError);

impl warp::reject::Reject for AdmissionError {}

/// Build the `/realtime` upgrade route
pub fn realtime_route(
    server: SharedRealtimeServer,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path(REALTIME_PATH)
        .and(warp::ws())
        .and(warp::header::headers_cloned())
        .and(warp::query::<HashMap<String, String>>())
        .and(warp::addr::remote())
        .and(warp::any().map(move || server.clone()))
        .and_then(admit_upgrade)
}

/// Run the pre-upgrade admission checks, then hand off to the event loop
async fn admit_upgrade(
    ws: warp::ws::Ws,
    headers: HeaderMap,
    query: HashMap<String, String>,
    remote: Option<SocketAddr>,
    server: SharedRealtimeServer,
) -> Result<impl Reply, Rejection> {
    check_origin(&headers, &server).map_err(|e| warp::reject::custom(AdmissionError(e)))?;

    let addr = remote
        .map(|a| a.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
    if !server.allow_attempt(addr).await {
        debug!("Rate limited upgrade attempt from {}", addr);
        return Err(warp::reject::custom(AdmissionError(
            TripSyncError::RateLimited,
        )));
    }

    let token = extract_token(&headers, &query);
    let identity = timeout(
        server.config().connect_timeout,
        server.authenticate(token.as_deref()),
    )
    .await
    .unwrap_or_else(|_| {
        warn!("Authentication timed out for upgrade from {}", addr);
        Err(TripSyncError::Unauthorized(
            "Authentication timed out".to_string(),
        ))
    })
    .map_err(|e| warp::reject::custom(AdmissionError(e)))?;

    Ok(ws.on_upgrade(move |socket| handle_client(socket, identity, server)))
}

/// Enforce the configured origin allow-list, if any
fn check_origin(headers: &HeaderMap, server: &SharedRealtimeServer) -> Result<(), TripSyncError> {
    let allowed = match &server.config().allowed_origin {
        Some(allowed) => allowed,
        None => return Ok(()),
    };
    let origin = headers
        .get("origin")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if origin == allowed {
        Ok(())
    } else {
        warn!("Rejected upgrade from disallowed origin {:?}", origin);
        Err(TripSyncError::Forbidden)
    }
}

/// Token arrives as a `token` query parameter (browser WebSocket clients
/// cannot set headers) or an Authorization bearer header
fn extract_token(headers: &HeaderMap, query: &HashMap<String, String>) -> Option<String> {
    if let Some(token) = query.get("token") {
        return Some(token.clone());
    }
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.to_string())
}

/// Per-connection task: admit, pump events, guarantee release
async fn handle_client(socket: WebSocket, identity: Identity, server: SharedRealtimeServer) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    // Single writer task per connection keeps outbound delivery FIFO
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = ws_tx.send(message).await {
                debug!("Outbound channel closed: {}", e);
                break;
            }
        }
    });

    let conn = match server.admit(identity, tx.clone()).await {
        Ok(conn) => conn,
        Err(e) => {
            // Per-user ceiling hit: close the transport without ever
            // entering the registry or any room
            let _ = tx.send(Message::text(
                serde_json::to_string(&ServerEvent::error("connect", &e)).unwrap_or_default(),
            ));
            let _ = tx.send(Message::close());
            warn!("Rejected connection after upgrade: {}", e);
            return;
        }
    };

    let ping_interval = server.config().ping_interval;
    let ping_timeout = server.config().ping_timeout;
    let max_message_size = server.config().max_message_size;
    let mut ticker = tokio::time::interval(ping_interval);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if last_seen.elapsed() > ping_timeout {
                    info!("Evicting unresponsive connection {}", conn.id);
                    break;
                }
                if tx.send(Message::ping(Vec::new())).is_err() {
                    break;
                }
            }
            inbound = ws_rx.next() => {
                let msg = match inbound {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        debug!("Transport error on connection {}: {}", conn.id, e);
                        break;
                    }
                    None => break,
                };
                last_seen = Instant::now();

                if msg.is_close() {
                    break;
                }
                if !msg.is_text() {
                    // Pings are answered at the transport level; pongs
                    // and binary frames only count as liveness
                    continue;
                }
                process_frame(&msg, &conn, &server, max_message_size).await;
            }
        }
    }

    // The one cleanup point every exit path funnels through
    server.release(&conn.id).await;
}

/// Decode and dispatch a single text frame
async fn process_frame(
    msg: &Message,
    conn: &ConnectionHandle,
    server: &SharedRealtimeServer,
    max_message_size: usize,
) {
    let size = msg.as_bytes().len();
    if size > max_message_size {
        conn.send_event(&ServerEvent::error(
            "message",
            &TripSyncError::MessageTooLarge(size),
        ));
        return;
    }

    let text = match msg.to_str() {
        Ok(text) => text,
        Err(_) => return,
    };

    match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => server.dispatch(conn, event).await,
        Err(e) => {
            debug!("Unparsable frame from connection {}: {}", conn.id, e);
            conn.send_event(&ServerEvent::error(
                "message",
                &TripSyncError::MessageParseError(e.to_string()),
            ));
        }
    }
}

/// Map admission rejections to HTTP responses on the upgrade request
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, code, message) = if let Some(AdmissionError(e)) = err.find::<AdmissionError>() {
        let status = match e {
            TripSyncError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            TripSyncError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            TripSyncError::Forbidden => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, e.code(), e.to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not-found", "Not found".to_string())
    } else {
        error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "server-error",
            "Internal server error".to_string(),
        )
    };

    let body = warp::reply::json(&json!({ "code": code, "message": message }));
    Ok(warp::reply::with_status(body, status))
}
