//! tagwire relay.
//!
//! One WebSocket per client, one JSON event per text frame. Each connection
//! gets a bounded outbound queue drained by its own writer task; envelopes
//! addressed to the connection are verified there, right before they are
//! written out.

#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod registry;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;

use tagwire_core::envelope::{MAX_ENVELOPE_CHARS, MAX_PLAINTEXT_LENGTH};
use tagwire_core::{ClientRequest, KeyPolicy, ServerEvent};

pub use config::{ServerArgs, ServerConfig};
pub use coordinator::ExchangeCoordinator;
pub use error::ServerError;
pub use registry::{ConnectionHandle, ConnectionId, Outbound, SessionRegistry};

// Largest request frame: a maximal plaintext with every byte JSON-escaped as
// `\u00XX`, or a tamper_message with a maximal envelope, plus names and
// framing.
const MAX_ESCAPED_PLAINTEXT: usize = 6 * MAX_PLAINTEXT_LENGTH;
const MAX_REQUEST_BYTES: usize = 1024
    + if MAX_ESCAPED_PLAINTEXT > MAX_ENVELOPE_CHARS {
        MAX_ESCAPED_PLAINTEXT
    } else {
        MAX_ENVELOPE_CHARS
    };

type IpConnMap = Arc<DashMap<IpAddr, usize>>;

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, config: ServerConfig) -> Result<(), ServerError> {
    let listener = TcpListener::bind(addr).await?;
    run_server(listener, config).await
}

/// Accept connections on `listener` forever.
///
/// # Errors
///
/// Fails before accepting anything if the master key is invalid.
pub async fn run_server(listener: TcpListener, config: ServerConfig) -> Result<(), ServerError> {
    let keys = config.key_policy()?;

    tracing::info!(
        addr = %listener.local_addr()?,
        key = %keys.fingerprint(),
        roster = config.roster.len(),
        queue_depth = config.queue_depth,
        "relay listening"
    );

    let coordinator = coordinator_with(keys, &config.roster);
    accept_loop(listener, coordinator, config).await
}

/// Accept loop over an already-built coordinator.
pub async fn accept_loop(
    listener: TcpListener,
    coordinator: Arc<ExchangeCoordinator>,
    config: ServerConfig,
) -> Result<(), ServerError> {
    let ip_conns: IpConnMap = Arc::new(DashMap::new());
    let mut next_conn: u64 = 0;

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                continue;
            }
        };

        let ip = peer_addr.ip();
        {
            let mut count = ip_conns.entry(ip).or_insert(0);
            if *count >= config.max_conn_per_ip {
                tracing::warn!(%ip, "per-ip connection limit reached");
                continue;
            }
            *count += 1;
        }

        next_conn += 1;
        let conn = ConnectionId(next_conn);
        let coordinator = coordinator.clone();
        let ip_conns = ip_conns.clone();
        let depth = config.queue_depth;

        tokio::spawn(async move {
            tracing::debug!(%conn, %peer_addr, "connection accepted");
            if let Err(e) = handle_connection(stream, coordinator, conn, depth).await {
                tracing::debug!(%conn, error = %e, "connection ended with error");
            }
            ip_conns.entry(ip).and_modify(|c| *c = c.saturating_sub(1));
            ip_conns.remove_if(&ip, |_, c| *c == 0);
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    coordinator: Arc<ExchangeCoordinator>,
    conn: ConnectionId,
    depth: usize,
) -> Result<(), ServerError> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let (tx, mut rx) = mpsc::channel::<Outbound>(depth);
    let handle = ConnectionHandle::new(conn, tx);

    // Writer task - owns ws_tx
    let writer_coordinator = coordinator.clone();
    tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            let event = match item {
                Outbound::Event(event) => event,
                Outbound::Envelope(envelope) => writer_coordinator.receive(&envelope),
            };
            let text = match event.to_json() {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(%conn, error = %e, "event not serializable");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let result = read_loop(&mut ws_rx, &coordinator, &handle).await;

    coordinator.disconnect(conn);
    tracing::debug!(%conn, "connection closed");
    result
}

async fn read_loop<S>(
    ws_rx: &mut S,
    coordinator: &ExchangeCoordinator,
    handle: &ConnectionHandle,
) -> Result<(), ServerError>
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg) = ws_rx.next().await {
        match msg? {
            Message::Text(text) => {
                if text.len() > MAX_REQUEST_BYTES {
                    handle.notify(ServerEvent::status("request too large"));
                    continue;
                }
                match ClientRequest::from_json(&text) {
                    Ok(request) => coordinator.handle(handle, request),
                    Err(_) => handle.notify(ServerEvent::status(
                        "invalid request: expected register_user, send_message or tamper_message",
                    )),
                }
            }
            Message::Binary(_) => {
                handle.notify(ServerEvent::status("binary frames are not supported"));
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}

/// Coordinator over a fresh registry, for embedding the relay in-process.
pub fn coordinator_with(keys: KeyPolicy, roster: &[String]) -> Arc<ExchangeCoordinator> {
    let registry = if roster.is_empty() {
        SessionRegistry::new()
    } else {
        SessionRegistry::with_roster(roster.iter().cloned())
    };
    Arc::new(ExchangeCoordinator::new(Arc::new(registry), Arc::new(keys)))
}
