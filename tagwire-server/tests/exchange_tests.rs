use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use tagwire_core::{ClientRequest, ServerEvent, VerdictStatus};
use tagwire_server::{run_server, ServerConfig};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_relay(config: ServerConfig) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = run_server(listener, config).await;
    });
    format!("ws://{}", addr)
}

async fn send(ws: &mut Ws, request: ClientRequest) {
    ws.send(Message::Text(request.to_json().unwrap()))
        .await
        .unwrap();
}

async fn recv(ws: &mut Ws) -> ServerEvent {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(3), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = msg {
            return ServerEvent::from_json(&text).unwrap();
        }
    }
}

async fn recv_status(ws: &mut Ws) -> String {
    match recv(ws).await {
        ServerEvent::StatusUpdate { msg } => msg,
        other => panic!("expected status_update, got {:?}", other),
    }
}

async fn assert_silent(ws: &mut Ws) {
    let res = tokio::time::timeout(Duration::from_millis(300), ws.next()).await;
    assert!(res.is_err(), "expected no traffic, got {:?}", res);
}

async fn join(url: &str, name: &str) -> Ws {
    let (mut ws, _) = connect_async(url).await.unwrap();
    send(
        &mut ws,
        ClientRequest::RegisterUser {
            username: name.into(),
        },
    )
    .await;
    assert!(recv(&mut ws).await.confirms_registration(name));
    ws
}

fn send_request(sender: &str, recipient: &str, message: &str) -> ClientRequest {
    ClientRequest::SendMessage {
        sender: sender.into(),
        recipient: recipient.into(),
        message: message.into(),
    }
}

fn tamper_request(sender: &str, recipient: &str, tampered: &str) -> ClientRequest {
    ClientRequest::TamperMessage {
        sender: sender.into(),
        recipient: recipient.into(),
        tampered_encrypted: tampered.into(),
    }
}

#[tokio::test]
async fn test_send_and_verify_over_websocket() {
    let url = start_relay(ServerConfig::default()).await;
    let mut alice = join(&url, "Alice").await;
    let mut bob = join(&url, "Bob").await;

    send(&mut alice, send_request("Alice", "Bob", "hi")).await;

    let wire = match recv(&mut alice).await {
        ServerEvent::SendSuccess {
            original_message,
            encrypted_message,
            ..
        } => {
            assert_eq!(original_message, "hi");
            assert_ne!(encrypted_message, "hi");
            encrypted_message
        }
        other => panic!("expected send_success, got {:?}", other),
    };

    match recv(&mut bob).await {
        ServerEvent::NewMessage {
            sender,
            integrity_verified,
            decrypted_message,
            encrypted_data,
            associated_data,
            status,
        } => {
            assert_eq!(sender, "Alice");
            assert!(integrity_verified);
            assert_eq!(decrypted_message.as_deref(), Some("hi"));
            assert_eq!(encrypted_data, wire);
            assert_eq!(associated_data, "Alice to Bob");
            assert_eq!(status, VerdictStatus::Verified);
        }
        other => panic!("expected new_message, got {:?}", other),
    }
}

#[tokio::test]
async fn test_control_character_message_fits_request_limit() {
    let url = start_relay(ServerConfig::default()).await;
    let mut alice = join(&url, "Alice").await;
    let mut bob = join(&url, "Bob").await;

    // Each \u{1} is one byte of plaintext but six bytes of JSON.
    for text in [format!("x{}", "\u{1}".repeat(2000)), "\u{1}".repeat(4000)] {
        let request = send_request("Alice", "Bob", &text);
        assert!(request.to_json().unwrap().len() > 8192 + 1024);
        send(&mut alice, request).await;

        match recv(&mut alice).await {
            ServerEvent::SendSuccess {
                original_message, ..
            } => assert_eq!(original_message, text),
            other => panic!("expected send_success, got {:?}", other),
        }
        match recv(&mut bob).await {
            ServerEvent::NewMessage {
                integrity_verified,
                decrypted_message,
                ..
            } => {
                assert!(integrity_verified);
                assert_eq!(decrypted_message, Some(text));
            }
            other => panic!("expected new_message, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_tamper_arbitrary_string() {
    let url = start_relay(ServerConfig::default()).await;
    let mut eve = join(&url, "Eve").await;
    let mut bob = join(&url, "Bob").await;

    send(&mut eve, tamper_request("Eve", "Bob", "hello-this-is-not-a-valid-envelope")).await;

    match recv(&mut eve).await {
        ServerEvent::TamperResult {
            integrity_verified,
            decrypted_message,
            ..
        } => {
            assert!(!integrity_verified);
            assert!(decrypted_message.is_none());
        }
        other => panic!("expected tamper_result, got {:?}", other),
    }
    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn test_tamper_modified_envelope() {
    let url = start_relay(ServerConfig::default()).await;
    let mut alice = join(&url, "Alice").await;
    let mut bob = join(&url, "Bob").await;

    send(&mut alice, send_request("Alice", "Bob", "transfer 10")).await;
    let wire = match recv(&mut alice).await {
        ServerEvent::SendSuccess {
            encrypted_message, ..
        } => encrypted_message,
        other => panic!("expected send_success, got {:?}", other),
    };
    let _ = recv(&mut bob).await;

    // Swap the first character: lands in the nonce
    let replacement = if wire.starts_with('A') { "B" } else { "A" };
    let tampered = format!("{replacement}{}", &wire[1..]);

    send(&mut alice, tamper_request("Alice", "Bob", &tampered)).await;
    match recv(&mut alice).await {
        ServerEvent::TamperResult {
            integrity_verified,
            decrypted_message,
            status,
        } => {
            assert!(!integrity_verified);
            assert!(decrypted_message.is_none());
            assert_eq!(status, VerdictStatus::TagMismatch);
        }
        other => panic!("expected tamper_result, got {:?}", other),
    }
    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn test_unreachable_recipient() {
    let url = start_relay(ServerConfig::default()).await;
    let mut alice = join(&url, "Alice").await;

    send(&mut alice, send_request("Alice", "Bob", "hello?")).await;
    let status = recv_status(&mut alice).await;
    assert!(status.contains("Bob is not connected"), "{status}");
    assert_silent(&mut alice).await;
}

#[tokio::test]
async fn test_invalid_json_gets_status() {
    let url = start_relay(ServerConfig::default()).await;
    let mut alice = join(&url, "Alice").await;

    alice
        .send(Message::Text("{not json".to_string()))
        .await
        .unwrap();
    assert!(recv_status(&mut alice).await.starts_with("invalid request"));

    // Connection stays usable
    send(&mut alice, send_request("Alice", "Nobody", "still here")).await;
    assert!(recv_status(&mut alice).await.contains("Nobody is not connected"));
}

#[tokio::test]
async fn test_empty_message_rejected() {
    let url = start_relay(ServerConfig::default()).await;
    let mut alice = join(&url, "Alice").await;
    let mut bob = join(&url, "Bob").await;

    send(&mut alice, send_request("Alice", "Bob", "")).await;
    assert_eq!(
        recv_status(&mut alice).await,
        "send_message rejected: empty plaintext"
    );
    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn test_sender_spoofing_rejected() {
    let url = start_relay(ServerConfig::default()).await;
    let mut mallory = join(&url, "Mallory").await;
    let mut bob = join(&url, "Bob").await;

    send(&mut mallory, send_request("Alice", "Bob", "it's Alice")).await;
    assert!(recv_status(&mut mallory).await.contains("sender not registered"));
    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn test_roster_refuses_unknown_name() {
    let config = ServerConfig {
        roster: vec!["Alice".into(), "Bob".into()],
        ..ServerConfig::default()
    };
    let url = start_relay(config).await;

    let (mut ws, _) = connect_async(&url).await.unwrap();
    send(
        &mut ws,
        ClientRequest::RegisterUser {
            username: "Mallory".into(),
        },
    )
    .await;
    assert_eq!(
        recv_status(&mut ws).await,
        "register_user rejected: participant not allowed"
    );

    let _alice = join(&url, "Alice").await;
}

#[tokio::test]
async fn test_reregistration_routes_to_newest_connection() {
    let url = start_relay(ServerConfig::default()).await;
    let mut alice = join(&url, "Alice").await;
    let mut old_bob = join(&url, "Bob").await;

    let (mut new_bob, _) = connect_async(&url).await.unwrap();
    send(
        &mut new_bob,
        ClientRequest::RegisterUser {
            username: "Bob".into(),
        },
    )
    .await;
    assert!(recv_status(&mut new_bob).await.contains("previous connection replaced"));

    send(&mut alice, send_request("Alice", "Bob", "which one?")).await;
    let _ = recv(&mut alice).await;

    match recv(&mut new_bob).await {
        ServerEvent::NewMessage {
            decrypted_message, ..
        } => assert_eq!(decrypted_message.as_deref(), Some("which one?")),
        other => panic!("expected new_message, got {:?}", other),
    }
    assert_silent(&mut old_bob).await;
}

#[tokio::test]
async fn test_disconnect_unregisters() {
    let url = start_relay(ServerConfig::default()).await;
    let mut alice = join(&url, "Alice").await;
    let mut bob = join(&url, "Bob").await;

    bob.close(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    send(&mut alice, send_request("Alice", "Bob", "gone?")).await;
    assert!(recv_status(&mut alice).await.contains("Bob is not connected"));
}

#[tokio::test]
async fn test_per_ip_limit() {
    let config = ServerConfig {
        max_conn_per_ip: 1,
        ..ServerConfig::default()
    };
    let url = start_relay(config).await;
    let _first = join(&url, "Alice").await;

    // Dropped at accept: the handshake cannot complete
    let second = tokio::time::timeout(Duration::from_secs(2), connect_async(&url)).await;
    assert!(matches!(second, Ok(Err(_))));
}
