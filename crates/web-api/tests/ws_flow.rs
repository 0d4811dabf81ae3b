mod support;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};

use support::{spawn_app, TestBackend};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect_ws(addr: std::net::SocketAddr) -> WsClient {
    let (ws, _) = connect_async(format!("ws://{}/api/ws", addr))
        .await
        .expect("ws connect");
    ws
}

async fn send_json(ws: &mut WsClient, payload: Value) {
    ws.send(TungsteniteMessage::Text(payload.to_string().into()))
        .await
        .expect("ws send");
}

async fn recv_json(ws: &mut WsClient) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for ws frame")
        .expect("ws stream ended")
        .expect("ws frame");
    match msg {
        TungsteniteMessage::Text(payload) => serde_json::from_str(&payload).expect("json"),
        other => panic!("unexpected message {other:?}"),
    }
}

async fn authenticate(ws: &mut WsClient, token: &str) {
    send_json(ws, json!({ "type": 0, "token": token })).await;
    let reply = recv_json(ws).await;
    assert_eq!(reply["status"], "success", "auth reply: {reply}");
}

#[tokio::test]
async fn in_band_authentication_succeeds() {
    let backend = TestBackend::new();
    let (addr, shutdown_tx) = spawn_app(backend.build_router()).await;

    let mut ws = connect_ws(addr).await;
    authenticate(&mut ws, "alice-token").await;

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn invalid_token_is_rejected_in_band_and_connection_survives() {
    let backend = TestBackend::new();
    let (addr, shutdown_tx) = spawn_app(backend.build_router()).await;

    let mut ws = connect_ws(addr).await;
    send_json(&mut ws, json!({ "type": 0, "token": "forged" })).await;
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["reason"], "invalid token: signature mismatch");

    // 同一条连接仍然可以用正确的令牌认证
    authenticate(&mut ws, "alice-token").await;

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn chat_send_before_authentication_is_rejected_in_band() {
    let backend = TestBackend::new();
    let chat = backend.chat;
    let (addr, shutdown_tx) = spawn_app(backend.build_router()).await;

    let mut ws = connect_ws(addr).await;
    send_json(
        &mut ws,
        json!({ "type": 2, "chat": chat, "message": "hi", "content-type": "message" }),
    )
    .await;
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["reason"], "unauthenticated connection");

    authenticate(&mut ws, "alice-token").await;

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn chat_send_fans_out_to_other_members_but_not_the_sender() {
    let backend = TestBackend::new();
    let chat = backend.chat;
    let (addr, shutdown_tx) = spawn_app(backend.build_router()).await;

    let mut alice_ws = connect_ws(addr).await;
    authenticate(&mut alice_ws, "alice-token").await;
    let mut bob_ws = connect_ws(addr).await;
    authenticate(&mut bob_ws, "bob-token").await;

    send_json(
        &mut alice_ws,
        json!({ "type": 2, "chat": chat, "message": "hello bob", "content-type": "message" }),
    )
    .await;

    // 发送方只看到成功应答
    let reply = recv_json(&mut alice_ws).await;
    assert_eq!(reply["status"], "success");

    // bob 收到完整的投递推送
    let delivery = recv_json(&mut bob_ws).await;
    assert_eq!(delivery["type"], 1);
    assert_eq!(delivery["message"], "hello bob");
    assert_eq!(delivery["chat"], chat.to_string());
    assert_eq!(delivery["sender"], "alice");
    assert_eq!(delivery["content-type"], 0);

    // 没有自我投递
    let self_delivery =
        tokio::time::timeout(Duration::from_millis(300), alice_ws.next()).await;
    assert!(self_delivery.is_err(), "sender must not receive its own message");

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn unknown_envelope_kind_is_answered_without_closing() {
    let backend = TestBackend::new();
    let (addr, shutdown_tx) = spawn_app(backend.build_router()).await;

    let mut ws = connect_ws(addr).await;
    authenticate(&mut ws, "alice-token").await;

    send_json(&mut ws, json!({ "type": 42 })).await;
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["reason"], "invalid message type");

    send_json(&mut ws, json!("not an object")).await;
    let reply = recv_json(&mut ws).await;
    assert_eq!(reply["status"], "error");
    assert!(reply["reason"]
        .as_str()
        .expect("reason")
        .starts_with("unable to decode JSON"));

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn ping_is_answered_with_matching_pong() {
    let backend = TestBackend::new();
    let (addr, shutdown_tx) = spawn_app(backend.build_router()).await;

    let mut ws = connect_ws(addr).await;
    let ping_data = b"keep-alive probe";
    ws.send(TungsteniteMessage::Ping(ping_data.to_vec().into()))
        .await
        .expect("send ping");

    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for pong")
        .expect("ws stream ended")
        .expect("ws frame");
    match msg {
        TungsteniteMessage::Pong(data) => assert_eq!(data.as_ref(), ping_data),
        other => panic!("expected pong, got {other:?}"),
    }

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn http_send_message_reaches_websocket_members() {
    let backend = TestBackend::new();
    let chat = backend.chat;
    let (addr, shutdown_tx) = spawn_app(backend.build_router()).await;

    let mut bob_ws = connect_ws(addr).await;
    authenticate(&mut bob_ws, "bob-token").await;

    let client = Client::new();
    let response = client
        .post(format!("http://{}/api/chats/{}/messages", addr, chat))
        .header("authorization", "Bearer alice-token")
        .json(&json!({ "message": "over http", "content-type": "message" }))
        .send()
        .await
        .expect("send message");
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.expect("response json");
    assert_eq!(body["message"], "over http");
    assert_eq!(body["chat"], chat.to_string());

    let delivery = recv_json(&mut bob_ws).await;
    assert_eq!(delivery["type"], 1);
    assert_eq!(delivery["message"], "over http");
    assert_eq!(delivery["sender"], "alice");

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn http_send_message_requires_membership_and_a_valid_token() {
    let backend = TestBackend::new();
    let chat = backend.chat;
    let (addr, shutdown_tx) = spawn_app(backend.build_router()).await;
    let client = Client::new();

    let response = client
        .post(format!("http://{}/api/chats/{}/messages", addr, chat))
        .header("authorization", "Bearer forged")
        .json(&json!({ "message": "hi", "content-type": "message" }))
        .send()
        .await
        .expect("send message");
    assert_eq!(response.status(), 401);

    let unknown_chat = uuid::Uuid::new_v4();
    let response = client
        .post(format!(
            "http://{}/api/chats/{}/messages",
            addr, unknown_chat
        ))
        .header("authorization", "Bearer alice-token")
        .json(&json!({ "message": "hi", "content-type": "message" }))
        .send()
        .await
        .expect("send message");
    assert_eq!(response.status(), 404);

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn health_endpoint_answers() {
    let backend = TestBackend::new();
    let (addr, shutdown_tx) = spawn_app(backend.build_router()).await;

    let response = reqwest::get(format!("http://{}/health", addr))
        .await
        .expect("health request");
    assert_eq!(response.status(), 200);

    let _ = shutdown_tx.send(());
}
