use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Path, State, WebSocketUpgrade},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, warn};
use uuid::Uuid;

use domain::envelope::{ChatDelivery, ChatSend};
use domain::{ChatId, ContentKind, UserId};

use crate::{error::ApiError, state::AppState, ws_connection};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/ws", get(ws_upgrade))
        .route("/api/chats/{chat_id}/messages", post(send_message))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// WebSocket 升级；认证在通道内用认证信封完成
async fn ws_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.max_message_size(state.realtime.max_frame_bytes)
        .on_upgrade(move |socket| ws_connection::serve(socket, peer, state))
}

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    #[serde(default)]
    message: String,
    #[serde(default)]
    filename: String,
    #[serde(rename = "content-type", default)]
    content_type: String,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    id: Uuid,
    chat: ChatId,
    sender: UserId,
    #[serde(rename = "content-type")]
    content_type: ContentKind,
    message: String,
    created_at: DateTime<Utc>,
}

/// 走 HTTP 的消息发送：持久化后向收件人的在线设备扇出
async fn send_message(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<SendMessagePayload>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let token = bearer_token(&headers)?;
    let user = state.collaborators.tokens.validate(token).await?;

    let send = ChatSend {
        chat: chat_id,
        message: payload.message,
        filename: payload.filename,
        content_type: payload.content_type,
    };
    let kind = send.validate()?;

    let chat = ChatId(chat_id);
    if !state.collaborators.directory.is_member(chat, user.id).await? {
        return Err(ApiError::forbidden("user is not part of specified chat"));
    }

    let record = state
        .collaborators
        .messages
        .create_message(chat, user.id, kind, &send.message)
        .await?;

    // 推送失败不影响响应：消息已经落库
    match state.collaborators.directory.members(chat).await {
        Ok(members) => {
            let delivery = ChatDelivery::new(chat_id, user.username.clone(), kind, send.message);
            for member in members.iter().filter(|member| member.id != user.id) {
                if let Err(err) = state.hub.push_to_user(member.id, &delivery).await {
                    error!(chat = %chat_id, recipient = %member.id, %err, "failed to push message");
                }
            }
        }
        Err(err) => {
            warn!(chat = %chat_id, %err, "member lookup failed, skipping fan-out");
        }
    }

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            id: record.id,
            chat: record.chat,
            sender: record.sender,
            content_type: record.kind,
            message: record.body,
            created_at: record.created_at,
        }),
    ))
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing authorization header"))?;
    value
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("authorization header must carry a bearer token"))
}
