//! 单条 WebSocket 连接的入站与出站循环
//!
//! 入站循环驱动协议会话状态机并对读操作施加对端超时；出站循环是
//! 传输层唯一的写入方，消费有界出站队列并按对端超时窗口的 9/10
//! 发送心跳。任意一侧失败都会触发注册中心的幂等注销。

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, trace, warn};

use config::RealtimeConfig;
use infrastructure::{ConnectionHandle, OutboundFrame, Session, SessionEnd};

use crate::state::AppState;

const INTERNAL_ERROR_REPLY: &str = r#"{"status":"error","reason":"internal server error"}"#;
const BINARY_FRAME_REPLY: &str = r#"{"status":"error","reason":"binary frames are not supported"}"#;

pub async fn serve(socket: WebSocket, peer: SocketAddr, state: AppState) {
    debug!(%peer, "websocket connection established");

    let (sink, stream) = socket.split();
    let (handle, rx) = state.hub.register(peer).await;
    let session = Session::new(state.hub.clone(), state.collaborators.clone(), handle.clone());

    let realtime = state.realtime.clone();
    let mut send_task = tokio::spawn(outbound_loop(sink, rx, realtime.clone(), peer));
    let mut recv_task = tokio::spawn(inbound_loop(stream, session, handle, realtime, peer));

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => {}
    }

    // 注销关闭出站队列，让出站循环清空后自行退出
    state.hub.unregister(peer).await;
    if !send_task.is_finished() {
        let _ = send_task.await;
    }
    debug!(%peer, "websocket connection closed");
}

async fn inbound_loop(
    mut stream: SplitStream<WebSocket>,
    mut session: Session,
    handle: Arc<ConnectionHandle>,
    realtime: RealtimeConfig,
    peer: SocketAddr,
) {
    loop {
        let frame = match timeout(realtime.peer_timeout(), stream.next()).await {
            Err(_) => {
                debug!(%peer, "peer timed out");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(err))) => {
                debug!(%peer, %err, "transport error on read");
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            WsMessage::Text(text) => match session.handle_frame(text.as_str()).await {
                Ok(()) => {}
                Err(SessionEnd::QueueUnavailable) => break,
                Err(SessionEnd::Defect(reason)) => {
                    error!(%peer, %reason, "internal defect while handling frame");
                    let _ =
                        handle.enqueue(OutboundFrame::Envelope(INTERNAL_ERROR_REPLY.to_string()));
                    // 给出站循环一点时间把通知写出去
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    break;
                }
            },
            WsMessage::Binary(_) => {
                trace!(%peer, "binary frame rejected");
                if handle
                    .enqueue(OutboundFrame::Envelope(BINARY_FRAME_REPLY.to_string()))
                    .is_err()
                {
                    break;
                }
            }
            WsMessage::Ping(data) => {
                if handle.enqueue(OutboundFrame::Pong(data.to_vec())).is_err() {
                    break;
                }
            }
            WsMessage::Pong(_) => {}
            WsMessage::Close(_) => {
                trace!(%peer, "close frame received");
                break;
            }
        }
    }
}

async fn outbound_loop(
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::Receiver<OutboundFrame>,
    realtime: RealtimeConfig,
    peer: SocketAddr,
) {
    let mut ping = interval(realtime.ping_period());
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // interval 的第一次 tick 立即完成
    ping.tick().await;

    loop {
        tokio::select! {
            frame = rx.recv() => {
                let Some(frame) = frame else {
                    // 队列已关闭：尽力发一个关闭帧后退出
                    let _ = timeout(realtime.write_timeout(), sink.send(WsMessage::Close(None))).await;
                    break;
                };
                if write_batch(&mut sink, frame, &mut rx, &realtime, peer).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                match timeout(realtime.write_timeout(), sink.send(WsMessage::Ping(Vec::new().into()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        debug!(%peer, %err, "keep-alive ping failed");
                        break;
                    }
                    Err(_) => {
                        warn!(%peer, "keep-alive ping exceeded write deadline");
                        break;
                    }
                }
            }
        }
    }
}

/// 把一帧连同已排队的后续帧写出，整体受单次写截止时间约束
async fn write_batch(
    sink: &mut SplitSink<WebSocket, WsMessage>,
    frame: OutboundFrame,
    rx: &mut mpsc::Receiver<OutboundFrame>,
    realtime: &RealtimeConfig,
    peer: SocketAddr,
) -> Result<(), ()> {
    let result = timeout(realtime.write_timeout(), async {
        sink.feed(to_ws_message(frame)).await?;
        while let Ok(queued) = rx.try_recv() {
            sink.feed(to_ws_message(queued)).await?;
        }
        sink.flush().await
    })
    .await;

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => {
            debug!(%peer, %err, "transport error on write");
            Err(())
        }
        Err(_) => {
            warn!(%peer, "write deadline exceeded");
            Err(())
        }
    }
}

fn to_ws_message(frame: OutboundFrame) -> WsMessage {
    match frame {
        OutboundFrame::Envelope(text) => WsMessage::Text(text.into()),
        OutboundFrame::Pong(data) => WsMessage::Pong(data.into()),
    }
}
