use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::ChannelGuard;
use crate::engine::session::{
    BoundSocket, ChannelMeta, HandshakeData, PacketSource, SessionCommand,
    SessionHandle, SocketFrame, TransportKind,
};
use crate::engine::Engine;
use crate::error::AppError;
use crate::protocol::EnginePacket;

/// Accepts a websocket either as a new session (no `sid`) or as an upgrade
/// probe for an existing polling session.
pub(super) fn upgrade(
    engine: Arc<Engine>,
    ws: WebSocketUpgrade,
    sid: Option<String>,
    handshake: HandshakeData,
) -> Result<Response, AppError> {
    let target = match sid {
        Some(sid) => Some(engine.session(&sid).ok_or_else(|| {
            tracing::warn!(%sid, "websocket for an unknown session");
            AppError::UnknownSession(sid.clone())
        })?),
        None => None,
    };
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, engine, target, handshake)))
}

async fn handle_socket(
    socket: WebSocket,
    engine: Arc<Engine>,
    target: Option<SessionHandle>,
    handshake: HandshakeData,
) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    // Frames the session wants written to this socket
    let (tx, mut rx) = mpsc::unbounded_channel::<SocketFrame>();
    let channel = engine.next_channel_id();
    let bound = BoundSocket { channel, tx };

    let handle = match target {
        None => engine.open_session(TransportKind::WebSocket, handshake, Some(bound)),
        Some(handle) => {
            let meta = ChannelMeta {
                origin: handshake.origin,
                user_agent: handshake.user_agent,
            };
            if !handle.send(SessionCommand::AttachProbe {
                socket: bound,
                meta,
            }) {
                let _ = ws_sink.send(Message::Close(None)).await;
                return;
            }
            handle
        }
    };
    let guard = ChannelGuard::new(handle.clone(), channel);

    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Some(SocketFrame::Packet(packet)) => {
                    if ws_sink.send(Message::Text(packet.encode().into())).await.is_err() {
                        break;
                    }
                }
                Some(SocketFrame::Close) | None => {
                    let _ = ws_sink.send(Message::Close(None)).await;
                    guard.disarm();
                    return;
                }
            },
            msg = ws_stream.next() => match msg {
                Some(Ok(Message::Text(text))) => match EnginePacket::decode(text.as_str()) {
                    Ok(packet) => {
                        handle.send(SessionCommand::Inbound {
                            source: PacketSource::Socket(channel),
                            packets: vec![packet],
                        });
                    }
                    Err(e) => {
                        tracing::warn!(session = %handle.id(), channel, "undecodable frame: {e}");
                    }
                },
                Some(Ok(Message::Binary(_))) => {
                    tracing::warn!(session = %handle.id(), channel, "binary frames are not supported");
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    }
    tracing::debug!(session = %handle.id(), channel, "websocket closed by peer");
}
