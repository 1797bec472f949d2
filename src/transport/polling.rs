use axum::body::Bytes;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

use super::{ChannelGuard, EngineQuery};
use crate::engine::session::{
    ChannelMeta, DisconnectReason, HandshakeData, PacketSource, SessionCommand,
    SessionHandle, TransportKind,
};
use crate::engine::Engine;
use crate::error::AppError;
use crate::protocol::{EnginePacket, Framing, PacketType};

pub(super) async fn handle(
    engine: Arc<Engine>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    params: HashMap<String, String>,
    query: EngineQuery,
    body: Bytes,
) -> Result<Response, AppError> {
    let framing = query.framing;
    let Some(sid) = query.sid else {
        if method == Method::GET && !query.disconnect {
            return Ok(handshake(&engine, uri, headers, params, framing).await);
        }
        tracing::warn!(%method, "polling request without a session id");
        return Err(AppError::UnknownSession(String::new()));
    };
    let handle = engine.session(&sid).ok_or_else(|| {
        tracing::warn!(%sid, %method, "unknown session");
        AppError::UnknownSession(sid.clone())
    })?;

    if query.disconnect {
        handle.disconnect(DisconnectReason::ClientDisconnect);
        return Ok(ok_response());
    }

    match method {
        Method::GET => Ok(on_get(&engine, &handle, framing, ChannelMeta::from_headers(&headers)).await),
        Method::POST => on_post(&engine, &handle, framing, &body),
        Method::OPTIONS => Ok(StatusCode::OK.into_response()),
        other => {
            tracing::warn!(session = %handle.id(), method = %other, "unsupported polling method");
            Err(AppError::UnsupportedMethod(other.to_string()))
        }
    }
}

/// A GET without a session id opens a new session and answers with its open
/// packet.
async fn handshake(
    engine: &Arc<Engine>,
    uri: Uri,
    headers: HeaderMap,
    params: HashMap<String, String>,
    framing: Framing,
) -> Response {
    let meta = ChannelMeta::from_headers(&headers);
    let handshake = HandshakeData::new(headers, uri.to_string(), params);
    let handle = engine.open_session(TransportKind::Polling, handshake, None);
    on_get(engine, &handle, framing, meta).await
}

/// Binds the request as the session's polling channel and waits for packets,
/// answering with a noop once the long-poll timeout runs out.
async fn on_get(
    engine: &Engine,
    handle: &SessionHandle,
    framing: Framing,
    meta: ChannelMeta,
) -> Response {
    let channel = engine.next_channel_id();
    let (reply, mut rx) = oneshot::channel();
    if !handle.send(SessionCommand::Poll {
        channel,
        reply,
        meta,
    }) {
        return payload_response(framing, &[EnginePacket::empty(PacketType::Close)]);
    }
    let guard = ChannelGuard::new(handle.clone(), channel);

    let packets = match tokio::time::timeout(engine.config().poll_timeout, &mut rx).await {
        Ok(Ok(packets)) => packets,
        // The session dropped the request while closing.
        Ok(Err(_)) => vec![EnginePacket::empty(PacketType::Close)],
        Err(_) => {
            rx.close();
            rx.try_recv()
                .unwrap_or_else(|_| vec![EnginePacket::empty(PacketType::Noop)])
        }
    };
    guard.disarm();
    payload_response(framing, &packets)
}

fn on_post(
    engine: &Engine,
    handle: &SessionHandle,
    framing: Framing,
    body: &[u8],
) -> Result<Response, AppError> {
    let limit = engine.config().max_payload_bytes;
    if body.len() > limit {
        return Err(AppError::PayloadTooLarge(format!(
            "payload exceeds {limit} bytes"
        )));
    }
    let packets = framing.decode(body).map_err(|e| {
        tracing::warn!(session = %handle.id(), "undecodable polling payload: {e}");
        AppError::from(e)
    })?;
    handle.send(SessionCommand::Inbound {
        source: PacketSource::Polling,
        packets,
    });
    Ok(ok_response())
}

fn ok_response() -> Response {
    ([(header::CONTENT_TYPE, "text/html")], "ok").into_response()
}

fn payload_response(framing: Framing, packets: &[EnginePacket]) -> Response {
    (
        [(header::CONTENT_TYPE, framing.content_type())],
        framing.encode(packets),
    )
        .into_response()
}
