//! HTTP entry point for both transports.
//!
//! Everything under the context path lands in [`engine_entry`], which reads
//! the query string and hands the request to the polling or websocket side.

pub mod polling;
pub mod websocket;

use axum::body::Bytes;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, Method, Uri};
use axum::response::Response;
use std::collections::HashMap;

use crate::engine::session::{
    ChannelId, HandshakeData, SessionCommand, SessionHandle, TransportKind,
};
use crate::error::AppError;
use crate::protocol::Framing;
use crate::state::AppState;

/// The query parameters the engine understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineQuery {
    pub transport: TransportKind,
    pub sid: Option<String>,
    pub framing: Framing,
    pub disconnect: bool,
}

impl EngineQuery {
    pub fn parse(params: &HashMap<String, String>) -> Result<Self, AppError> {
        let transport = match params.get("transport") {
            Some(name) => TransportKind::parse(name)
                .ok_or_else(|| AppError::BadRequest(format!("unknown transport: {name}")))?,
            None => return Err(AppError::BadRequest("missing transport".to_string())),
        };
        let jsonp = match params.get("j") {
            Some(index) => Some(
                index
                    .parse::<u32>()
                    .map_err(|_| AppError::BadRequest(format!("invalid jsonp index: {index}")))?,
            ),
            None => None,
        };
        let b64 = match params.get("b64").map(String::as_str) {
            None | Some("false") | Some("0") => false,
            Some("true") | Some("1") => true,
            Some(other) => {
                return Err(AppError::BadRequest(format!("invalid b64 flag: {other}")));
            }
        };
        Ok(Self {
            transport,
            sid: params.get("sid").filter(|sid| !sid.is_empty()).cloned(),
            framing: Framing { b64, jsonp },
            disconnect: params.contains_key("disconnect"),
        })
    }
}

pub async fn engine_entry(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    body: Bytes,
) -> Result<Response, AppError> {
    let query = EngineQuery::parse(&params)?;
    let engine = state.engine;
    match query.transport {
        TransportKind::Polling => {
            polling::handle(engine, method, uri, headers, params, query, body).await
        }
        TransportKind::WebSocket => {
            let ws = ws.map_err(|e| AppError::BadRequest(format!("websocket upgrade failed: {e}")))?;
            let handshake = HandshakeData::new(headers, uri.to_string(), params);
            websocket::upgrade(engine, ws, query.sid, handshake)
        }
    }
}

/// Tells the session when a channel ends without being answered normally,
/// e.g. because the client went away.
pub(crate) struct ChannelGuard {
    handle: Option<SessionHandle>,
    channel: ChannelId,
}

impl ChannelGuard {
    pub(crate) fn new(handle: SessionHandle, channel: ChannelId) -> Self {
        Self {
            handle: Some(handle),
            channel,
        }
    }

    /// The channel finished normally; nothing to report.
    pub(crate) fn disarm(mut self) {
        self.handle = None;
    }
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.send(SessionCommand::ChannelClosed {
                channel: self.channel,
            });
        }
    }
}
