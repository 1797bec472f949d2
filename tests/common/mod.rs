#![allow(dead_code)]

use axum::body::Body;
use http::{Method, Request};
use pulseserver::config::Config;
use pulseserver::engine::{AckSender, Engine, SocketClient};
use pulseserver::namespace::{EventListener, ListenerTable};
use pulseserver::protocol::{EnginePacket, Framing, PacketType};
use pulseserver::routes;
use pulseserver::state::AppState;
use pulseserver::store::{MemoryPubSubStore, PubSubStore};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

/// Timeouts short enough that expiry paths run within a test.
pub fn fast_config() -> Config {
    Config {
        ping_interval: Duration::from_millis(200),
        ping_timeout: Duration::from_millis(200),
        upgrade_timeout: Duration::from_millis(150),
        poll_timeout: Duration::from_millis(100),
        ack_timeout: Duration::from_millis(150),
        max_payload_bytes: 1024,
        ..Config::default()
    }
}

/// Everything a listener saw, in order, as `"<hook>:<namespace>:<detail>"`.
#[derive(Default)]
pub struct Recorder {
    pub events: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, entry: String) {
        self.events.lock().unwrap().push(entry);
    }
}

impl EventListener for Recorder {
    fn on_connect(&self, client: &SocketClient) {
        self.push(format!("connect:{}", client.namespace()));
    }

    fn on_disconnect(
        &self,
        client: &SocketClient,
        reason: pulseserver::engine::session::DisconnectReason,
    ) {
        self.push(format!("disconnect:{}:{}", client.namespace(), reason.as_str()));
    }

    fn on_event(&self, client: &SocketClient, event: &str, args: Vec<Value>, ack: Option<AckSender>) {
        self.push(format!(
            "event:{}:{event}:{}",
            client.namespace(),
            Value::Array(args.clone())
        ));
        match event {
            "join" => {
                if let Some(room) = args.first().and_then(Value::as_str) {
                    client.join_room(room);
                }
            }
            "echo" => match ack {
                Some(ack) => {
                    ack.send(args);
                }
                None => {
                    client.send_event("echo", args);
                }
            },
            _ => {}
        }
    }
}

/// Engine plus router over an in-memory store. Each instance is isolated.
pub struct TestServer {
    pub engine: Arc<Engine>,
    pub state: AppState,
    pub recorder: Arc<Recorder>,
}

impl TestServer {
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    pub fn with_config(config: Config) -> Self {
        let store: Arc<dyn PubSubStore> = Arc::new(MemoryPubSubStore::new(config.node_id.clone()));
        Self::with_store(config, store)
    }

    /// Registers the recorder for connect/disconnect on `/` and `/chat`, and
    /// for the `join` and `echo` events.
    pub fn with_store(config: Config, store: Arc<dyn PubSubStore>) -> Self {
        let recorder = Arc::new(Recorder::default());
        let listener: Arc<dyn EventListener> = recorder.clone();
        let mut builder = ListenerTable::builder();
        for ns in ["/", "/chat"] {
            builder = builder
                .on_connect(ns, Arc::clone(&listener))
                .on_disconnect(ns, Arc::clone(&listener))
                .on_event(ns, "join", Arc::clone(&listener))
                .on_event(ns, "echo", Arc::clone(&listener));
        }
        let engine = Engine::new(config, builder.build(), store);
        Self {
            state: AppState::new(Arc::clone(&engine)),
            engine,
            recorder,
        }
    }

    /// Returns an Axum Router wired to this server's state for `oneshot()` calls.
    pub fn router(&self) -> axum::Router {
        routes::router(self.state.clone())
    }

    /// Binds a TCP listener on port 0, spawns the server, and returns the base URL.
    pub async fn spawn(&self) -> String {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("127.0.0.1:{}", addr.port())
    }

    pub async fn request(&self, request: Request<Body>) -> axum::response::Response {
        self.router().oneshot(request).await.unwrap()
    }

    /// Handshakes over polling; returns the session id and the packets of the
    /// first response.
    pub async fn handshake(&self) -> (String, Vec<EnginePacket>) {
        let response = self
            .request(get("/socket.io/?EIO=3&transport=polling"))
            .await;
        assert_eq!(response.status(), http::StatusCode::OK);
        let packets = decode_payload(&body_bytes(response).await);
        assert_eq!(packets[0].kind, PacketType::Open);
        let open: Value = serde_json::from_str(&packets[0].data).unwrap();
        (open["sid"].as_str().unwrap().to_string(), packets)
    }

    pub async fn poll(&self, sid: &str) -> Vec<EnginePacket> {
        let response = self
            .request(get(&format!("/socket.io/?EIO=3&transport=polling&sid={sid}")))
            .await;
        assert_eq!(response.status(), http::StatusCode::OK);
        decode_payload(&body_bytes(response).await)
    }

    /// Keeps polling until `count` packets arrived; replies to listener
    /// calls can land in a later response than the packets that caused them.
    pub async fn poll_at_least(&self, sid: &str, count: usize) -> Vec<EnginePacket> {
        let mut packets = Vec::new();
        while packets.len() < count {
            packets.extend(
                self.poll(sid)
                    .await
                    .into_iter()
                    .filter(|packet| packet.kind != PacketType::Noop),
            );
        }
        packets
    }

    pub async fn post(&self, sid: &str, packets: &[EnginePacket]) -> axum::response::Response {
        self.request(post(
            &format!("/socket.io/?EIO=3&transport=polling&sid={sid}"),
            encode_text_payload(packets),
        ))
        .await
    }
}

// ---------------------------------------------------------------------------
// Request builder helpers
// ---------------------------------------------------------------------------

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("Content-Type", "text/plain;charset=UTF-8")
        .body(body.into())
        .unwrap()
}

pub async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn parse_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// `<len>:<packet>` records, lengths counted in characters.
pub fn encode_text_payload(packets: &[EnginePacket]) -> String {
    packets
        .iter()
        .map(|packet| {
            let encoded = packet.encode();
            format!("{}:{encoded}", encoded.chars().count())
        })
        .collect()
}

/// Decodes a polling response body in the default (binary) framing.
pub fn decode_payload(body: &[u8]) -> Vec<EnginePacket> {
    Framing::default().decode(body).unwrap()
}

pub async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub fn message(data: &str) -> EnginePacket {
    EnginePacket::new(PacketType::Message, data)
}

/// Waits until `check` holds, polling every few milliseconds.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
