use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ProtocolError;

/// Engine-level packet types, encoded as a single leading digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketType {
    Open,
    Close,
    Ping,
    Pong,
    Message,
    Upgrade,
    Noop,
}

impl PacketType {
    pub fn code(self) -> char {
        match self {
            PacketType::Open => '0',
            PacketType::Close => '1',
            PacketType::Ping => '2',
            PacketType::Pong => '3',
            PacketType::Message => '4',
            PacketType::Upgrade => '5',
            PacketType::Noop => '6',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            '0' => Some(PacketType::Open),
            '1' => Some(PacketType::Close),
            '2' => Some(PacketType::Ping),
            '3' => Some(PacketType::Pong),
            '4' => Some(PacketType::Message),
            '5' => Some(PacketType::Upgrade),
            '6' => Some(PacketType::Noop),
            _ => None,
        }
    }
}

/// One engine packet: a type and its text data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnginePacket {
    pub kind: PacketType,
    pub data: String,
}

impl EnginePacket {
    pub fn new(kind: PacketType, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }

    pub fn empty(kind: PacketType) -> Self {
        Self::new(kind, String::new())
    }

    /// Wraps a socket packet in a message packet.
    pub fn message(packet: &SocketPacket) -> Self {
        Self::new(PacketType::Message, packet.encode())
    }

    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.data.len() + 1);
        out.push(self.kind.code());
        out.push_str(&self.data);
        out
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let mut chars = text.chars();
        let code = chars.next().ok_or(ProtocolError::EmptyPacket)?;
        let kind = PacketType::from_code(code).ok_or(ProtocolError::UnknownPacketType(code))?;
        Ok(Self::new(kind, chars.as_str()))
    }
}

/// Socket-level packet types carried inside engine message packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocketPacketType {
    Connect,
    Disconnect,
    Event,
    Ack,
    Error,
}

impl SocketPacketType {
    pub fn code(self) -> char {
        match self {
            SocketPacketType::Connect => '0',
            SocketPacketType::Disconnect => '1',
            SocketPacketType::Event => '2',
            SocketPacketType::Ack => '3',
            SocketPacketType::Error => '4',
        }
    }

    fn from_code(code: char) -> Result<Self, ProtocolError> {
        match code {
            '0' => Ok(SocketPacketType::Connect),
            '1' => Ok(SocketPacketType::Disconnect),
            '2' => Ok(SocketPacketType::Event),
            '3' => Ok(SocketPacketType::Ack),
            '4' => Ok(SocketPacketType::Error),
            '5' | '6' => Err(ProtocolError::BinaryUnsupported),
            other => Err(ProtocolError::UnknownPacketType(other)),
        }
    }
}

/// Namespace-addressed packet: `<type>[/nsp,][ack id][json]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketPacket {
    pub kind: SocketPacketType,
    pub namespace: String,
    pub ack_id: Option<u64>,
    pub data: Option<Value>,
}

impl SocketPacket {
    pub fn new(kind: SocketPacketType, namespace: &str) -> Self {
        Self {
            kind,
            namespace: normalize_namespace(namespace),
            ack_id: None,
            data: None,
        }
    }

    pub fn connect(namespace: &str) -> Self {
        Self::new(SocketPacketType::Connect, namespace)
    }

    pub fn disconnect(namespace: &str) -> Self {
        Self::new(SocketPacketType::Disconnect, namespace)
    }

    pub fn event(namespace: &str, name: &str, args: Vec<Value>) -> Self {
        let mut data = Vec::with_capacity(args.len() + 1);
        data.push(Value::String(name.to_string()));
        data.extend(args);
        Self {
            data: Some(Value::Array(data)),
            ..Self::new(SocketPacketType::Event, namespace)
        }
    }

    pub fn ack(namespace: &str, ack_id: u64, args: Vec<Value>) -> Self {
        Self {
            ack_id: Some(ack_id),
            data: Some(Value::Array(args)),
            ..Self::new(SocketPacketType::Ack, namespace)
        }
    }

    pub fn error(namespace: &str, message: &str) -> Self {
        Self {
            data: Some(Value::String(message.to_string())),
            ..Self::new(SocketPacketType::Error, namespace)
        }
    }

    pub fn with_ack_id(mut self, ack_id: u64) -> Self {
        self.ack_id = Some(ack_id);
        self
    }

    /// Event name of an event packet.
    pub fn event_name(&self) -> Option<&str> {
        match (&self.kind, &self.data) {
            (SocketPacketType::Event, Some(Value::Array(items))) => items.first()?.as_str(),
            _ => None,
        }
    }

    /// Arguments of an event (everything after the name) or of an ack.
    pub fn args(&self) -> Vec<Value> {
        match (&self.kind, &self.data) {
            (SocketPacketType::Event, Some(Value::Array(items))) => {
                items.iter().skip(1).cloned().collect()
            }
            (_, Some(Value::Array(items))) => items.clone(),
            (_, Some(other)) => vec![other.clone()],
            (_, None) => Vec::new(),
        }
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push(self.kind.code());
        if self.namespace != "/" {
            out.push_str(&self.namespace);
            out.push(',');
        }
        if let Some(ack_id) = self.ack_id {
            out.push_str(&ack_id.to_string());
        }
        if let Some(data) = &self.data {
            out.push_str(&data.to_string());
        }
        out
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let code = text.chars().next().ok_or(ProtocolError::EmptyPacket)?;
        let kind = SocketPacketType::from_code(code)?;
        let mut rest = &text[code.len_utf8()..];

        let mut namespace = "/";
        if rest.starts_with('/') {
            let end = rest.find(',').unwrap_or(rest.len());
            namespace = &rest[..end];
            rest = rest.get(end + 1..).unwrap_or("");
        }
        // Query strings on the namespace are handshake data, not routing.
        let namespace = namespace.split('?').next().unwrap_or("/");

        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let ack_id = if digits > 0 {
            Some(
                rest[..digits]
                    .parse()
                    .map_err(|_| ProtocolError::MalformedPayload("ack id out of range"))?,
            )
        } else {
            None
        };
        rest = &rest[digits..];

        let data = if rest.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str(rest)
                    .map_err(|e| ProtocolError::InvalidJson(e.to_string()))?,
            )
        };

        Ok(Self {
            kind,
            namespace: normalize_namespace(namespace),
            ack_id,
            data,
        })
    }
}

/// An empty namespace is the root namespace.
pub fn normalize_namespace(namespace: &str) -> String {
    if namespace.is_empty() {
        "/".to_string()
    } else {
        namespace.to_string()
    }
}
