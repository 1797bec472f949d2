pub mod packet;
pub mod payload;

use thiserror::Error;

pub use packet::{EnginePacket, PacketType, SocketPacket, SocketPacketType};
pub use payload::Framing;

/// Engine protocol revision spoken by this server.
pub const PROTOCOL_VERSION: u8 = 3;

/// Errors raised while decoding packets or polling payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty packet")]
    EmptyPacket,

    #[error("unknown packet type {0:?}")]
    UnknownPacketType(char),

    #[error("malformed payload: {0}")]
    MalformedPayload(&'static str),

    #[error("invalid base64 payload")]
    InvalidBase64,

    #[error("invalid json: {0}")]
    InvalidJson(String),

    #[error("binary packets are not supported")]
    BinaryUnsupported,
}
