//! Polling payload framing.
//!
//! A polling request or response carries several engine packets at once:
//!
//! - binary (default): per packet `0x00`, the decimal digits of its byte
//!   length as raw values 0-9, `0xFF`, then the packet bytes;
//! - text: `<char length>:<packet>` repeated. With `b64` the text payload
//!   travels base64 encoded, with `j=<n>` it is wrapped in a JSONP callback.

use data_encoding::BASE64;
use serde_json::Value;

use super::packet::EnginePacket;
use super::ProtocolError;

pub const BINARY_CONTENT_TYPE: &str = "application/octet-stream";
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=UTF-8";
pub const JSONP_CONTENT_TYPE: &str = "text/javascript; charset=UTF-8";

const STRING_MARKER: u8 = 0;
const BINARY_MARKER: u8 = 1;
const LENGTH_TERMINATOR: u8 = 0xFF;
const MAX_LENGTH_DIGITS: usize = 20;

/// Per-request framing flags taken from the `b64` and `j` query parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Framing {
    pub b64: bool,
    pub jsonp: Option<u32>,
}

impl Framing {
    pub fn content_type(&self) -> &'static str {
        if self.jsonp.is_some() {
            JSONP_CONTENT_TYPE
        } else if self.b64 {
            TEXT_CONTENT_TYPE
        } else {
            BINARY_CONTENT_TYPE
        }
    }

    pub fn encode(&self, packets: &[EnginePacket]) -> Vec<u8> {
        if let Some(index) = self.jsonp {
            let mut text = encode_text(packets);
            if self.b64 {
                text = BASE64.encode(text.as_bytes());
            }
            return format!("___eio[{index}]({});", Value::String(text)).into_bytes();
        }
        if self.b64 {
            return BASE64.encode(encode_text(packets).as_bytes()).into_bytes();
        }
        encode_binary(packets)
    }

    /// Undoes the JSONP form wrapping and base64 transfer encoding of a
    /// request body, leaving the bare payload.
    pub fn preprocess(&self, body: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let mut body = match self.jsonp {
            Some(_) => unwrap_jsonp_form(body)?,
            None => body.to_vec(),
        };
        if self.b64 {
            let trimmed = body.trim_ascii();
            body = BASE64
                .decode(trimmed)
                .map_err(|_| ProtocolError::InvalidBase64)?;
        }
        Ok(body)
    }

    pub fn decode(&self, body: &[u8]) -> Result<Vec<EnginePacket>, ProtocolError> {
        let payload = self.preprocess(body)?;
        match payload.first() {
            None => Ok(Vec::new()),
            Some(&STRING_MARKER) | Some(&BINARY_MARKER) => decode_binary(&payload),
            Some(_) => {
                let text = std::str::from_utf8(&payload)
                    .map_err(|_| ProtocolError::MalformedPayload("payload is not utf-8"))?;
                decode_text(text)
            }
        }
    }
}

fn encode_text(packets: &[EnginePacket]) -> String {
    let mut out = String::new();
    for packet in packets {
        let encoded = packet.encode();
        out.push_str(&encoded.chars().count().to_string());
        out.push(':');
        out.push_str(&encoded);
    }
    out
}

fn encode_binary(packets: &[EnginePacket]) -> Vec<u8> {
    let mut out = Vec::new();
    for packet in packets {
        let encoded = packet.encode();
        out.push(STRING_MARKER);
        out.extend(encoded.len().to_string().bytes().map(|digit| digit - b'0'));
        out.push(LENGTH_TERMINATOR);
        out.extend_from_slice(encoded.as_bytes());
    }
    out
}

fn decode_text(mut rest: &str) -> Result<Vec<EnginePacket>, ProtocolError> {
    let mut packets = Vec::new();
    while !rest.is_empty() {
        let colon = rest
            .find(':')
            .ok_or(ProtocolError::MalformedPayload("missing length separator"))?;
        let length: usize = rest[..colon]
            .parse()
            .map_err(|_| ProtocolError::MalformedPayload("invalid packet length"))?;
        let body = &rest[colon + 1..];
        let end = match body.char_indices().nth(length) {
            Some((index, _)) => index,
            None if body.chars().count() == length => body.len(),
            None => return Err(ProtocolError::MalformedPayload("truncated packet")),
        };
        packets.push(EnginePacket::decode(&body[..end])?);
        rest = &body[end..];
    }
    Ok(packets)
}

fn decode_binary(mut bytes: &[u8]) -> Result<Vec<EnginePacket>, ProtocolError> {
    let mut packets = Vec::new();
    while let Some(&marker) = bytes.first() {
        match marker {
            STRING_MARKER => {}
            BINARY_MARKER => return Err(ProtocolError::BinaryUnsupported),
            _ => return Err(ProtocolError::MalformedPayload("unknown packet marker")),
        }
        let terminator = bytes
            .iter()
            .position(|b| *b == LENGTH_TERMINATOR)
            .ok_or(ProtocolError::MalformedPayload("missing length terminator"))?;
        let digits = &bytes[1..terminator];
        if digits.is_empty() || digits.len() > MAX_LENGTH_DIGITS {
            return Err(ProtocolError::MalformedPayload("invalid packet length"));
        }
        let mut length: usize = 0;
        for digit in digits {
            if *digit > 9 {
                return Err(ProtocolError::MalformedPayload("invalid packet length"));
            }
            length = length
                .checked_mul(10)
                .and_then(|l| l.checked_add(usize::from(*digit)))
                .ok_or(ProtocolError::MalformedPayload("invalid packet length"))?;
        }
        let start = terminator + 1;
        let end = start
            .checked_add(length)
            .filter(|end| *end <= bytes.len())
            .ok_or(ProtocolError::MalformedPayload("truncated packet"))?;
        let text = std::str::from_utf8(&bytes[start..end])
            .map_err(|_| ProtocolError::MalformedPayload("packet is not utf-8"))?;
        packets.push(EnginePacket::decode(text)?);
        bytes = &bytes[end..];
    }
    Ok(packets)
}

/// JSONP clients post `d=<urlencoded payload>` form bodies.
fn unwrap_jsonp_form(body: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let form = String::from_utf8_lossy(body).replace('+', " ");
    let encoded = form
        .strip_prefix("d=")
        .ok_or(ProtocolError::MalformedPayload("jsonp body must be a d= form"))?;
    let decoded = urlencoding::decode(encoded)
        .map_err(|_| ProtocolError::MalformedPayload("jsonp body is not valid utf-8"))?;
    // The client escapes newlines inside the form value.
    Ok(decoded.replace("\\n", "\n").into_bytes())
}
