//! Native-messaging framing.
//!
//! Each message is UTF-8 JSON preceded by its length as a 32-bit integer in
//! native byte order. The browser caps host-to-extension messages at 1 MiB
//! and extension-to-host messages at 64 MiB.

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::codec::LengthDelimitedCodec;

use super::BridgeError;

/// Largest message the browser sends to a native host.
pub const MAX_INBOUND_FRAME: usize = 64 * 1024 * 1024;

/// Largest message a native host may send to the browser.
pub const MAX_OUTBOUND_FRAME: usize = 1024 * 1024;

fn codec(max_frame_length: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .native_endian()
        .max_frame_length(max_frame_length)
        .new_codec()
}

/// Codec for frames read from the browser.
pub fn inbound_codec() -> LengthDelimitedCodec {
    codec(MAX_INBOUND_FRAME)
}

/// Codec for frames written to the browser.
pub fn outbound_codec() -> LengthDelimitedCodec {
    codec(MAX_OUTBOUND_FRAME)
}

/// Serializes a message, refusing payloads the browser would drop.
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Bytes, BridgeError> {
    let bytes = serde_json::to_vec(message).map_err(BridgeError::Encode)?;
    if bytes.len() > MAX_OUTBOUND_FRAME {
        return Err(BridgeError::FrameTooLarge { len: bytes.len() });
    }
    Ok(Bytes::from(bytes))
}

pub fn decode_frame<T: DeserializeOwned>(frame: &[u8]) -> Result<T, BridgeError> {
    serde_json::from_slice(frame).map_err(BridgeError::Decode)
}
