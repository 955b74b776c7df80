//! Native-messaging transport between the engine and the browser.
//!
//! The engine runs as a native messaging host: the browser starts it and
//! talks to it over stdin/stdout. A thin extension shim forwards UI
//! messages and browser events, and performs tab API calls on request.

mod codec;
mod host;
mod protocol;
mod runtime;

use thiserror::Error;

pub use codec::{
    MAX_INBOUND_FRAME, MAX_OUTBOUND_FRAME, decode_frame, encode_frame, inbound_codec,
    outbound_codec,
};
pub use host::{BridgeHost, DEFAULT_CALL_TIMEOUT};
pub use protocol::{BrowserEvent, HostCall, Inbound, Outbound, ReplyError};
pub use runtime::serve;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("malformed frame: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("outbound frame of {len} bytes exceeds the browser's limit")]
    FrameTooLarge { len: usize },
}
