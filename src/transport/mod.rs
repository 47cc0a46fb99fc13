//! Transport to the remote detection service.
//!
//! - `protocol`: JSON frames exchanged over the socket.
//! - `channel`: connection lifecycle, reconnect policy and inbound validation.
//! - `ws`: the websocket pump that owns the actual socket.
//! - `endpoint`: server address parsing.

pub mod channel;
mod endpoint;
pub mod protocol;
pub mod ws;

pub use channel::{
    ChannelStats, ConnectRequest, ConnectionHandle, ConnectionState, DetectionChannel, LinkEvent,
    ABNORMAL_CLOSE, DEFAULT_RECONNECT_DELAY_MS, NORMAL_CLOSE,
};
pub use endpoint::{is_loopback, parse_server_endpoint, DEFAULT_WS_PATH};
pub use protocol::{parse_inbound, FramePayload, InboundMessage, Payload};
pub use ws::{Connector, WsConnector, WsHandle};
