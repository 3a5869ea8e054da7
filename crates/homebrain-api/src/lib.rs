// homebrain-api: Async client for the HomeBrain Insteon bridge (HTTP + WebSocket)

pub mod client;
pub mod error;
pub mod events;
pub mod models;
pub mod transport;
pub mod websocket;

pub use client::{BridgeClient, websocket_url};
pub use error::{Error, ErrorKind};
pub use events::{BridgeEvent, CommandAck, DeviceBatch, FrameError};
pub use models::{BridgeStatus, CommandRequest, Discovery, RawDevice};
pub use transport::{DEFAULT_REQUEST_TIMEOUT, TransportConfig};
pub use websocket::{Backoff, EventStream, ReconnectConfig, StreamMessage};
