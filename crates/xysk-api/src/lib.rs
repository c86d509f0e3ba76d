// xysk-api: wire protocol, WebSocket transport, and HTTP fallback for XY-SK120 bridges

pub mod address;
pub mod error;
pub mod fallback;
pub mod protocol;
pub mod transport;
pub mod websocket;

pub use address::{DeviceAddress, PageOrigin};
pub use error::Error;
pub use fallback::{FallbackClient, FallbackRoute};
pub use protocol::{Command, InboundMessage, OperatingMode, StatusReport};
pub use transport::{HttpConfig, TlsMode};
pub use websocket::{ReadyState, Transport, TransportEvent, TransportEventKind};
