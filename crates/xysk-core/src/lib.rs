// xysk-core: session management between xysk-api and frontends (CLI).

pub mod config;
pub mod error;
pub mod queue;
pub mod reconnect;
pub mod session;
pub mod status;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::SessionConfig;
pub use error::CoreError;
pub use reconnect::ReconnectConfig;
pub use session::{Dispatch, DropReason, EventSource, InboundEvent, RequestId, Session};
pub use status::{ConnectionStatus, Diagnostics};
pub use store::{AddressStore, MemoryAddressStore};

// Re-export the wire vocabulary so frontends need only this crate.
pub use xysk_api::{Command, DeviceAddress, OperatingMode, PageOrigin, StatusReport};
