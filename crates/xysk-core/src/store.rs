// ── Last-device persistence seam ──
//
// The session records the last address it successfully opened. Core never
// touches disk; frontends plug in a file-backed store (see xysk-config).

use std::sync::{Mutex, PoisonError};

use xysk_api::DeviceAddress;

use crate::error::CoreError;

/// Where the last successfully connected address lives.
pub trait AddressStore: Send + Sync {
    fn load_last(&self) -> Option<DeviceAddress>;

    fn save_last(&self, address: &DeviceAddress) -> Result<(), CoreError>;
}

/// Process-local store, used when nothing should outlive the session.
#[derive(Debug, Default)]
pub struct MemoryAddressStore {
    last: Mutex<Option<DeviceAddress>>,
}

impl MemoryAddressStore {
    pub fn new(initial: Option<DeviceAddress>) -> Self {
        Self {
            last: Mutex::new(initial),
        }
    }
}

impl AddressStore for MemoryAddressStore {
    fn load_last(&self) -> Option<DeviceAddress> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save_last(&self, address: &DeviceAddress) -> Result<(), CoreError> {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(address.clone());
        Ok(())
    }
}
