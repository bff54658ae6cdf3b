/// Persistence contract for devices and their signature chains. Implementers
/// decide where records live; the signing engine only relies on the guarantees
/// documented on each method.
use crate::errors::SigningError;
use crate::page::{Page, PageRequest};
use crate::types::{ChainState, Device, SignatureRecord};

pub trait DeviceStore: Send + Sync {
    /// Insert a new device. `Conflict` if the id is already taken.
    fn save_device(&self, device: Device) -> Result<Device, SigningError>;
    /// `NotFound` if absent.
    fn find_device(&self, id: &str) -> Result<Device, SigningError>;
    /// Devices in a stable order (insertion order for the in-memory store).
    fn list_devices(&self, page: PageRequest) -> Result<Page<Device>, SigningError>;
    /// Current counter and last signature; `(0, "")` if the device never signed.
    fn chain_state(&self, device_id: &str) -> Result<ChainState, SigningError>;
    /// Persist a new record and move the device counter to `new_counter` as one
    /// unit. On error neither has changed.
    fn append_signature(
        &self,
        device_id: &str,
        new_counter: u64,
        signature: String,
        signed_payload: String,
    ) -> Result<SignatureRecord, SigningError>;
    /// One device's records ordered by counter ascending.
    fn list_signatures(&self, device_id: &str, page: PageRequest) -> Result<Page<SignatureRecord>, SigningError>;
}
