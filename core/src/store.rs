use std::collections::HashMap;

use parking_lot::RwLock;

use crate::errors::SigningError;
use crate::page::{Page, PageRequest};
use crate::traits::DeviceStore;
use crate::types::{ChainState, Device, SignatureRecord};

#[derive(Default)]
struct Inner {
    /// Devices in registration order; `index` maps id to position.
    devices: Vec<Device>,
    index: HashMap<String, usize>,
    /// Per-device records, ordered by counter.
    signatures: HashMap<String, Vec<SignatureRecord>>,
}

impl Inner {
    fn device_mut(&mut self, id: &str) -> Option<&mut Device> {
        let pos = *self.index.get(id)?;
        self.devices.get_mut(pos)
    }
}

/// Simple in-memory store suitable for tests and single-process deployments.
///
/// All state sits behind one `RwLock`, so a reader never sees a device counter
/// without the record that advanced it.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    /// Create a new, empty store.
    pub fn new() -> Self { Self::default() }
}

impl DeviceStore for InMemoryStore {
    fn save_device(&self, device: Device) -> Result<Device, SigningError> {
        let mut inner = self.inner.write();
        if inner.index.contains_key(&device.id) {
            return Err(SigningError::Conflict(format!("device {} already exists", device.id)));
        }
        let pos = inner.devices.len();
        inner.index.insert(device.id.clone(), pos);
        inner.devices.push(device.clone());
        Ok(device)
    }

    fn find_device(&self, id: &str) -> Result<Device, SigningError> {
        let inner = self.inner.read();
        inner
            .index
            .get(id)
            .and_then(|&pos| inner.devices.get(pos))
            .cloned()
            .ok_or_else(|| SigningError::NotFound(format!("device {id}")))
    }

    fn list_devices(&self, page: PageRequest) -> Result<Page<Device>, SigningError> {
        Ok(page.slice(&self.inner.read().devices))
    }

    fn chain_state(&self, device_id: &str) -> Result<ChainState, SigningError> {
        let inner = self.inner.read();
        let pos = inner
            .index
            .get(device_id)
            .ok_or_else(|| SigningError::NotFound(format!("device {device_id}")))?;
        let counter = inner.devices[*pos].counter;
        let last_signature = inner
            .signatures
            .get(device_id)
            .and_then(|records| records.last())
            .map(|r| r.signature.clone())
            .unwrap_or_default();
        Ok(ChainState { counter, last_signature })
    }

    fn append_signature(
        &self,
        device_id: &str,
        new_counter: u64,
        signature: String,
        signed_payload: String,
    ) -> Result<SignatureRecord, SigningError> {
        let mut inner = self.inner.write();
        let device = inner
            .device_mut(device_id)
            .ok_or_else(|| SigningError::NotFound(format!("device {device_id}")))?;
        if device.counter.checked_add(1) != Some(new_counter) {
            return Err(SigningError::Internal(format!(
                "device {device_id}: counter {new_counter} does not follow {}",
                device.counter
            )));
        }
        device.counter = new_counter;
        let record = SignatureRecord {
            id: uuid::Uuid::new_v4().to_string(),
            device_id: device_id.to_string(),
            counter: new_counter,
            signature,
            signed_payload,
            created_at: chrono::Utc::now().timestamp(),
        };
        inner.signatures.entry(device_id.to_string()).or_default().push(record.clone());
        Ok(record)
    }

    fn list_signatures(&self, device_id: &str, page: PageRequest) -> Result<Page<SignatureRecord>, SigningError> {
        let inner = self.inner.read();
        if !inner.index.contains_key(device_id) {
            return Err(SigningError::NotFound(format!("device {device_id}")));
        }
        let records = inner.signatures.get(device_id).map(Vec::as_slice).unwrap_or_default();
        Ok(page.slice(records))
    }
}
