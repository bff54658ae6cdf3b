use std::sync::Arc;

use tracing::info;

use crate::codec;
use crate::errors::SigningError;
use crate::page::{Page, PageRequest};
use crate::traits::DeviceStore;
use crate::types::{Algorithm, Device};

/// Registry owns device lifecycle: provisioning keys and looking devices up.
#[derive(Clone)]
pub struct DeviceRegistry {
    store: Arc<dyn DeviceStore>,
}

impl DeviceRegistry {
    pub fn new(store: Arc<dyn DeviceStore>) -> Self { Self { store } }

    /// Register a device under `id`, generating a fresh key pair for `algorithm`.
    ///
    /// Not idempotent: a second call with the same id is a `Conflict` and leaves
    /// the existing device untouched.
    pub fn register(&self, id: &str, algorithm: &str, label: Option<String>) -> Result<Device, SigningError> {
        if id.is_empty() {
            return Err(SigningError::InvalidArgument("id is required".into()));
        }
        let algorithm: Algorithm = algorithm.parse().map_err(|e| match e {
            SigningError::Configuration(token) => {
                SigningError::InvalidArgument(format!("unsupported algorithm {token:?}"))
            }
            other => other,
        })?;
        // Cheap check before paying for key generation; the store re-checks atomically.
        match self.store.find_device(id) {
            Ok(_) => return Err(SigningError::Conflict(format!("device {id} already exists"))),
            Err(SigningError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let key_pair = codec::generate_key_pair(algorithm)?;
        let encoded = codec::encode(&key_pair)?;
        let device = self.store.save_device(Device {
            id: id.to_string(),
            algorithm,
            label,
            counter: 0,
            public_key: encoded.public_key,
            private_key: encoded.private_key,
            created_at: chrono::Utc::now().timestamp(),
        })?;
        info!(device_id = %device.id, algorithm = %device.algorithm, "registered signing device");
        Ok(device)
    }

    pub fn get_by_id(&self, id: &str) -> Result<Device, SigningError> {
        if id.is_empty() {
            return Err(SigningError::InvalidArgument("id is required".into()));
        }
        self.store.find_device(id)
    }

    pub fn list_page(&self, page_nr: i64, page_size: i64) -> Result<Page<Device>, SigningError> {
        self.store.list_devices(PageRequest::new(page_nr, page_size)?)
    }
}
