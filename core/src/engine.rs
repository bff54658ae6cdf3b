use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::codec;
use crate::errors::{ChainViolation, SigningError};
use crate::page::{Page, PageRequest};
use crate::registry::DeviceRegistry;
use crate::traits::DeviceStore;
use crate::types::{chain_seed, compose_signed_payload, Device, SignResult, SignatureRecord};

/// Page size used when walking a whole chain.
const AUDIT_BATCH: i64 = 256;

/// Signing engine: signs payloads for devices and advances their chains.
///
/// The read-link-append step for a device runs under that device's own lock,
/// so concurrent callers on one device are serialized while different devices
/// proceed in parallel.
pub struct SigningEngine {
    registry: DeviceRegistry,
    store: Arc<dyn DeviceStore>,
    chain_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SigningEngine {
    /// Create a new engine resolving devices through `registry` and keeping chain state in `store`.
    pub fn new(registry: DeviceRegistry, store: Arc<dyn DeviceStore>) -> Self {
        Self { registry, store, chain_locks: DashMap::new() }
    }

    pub fn registry(&self) -> &DeviceRegistry { &self.registry }

    /// Sign `payload` with the device key and append the result to its chain.
    pub fn sign(&self, device_id: &str, payload: &str) -> Result<SignResult, SigningError> {
        if device_id.is_empty() {
            return Err(SigningError::InvalidArgument("device_id is required".into()));
        }
        if payload.is_empty() {
            return Err(SigningError::InvalidArgument("data is required".into()));
        }
        let device = self.registry.get_by_id(device_id)?;

        let signer = codec::decode(&device.private_key, device.algorithm)?;
        let signature = B64.encode(signer.sign(payload.as_bytes())?);

        let lock = self.chain_lock(device_id);
        let _guard = lock.lock();

        let state = self.store.chain_state(device_id)?;
        let new_counter = state
            .counter
            .checked_add(1)
            .ok_or_else(|| SigningError::Internal(format!("device {device_id}: counter exhausted")))?;
        let seed = chain_seed(device_id, new_counter, &state.last_signature);
        let signed_data = compose_signed_payload(new_counter, payload, &seed);

        match self.store.append_signature(device_id, new_counter, signature.clone(), signed_data.clone()) {
            Ok(record) => {
                debug!(device_id, counter = record.counter, "chain advanced");
                Ok(SignResult { signature, signed_data })
            }
            Err(e) => {
                warn!(device_id, counter = new_counter, error = %e, "failed to persist signature");
                Err(match e {
                    e @ SigningError::Internal(_) => e,
                    other => SigningError::Internal(other.to_string()),
                })
            }
        }
    }

    /// A device's signature records, ordered by counter.
    pub fn list_signatures(
        &self,
        device_id: &str,
        page_nr: i64,
        page_size: i64,
    ) -> Result<Page<SignatureRecord>, SigningError> {
        if device_id.is_empty() {
            return Err(SigningError::InvalidArgument("deviceId is required".into()));
        }
        let page = PageRequest::new(page_nr, page_size)?;
        self.store.list_signatures(device_id, page)
    }

    /// Check a base64 signature over `data` against the device key.
    pub fn verify(&self, device_id: &str, data: &str, signature: &str) -> Result<bool, SigningError> {
        if device_id.is_empty() {
            return Err(SigningError::InvalidArgument("device_id is required".into()));
        }
        let device = self.registry.get_by_id(device_id)?;
        let signer = codec::decode(&device.private_key, device.algorithm)?;
        Ok(match B64.decode(signature.as_bytes()) {
            Ok(raw) => signer.verify(data.as_bytes(), &raw),
            Err(_) => false,
        })
    }

    /// Walk the device's full chain and check every link. Returns the chain length.
    pub fn verify_chain(&self, device_id: &str) -> Result<u64, SigningError> {
        if device_id.is_empty() {
            return Err(SigningError::InvalidArgument("device_id is required".into()));
        }
        let device = self.registry.get_by_id(device_id)?;
        let signer = codec::decode(&device.private_key, device.algorithm)?;

        let mut expected: u64 = 1;
        let mut previous = String::new();
        let mut page_nr = 1;
        loop {
            let page = self.list_signatures(device_id, page_nr, AUDIT_BATCH)?;
            if page.items.is_empty() {
                break;
            }
            for record in &page.items {
                check_link(&device, &signer, record, expected, &previous)
                    .map_err(|violation| SigningError::ChainBroken { counter: expected, violation })?;
                previous.clone_from(&record.signature);
                expected += 1;
            }
            page_nr += 1;
        }
        Ok(expected - 1)
    }

    fn chain_lock(&self, device_id: &str) -> Arc<Mutex<()>> {
        self.chain_locks.entry(device_id.to_string()).or_default().clone()
    }
}

fn check_link(
    device: &Device,
    signer: &codec::DeviceSigner,
    record: &SignatureRecord,
    expected: u64,
    previous: &str,
) -> Result<(), ChainViolation> {
    if record.counter != expected {
        return Err(ChainViolation::CounterGap);
    }
    let seed = chain_seed(&device.id, expected, previous);
    let payload = record
        .signed_payload
        .strip_prefix(&format!("{expected}_"))
        .ok_or(ChainViolation::CounterMismatch)?
        .strip_suffix(&format!("_{seed}"))
        .ok_or(ChainViolation::LinkMismatch)?;
    let raw = B64.decode(record.signature.as_bytes()).map_err(|_| ChainViolation::MalformedSignature)?;
    if !signer.verify(payload.as_bytes(), &raw) {
        return Err(ChainViolation::InvalidSignature);
    }
    Ok(())
}
