use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;

use crate::errors::{ChainViolation, SigningError};
use crate::page::{Page, PageRequest};
use crate::registry::DeviceRegistry;
use crate::store::InMemoryStore;
use crate::traits::DeviceStore;
use crate::types::{ChainState, Device, SignatureRecord};
use crate::SigningEngine;

/// Store double: wraps the in-memory store and can fail appends or tamper with
/// one record on the way out.
#[derive(Default)]
struct FaultyStore {
    inner: InMemoryStore,
    fail_appends: AtomicBool,
    tamper_counter: AtomicU64,
}

impl DeviceStore for FaultyStore {
    fn save_device(&self, device: Device) -> Result<Device, SigningError> { self.inner.save_device(device) }
    fn find_device(&self, id: &str) -> Result<Device, SigningError> { self.inner.find_device(id) }
    fn list_devices(&self, page: PageRequest) -> Result<Page<Device>, SigningError> { self.inner.list_devices(page) }
    fn chain_state(&self, device_id: &str) -> Result<ChainState, SigningError> { self.inner.chain_state(device_id) }
    fn append_signature(
        &self,
        device_id: &str,
        new_counter: u64,
        signature: String,
        signed_payload: String,
    ) -> Result<SignatureRecord, SigningError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(SigningError::Internal("disk full".into()));
        }
        self.inner.append_signature(device_id, new_counter, signature, signed_payload)
    }
    fn list_signatures(&self, device_id: &str, page: PageRequest) -> Result<Page<SignatureRecord>, SigningError> {
        let mut page = self.inner.list_signatures(device_id, page)?;
        let target = self.tamper_counter.load(Ordering::SeqCst);
        for record in page.items.iter_mut().filter(|r| r.counter == target) {
            record.signed_payload = record.signed_payload.replacen("_", "_x", 1);
        }
        Ok(page)
    }
}

fn engine_with(store: Arc<dyn DeviceStore>) -> SigningEngine {
    SigningEngine::new(DeviceRegistry::new(store.clone()), store)
}

fn engine() -> SigningEngine { engine_with(Arc::new(InMemoryStore::new())) }

fn all_counters(engine: &SigningEngine, device_id: &str) -> Vec<u64> {
    let page = engine.list_signatures(device_id, 1, i64::MAX).expect("list signatures");
    page.items.iter().map(|r| r.counter).collect()
}

#[test]
fn registered_device_starts_unsigned() {
    let engine = engine();
    let device = engine.registry().register("dev-1", "ECC", Some("till 1".into())).expect("register");
    assert_eq!(device.counter, 0);
    assert_eq!(device.label.as_deref(), Some("till 1"));
    assert!(!device.private_key.is_empty());

    let page = engine.list_signatures("dev-1", 1, 10).unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.total, 0);
    assert_eq!(engine.verify_chain("dev-1").unwrap(), 0);
}

#[test]
fn register_rejects_bad_input() {
    let engine = engine();
    let err = engine.registry().register("", "ECC", None).unwrap_err();
    assert!(matches!(err, SigningError::InvalidArgument(_)));
    let err = engine.registry().register("dev-1", "DSA", None).unwrap_err();
    assert!(matches!(err, SigningError::InvalidArgument(_)));
    let err = engine.registry().register("dev-1", "ecc", None).unwrap_err();
    assert!(matches!(err, SigningError::InvalidArgument(_)));
    assert!(matches!(engine.registry().get_by_id("dev-1"), Err(SigningError::NotFound(_))));
}

#[test]
fn duplicate_registration_conflicts_and_keeps_device() {
    let engine = engine();
    let original = engine.registry().register("dev-1", "ECC", None).unwrap();
    engine.sign("dev-1", "a").unwrap();

    let err = engine.registry().register("dev-1", "RSA", Some("other".into())).unwrap_err();
    assert!(matches!(err, SigningError::Conflict(_)));

    let current = engine.registry().get_by_id("dev-1").unwrap();
    assert_eq!(current.private_key, original.private_key);
    assert_eq!(current.public_key, original.public_key);
    assert_eq!(current.counter, 1);
    assert_eq!(current.label, None);
}

#[test]
fn signatures_link_to_their_predecessor() {
    let engine = engine();
    engine.registry().register("dev-1", "ECC", None).unwrap();

    let first = engine.sign("dev-1", "a").expect("first signature");
    assert_eq!(first.signed_data, format!("1_a_{}", B64.encode("dev-1")));

    let second = engine.sign("dev-1", "b").expect("second signature");
    assert_eq!(second.signed_data, format!("2_b_{}", first.signature));

    let third = engine.sign("dev-1", "c_with_underscores").unwrap();
    assert_eq!(third.signed_data, format!("3_c_with_underscores_{}", second.signature));

    assert!(engine.verify("dev-1", "a", &first.signature).unwrap());
    assert!(!engine.verify("dev-1", "b", &first.signature).unwrap());
    assert!(!engine.verify("dev-1", "a", "***not base64***").unwrap());

    assert_eq!(engine.registry().get_by_id("dev-1").unwrap().counter, 3);
    assert_eq!(engine.verify_chain("dev-1").unwrap(), 3);
}

#[test]
fn rsa_device_chain() {
    let engine = engine();
    engine.registry().register("rsa-1", "RSA", None).unwrap();
    let first = engine.sign("rsa-1", "a").unwrap();
    let second = engine.sign("rsa-1", "b").unwrap();
    assert_eq!(second.signed_data, format!("2_b_{}", first.signature));
    assert!(engine.verify("rsa-1", "b", &second.signature).unwrap());
    assert_eq!(engine.verify_chain("rsa-1").unwrap(), 2);
}

#[test]
fn sign_validates_input() {
    let engine = engine();
    engine.registry().register("dev-1", "ECC", None).unwrap();
    assert!(matches!(engine.sign("", "a"), Err(SigningError::InvalidArgument(_))));
    assert!(matches!(engine.sign("dev-1", ""), Err(SigningError::InvalidArgument(_))));
    assert_eq!(engine.registry().get_by_id("dev-1").unwrap().counter, 0);
}

#[test]
fn sign_unknown_device_creates_nothing() {
    let engine = engine();
    let err = engine.sign("ghost", "a").unwrap_err();
    assert!(matches!(err, SigningError::NotFound(_)));
    assert!(matches!(engine.list_signatures("ghost", 1, 10), Err(SigningError::NotFound(_))));
}

#[test]
fn device_listing_is_stable_and_bounded() {
    let engine = engine();
    for i in 0..100 {
        engine.registry().register(&format!("dev-{i}"), "ECC", None).unwrap();
    }
    let first = engine.registry().list_page(3, 7).unwrap();
    let again = engine.registry().list_page(3, 7).unwrap();
    assert_eq!(first, again);
    let ids: Vec<_> = first.items.iter().map(|d| d.id.clone()).collect();
    assert_eq!(ids, (14..21).map(|i| format!("dev-{i}")).collect::<Vec<_>>());

    let past_end = engine.registry().list_page(11, 10).unwrap();
    assert!(past_end.items.is_empty());
    assert_eq!(past_end.total, 100);

    assert!(matches!(engine.registry().list_page(0, 10), Err(SigningError::InvalidArgument(_))));
    assert!(matches!(engine.registry().list_page(1, -1), Err(SigningError::InvalidArgument(_))));
}

#[test]
fn signature_listing_follows_counter_order() {
    let engine = engine();
    engine.registry().register("dev-1", "ECC", None).unwrap();
    for i in 0..5 {
        engine.sign("dev-1", &format!("p{i}")).unwrap();
    }
    let page = engine.list_signatures("dev-1", 2, 2).unwrap();
    assert_eq!(page.items.iter().map(|r| r.counter).collect::<Vec<_>>(), vec![3, 4]);
    assert_eq!(page.total, 5);
    assert!(page.items.iter().all(|r| r.device_id == "dev-1"));
    assert!(page.items[0].signed_payload.starts_with("3_p2_"));

    assert!(matches!(engine.list_signatures("", 1, 1), Err(SigningError::InvalidArgument(_))));
    assert!(matches!(engine.list_signatures("dev-1", 1, 0), Err(SigningError::InvalidArgument(_))));
}

#[test]
fn concurrent_signing_on_one_device_is_gap_free() {
    const THREADS: u64 = 8;
    const PER_THREAD: u64 = 25;

    let engine = engine();
    engine.registry().register("dev-1", "ECC", None).unwrap();

    std::thread::scope(|s| {
        for t in 0..THREADS {
            let engine = &engine;
            s.spawn(move || {
                for i in 0..PER_THREAD {
                    engine.sign("dev-1", &format!("t{t}-{i}")).expect("sign");
                }
            });
        }
    });

    let total = THREADS * PER_THREAD;
    assert_eq!(engine.registry().get_by_id("dev-1").unwrap().counter, total);
    let counters = all_counters(&engine, "dev-1");
    assert_eq!(counters.len() as u64, total);
    let distinct: BTreeSet<u64> = counters.into_iter().collect();
    assert_eq!(distinct, (1..=total).collect::<BTreeSet<_>>());
    assert_eq!(engine.verify_chain("dev-1").unwrap(), total);
}

#[test]
fn concurrent_signing_across_devices() {
    let engine = engine();
    let ids: Vec<String> = (0..4).map(|i| format!("dev-{i}")).collect();
    for id in &ids {
        engine.registry().register(id, "ECC", None).unwrap();
    }

    std::thread::scope(|s| {
        for id in &ids {
            for _ in 0..3 {
                let engine = &engine;
                s.spawn(move || {
                    for i in 0..10 {
                        engine.sign(id, &format!("{i}")).expect("sign");
                    }
                });
            }
        }
    });

    for id in &ids {
        assert_eq!(all_counters(&engine, id), (1..=30).collect::<Vec<_>>());
        assert_eq!(engine.verify_chain(id).unwrap(), 30);
    }
}

#[test]
fn failed_append_leaves_chain_untouched() {
    let store = Arc::new(FaultyStore::default());
    let engine = engine_with(store.clone());
    engine.registry().register("dev-1", "ECC", None).unwrap();
    let first = engine.sign("dev-1", "a").unwrap();

    store.fail_appends.store(true, Ordering::SeqCst);
    let err = engine.sign("dev-1", "b").unwrap_err();
    assert!(matches!(err, SigningError::Internal(_)));
    assert!(err.is_internal());
    assert_eq!(engine.registry().get_by_id("dev-1").unwrap().counter, 1);
    assert_eq!(all_counters(&engine, "dev-1"), vec![1]);

    // a retry after the failure continues the chain from the last stored link
    store.fail_appends.store(false, Ordering::SeqCst);
    let retry = engine.sign("dev-1", "b").unwrap();
    assert_eq!(retry.signed_data, format!("2_b_{}", first.signature));
}

#[test]
fn verify_chain_detects_tampering() {
    let store = Arc::new(FaultyStore::default());
    let engine = engine_with(store.clone());
    engine.registry().register("dev-1", "ECC", None).unwrap();
    for p in ["a", "b", "c"] {
        engine.sign("dev-1", p).unwrap();
    }
    assert_eq!(engine.verify_chain("dev-1").unwrap(), 3);

    store.tamper_counter.store(2, Ordering::SeqCst);
    let err = engine.verify_chain("dev-1").unwrap_err();
    assert_eq!(err, SigningError::ChainBroken { counter: 2, violation: ChainViolation::InvalidSignature });
}

#[test]
fn verify_chain_unknown_device() {
    let engine = engine();
    assert!(matches!(engine.verify_chain("ghost"), Err(SigningError::NotFound(_))));
    assert!(matches!(engine.verify("", "a", "b"), Err(SigningError::InvalidArgument(_))));
}
