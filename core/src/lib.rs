//! chainsign core library: device keys, registry, and chained signing.
//!
//! - ECC (P-256 / ECDSA) and RSA (2048-bit / PSS) key pairs, PEM-encoded at rest
//! - Device registry with stable, paginated listing
//! - Per-device signature chains: each signed payload embeds the previous
//!   signature, and the counter advances by exactly one per signature
//! - Pluggable storage behind [`DeviceStore`], with an in-memory implementation

pub mod codec;
pub mod engine;
pub mod errors;
pub mod page;
pub mod registry;
pub mod store;
pub mod traits;
pub mod types;

pub use codec::{DeviceSigner, EncodedKeyPair, KeyPair};
pub use engine::SigningEngine;
pub use errors::{ChainViolation, SigningError};
pub use page::{Page, PageRequest};
pub use registry::DeviceRegistry;
pub use store::InMemoryStore;
pub use traits::DeviceStore;
pub use types::{Algorithm, ChainState, Device, SignResult, SignatureRecord};

/// Library version string.
pub fn version() -> &'static str { concat!("chainsign-core ", env!("CARGO_PKG_VERSION")) }

#[cfg(test)]
mod tests;
