use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::errors::SigningError;

/// Signature algorithms a device can be provisioned with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "ECC")]
    Ecc,
    #[serde(rename = "RSA")]
    Rsa,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Ecc => "ECC",
            Algorithm::Rsa => "RSA",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Algorithm {
    type Err = SigningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ECC" => Ok(Algorithm::Ecc),
            "RSA" => Ok(Algorithm::Rsa),
            other => Err(SigningError::Configuration(other.to_string())),
        }
    }
}

/// A signing device: one key pair plus its monotonic signature counter.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    pub algorithm: Algorithm,
    pub label: Option<String>,
    pub counter: u64,
    /// PEM-encoded public key.
    pub public_key: Vec<u8>,
    /// PEM-encoded private key. Never leaves the process.
    #[serde(skip_serializing)]
    pub private_key: Vec<u8>,
    pub created_at: i64,
}

/// One link of a device's signature chain. Immutable once stored.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignatureRecord {
    pub id: String,
    pub device_id: String,
    pub counter: u64,
    /// Standard base64 of the raw signature bytes.
    pub signature: String,
    pub signed_payload: String,
    pub created_at: i64,
}

/// Chain state as read at the start of a chain advance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChainState {
    pub counter: u64,
    /// Signature of the record at `counter`; empty when the device never signed.
    pub last_signature: String,
}

/// Outcome of a successful signing call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignResult {
    pub signature: String,
    pub signed_data: String,
}

/// Link value embedded into the payload signed at `new_counter`.
///
/// The first signature of a device is seeded with the base64 of its id; every
/// later one carries the previous signature.
pub fn chain_seed(device_id: &str, new_counter: u64, last_signature: &str) -> String {
    if new_counter == 1 {
        B64.encode(device_id.as_bytes())
    } else {
        last_signature.to_string()
    }
}

/// `"{counter}_{payload}_{seed}"`
pub fn compose_signed_payload(counter: u64, payload: &str, seed: &str) -> String {
    format!("{counter}_{payload}_{seed}")
}
