//! Key material codec: generation, PEM encoding and decoding of device keys.
//!
//! - **ECC**: NIST P-256, ECDSA over SHA-256, DER-encoded `(r, s)` signatures.
//!   Private keys are stored as SEC1 PEM (`EC PRIVATE KEY`), public keys as SPKI PEM.
//! - **RSA**: 2048-bit modulus, RSASSA-PSS over SHA-256 with a digest-sized salt.
//!   Both halves are stored as PKCS#1 PEM (`RSA PRIVATE KEY` / `RSA PUBLIC KEY`).
//!
//! Every signature draws fresh randomness from the OS, so signing the same
//! input twice yields different bytes; both verify.

use std::fmt;

use p256::ecdsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use p256::ecdsa::{Signature as EcdsaSignature, SigningKey as EcdsaSigningKey, VerifyingKey as EcdsaVerifyingKey};
use p256::pkcs8::{EncodePublicKey, LineEnding};
use p256::SecretKey;
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::pss::{BlindedSigningKey, Signature as PssSignature, VerifyingKey as PssVerifyingKey};
use rsa::RsaPrivateKey;
use sha2::Sha256;

use crate::errors::SigningError;
use crate::types::Algorithm;

/// RSA modulus size for newly provisioned devices.
pub const RSA_KEY_BITS: usize = 2048;

/// A freshly generated key pair, one variant per supported algorithm.
pub enum KeyPair {
    Ecc(SecretKey),
    Rsa(RsaPrivateKey),
}

impl KeyPair {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            KeyPair::Ecc(_) => Algorithm::Ecc,
            KeyPair::Rsa(_) => Algorithm::Rsa,
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair").field("algorithm", &self.algorithm()).finish_non_exhaustive()
    }
}

/// PEM text of both halves of a key pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedKeyPair {
    pub public_key: Vec<u8>,
    pub private_key: Vec<u8>,
}

/// Generate a new key pair for `algorithm` using the OS RNG.
pub fn generate_key_pair(algorithm: Algorithm) -> Result<KeyPair, SigningError> {
    match algorithm {
        Algorithm::Ecc => Ok(KeyPair::Ecc(SecretKey::random(&mut OsRng))),
        Algorithm::Rsa => RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
            .map(KeyPair::Rsa)
            .map_err(|e| SigningError::Internal(format!("rsa key generation: {e}"))),
    }
}

/// Serialize a key pair into type-tagged PEM blocks.
pub fn encode(key_pair: &KeyPair) -> Result<EncodedKeyPair, SigningError> {
    match key_pair {
        KeyPair::Ecc(secret) => {
            let private_key = secret
                .to_sec1_pem(LineEnding::LF)
                .map_err(|e| SigningError::Internal(format!("ec private key encoding: {e}")))?;
            let public_key = secret
                .public_key()
                .to_public_key_pem(LineEnding::LF)
                .map_err(|e| SigningError::Internal(format!("ec public key encoding: {e}")))?;
            Ok(EncodedKeyPair { public_key: public_key.into_bytes(), private_key: private_key.as_bytes().to_vec() })
        }
        KeyPair::Rsa(private) => {
            let private_key = private
                .to_pkcs1_pem(LineEnding::LF)
                .map_err(|e| SigningError::Internal(format!("rsa private key encoding: {e}")))?;
            let public_key = private
                .to_public_key()
                .to_pkcs1_pem(LineEnding::LF)
                .map_err(|e| SigningError::Internal(format!("rsa public key encoding: {e}")))?;
            Ok(EncodedKeyPair { public_key: public_key.into_bytes(), private_key: private_key.as_bytes().to_vec() })
        }
    }
}

/// Rebuild a signer from a stored private key.
///
/// Fails with `Decode` when the bytes are not a PEM block of the kind
/// `algorithm` expects.
pub fn decode(private_key: &[u8], algorithm: Algorithm) -> Result<DeviceSigner, SigningError> {
    let pem = std::str::from_utf8(private_key)
        .map_err(|_| SigningError::Decode("private key is not PEM text".into()))?;
    match algorithm {
        Algorithm::Ecc => {
            let secret = SecretKey::from_sec1_pem(pem)
                .map_err(|e| SigningError::Decode(format!("ec private key: {e}")))?;
            Ok(DeviceSigner::Ecc(EcdsaSigningKey::from(&secret)))
        }
        Algorithm::Rsa => {
            let private = RsaPrivateKey::from_pkcs1_pem(pem)
                .map_err(|e| SigningError::Decode(format!("rsa private key: {e}")))?;
            let verifying = PssVerifyingKey::<Sha256>::new(private.to_public_key());
            Ok(DeviceSigner::Rsa { signing: BlindedSigningKey::<Sha256>::new(private), verifying })
        }
    }
}

/// A decoded private key able to sign and verify.
pub enum DeviceSigner {
    Ecc(EcdsaSigningKey),
    Rsa { signing: BlindedSigningKey<Sha256>, verifying: PssVerifyingKey<Sha256> },
}

impl DeviceSigner {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            DeviceSigner::Ecc(_) => Algorithm::Ecc,
            DeviceSigner::Rsa { .. } => Algorithm::Rsa,
        }
    }

    /// Hash `data` with SHA-256 and sign it, returning the raw signature bytes.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, SigningError> {
        match self {
            DeviceSigner::Ecc(key) => {
                let sig: EcdsaSignature = key
                    .try_sign_with_rng(&mut OsRng, data)
                    .map_err(|e| SigningError::Internal(format!("ecdsa signing: {e}")))?;
                Ok(sig.to_der().as_bytes().to_vec())
            }
            DeviceSigner::Rsa { signing, .. } => {
                let sig = signing
                    .try_sign_with_rng(&mut OsRng, data)
                    .map_err(|e| SigningError::Internal(format!("rsa-pss signing: {e}")))?;
                Ok(sig.to_vec())
            }
        }
    }

    /// Malformed signatures simply fail verification.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        match self {
            DeviceSigner::Ecc(key) => {
                let verifying: &EcdsaVerifyingKey = key.verifying_key();
                match EcdsaSignature::from_der(signature) {
                    Ok(sig) => verifying.verify(data, &sig).is_ok(),
                    Err(_) => false,
                }
            }
            DeviceSigner::Rsa { verifying, .. } => match PssSignature::try_from(signature) {
                Ok(sig) => verifying.verify(data, &sig).is_ok(),
                Err(_) => false,
            },
        }
    }
}

impl fmt::Debug for DeviceSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSigner").field("algorithm", &self.algorithm()).finish_non_exhaustive()
    }
}
