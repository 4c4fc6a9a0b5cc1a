//! # Key Material
//!
//! RSA key generation for the key-pair reconcilers.
//!
//! Private keys are encoded as PKCS#1 PEM (`BEGIN RSA PRIVATE KEY`), public
//! keys as SPKI PEM (`BEGIN PUBLIC KEY`), the formats CloudFront and most
//! signing libraries expect. Private material only ever lives in
//! [`Zeroizing`] buffers.

use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Unsupported key type {0}")]
    UnsupportedKeyType(String),

    #[error("Failed to generate RSA key: {0}")]
    Generate(#[from] rsa::Error),

    #[error("Failed to encode private key: {0}")]
    EncodePrivateKey(#[from] rsa::pkcs1::Error),

    #[error("Failed to encode public key: {0}")]
    EncodePublicKey(#[from] rsa::pkcs8::spki::Error),

    #[error("Stored private key is not a PKCS#1 or PKCS#8 PEM RSA key")]
    UnreadablePrivateKey,
}

/// Asymmetric algorithm of a generated key pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Rsa,
}

impl FromStr for KeyType {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rsa" => Ok(Self::Rsa),
            other => Err(CryptoError::UnsupportedKeyType(other.to_string())),
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rsa => write!(f, "rsa"),
        }
    }
}

/// PEM-encoded key pair
pub struct GeneratedKeyPair {
    pub private_key_pem: Zeroizing<String>,
    pub public_key_pem: String,
}

impl fmt::Debug for GeneratedKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedKeyPair")
            .field("private_key_pem", &"<redacted>")
            .field("public_key_pem", &self.public_key_pem)
            .finish()
    }
}

/// Generate a fresh key pair
///
/// CPU bound; callers on the async runtime should run it on a blocking thread.
///
/// # Errors
///
/// Fails when the modulus length is rejected by the RSA implementation or
/// the key cannot be encoded.
pub fn generate_key_pair(
    key_type: KeyType,
    modulus_length: usize,
) -> Result<GeneratedKeyPair, CryptoError> {
    match key_type {
        KeyType::Rsa => {
            let private_key = RsaPrivateKey::new(&mut OsRng, modulus_length)?;
            let private_key_pem = private_key.to_pkcs1_pem(LineEnding::LF)?;
            let public_key_pem =
                RsaPublicKey::from(&private_key).to_public_key_pem(LineEnding::LF)?;
            Ok(GeneratedKeyPair {
                private_key_pem,
                public_key_pem,
            })
        }
    }
}

/// Derive the SPKI PEM public key matching a stored private key
///
/// # Errors
///
/// Fails when the stored key is neither PKCS#1 nor PKCS#8 PEM.
pub fn public_key_from_private(private_key_pem: &str) -> Result<String, CryptoError> {
    let private_key = RsaPrivateKey::from_pkcs1_pem(private_key_pem)
        .ok()
        .or_else(|| RsaPrivateKey::from_pkcs8_pem(private_key_pem).ok())
        .ok_or(CryptoError::UnreadablePrivateKey)?;

    Ok(RsaPublicKey::from(&private_key).to_public_key_pem(LineEnding::LF)?)
}
