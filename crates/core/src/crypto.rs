// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signing capability consumed by the client and the daemon
//!
//! Actual signature algorithms live outside this workspace; they plug in
//! through [`Signer`] and [`Verifier`].

use std::str::FromStr;
use tracing::warn;

use crate::datum::{Datum, Signature};
use crate::error::{ErrorKind, GdpError, Result};
use crate::metadata::PublicKey;

/// Digest algorithm ids carried in signatures and public keys
pub mod md {
    pub const NONE: u8 = 0;
    pub const SHA256: u8 = 3;
}

/// Produces signatures with a private key
pub trait Signer: Send + Sync {
    fn md_alg(&self) -> u8;
    fn sign(&self, bytes: &[u8]) -> Result<Signature>;
}

/// Checks signatures against a log's public key
pub trait Verifier: Send + Sync {
    fn verify(&self, key: &PublicKey, bytes: &[u8], sig: &Signature) -> Result<bool>;
}

/// Verifier used when no algorithm is available; every check fails
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVerifier;

impl Verifier for NoVerifier {
    fn verify(&self, key: &PublicKey, _bytes: &[u8], sig: &Signature) -> Result<bool> {
        Err(GdpError::new(
            ErrorKind::SignatureInvalid,
            format!(
                "no verifier for digest {} key type {}",
                sig.md_alg, key.key_type
            ),
        ))
    }
}

/// How strictly appends are checked against the log's public key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignaturePolicy {
    /// A present signature must verify
    pub verify: bool,
    /// A log with a public key must receive signed appends
    pub required: bool,
    /// Every log must carry a public key to be appendable
    pub pubkey: bool,
}

impl SignaturePolicy {
    pub const NONE: SignaturePolicy = SignaturePolicy {
        verify: false,
        required: false,
        pubkey: false,
    };

    /// Check an append against the log's key; `Ok` means accept
    pub fn check(
        &self,
        verifier: &dyn Verifier,
        key: Option<&PublicKey>,
        datum: &Datum,
    ) -> Result<()> {
        let Some(key) = key else {
            if self.pubkey {
                return Err(GdpError::new(
                    ErrorKind::SignatureRequired,
                    "log has no public key",
                ));
            }
            return Ok(());
        };
        let Some(sig) = &datum.sig else {
            if self.required {
                return Err(GdpError::new(
                    ErrorKind::SignatureRequired,
                    "append must be signed",
                ));
            }
            return Ok(());
        };
        let ok = match verifier.verify(key, &datum.signed_bytes(), sig) {
            Ok(ok) => ok,
            Err(e) if self.verify => return Err(e),
            Err(_) => false,
        };
        if !ok {
            if self.verify {
                return Err(GdpError::new(
                    ErrorKind::SignatureInvalid,
                    format!("signature does not verify for recno {}", datum.recno),
                ));
            }
            warn!(recno = datum.recno, "accepting append with unverified signature");
        }
        Ok(())
    }
}

impl FromStr for SignaturePolicy {
    type Err = GdpError;

    /// Accepts `none`, or a comma list of `verify`, `required`, `pubkey`
    fn from_str(s: &str) -> Result<Self> {
        let mut policy = SignaturePolicy::NONE;
        for word in s.split(',').map(str::trim).filter(|w| !w.is_empty()) {
            match word {
                "none" => {}
                "verify" => policy.verify = true,
                "required" => {
                    policy.verify = true;
                    policy.required = true;
                }
                "pubkey" => {
                    policy.verify = true;
                    policy.required = true;
                    policy.pubkey = true;
                }
                other => {
                    return Err(GdpError::bad_request(format!(
                        "unknown signature strictness: {}",
                        other
                    )))
                }
            }
        }
        Ok(policy)
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use bytes::Bytes;
    use sha2::{Digest, Sha256};

    /// Keyed-digest stand-in for a real signature scheme.
    ///
    /// The "public key" DER is the shared secret, so anyone holding the
    /// metadata can forge signatures. Only for tests.
    #[derive(Debug, Clone)]
    pub struct FakeSigner {
        secret: Bytes,
    }

    impl FakeSigner {
        pub fn new(secret: impl Into<Bytes>) -> Self {
            Self {
                secret: secret.into(),
            }
        }

        pub fn public_key(&self) -> PublicKey {
            PublicKey {
                md_alg: md::SHA256,
                key_type: 0,
                bits: (self.secret.len() * 8) as u16,
                der: self.secret.clone(),
            }
        }

        fn digest(secret: &[u8], bytes: &[u8]) -> Vec<u8> {
            let mut h = Sha256::new();
            h.update(secret);
            h.update(bytes);
            h.finalize().to_vec()
        }
    }

    impl Signer for FakeSigner {
        fn md_alg(&self) -> u8 {
            md::SHA256
        }

        fn sign(&self, bytes: &[u8]) -> Result<Signature> {
            Signature::new(md::SHA256, Self::digest(&self.secret, bytes))
        }
    }

    impl Verifier for FakeSigner {
        fn verify(&self, key: &PublicKey, bytes: &[u8], sig: &Signature) -> Result<bool> {
            Ok(sig.md_alg == md::SHA256 && sig.bytes[..] == Self::digest(&key.der, bytes)[..])
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeSigner;

#[cfg(test)]
#[path = "crypto_tests.rs"]
mod tests;
