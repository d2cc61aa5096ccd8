//! Signed-operation seam
//!
//! `permit` and `delegate_by_sig` authorize a call by signature. The engine
//! builds the digest and checks deadlines and nonces; recovering the signer
//! from the signature is delegated to a [`SignatureVerifier`].

use serde::{Deserialize, Serialize};

use crate::error::{PceError, Result};
use crate::types::{Address, Amount, Timestamp};

/// Recoverable signature in (v, r, s) form
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub v: u8,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

/// Message authorized by a signature
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignedPayload {
    Permit {
        owner: Address,
        spender: Address,
        value: Amount,
        nonce: u64,
        deadline: Timestamp,
    },
    Delegation {
        delegatee: Address,
        nonce: u64,
        expiry: Timestamp,
    },
}

impl SignedPayload {
    /// BLAKE3 digest of the payload under a domain separator
    pub fn digest(&self, domain_separator: &[u8; 32]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(domain_separator);
        match self {
            Self::Permit {
                owner,
                spender,
                value,
                nonce,
                deadline,
            } => {
                hasher.update(b"Permit");
                hasher.update(owner.as_bytes());
                hasher.update(spender.as_bytes());
                hasher.update(&value.to_be_bytes());
                hasher.update(&nonce.to_be_bytes());
                hasher.update(&deadline.to_be_bytes());
            }
            Self::Delegation {
                delegatee,
                nonce,
                expiry,
            } => {
                hasher.update(b"Delegation");
                hasher.update(delegatee.as_bytes());
                hasher.update(&nonce.to_be_bytes());
                hasher.update(&expiry.to_be_bytes());
            }
        }
        *hasher.finalize().as_bytes()
    }
}

/// Domain separator binding signatures to one token deployment
pub fn domain_separator(name: &str, version: &str, chain_id: u64, contract: &Address) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(name.as_bytes());
    hasher.update(version.as_bytes());
    hasher.update(&chain_id.to_be_bytes());
    hasher.update(contract.as_bytes());
    *hasher.finalize().as_bytes()
}

/// Recovers signer addresses from signatures
pub trait SignatureVerifier: Send + Sync {
    /// Address that signed `digest`
    fn recover(&self, digest: &[u8; 32], signature: &Signature) -> Result<Address>;
}

/// Verifier for deployments without a signing backend; rejects everything
#[derive(Clone, Copy, Debug, Default)]
pub struct RejectingVerifier;

impl SignatureVerifier for RejectingVerifier {
    fn recover(&self, _digest: &[u8; 32], _signature: &Signature) -> Result<Address> {
        Err(PceError::InvalidSignature)
    }
}
