use serde::{Deserialize, Serialize};
use veracam_core::error::{Result, VeracamError};

/// How a verifier locates the public half of the capture key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyRef {
    /// Raw ed25519 public key carried inline with the attestation.
    Inline([u8; 32]),
    /// Name of a key registered in the verifier's trust store.
    KeyId(String),
}

/// The signed binding produced once at capture time: one tile-tree root,
/// one metadata digest, one hardware-rooted signature over the pair.
/// Immutable after creation — tampering with any field is exactly what the
/// verification engine exists to surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attestation {
    pub tree_root: [u8; 32],
    pub metadata_digest: [u8; 32],
    /// ed25519 signature over `tree_root || metadata_digest`.
    pub signature: Vec<u8>,
    pub key: KeyRef,
}

impl Attestation {
    /// The one wire contract of the system: the signed message is the
    /// 64-byte concatenation of the tree root and the metadata digest,
    /// in that order.
    pub fn signable_bytes(&self) -> [u8; 64] {
        signable_bytes(&self.tree_root, &self.metadata_digest)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| VeracamError::Verification(format!("invalid attestation: {e}")))
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| VeracamError::Verification(format!("serialize attestation: {e}")))
    }

    /// Verify this attestation's signature against a resolved public key.
    pub fn verify_signature(&self, public_key: &[u8; 32]) -> bool {
        let verifier = crate::signature::SignatureVerifier::new();
        verifier.verify_ed25519_bytes(public_key, &self.signable_bytes(), &self.signature)
    }
}

pub fn signable_bytes(tree_root: &[u8; 32], metadata_digest: &[u8; 32]) -> [u8; 64] {
    let mut message = [0u8; 64];
    message[..32].copy_from_slice(tree_root);
    message[32..].copy_from_slice(metadata_digest);
    message
}
