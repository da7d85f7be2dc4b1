use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use ed25519_dalek::{Signer, SigningKey};
use veracam_core::error::{Result, VeracamError};
use veracam_verify::attestation::{signable_bytes, Attestation, KeyRef};

/// Opaque handle to attestation key material. The private key never leaves
/// the implementation — callers get signatures and a key reference, nothing
/// else. Hardware-backed stores implement this per platform; `SoftwareKey`
/// is the file-key implementation.
pub trait AttestationKey: Send + Sync {
    /// Sign the 64-byte attestation message. `SigningUnavailable` means the
    /// backing store cannot be used right now; callers route to the offline
    /// path, they do not retry here.
    fn sign(&self, message: &[u8]) -> Result<[u8; 64]>;

    /// Public identity of the key, as it should appear in the attestation.
    fn attest_key(&self) -> Result<KeyRef>;
}

/// Sign one tree-root + metadata-digest pair under the given key handle.
/// The signed message is `tree_root || metadata_digest`, nothing more.
pub fn attest(
    tree_root: [u8; 32],
    metadata_digest: [u8; 32],
    key: &dyn AttestationKey,
) -> Result<Attestation> {
    let message = signable_bytes(&tree_root, &metadata_digest);
    let signature = key.sign(&message)?;
    let key_ref = key.attest_key()?;
    Ok(Attestation {
        tree_root,
        metadata_digest,
        signature: signature.to_vec(),
        key: key_ref,
    })
}

/// Software ed25519 key. The real capture deployment keeps its key in the
/// platform attestation store; this implementation backs tests, the CLI,
/// and devices without one.
pub struct SoftwareKey {
    key: SigningKey,
    key_id: Option<String>,
}

impl SoftwareKey {
    pub fn new(key: SigningKey) -> Self {
        Self { key, key_id: None }
    }

    /// Attest under a registered key id instead of carrying the public key
    /// inline.
    pub fn with_key_id(key: SigningKey, key_id: impl Into<String>) -> Self {
        Self {
            key,
            key_id: Some(key_id.into()),
        }
    }
}

impl AttestationKey for SoftwareKey {
    fn sign(&self, message: &[u8]) -> Result<[u8; 64]> {
        Ok(self.key.sign(message).to_bytes())
    }

    fn attest_key(&self) -> Result<KeyRef> {
        Ok(match &self.key_id {
            Some(id) => KeyRef::KeyId(id.clone()),
            None => KeyRef::Inline(self.key.verifying_key().to_bytes()),
        })
    }
}

/// Bounds key-handle access with a hard deadline. Hardware attestation
/// stores can hang on a wedged secure element; a capture action must
/// degrade to the offline path instead of hanging with it.
pub struct DeadlineSigner {
    inner: Arc<dyn AttestationKey>,
    timeout: Duration,
}

impl DeadlineSigner {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

    pub fn new(inner: Arc<dyn AttestationKey>) -> Self {
        Self {
            inner,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(inner: Arc<dyn AttestationKey>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl AttestationKey for DeadlineSigner {
    fn sign(&self, message: &[u8]) -> Result<[u8; 64]> {
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let message = message.to_vec();
        std::thread::spawn(move || {
            // receiver may be gone if we already timed out; that's fine
            let _ = tx.send(inner.sign(&message));
        });

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "key handle access timed out");
                Err(VeracamError::SigningUnavailable(format!(
                    "key handle access timed out after {}ms",
                    self.timeout.as_millis()
                )))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(VeracamError::SigningUnavailable(
                "key handle worker died before producing a signature".into(),
            )),
        }
    }

    fn attest_key(&self) -> Result<KeyRef> {
        self.inner.attest_key()
    }
}
