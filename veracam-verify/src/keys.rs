use crate::attestation::KeyRef;
use ed25519_dalek::{SigningKey, VerifyingKey};
use std::path::{Path, PathBuf};
use veracam_core::error::{Result, VeracamError};

/// File-backed key material: the local signing key (used by the offline
/// certifier and by software-key capture setups) plus the public keys of
/// capture devices this verifier trusts.
pub struct KeyStore {
    base_dir: PathBuf,
}

impl KeyStore {
    /// Open the key store at ~/.veracam/keys/
    pub fn open() -> Result<Self> {
        let base = dirs_path()?;
        std::fs::create_dir_all(&base).map_err(VeracamError::Io)?;
        Ok(Self { base_dir: base })
    }

    /// Open at a specific directory (for testing).
    pub fn open_at(path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&path).map_err(VeracamError::Io)?;
        Ok(Self { base_dir: path })
    }

    /// Load or generate the local signing key.
    /// Generated on first use, persisted for all future runs.
    pub fn local_key(&self) -> Result<SigningKey> {
        let key_path = self.base_dir.join("local.key");
        if key_path.exists() {
            self.load_signing_key(&key_path)
        } else {
            let key = self.generate_and_save(&key_path)?;
            tracing::info!("generated new local signing key");
            Ok(key)
        }
    }

    pub fn local_public_key(&self) -> Result<VerifyingKey> {
        Ok(self.local_key()?.verifying_key())
    }

    /// Trust a capture device's public key (saved as keys/{name}.pub).
    pub fn trust_device(&self, name: &str, public_key: &[u8; 32]) -> Result<()> {
        let path = self.base_dir.join(format!("{name}.pub"));
        std::fs::write(&path, public_key).map_err(VeracamError::Io)?;
        tracing::info!(device = name, "trusted capture device key");
        Ok(())
    }

    /// Load a trusted capture device's public key.
    pub fn device_key(&self, name: &str) -> Result<Option<VerifyingKey>> {
        let path = self.base_dir.join(format!("{name}.pub"));
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path).map_err(VeracamError::Io)?;
        let key_bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            VeracamError::Verification(format!(
                "device key '{name}' is {} bytes, expected 32",
                bytes.len()
            ))
        })?;
        let key = VerifyingKey::from_bytes(&key_bytes)
            .map_err(|e| VeracamError::Verification(format!("invalid device key: {e}")))?;
        Ok(Some(key))
    }

    /// List all trusted capture devices.
    pub fn list_devices(&self) -> Result<Vec<String>> {
        let mut devices = Vec::new();
        let entries = std::fs::read_dir(&self.base_dir).map_err(VeracamError::Io)?;
        for entry in entries {
            let entry = entry.map_err(VeracamError::Io)?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".pub") && name != "local.pub" {
                devices.push(name.trim_end_matches(".pub").to_string());
            }
        }
        devices.sort();
        Ok(devices)
    }

    /// Resolve an attestation's key reference to a verifying key.
    /// An unknown key id resolves to None — the signature sub-check simply
    /// fails, it is not a hard error.
    pub fn resolve(&self, key: &KeyRef) -> Result<Option<VerifyingKey>> {
        match key {
            KeyRef::Inline(bytes) => Ok(VerifyingKey::from_bytes(bytes).ok()),
            KeyRef::KeyId(id) => self.device_key(id),
        }
    }

    fn generate_and_save(&self, path: &Path) -> Result<SigningKey> {
        let mut secret = [0u8; 32];
        getrandom::fill(&mut secret)
            .map_err(|e| VeracamError::Verification(format!("CSPRNG failed: {e}")))?;
        let key = SigningKey::from_bytes(&secret);
        // raw 32-byte secret, public half alongside for reference
        std::fs::write(path, key.to_bytes()).map_err(VeracamError::Io)?;
        let pub_path = path.with_extension("pub");
        std::fs::write(&pub_path, key.verifying_key().to_bytes()).map_err(VeracamError::Io)?;
        Ok(key)
    }

    fn load_signing_key(&self, path: &Path) -> Result<SigningKey> {
        let bytes = std::fs::read(path).map_err(VeracamError::Io)?;
        let key_bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            VeracamError::Verification(format!(
                "local key is {} bytes, expected 32",
                bytes.len()
            ))
        })?;
        Ok(SigningKey::from_bytes(&key_bytes))
    }
}

/// Default key store directory: ~/.veracam/keys/
fn dirs_path() -> Result<PathBuf> {
    let home = if cfg!(windows) {
        std::env::var("USERPROFILE")
            .or_else(|_| std::env::var("HOME"))
            .map_err(|_| VeracamError::Verification("cannot determine home directory".into()))?
    } else {
        std::env::var("HOME")
            .map_err(|_| VeracamError::Verification("cannot determine home directory".into()))?
    };
    Ok(PathBuf::from(home).join(".veracam").join("keys"))
}
