use ed25519_dalek::{Signature, VerifyingKey};
use veracam_core::error::{Result, VeracamError};

pub struct SignatureVerifier;

impl SignatureVerifier {
    pub fn new() -> Self {
        Self
    }

    /// Strict ed25519 verification. A bad signature is Ok(false); only a
    /// structurally unusable public key is an error.
    pub fn verify_ed25519(
        &self,
        public_key: &[u8; 32],
        message: &[u8],
        signature: &[u8; 64],
    ) -> Result<bool> {
        let key = VerifyingKey::from_bytes(public_key)
            .map_err(|e| VeracamError::Verification(format!("invalid public key: {e}")))?;

        let sig = Signature::from_bytes(signature);

        Ok(key.verify_strict(message, &sig).is_ok())
    }

    /// Variant-length entry point for signatures carried as `Vec<u8>`;
    /// anything that is not exactly 64 bytes simply does not verify.
    pub fn verify_ed25519_bytes(
        &self,
        public_key: &[u8; 32],
        message: &[u8],
        signature: &[u8],
    ) -> bool {
        let sig: [u8; 64] = match signature.try_into() {
            Ok(s) => s,
            Err(_) => return false,
        };
        self.verify_ed25519(public_key, message, &sig)
            .unwrap_or(false)
    }
}

impl Default for SignatureVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    #[test]
    fn valid_signature_verifies() {
        let mut secret = [0u8; 32];
        getrandom::fill(&mut secret).unwrap();
        let key = SigningKey::from_bytes(&secret);

        let msg = b"tree root and digest";
        let sig = key.sign(msg);

        let verifier = SignatureVerifier::new();
        assert!(verifier
            .verify_ed25519(&key.verifying_key().to_bytes(), msg, &sig.to_bytes())
            .unwrap());
    }

    #[test]
    fn flipped_bit_does_not_verify() {
        let mut secret = [0u8; 32];
        getrandom::fill(&mut secret).unwrap();
        let key = SigningKey::from_bytes(&secret);

        let msg = b"tree root and digest";
        let mut sig = key.sign(msg).to_bytes();
        sig[10] ^= 0x01;

        let verifier = SignatureVerifier::new();
        assert!(!verifier
            .verify_ed25519(&key.verifying_key().to_bytes(), msg, &sig)
            .unwrap());
    }

    #[test]
    fn wrong_length_signature_is_false_not_error() {
        let verifier = SignatureVerifier::new();
        let mut secret = [0u8; 32];
        getrandom::fill(&mut secret).unwrap();
        let key = SigningKey::from_bytes(&secret);
        assert!(!verifier.verify_ed25519_bytes(&key.verifying_key().to_bytes(), b"msg", &[0u8; 12]));
    }
}
