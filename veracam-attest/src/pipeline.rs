use crate::signer::{attest, AttestationKey};
use ed25519_dalek::SigningKey;
use veracam_core::error::{Result, VeracamError};
use veracam_core::frozen::FrozenImage;
use veracam_core::metadata::MetadataBundle;
use veracam_core::tile_tree::TileTreeBuilder;
use veracam_verify::attestation::Attestation;
use veracam_verify::offline::OfflineCertifier;
use veracam_verify::scoring::{ScoringPolicy, VerificationResult};

/// What one certification attempt produced: either an attestation ready for
/// online submission, or the offline certifier's verdict when the key
/// handle was unavailable. Never both — the fallback decision is made once
/// per attempt.
#[derive(Debug)]
pub enum CaptureOutcome {
    Attested(Attestation),
    Offline(VerificationResult),
}

/// Capture-side pipeline: freeze → build tile tree → digest metadata →
/// sign. Strictly sequential; each stage's output is the next stage's only
/// input.
pub struct CapturePipeline {
    key: Box<dyn AttestationKey>,
    builder: TileTreeBuilder,
    offline: OfflineCertifier,
    fallback_key: Option<SigningKey>,
}

impl CapturePipeline {
    pub fn new(key: Box<dyn AttestationKey>, policy: ScoringPolicy) -> Self {
        let builder = TileTreeBuilder::new();
        Self {
            key,
            offline: OfflineCertifier::new(policy).with_tile_builder(builder.clone()),
            builder,
            fallback_key: None,
        }
    }

    /// Locally-held key the offline path signs with when the primary key
    /// handle is unusable.
    pub fn with_fallback_key(mut self, key: SigningKey) -> Self {
        self.fallback_key = Some(key);
        self
    }

    /// Certify one capture. Unusable image bytes or malformed present
    /// metadata fields are the caller's bugs and fail hard; an unusable key
    /// handle is expected in the field and routes to the offline certifier
    /// instead.
    pub fn certify(
        &self,
        raw: Vec<u8>,
        bundle: &MetadataBundle,
        now: u64,
    ) -> Result<(FrozenImage, CaptureOutcome)> {
        let frozen = FrozenImage::freeze(raw)?;
        let tree = self.builder.build(&frozen);
        let metadata_digest = bundle.digest()?;

        match attest(tree.root, metadata_digest, self.key.as_ref()) {
            Ok(attestation) => {
                tracing::debug!(
                    tiles = tree.tile_count(),
                    format = frozen.format().as_str(),
                    "capture attested"
                );
                Ok((frozen, CaptureOutcome::Attested(attestation)))
            }
            Err(VeracamError::SigningUnavailable(reason)) => {
                tracing::warn!(reason = %reason, "signing unavailable, certifying offline");
                let result =
                    self.offline
                        .certify(frozen.as_bytes(), bundle, self.fallback_key.as_ref(), now);
                Ok((frozen, CaptureOutcome::Offline(result)))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::{DeadlineSigner, SoftwareKey};
    use std::sync::Arc;
    use std::time::Duration;
    use veracam_core::metadata::{DeviceClass, GeoFix, MotionSample, SensorFlags};
    use veracam_core::tile_tree::DEFAULT_TILE_SIZE;
    use veracam_verify::scoring::{Mode, Verdict};
    use veracam_verify::Verifier;

    const NOW: u64 = 1_755_000_060;
    const CAPTURED_AT: u64 = 1_755_000_000;

    fn jpeg_bytes(total_len: usize) -> Vec<u8> {
        let mut data = vec![0u8; total_len];
        data[..4].copy_from_slice(&[0xFF, 0xD8, 0xFF, 0xE0]);
        for (i, b) in data.iter_mut().enumerate().skip(4) {
            *b = (i % 251) as u8;
        }
        data
    }

    fn full_bundle() -> MetadataBundle {
        MetadataBundle {
            captured_at: CAPTURED_AT,
            geo: Some(GeoFix {
                latitude: 48.2082,
                longitude: 16.3738,
                accuracy_m: 12.0,
                sampled_at: CAPTURED_AT,
            }),
            motion: Some(MotionSample {
                accel_x: 0.12,
                accel_y: -0.33,
                accel_z: 9.74,
                sampled_at: CAPTURED_AT,
            }),
            device_class: DeviceClass::Smartphone,
            sensor_flags: SensorFlags {
                gps_live: true,
                motion_live: true,
                screen_capture_suspected: false,
            },
        }
    }

    fn test_key() -> SigningKey {
        let mut secret = [0u8; 32];
        getrandom::fill(&mut secret).unwrap();
        SigningKey::from_bytes(&secret)
    }

    struct HangingKey;

    impl AttestationKey for HangingKey {
        fn sign(&self, _message: &[u8]) -> veracam_core::error::Result<[u8; 64]> {
            std::thread::sleep(Duration::from_millis(500));
            Ok([0u8; 64])
        }

        fn attest_key(&self) -> veracam_core::error::Result<veracam_verify::attestation::KeyRef> {
            Ok(veracam_verify::attestation::KeyRef::KeyId("hanging".into()))
        }
    }

    #[test]
    fn attested_capture_verifies_end_to_end() {
        let key = test_key();
        let pipeline = CapturePipeline::new(
            Box::new(SoftwareKey::new(key)),
            ScoringPolicy::default(),
        );

        let (frozen, outcome) = pipeline
            .certify(jpeg_bytes(10 * DEFAULT_TILE_SIZE), &full_bundle(), NOW)
            .unwrap();

        let attestation = match outcome {
            CaptureOutcome::Attested(att) => att,
            CaptureOutcome::Offline(_) => panic!("expected the online path"),
        };

        let verifier = Verifier::new(ScoringPolicy::default());
        let result = verifier.verify(frozen.as_bytes(), &attestation, &full_bundle(), NOW);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.verdict, Verdict::Authentic);
        assert_eq!(result.mode, Mode::Online);
    }

    #[test]
    fn key_timeout_routes_to_offline_with_a_verdict() {
        let signer = DeadlineSigner::with_timeout(Arc::new(HangingKey), Duration::from_millis(30));
        let pipeline = CapturePipeline::new(Box::new(signer), ScoringPolicy::default())
            .with_fallback_key(test_key());

        let started = std::time::Instant::now();
        let (_frozen, outcome) = pipeline
            .certify(jpeg_bytes(2 * DEFAULT_TILE_SIZE), &full_bundle(), NOW)
            .unwrap();

        let result = match outcome {
            CaptureOutcome::Offline(result) => result,
            CaptureOutcome::Attested(_) => panic!("expected the offline path"),
        };
        assert_eq!(result.mode, Mode::Offline);
        assert_eq!(result.verdict, Verdict::Authentic);
        // the user got an answer promptly, not after the hang resolved
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn unusable_bytes_fail_hard_before_signing() {
        let pipeline = CapturePipeline::new(
            Box::new(SoftwareKey::new(test_key())),
            ScoringPolicy::default(),
        );
        assert!(pipeline.certify(vec![0u8; 64], &full_bundle(), NOW).is_err());
    }

    #[test]
    fn malformed_metadata_fails_hard_before_signing() {
        let pipeline = CapturePipeline::new(
            Box::new(SoftwareKey::new(test_key())),
            ScoringPolicy::default(),
        );
        let mut bundle = full_bundle();
        bundle.geo.as_mut().unwrap().latitude = f64::INFINITY;
        assert!(pipeline
            .certify(jpeg_bytes(DEFAULT_TILE_SIZE), &bundle, NOW)
            .is_err());
    }
}
