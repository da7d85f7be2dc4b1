use std::collections::BTreeMap;

use crate::attestation::{signable_bytes, Attestation, KeyRef};
use crate::scoring::{Check, Mode, ScoringPolicy, VerificationResult};
use crate::signature::SignatureVerifier;
use ed25519_dalek::{Signer, SigningKey};
use veracam_core::frozen::ImageFormat;
use veracam_core::metadata::MetadataBundle;
use veracam_core::tile_tree::TileTreeBuilder;

/// Reduced-trust local certification for when no verifier service is
/// reachable. Every call returns a verdict: checks that cannot be
/// performed fail, they never throw.
pub struct OfflineCertifier {
    policy: ScoringPolicy,
    builder: TileTreeBuilder,
}

impl OfflineCertifier {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self {
            policy,
            builder: TileTreeBuilder::new(),
        }
    }

    pub fn with_tile_builder(mut self, builder: TileTreeBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// Certify locally. There is no remote authority to cross-check
    /// against, so the signature sub-check is only the locally-held key
    /// pair signing and immediately re-verifying its own work.
    pub fn certify(
        &self,
        image: &[u8],
        bundle: &MetadataBundle,
        local_key: Option<&SigningKey>,
        now: u64,
    ) -> VerificationResult {
        self.certify_with_attestation(image, bundle, local_key, now).0
    }

    /// Same as `certify`, also returning the locally-signed attestation
    /// when one could be produced, so the capture can be resubmitted for
    /// online verification once the service is reachable again.
    pub fn certify_with_attestation(
        &self,
        image: &[u8],
        bundle: &MetadataBundle,
        local_key: Option<&SigningKey>,
        now: u64,
    ) -> (VerificationResult, Option<Attestation>) {
        let mut per_check = BTreeMap::new();

        // integrity here means the bytes froze and hashed cleanly — there
        // is no prior root to compare against on this path
        let integrity = ImageFormat::sniff(image).is_ok();
        per_check.insert(Check::Integrity, integrity);
        let tree = self.builder.build_bytes(image);

        let digest = match bundle.digest() {
            Ok(digest) => {
                per_check.insert(Check::MetadataBinding, true);
                Some(digest)
            }
            Err(e) => {
                tracing::debug!(error = %e, "metadata digest not computable offline");
                per_check.insert(Check::MetadataBinding, false);
                None
            }
        };

        let attestation = match (local_key, digest) {
            (Some(key), Some(digest)) => {
                let message = signable_bytes(&tree.root, &digest);
                let signature = key.sign(&message).to_bytes();
                let self_checked = SignatureVerifier::new()
                    .verify_ed25519(&key.verifying_key().to_bytes(), &message, &signature)
                    .unwrap_or(false);
                per_check.insert(Check::Signature, self_checked);
                self_checked.then(|| Attestation {
                    tree_root: tree.root,
                    metadata_digest: digest,
                    signature: signature.to_vec(),
                    key: KeyRef::Inline(key.verifying_key().to_bytes()),
                })
            }
            _ => {
                per_check.insert(Check::Signature, false);
                None
            }
        };

        per_check.insert(
            Check::MetadataCompleteness,
            self.policy.metadata_complete(bundle),
        );
        per_check.insert(Check::GeoPlausibility, self.policy.geo_plausible(bundle));
        per_check.insert(
            Check::MotionPlausibility,
            self.policy.motion_plausible(bundle),
        );
        per_check.insert(
            Check::TimestampPlausibility,
            self.policy.timestamp_plausible(bundle, now),
        );

        (self.policy.score(per_check, Mode::Offline), attestation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::Verdict;
    use veracam_core::metadata::{DeviceClass, GeoFix, MotionSample, SensorFlags};
    use veracam_core::tile_tree::DEFAULT_TILE_SIZE;

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

    #[test]
    fn offline_certification_with_local_key_passes() {
        let certifier = OfflineCertifier::new(ScoringPolicy::default());
        let key = test_key();
        let image = jpeg_bytes(10 * DEFAULT_TILE_SIZE);

        let (result, attestation) =
            certifier.certify_with_attestation(&image, &full_bundle(), Some(&key), NOW);

        assert_eq!(result.mode, Mode::Offline);
        assert_eq!(result.verdict, Verdict::Authentic);
        assert!(result.passed(Check::Signature));

        // the emitted attestation verifies like any online submission
        let att = attestation.unwrap();
        assert!(att.verify_signature(&key.verifying_key().to_bytes()));
    }

    #[test]
    fn never_errors_on_garbage_bytes() {
        let certifier = OfflineCertifier::new(ScoringPolicy::default());
        let result = certifier.certify(&[0xAB; 100], &full_bundle(), None, NOW);

        assert_eq!(result.mode, Mode::Offline);
        assert!(!result.passed(Check::Integrity));
        assert!(!result.passed(Check::Signature));
    }

    #[test]
    fn never_errors_on_malformed_metadata() {
        let certifier = OfflineCertifier::new(ScoringPolicy::default());
        let key = test_key();
        let mut bundle = full_bundle();
        bundle.geo.as_mut().unwrap().longitude = 361.0;

        let (result, attestation) = certifier.certify_with_attestation(
            &jpeg_bytes(DEFAULT_TILE_SIZE),
            &bundle,
            Some(&key),
            NOW,
        );

        assert_eq!(result.mode, Mode::Offline);
        assert!(!result.passed(Check::MetadataBinding));
        assert!(!result.passed(Check::Signature));
        assert!(attestation.is_none());
    }

    #[test]
    fn missing_local_key_lowers_confidence_without_failing() {
        let certifier = OfflineCertifier::new(ScoringPolicy::default());
        let image = jpeg_bytes(DEFAULT_TILE_SIZE);

        let with_key = certifier.certify(&image, &full_bundle(), Some(&test_key()), NOW);
        let without = certifier.certify(&image, &full_bundle(), None, NOW);

        assert!(without.confidence < with_key.confidence);
        assert_eq!(without.mode, Mode::Offline);
    }
}
