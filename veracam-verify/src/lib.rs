pub mod attestation;
pub mod keys;
pub mod offline;
pub mod scoring;
pub mod signature;

use std::collections::BTreeMap;

use crate::attestation::Attestation;
use crate::keys::KeyStore;
use crate::scoring::{Check, Mode, ScoringPolicy, VerificationResult};
use crate::signature::SignatureVerifier;
use veracam_core::metadata::MetadataBundle;
use veracam_core::tile_tree::TileTreeBuilder;

/// Server-side verification engine: re-derives everything the capture side
/// claimed and scores it. Stateless and reentrant — independent calls share
/// nothing mutable, and fraud shows up as data in the result, never as an
/// error.
pub struct Verifier {
    policy: ScoringPolicy,
    builder: TileTreeBuilder,
    key_store: Option<KeyStore>,
}

impl Verifier {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self {
            policy,
            builder: TileTreeBuilder::new(),
            key_store: None,
        }
    }

    /// Attach the trust store used to resolve `KeyRef::KeyId` references.
    /// Without one, only inline keys can be checked.
    pub fn with_key_store(mut self, key_store: KeyStore) -> Self {
        self.key_store = Some(key_store);
        self
    }

    /// Nonstandard tile sizes are for tests; capture and verification must
    /// agree on the size or every integrity check fails.
    pub fn with_tile_builder(mut self, builder: TileTreeBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Verify one submission. `now` is unix seconds supplied by the caller
    /// so repeated calls over identical inputs return identical results.
    pub fn verify(
        &self,
        image: &[u8],
        attestation: &Attestation,
        bundle: &MetadataBundle,
        now: u64,
    ) -> VerificationResult {
        let mut per_check = BTreeMap::new();

        // 1. recompute the tile tree and compare roots
        let recomputed = self.builder.build_bytes(image);
        let integrity = recomputed.root == attestation.tree_root;
        per_check.insert(Check::Integrity, integrity);
        if !integrity {
            tracing::debug!(
                tiles = recomputed.tile_count(),
                "tile tree root mismatch — content differs from attestation"
            );
        }

        // 2. recompute the metadata digest; a malformed present field makes
        //    the binding false rather than aborting the verification
        let binding = match bundle.digest() {
            Ok(digest) => digest == attestation.metadata_digest,
            Err(e) => {
                tracing::debug!(error = %e, "metadata digest not recomputable");
                false
            }
        };
        per_check.insert(Check::MetadataBinding, binding);

        // 3. signature over tree_root || metadata_digest, under whichever
        //    key the attestation references
        per_check.insert(Check::Signature, self.signature_valid(attestation));

        // 4. metadata plausibility, independent of the binding
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

        // 5 & 6. weighted sum and verdict
        self.policy.score(per_check, Mode::Online)
    }

    fn signature_valid(&self, attestation: &Attestation) -> bool {
        let resolved = match &self.key_store {
            Some(store) => store.resolve(&attestation.key),
            None => match &attestation.key {
                crate::attestation::KeyRef::Inline(bytes) => {
                    Ok(ed25519_dalek::VerifyingKey::from_bytes(bytes).ok())
                }
                crate::attestation::KeyRef::KeyId(_) => Ok(None),
            },
        };
        let key = match resolved {
            Ok(Some(key)) => key,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(error = %e, "key resolution failed");
                return false;
            }
        };
        SignatureVerifier::new().verify_ed25519_bytes(
            &key.to_bytes(),
            &attestation.signable_bytes(),
            &attestation.signature,
        )
    }
}
