pub mod pipeline;
pub mod signer;

pub use pipeline::{CaptureOutcome, CapturePipeline};
pub use signer::{attest, AttestationKey, DeadlineSigner, SoftwareKey};
pub use veracam_verify::attestation::{Attestation, KeyRef};
