use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use veracam_attest::{CaptureOutcome, CapturePipeline, DeadlineSigner, SoftwareKey};
use veracam_core::error::Result;
use veracam_core::frozen::FrozenImage;
use veracam_core::metadata::MetadataBundle;
use veracam_core::tile_tree::TileTreeBuilder;
use veracam_verify::attestation::Attestation;
use veracam_verify::keys::KeyStore;
use veracam_verify::scoring::{ScoringPolicy, Verdict};
use veracam_verify::Verifier;

#[derive(Parser)]
#[command(name = "veracam")]
#[command(about = "Capture attestation and verification for photographic evidence")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Certify a captured image: freeze, hash, sign, emit an attestation
    Certify {
        /// Path to the captured image file
        image: String,

        /// Path to the capture metadata JSON
        #[arg(short, long)]
        metadata: String,

        /// Where to write the attestation JSON (default: <image>.attestation.json)
        #[arg(short, long)]
        out: Option<String>,

        /// Attest under this registered key id instead of an inline key
        #[arg(long)]
        key_id: Option<String>,

        /// Key handle deadline in milliseconds before falling back offline
        #[arg(long, default_value = "3000")]
        key_timeout_ms: u64,

        /// Key store directory (default: ~/.veracam/keys)
        #[arg(long)]
        keys_dir: Option<PathBuf>,
    },

    /// Verify an image against its attestation and metadata
    Verify {
        /// Path to the received image file
        image: String,

        /// Path to the attestation JSON
        #[arg(short, long)]
        attestation: String,

        /// Path to the metadata JSON
        #[arg(short, long)]
        metadata: String,

        /// Scoring policy JSON (default: built-in weights)
        #[arg(long)]
        policy: Option<String>,

        /// Key store directory (default: ~/.veracam/keys)
        #[arg(long)]
        keys_dir: Option<PathBuf>,
    },

    /// Print tile tree stats for an image without verdicting
    Inspect {
        /// Path to the image file
        image: String,
    },

    /// Manage the local key store
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },
}

#[derive(Subcommand)]
enum KeysAction {
    /// Show the local public key and trusted devices
    Show {
        #[arg(long)]
        keys_dir: Option<PathBuf>,
    },
    /// Trust a capture device's public key (64 hex chars)
    Trust {
        name: String,
        public_key_hex: String,
        #[arg(long)]
        keys_dir: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    match cli.command {
        Commands::Certify {
            image,
            metadata,
            out,
            key_id,
            key_timeout_ms,
            keys_dir,
        } => {
            if let Err(e) = cmd_certify(&image, &metadata, out, key_id, key_timeout_ms, keys_dir) {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Commands::Verify {
            image,
            attestation,
            metadata,
            policy,
            keys_dir,
        } => match cmd_verify(&image, &attestation, &metadata, policy, keys_dir) {
            Ok(verdict) => {
                if verdict == Verdict::Rejected {
                    std::process::exit(2);
                }
            }
            Err(e) => {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        },
        Commands::Inspect { image } => {
            if let Err(e) = cmd_inspect(&image) {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Commands::Keys { action } => {
            let result = match action {
                KeysAction::Show { keys_dir } => cmd_keys_show(keys_dir),
                KeysAction::Trust {
                    name,
                    public_key_hex,
                    keys_dir,
                } => cmd_keys_trust(&name, &public_key_hex, keys_dir),
            };
            if let Err(e) = result {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
    }
}

fn open_store(keys_dir: Option<PathBuf>) -> Result<KeyStore> {
    match keys_dir {
        Some(dir) => KeyStore::open_at(dir),
        None => KeyStore::open(),
    }
}

fn load_bundle(path: &str) -> Result<MetadataBundle> {
    let data = std::fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn cmd_certify(
    image_path: &str,
    metadata_path: &str,
    out: Option<String>,
    key_id: Option<String>,
    key_timeout_ms: u64,
    keys_dir: Option<PathBuf>,
) -> Result<()> {
    let raw = std::fs::read(image_path)?;
    let bundle = load_bundle(metadata_path)?;

    let store = open_store(keys_dir)?;
    let local_key = store.local_key()?;
    let software_key = match key_id {
        Some(id) => SoftwareKey::with_key_id(local_key.clone(), id),
        None => SoftwareKey::new(local_key.clone()),
    };
    let signer = DeadlineSigner::with_timeout(
        Arc::new(software_key),
        Duration::from_millis(key_timeout_ms),
    );

    let pipeline = CapturePipeline::new(Box::new(signer), ScoringPolicy::default())
        .with_fallback_key(local_key);

    let (frozen, outcome) = pipeline.certify(raw, &bundle, unix_now())?;

    match outcome {
        CaptureOutcome::Attested(attestation) => {
            let out_path = out.unwrap_or_else(|| format!("{image_path}.attestation.json"));
            std::fs::write(&out_path, attestation.to_json()?)?;
            println!("attested: {image_path}");
            println!("  format:      {}", frozen.format().as_str());
            println!("  bytes:       {}", frozen.len());
            println!("  tree root:   {}", hex(&attestation.tree_root));
            println!("  attestation: {out_path}");
        }
        CaptureOutcome::Offline(result) => {
            println!("certified offline (no usable signing key):");
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }
    Ok(())
}

fn cmd_verify(
    image_path: &str,
    attestation_path: &str,
    metadata_path: &str,
    policy_path: Option<String>,
    keys_dir: Option<PathBuf>,
) -> Result<Verdict> {
    let image = std::fs::read(image_path)?;
    let attestation = Attestation::from_json(&std::fs::read(attestation_path)?)?;
    let bundle = load_bundle(metadata_path)?;

    let policy = match policy_path {
        Some(path) => ScoringPolicy::from_json(&std::fs::read(path)?)?,
        None => ScoringPolicy::default(),
    };

    let verifier = Verifier::new(policy).with_key_store(open_store(keys_dir)?);
    let result = verifier.verify(&image, &attestation, &bundle, unix_now());

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.verdict)
}

fn cmd_inspect(image_path: &str) -> Result<()> {
    let raw = std::fs::read(image_path)?;
    let frozen = FrozenImage::freeze(raw)?;
    let tree = TileTreeBuilder::new().build(&frozen);

    println!("inspecting: {image_path}");
    println!("  format:    {}", frozen.format().as_str());
    println!("  bytes:     {}", frozen.len());
    println!("  tile size: {}", tree.tile_size);
    println!("  tiles:     {}", tree.tile_count());
    println!("  root:      {}", hex(&tree.root));
    Ok(())
}

fn cmd_keys_show(keys_dir: Option<PathBuf>) -> Result<()> {
    let store = open_store(keys_dir)?;
    println!("local public key: {}", hex(&store.local_public_key()?.to_bytes()));
    let devices = store.list_devices()?;
    if devices.is_empty() {
        println!("no trusted capture devices");
    } else {
        println!("trusted capture devices:");
        for name in devices {
            if let Some(key) = store.device_key(&name)? {
                println!("  {name}: {}", hex(&key.to_bytes()));
            }
        }
    }
    Ok(())
}

fn cmd_keys_trust(name: &str, public_key_hex: &str, keys_dir: Option<PathBuf>) -> Result<()> {
    let key = parse_hex32(public_key_hex)?;
    let store = open_store(keys_dir)?;
    store.trust_device(name, &key)?;
    println!("trusted device '{name}'");
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn parse_hex32(s: &str) -> Result<[u8; 32]> {
    use veracam_core::error::VeracamError;
    if s.len() != 64 {
        return Err(VeracamError::Verification(format!(
            "public key must be 64 hex chars, got {}",
            s.len()
        )));
    }
    let mut out = [0u8; 32];
    for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
        let pair = std::str::from_utf8(chunk)
            .map_err(|_| VeracamError::Verification("public key is not ASCII hex".into()))?;
        out[i] = u8::from_str_radix(pair, 16)
            .map_err(|_| VeracamError::Verification(format!("bad hex byte '{pair}'")))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let bytes: Vec<u8> = (0u8..32).collect();
        let encoded = hex(&bytes);
        assert_eq!(parse_hex32(&encoded).unwrap().to_vec(), bytes);
    }

    #[test]
    fn short_hex_rejected() {
        assert!(parse_hex32("abcd").is_err());
    }
}
