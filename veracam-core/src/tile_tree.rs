use crate::frozen::FrozenImage;
use serde::{Deserialize, Serialize};

/// 4 KiB tiles put a typical multi-megabyte photo at ~1,000 leaves —
/// fine-grained enough to localize an edit to a small region.
pub const DEFAULT_TILE_SIZE: usize = 4096;

#[derive(Debug, Clone)]
pub struct TileTreeBuilder {
    tile_size: usize,
}

impl TileTreeBuilder {
    pub fn new() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
        }
    }

    pub fn with_tile_size(tile_size: usize) -> Self {
        assert!(tile_size > 0, "tile size must be nonzero");
        Self { tile_size }
    }

    pub fn build(&self, image: &FrozenImage) -> TileHashTree {
        self.build_bytes(image.as_bytes())
    }

    /// Pure function of the byte content and tile size: same input, same
    /// root, across calls and across processes.
    pub fn build_bytes(&self, data: &[u8]) -> TileHashTree {
        let tile_hashes: Vec<[u8; 32]> = data
            .chunks(self.tile_size)
            .map(|tile| hash_tile(tile))
            .collect();

        let root = compute_root(&tile_hashes);

        TileHashTree {
            tile_size: self.tile_size,
            content_len: data.len() as u64,
            tile_hashes,
            root,
        }
    }

    pub fn tile_size(&self) -> usize {
        self.tile_size
    }
}

impl Default for TileTreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// Leaf hash covers the tile's true byte length, so a short final tile can
// never collide with the same tile zero-padded to full size.
fn hash_tile(tile: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(tile.len() as u64).to_le_bytes());
    hasher.update(tile);
    hasher.finalize().into()
}

fn compute_root(leaves: &[[u8; 32]]) -> [u8; 32] {
    if leaves.is_empty() {
        return [0u8; 32];
    }
    if leaves.len() == 1 {
        return leaves[0];
    }

    let mut level = leaves.to_vec();
    while level.len() > 1 {
        let mut next_level = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let hash = if pair.len() == 2 {
                let mut hasher = blake3::Hasher::new();
                hasher.update(&pair[0]);
                hasher.update(&pair[1]);
                hasher.finalize().into()
            } else {
                pair[0] // odd node promoted
            };
            next_level.push(hash);
        }
        level = next_level;
    }
    level[0]
}

/// Ordered tile hashes plus their root — the content fingerprint of one
/// frozen image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileHashTree {
    pub tile_size: usize,
    pub content_len: u64,
    pub tile_hashes: Vec<[u8; 32]>,
    pub root: [u8; 32],
}

impl TileHashTree {
    pub fn tile_count(&self) -> usize {
        self.tile_hashes.len()
    }

    /// Indices of tiles whose hashes differ between the two trees.
    /// Tiles present in only one tree count as differing, so truncation
    /// shows up as a trailing run of indices rather than a bare root
    /// mismatch.
    pub fn diff_tiles(&self, other: &TileHashTree) -> Vec<usize> {
        let longest = self.tile_hashes.len().max(other.tile_hashes.len());
        let mut changed = Vec::new();
        for i in 0..longest {
            match (self.tile_hashes.get(i), other.tile_hashes.get(i)) {
                (Some(a), Some(b)) if a == b => {}
                _ => changed.push(i),
            }
        }
        changed
    }
}
