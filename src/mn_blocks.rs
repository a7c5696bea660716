//! Blocks and their content-derived identity.
//!
//! A block id is Blake3 over the immutable fields, so every miner that sees the
//! same block computes the same id no matter where its copy came from.

use crate::mn_interface::{BlockId, MinerId, SimTime, GENESIS_MINER};

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub id: BlockId,
    /// `None` only for genesis
    pub parent: Option<BlockId>,
    pub height: u64,
    pub created_at: SimTime,
    pub miner: MinerId,
    pub size: f64,
}

impl Block {
    pub fn new(
        parent: Option<BlockId>,
        height: u64,
        created_at: SimTime,
        miner: MinerId,
        size: f64,
    ) -> Self {
        Self {
            id: block_hash(parent, height, created_at, miner, size),
            parent,
            height,
            created_at,
            miner,
            size,
        }
    }

    /// The shared root every miner starts from
    pub fn genesis() -> Self {
        Self::new(None, 0, 0.0, GENESIS_MINER, 0.0)
    }

    pub fn is_genesis(&self) -> bool {
        self.parent.is_none()
    }

    /// Recomputes the hash and compares it with the stored id
    pub fn verify_id(&self) -> bool {
        self.id == block_hash(self.parent, self.height, self.created_at, self.miner, self.size)
    }
}

/// Blake3(parent || height || created_at || miner || size), first 8 bytes as LE u64
pub fn block_hash(
    parent: Option<BlockId>,
    height: u64,
    created_at: SimTime,
    miner: MinerId,
    size: f64,
) -> BlockId {
    let mut hasher = blake3::Hasher::new();
    match parent {
        Some(parent) => {
            hasher.update(&[1]);
            hasher.update(&parent.to_le_bytes());
        }
        None => {
            hasher.update(&[0]);
        }
    }
    hasher.update(&height.to_le_bytes());
    hasher.update(&created_at.to_bits().to_le_bytes());
    hasher.update(&miner.to_le_bytes());
    hasher.update(&size.to_bits().to_le_bytes());

    let hash = hasher.finalize();
    u64::from_le_bytes(
        hash.as_bytes()[0..8]
            .try_into()
            .expect("hash should have at least 8 bytes"),
    )
}
