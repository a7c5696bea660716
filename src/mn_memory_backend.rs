// In-memory recording backend
//
// Keeps everything the miners report about blocks, miners and links in plain
// collections. Ideal for testing, simulation and post-run reporting. Nothing is
// ever removed. A block keeps its first record, miners and links keep the latest
// one, and each (miner, block) ownership pair is stored once.

use indexmap::IndexMap;

use crate::mn_blocks::Block;
use crate::mn_interface::{BlockId, LinkId, MinerId, Recorder, SimTime};

#[derive(Debug, Clone, PartialEq)]
pub struct BlockRecord {
    pub parent: Option<BlockId>,
    pub height: u64,
    pub time: SimTime,
    pub size: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinerRecord {
    pub hashrate: f64,
    pub verify_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkRecord {
    pub destination: MinerId,
    pub delay: SimTime,
}

/// In-memory recorder
///
/// # Example
/// ```rust
/// use mn_rust::mn_memory_backend::MemRecorder;
/// use mn_rust::mn_interface::Recorder;
///
/// let mut recorder = MemRecorder::new();
/// recorder.record_miner(1, 0.5, 1024.0);
/// assert_eq!(recorder.miners().count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemRecorder {
    blocks: IndexMap<BlockId, BlockRecord>,
    miners: IndexMap<MinerId, MinerRecord>,
    links: IndexMap<LinkId, LinkRecord>,
    ownership: IndexMap<MinerId, Vec<BlockId>>,
    writes: usize,
}

impl MemRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(&self, id: &BlockId) -> Option<&BlockRecord> {
        self.blocks.get(id)
    }

    pub fn blocks(&self) -> impl Iterator<Item = (&BlockId, &BlockRecord)> {
        self.blocks.iter()
    }

    pub fn miners(&self) -> impl Iterator<Item = (&MinerId, &MinerRecord)> {
        self.miners.iter()
    }

    pub fn links(&self) -> impl Iterator<Item = (&LinkId, &LinkRecord)> {
        self.links.iter()
    }

    /// Blocks authored by `miner`, in creation order
    pub fn owned_by(&self, miner: &MinerId) -> &[BlockId] {
        self.ownership.get(miner).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Total number of record calls received
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl Recorder for MemRecorder {
    fn record_block(&mut self, block: &Block) {
        self.writes += 1;
        self.blocks.entry(block.id).or_insert(BlockRecord {
            parent: block.parent,
            height: block.height,
            time: block.created_at,
            size: block.size,
        });
    }

    fn record_miner(&mut self, miner: MinerId, hashrate: f64, verify_rate: f64) {
        self.writes += 1;
        self.miners.insert(
            miner,
            MinerRecord {
                hashrate,
                verify_rate,
            },
        );
    }

    fn record_link(&mut self, link: LinkId, destination: MinerId, delay: SimTime) {
        self.writes += 1;
        self.links.insert(link, LinkRecord { destination, delay });
    }

    fn record_ownership(&mut self, miner: MinerId, block: BlockId) {
        self.writes += 1;
        let owned = self.ownership.entry(miner).or_default();
        if !owned.contains(&block) {
            owned.push(block);
        }
    }
}

/// Discards everything
pub struct NoOpRecorder;

impl Recorder for NoOpRecorder {
    fn record_block(&mut self, _block: &Block) {}

    fn record_miner(&mut self, _miner: MinerId, _hashrate: f64, _verify_rate: f64) {}

    fn record_link(&mut self, _link: LinkId, _destination: MinerId, _delay: SimTime) {}

    fn record_ownership(&mut self, _miner: MinerId, _block: BlockId) {}
}
