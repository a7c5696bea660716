use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use crate::mn_blocks::Block;

// all the same numeric type of some size to allow casting/interop
pub type MinerId = u64;
pub type LinkId = u64;
pub type BlockId = u64;

/// Virtual time. Non-negative and never decreasing over a run.
pub type SimTime = f64;

/// Author of the genesis block. Real miners are numbered from 1.
pub const GENESIS_MINER: MinerId = 0;

/// Default block size upper bound in bytes (200 KiB)
pub const MAX_BLOCK_SIZE: f64 = 1024.0 * 200.0;

// ============================================================================
// Protocol Messages
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// "I need this block"
    RequestBlock(BlockId),
    /// "Here is the block you wanted"
    DeliverBlock(Rc<Block>),
    /// "I have a new chain head"
    AnnounceHead(BlockId),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProtocolMessage {
    pub destination: MinerId,
    pub origin: MinerId,
    pub action: Action,
}

impl ProtocolMessage {
    pub fn block_id(&self) -> BlockId {
        match &self.action {
            Action::RequestBlock(id) | Action::AnnounceHead(id) => *id,
            Action::DeliverBlock(block) => block.id,
        }
    }
}

/// Where a block handed to the validation pipeline came from
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    Mined,
    Peer(MinerId),
}

/// Payload carried by scheduler conditions in a mining network
#[derive(Clone, Debug, Default)]
pub enum Signal {
    /// Plain wakeup (timeouts, new blocks to validate, permission to resume)
    #[default]
    Wake,
    Message(ProtocolMessage),
}

impl From<ProtocolMessage> for Signal {
    fn from(message: ProtocolMessage) -> Self {
        Signal::Message(message)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Problems detected while building a network. Nothing here is raised once the
/// simulation is running.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("hashrate must be positive, got {0}")]
    NonPositiveHashrate(f64),
    #[error("verify rate must be positive, got {0}")]
    NonPositiveVerifyRate(f64),
    #[error("link delay must not be negative, got {0}")]
    NegativeDelay(SimTime),
    #[error("block size range [{0}, {1}) is empty or negative")]
    InvalidBlockSize(f64, f64),
    #[error("no miner with id {0}")]
    UnknownMiner(MinerId),
    #[error("miner {0} cannot link to itself")]
    SelfLink(MinerId),
    #[error("miners {0} and {1} are already linked")]
    DuplicateLink(MinerId, MinerId),
    #[error("topology can not change once the simulation has started")]
    TopologyFrozen,
}

// ============================================================================
// Recording
// ============================================================================

/// Append-only store for simulation entities.
///
/// Calls are fire-and-forget: implementations must not fail back into the
/// simulation, and whatever they do with the data is their own concern.
pub trait Recorder {
    fn record_block(&mut self, block: &Block);

    fn record_miner(&mut self, miner: MinerId, hashrate: f64, verify_rate: f64);

    fn record_link(&mut self, link: LinkId, destination: MinerId, delay: SimTime);

    /// `block` was authored by `miner`
    fn record_ownership(&mut self, miner: MinerId, block: BlockId);
}

/// One recorder shared by every miner of a network
pub type SharedRecorder = Rc<RefCell<dyn Recorder>>;
