// Local chain knowledge of one miner
//
// Blocks enter `known` only after passing validation, so every known block has
// its full ancestry known as well. The head is the highest known block; on equal
// height the one integrated first stays head.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::mn_blocks::Block;
use crate::mn_interface::{BlockId, MinerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Height is not parent height + 1, or a second genesis
    HeightMismatch,
    /// Self-mined on a parent that is no longer our head
    StaleParent,
    /// Id does not match the block content
    BadId,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::HeightMismatch => "height",
            RejectReason::StaleParent => "stale",
            RejectReason::BadId => "id",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid(RejectReason),
    MissingParent,
}

/// Result of integrating a valid block
#[derive(Debug, Clone, PartialEq)]
pub struct Integration {
    pub head_changed: bool,
    /// Orphans that were waiting for this block, oldest first
    pub unblocked: Vec<Rc<Block>>,
}

pub struct ChainView {
    owner: MinerId,
    genesis: BlockId,
    known: IndexMap<BlockId, Rc<Block>>,
    head: BlockId,
    pending: Vec<Rc<Block>>,
}

impl ChainView {
    pub fn new(owner: MinerId, genesis: Rc<Block>) -> Self {
        let id = genesis.id;
        let mut known = IndexMap::new();
        known.insert(id, genesis);
        Self {
            owner,
            genesis: id,
            known,
            head: id,
            pending: Vec::new(),
        }
    }

    pub fn owner(&self) -> MinerId {
        self.owner
    }

    pub fn genesis(&self) -> BlockId {
        self.genesis
    }

    pub fn head(&self) -> BlockId {
        self.head
    }

    pub fn head_block(&self) -> &Rc<Block> {
        &self.known[&self.head]
    }

    pub fn height(&self) -> u64 {
        self.head_block().height
    }

    pub fn contains(&self, block: &BlockId) -> bool {
        self.known.contains_key(block)
    }

    pub fn get(&self, block: &BlockId) -> Option<&Rc<Block>> {
        self.known.get(block)
    }

    /// Known blocks in integration order, genesis first
    pub fn known_blocks(&self) -> impl Iterator<Item = &Rc<Block>> {
        self.known.values()
    }

    pub fn num_known(&self) -> usize {
        self.known.len()
    }

    pub fn pending_blocks(&self) -> &[Rc<Block>] {
        &self.pending
    }

    pub fn is_pending(&self, block: &BlockId) -> bool {
        self.pending.iter().any(|b| b.id == *block)
    }

    pub fn classify(&self, block: &Block) -> Verdict {
        if !block.verify_id() {
            return Verdict::Invalid(RejectReason::BadId);
        }
        // own work only counts if it still extends our head
        if block.miner == self.owner && block.parent != Some(self.head) {
            return Verdict::Invalid(RejectReason::StaleParent);
        }
        let Some(parent_id) = block.parent else {
            return Verdict::Invalid(RejectReason::HeightMismatch);
        };
        match self.known.get(&parent_id) {
            None => Verdict::MissingParent,
            Some(parent) if block.height != parent.height + 1 => {
                Verdict::Invalid(RejectReason::HeightMismatch)
            }
            Some(_) => Verdict::Valid,
        }
    }

    /// Add a block that classified as valid
    pub fn integrate(&mut self, block: Rc<Block>) -> Integration {
        debug_assert_eq!(self.classify(&block), Verdict::Valid);

        let id = block.id;
        let height = block.height;
        self.known.insert(id, block);

        let head_changed = height > self.height();
        if head_changed {
            self.head = id;
        }

        let (unblocked, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|b| b.parent == Some(id));
        self.pending = waiting;

        Integration {
            head_changed,
            unblocked,
        }
    }

    /// Park a block whose parent is unknown. Returns false if it was already parked.
    pub fn park(&mut self, block: Rc<Block>) -> bool {
        if self.is_pending(&block.id) {
            return false;
        }
        self.pending.push(block);
        true
    }

    /// Blocks from `from` back to genesis, `from` first
    pub fn ancestors(&self, from: &BlockId) -> Vec<Rc<Block>> {
        let mut chain = Vec::new();
        let mut cursor = Some(*from);
        while let Some(id) = cursor {
            let Some(block) = self.known.get(&id) else {
                break;
            };
            chain.push(block.clone());
            cursor = block.parent;
        }
        chain
    }

    /// The chain ending in our head, head first
    pub fn main_chain(&self) -> Vec<Rc<Block>> {
        self.ancestors(&self.head)
    }

    /// Known blocks not on the main chain
    pub fn stale_blocks(&self) -> usize {
        self.num_known() - self.main_chain().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ME: MinerId = 1;
    const PEER: MinerId = 2;

    fn child(parent: &Block, miner: MinerId, time: f64) -> Rc<Block> {
        Rc::new(Block::new(
            Some(parent.id),
            parent.height + 1,
            time,
            miner,
            100.0,
        ))
    }

    fn view() -> (ChainView, Rc<Block>) {
        let genesis = Rc::new(Block::genesis());
        (ChainView::new(ME, genesis.clone()), genesis)
    }

    #[test]
    fn test_starts_at_genesis() {
        let (chain, genesis) = view();

        assert_eq!(chain.head(), genesis.id);
        assert_eq!(chain.height(), 0);
        assert_eq!(chain.num_known(), 1);
        assert!(chain.pending_blocks().is_empty());
    }

    #[test]
    fn test_extend_moves_head() {
        let (mut chain, genesis) = view();
        let b1 = child(&genesis, PEER, 1.0);

        assert_eq!(chain.classify(&b1), Verdict::Valid);
        let result = chain.integrate(b1.clone());

        assert!(result.head_changed);
        assert_eq!(chain.head(), b1.id);
        assert_eq!(chain.height(), 1);
    }

    #[test]
    fn test_equal_height_keeps_first_head() {
        let (mut chain, genesis) = view();
        let a = child(&genesis, PEER, 1.0);
        let b = child(&genesis, PEER, 2.0);

        chain.integrate(a.clone());
        let result = chain.integrate(b.clone());

        assert!(!result.head_changed);
        assert_eq!(chain.head(), a.id);
        assert_eq!(chain.stale_blocks(), 1);
    }

    #[test]
    fn test_higher_fork_wins() {
        let (mut chain, genesis) = view();
        let a = child(&genesis, PEER, 1.0);
        let b = child(&genesis, PEER, 2.0);
        let b2 = child(&b, PEER, 3.0);

        chain.integrate(a.clone());
        chain.integrate(b.clone());
        chain.integrate(b2.clone());

        assert_eq!(chain.head(), b2.id);
        let ids: Vec<_> = chain.main_chain().iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![b2.id, b.id, genesis.id]);
    }

    #[test]
    fn test_missing_parent() {
        let (chain, genesis) = view();
        let b1 = child(&genesis, PEER, 1.0);
        let b2 = child(&b1, PEER, 2.0);

        assert_eq!(chain.classify(&b2), Verdict::MissingParent);
    }

    #[test]
    fn test_height_mismatch() {
        let (chain, genesis) = view();
        let bad = Rc::new(Block::new(Some(genesis.id), 5, 1.0, PEER, 10.0));

        assert_eq!(
            chain.classify(&bad),
            Verdict::Invalid(RejectReason::HeightMismatch)
        );
        assert_eq!(
            chain.classify(&Block::new(None, 0, 3.0, PEER, 0.0)),
            Verdict::Invalid(RejectReason::HeightMismatch)
        );
    }

    #[test]
    fn test_own_block_on_stale_parent() {
        let (mut chain, genesis) = view();
        let mine = child(&genesis, ME, 1.0);
        let theirs = child(&genesis, PEER, 0.5);

        chain.integrate(theirs);

        assert_eq!(
            chain.classify(&mine),
            Verdict::Invalid(RejectReason::StaleParent)
        );
        // the same shape from a peer is fine
        assert_eq!(chain.classify(&child(&genesis, PEER, 1.0)), Verdict::Valid);
    }

    #[test]
    fn test_tampered_block_rejected() {
        let (chain, genesis) = view();
        let mut forged = (*child(&genesis, PEER, 1.0)).clone();
        forged.size = 1.0;

        assert_eq!(chain.classify(&forged), Verdict::Invalid(RejectReason::BadId));
    }

    #[test]
    fn test_orphans_unblocked_by_parent() {
        let (mut chain, genesis) = view();
        let b1 = child(&genesis, PEER, 1.0);
        let b2 = child(&b1, PEER, 2.0);
        let other = child(&b2, PEER, 3.0);

        assert!(chain.park(b2.clone()));
        assert!(!chain.park(b2.clone()));
        assert!(chain.park(other.clone()));

        let result = chain.integrate(b1);
        assert_eq!(result.unblocked, vec![b2]);
        assert_eq!(chain.pending_blocks(), &[other]);
    }
}
