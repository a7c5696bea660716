//! Monotonic id counters for miners and links
//!
//! Handed to the network builder instead of living in global state, so two
//! networks built side by side (or one after a `reset`) number their entities
//! independently. Ids start at 1; 0 is reserved for the genesis author.

use crate::mn_interface::{LinkId, MinerId};

#[derive(Debug, Clone)]
pub struct IdRegistry {
    next_miner: MinerId,
    next_link: LinkId,
}

impl IdRegistry {
    pub fn new() -> Self {
        Self {
            next_miner: 1,
            next_link: 1,
        }
    }

    pub fn next_miner_id(&mut self) -> MinerId {
        let id = self.next_miner;
        self.next_miner += 1;
        id
    }

    pub fn next_link_id(&mut self) -> LinkId {
        let id = self.next_link;
        self.next_link += 1;
        id
    }

    pub fn miners_issued(&self) -> u64 {
        self.next_miner - 1
    }

    pub fn links_issued(&self) -> u64 {
        self.next_link - 1
    }

    /// Forget every id handed out so far
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for IdRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_independent() {
        let mut registry = IdRegistry::new();

        assert_eq!(registry.next_miner_id(), 1);
        assert_eq!(registry.next_miner_id(), 2);
        assert_eq!(registry.next_link_id(), 1);
        assert_eq!(registry.miners_issued(), 2);
        assert_eq!(registry.links_issued(), 1);
    }

    #[test]
    fn test_reset() {
        let mut registry = IdRegistry::new();
        registry.next_miner_id();
        registry.next_link_id();
        registry.reset();

        assert_eq!(registry.next_miner_id(), 1);
        assert_eq!(registry.next_link_id(), 1);
    }
}
