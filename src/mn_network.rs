// Network builder and driver
//
// Owns the scheduler, the shared genesis block and every miner. Topology is
// fixed once the first `run_until` starts the miners' processes.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::mn_blocks::Block;
use crate::mn_events::{NoOpSink, SharedSink};
use crate::mn_interface::{
    BlockId, ConfigError, LinkId, MinerId, ProtocolMessage, SharedRecorder, Signal, SimTime,
    GENESIS_MINER, MAX_BLOCK_SIZE,
};
use crate::mn_link::Link;
use crate::mn_memory_backend::NoOpRecorder;
use crate::mn_miner::{Miner, MinerConfig, MinerStats};
use crate::mn_registry::IdRegistry;
use crate::mn_scheduler::Scheduler;

/// Settings shared by every miner of a network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Master seed. `None` picks a random one, see [`Network::seed`].
    pub seed: Option<[u8; 32]>,
    /// Uniform block size draw, `[low, high)` bytes
    pub block_size_range: (f64, f64),
    /// Minimum delay before re-requesting a block. `None` asks exactly once.
    pub request_timeout: Option<SimTime>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            seed: None,
            block_size_range: (0.0, MAX_BLOCK_SIZE),
            request_timeout: None,
        }
    }
}

/// End-of-run view of one miner
#[derive(Debug, Clone, PartialEq)]
pub struct MinerSummary {
    pub id: MinerId,
    pub head: BlockId,
    pub height: u64,
    pub known: usize,
    pub pending: usize,
    pub stale: usize,
    pub stats: MinerStats,
}

pub struct Network {
    sched: Scheduler<Signal>,
    registry: IdRegistry,
    config: NetworkConfig,
    genesis: Rc<Block>,
    miners: BTreeMap<MinerId, Miner>,
    links: Vec<(LinkId, MinerId, MinerId)>,
    rng: StdRng,
    seed: [u8; 32],
    sink: SharedSink,
    recorder: SharedRecorder,
    started: bool,
}

impl Network {
    /// Network that discards events and records
    pub fn new(config: NetworkConfig) -> Self {
        Self::with_parts(
            config,
            IdRegistry::new(),
            Rc::new(RefCell::new(NoOpSink)),
            Rc::new(RefCell::new(NoOpRecorder)),
        )
    }

    pub fn with_parts(
        config: NetworkConfig,
        registry: IdRegistry,
        sink: SharedSink,
        recorder: SharedRecorder,
    ) -> Self {
        let seed = config.seed.unwrap_or_else(|| {
            let mut seed = [0u8; 32];
            rand::thread_rng().fill(&mut seed);
            seed
        });

        let genesis = Rc::new(Block::genesis());
        {
            let mut recorder = recorder.borrow_mut();
            recorder.record_block(&genesis);
            recorder.record_ownership(GENESIS_MINER, genesis.id);
        }

        Self {
            sched: Scheduler::new(),
            registry,
            config,
            genesis,
            miners: BTreeMap::new(),
            links: Vec::new(),
            rng: StdRng::from_seed(seed),
            seed,
            sink,
            recorder,
            started: false,
        }
    }

    /// The seed actually in use, for reproducing a run
    pub fn seed(&self) -> [u8; 32] {
        self.seed
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn genesis(&self) -> &Rc<Block> {
        &self.genesis
    }

    pub fn now(&self) -> SimTime {
        self.sched.now()
    }

    pub fn events_processed(&self) -> u64 {
        self.sched.events_processed()
    }

    pub fn add_miner(&mut self, hashrate: f64, verify_rate: f64) -> Result<MinerId, ConfigError> {
        if self.started {
            return Err(ConfigError::TopologyFrozen);
        }

        let config = MinerConfig {
            hashrate,
            verify_rate,
            block_size_range: self.config.block_size_range,
            request_timeout: self.config.request_timeout,
        };
        config.validate()?;

        // every miner draws from its own stream, fixed by creation order
        let mut seed = [0u8; 32];
        self.rng.fill(&mut seed);

        let id = self.registry.next_miner_id();
        let miner = Miner::new(
            id,
            config,
            self.genesis.clone(),
            StdRng::from_seed(seed),
            &mut self.sched,
            self.sink.clone(),
            self.recorder.clone(),
        )?;
        self.miners.insert(id, miner);

        debug!("added miner {} (hashrate {}, verify {})", id, hashrate, verify_rate);
        Ok(id)
    }

    /// Duplex connection made of two independent one-way links
    pub fn connect(
        &mut self,
        a: MinerId,
        b: MinerId,
        delay_ab: SimTime,
        delay_ba: SimTime,
    ) -> Result<(LinkId, LinkId), ConfigError> {
        if self.started {
            return Err(ConfigError::TopologyFrozen);
        }
        if a == b {
            return Err(ConfigError::SelfLink(a));
        }
        let (Some(miner_a), Some(miner_b)) = (self.miners.get(&a), self.miners.get(&b)) else {
            let missing = if self.miners.contains_key(&a) { b } else { a };
            return Err(ConfigError::UnknownMiner(missing));
        };
        if miner_a.is_linked_to(b) || miner_b.is_linked_to(a) {
            return Err(ConfigError::DuplicateLink(a, b));
        }
        for delay in [delay_ab, delay_ba] {
            if !(delay >= 0.0) {
                return Err(ConfigError::NegativeDelay(delay));
            }
        }

        let ab = self.registry.next_link_id();
        let ba = self.registry.next_link_id();
        miner_a.add_peer(Link::new(ab, a, b, delay_ab, miner_b.inbox().clone())?);
        miner_b.add_peer(Link::new(ba, b, a, delay_ba, miner_a.inbox().clone())?);

        {
            let mut recorder = self.recorder.borrow_mut();
            recorder.record_link(ab, b, delay_ab);
            recorder.record_link(ba, a, delay_ba);
        }
        self.links.push((ab, a, b));
        self.links.push((ba, b, a));

        Ok((ab, ba))
    }

    /// `(link, origin, destination)` in creation order
    pub fn links(&self) -> &[(LinkId, MinerId, MinerId)] {
        &self.links
    }

    /// Advance virtual time. The first call starts every miner.
    pub fn run_until(&mut self, horizon: SimTime) {
        if !self.started {
            self.started = true;
            info!(
                "starting {} miners over {} links",
                self.miners.len(),
                self.links.len()
            );
            for miner in self.miners.values() {
                miner.start(&mut self.sched);
            }
        }

        self.sched.run_until(horizon);
        info!(
            "reached t={} after {} scheduler events",
            self.sched.now(),
            self.sched.events_processed()
        );
    }

    pub fn stop_mining(&mut self, miner: MinerId) -> Result<(), ConfigError> {
        let handle = self
            .miners
            .get(&miner)
            .ok_or(ConfigError::UnknownMiner(miner))?;
        handle.stop_mining(&mut self.sched);
        Ok(())
    }

    pub fn stop_all_mining(&mut self) {
        for miner in self.miners.values() {
            miner.stop_mining(&mut self.sched);
        }
    }

    /// Put a message straight into a miner's inbound channel, as if it had
    /// just arrived over a link
    pub fn inject(&mut self, to: MinerId, message: ProtocolMessage) -> Result<(), ConfigError> {
        let miner = self.miners.get(&to).ok_or(ConfigError::UnknownMiner(to))?;
        miner.inbox().put(&mut self.sched, message);
        Ok(())
    }

    pub fn miner(&self, id: MinerId) -> Option<&Miner> {
        self.miners.get(&id)
    }

    pub fn miners(&self) -> impl Iterator<Item = &Miner> {
        self.miners.values()
    }

    pub fn miner_ids(&self) -> Vec<MinerId> {
        self.miners.keys().copied().collect()
    }

    pub fn chain_head(&self, miner: MinerId) -> Option<Rc<Block>> {
        self.miners
            .get(&miner)
            .map(|m| m.chain().head_block().clone())
    }

    /// Head first, genesis last
    pub fn main_chain(&self, miner: MinerId) -> Option<Vec<Rc<Block>>> {
        self.miners.get(&miner).map(|m| m.chain().main_chain())
    }

    /// Highest height at which every miner's main chain holds the same block
    pub fn common_prefix_height(&self) -> u64 {
        let chains: Vec<Vec<Rc<Block>>> = self
            .miners
            .values()
            .map(|m| {
                let mut chain = m.chain().main_chain();
                chain.reverse();
                chain
            })
            .collect();

        let Some(shortest) = chains.iter().map(Vec::len).min() else {
            return 0;
        };

        let mut agreed = 0;
        for height in 0..shortest {
            let id = chains[0][height].id;
            if chains.iter().all(|chain| chain[height].id == id) {
                agreed = height as u64;
            } else {
                break;
            }
        }
        agreed
    }

    pub fn summaries(&self) -> Vec<MinerSummary> {
        self.miners
            .values()
            .map(|miner| {
                let chain = miner.chain();
                MinerSummary {
                    id: miner.id(),
                    head: chain.head(),
                    height: chain.height(),
                    known: chain.num_known(),
                    pending: chain.pending_blocks().len(),
                    stale: chain.stale_blocks(),
                    stats: miner.stats(),
                }
            })
            .collect()
    }
}
