//! Statistics and results for the mining network simulator

use std::collections::BTreeMap;

use mn_rust::{BlockId, MinerId, MinerSummary, SimTime};

/// One row of a main chain walk, head first
#[derive(Debug, Clone)]
pub struct ChainEntry {
    pub index: usize,
    pub block: BlockId,
    pub height: u64,
    pub miner: MinerId,
}

/// Simulation result
#[derive(Debug)]
pub struct SimResult {
    /// Seed used for the simulation
    pub seed_used: [u8; 32],

    pub horizon: SimTime,

    pub events_processed: u64,

    /// Per-miner end state, ordered by id
    pub miners: Vec<MinerSummary>,

    /// Main chain of every miner, head first
    pub chains: BTreeMap<MinerId, Vec<ChainEntry>>,

    /// Highest height on which every miner agrees
    pub common_prefix_height: u64,

    /// Distinct blocks ever created, genesis included
    pub blocks_recorded: usize,
}

impl SimResult {
    /// Blocks each miner authored on `observer`'s main chain
    pub fn chain_share(&self, observer: MinerId) -> BTreeMap<MinerId, usize> {
        let mut share = BTreeMap::new();
        if let Some(chain) = self.chains.get(&observer) {
            for entry in chain.iter().filter(|e| e.height > 0) {
                *share.entry(entry.miner).or_insert(0) += 1;
            }
        }
        share
    }

    pub fn total_mined(&self) -> usize {
        self.miners.iter().map(|m| m.stats.mined).sum()
    }

    /// Print a summary of the simulation results
    pub fn print_summary(&self) {
        println!("\n╔════════════════════════════════════════════════════════╗");
        println!("║        Mining Network Simulation Results              ║");
        println!("╚════════════════════════════════════════════════════════╝\n");

        println!("Configuration:");
        println!("  Seed: {:?}", self.seed_used);
        println!("  Horizon: {}", self.horizon);
        println!("  Scheduler events: {}\n", self.events_processed);

        println!("Blocks:");
        println!("  Mined: {}", self.total_mined());
        println!("  Recorded (incl. genesis): {}", self.blocks_recorded);
        println!("  Common prefix height: {}\n", self.common_prefix_height);

        println!("Miners:");
        println!(
            "  {:>4} {:>7} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6}",
            "id", "height", "known", "stale", "orph", "mined", "rej", "req", "resp"
        );
        for m in &self.miners {
            println!(
                "  {:>4} {:>7} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6}",
                m.id,
                m.height,
                m.known,
                m.stale,
                m.pending,
                m.stats.mined,
                m.stats.rejected,
                m.stats.requests_sent,
                m.stats.responses_sent
            );
        }
        println!();
    }

    /// `index  block  height  miner` rows for every miner
    pub fn print_chains(&self) {
        for (miner, chain) in &self.chains {
            let known = self
                .miners
                .iter()
                .find(|m| m.id == *miner)
                .map(|m| m.known)
                .unwrap_or(0);
            println!("Miner {} knows {} blocks", miner, known);
            for entry in chain {
                println!(
                    "{}\t {:x}\t {}\t {}",
                    entry.index, entry.block, entry.height, entry.miner
                );
            }
        }
    }
}
