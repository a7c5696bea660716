// Simulation Runner

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::error::Error;
use std::rc::Rc;

use log::{info, warn};

use mn_rust::mn_memory_backend::MemRecorder;
use mn_rust::{IdRegistry, MinerId, Network, NoOpSink, SharedSink};

use super::config::SimConfig;
use super::event_sinks::{ConsoleEventSink, CsvEventSink};
use super::stats::{ChainEntry, SimResult};

pub struct SimRunner {
    config: SimConfig,
}

impl SimRunner {
    pub fn new(config: SimConfig) -> Self {
        Self { config }
    }

    fn build_sink(&self) -> Result<SharedSink, Box<dyn Error>> {
        if let Some(path) = &self.config.csv_output_path {
            info!("writing events to {}", path);
            return Ok(Rc::new(RefCell::new(CsvEventSink::new(path)?)));
        }
        if self.config.enable_event_logging {
            return Ok(Rc::new(RefCell::new(ConsoleEventSink::new(true))));
        }
        Ok(Rc::new(RefCell::new(NoOpSink)))
    }

    /// Build the network, run it to the horizon and collect the results
    pub fn run(&mut self) -> Result<SimResult, Box<dyn Error>> {
        let recorder = Rc::new(RefCell::new(MemRecorder::new()));
        let mut network = Network::with_parts(
            self.config.network_config(),
            IdRegistry::new(),
            self.build_sink()?,
            recorder.clone(),
        );

        let mut ids: Vec<MinerId> = Vec::with_capacity(self.config.miners.len());
        for params in &self.config.miners {
            ids.push(network.add_miner(params.hashrate, params.verify_rate)?);
        }

        for (a, b, delay_ab, delay_ba) in self.config.topology.pairs(ids.len()) {
            let (Some(&id_a), Some(&id_b)) = (ids.get(a), ids.get(b)) else {
                warn!("skipping link {} <-> {}: only {} miners", a, b, ids.len());
                continue;
            };
            network.connect(id_a, id_b, delay_ab, delay_ba)?;
        }

        info!(
            "running {} miners until t={} (seed {:02x?})",
            ids.len(),
            self.config.horizon,
            &network.seed()[..4]
        );
        network.run_until(self.config.horizon);

        let mut chains = BTreeMap::new();
        for id in &ids {
            let entries = network
                .main_chain(*id)
                .unwrap_or_default()
                .iter()
                .enumerate()
                .map(|(index, block)| ChainEntry {
                    index,
                    block: block.id,
                    height: block.height,
                    miner: block.miner,
                })
                .collect();
            chains.insert(*id, entries);
        }

        let blocks_recorded = recorder.borrow().blocks().count();
        Ok(SimResult {
            seed_used: network.seed(),
            horizon: self.config.horizon,
            events_processed: network.events_processed(),
            miners: network.summaries(),
            chains,
            common_prefix_height: network.common_prefix_height(),
            blocks_recorded,
        })
    }
}
