//! Two miners, one duplex link, printed chains
//!
//! Run with: cargo run --example two_miners

use std::cell::RefCell;
use std::rc::Rc;

use log::info;
use simple_logger::SimpleLogger;

use mn_rust::mn_memory_backend::NoOpRecorder;
use mn_rust::{IdRegistry, LogEventSink, Network, NetworkConfig};

fn main() {
    SimpleLogger::new().init().unwrap();

    let mut network = Network::with_parts(
        NetworkConfig::default(),
        IdRegistry::new(),
        Rc::new(RefCell::new(LogEventSink)),
        Rc::new(RefCell::new(NoOpRecorder)),
    );

    // half the Bitcoin rate each, 200 KiB/s verification
    let miner1 = network.add_miner(0.5 / 600.0, 200.0 * 1024.0).unwrap();
    let miner2 = network.add_miner(0.5 / 600.0, 200.0 * 1024.0).unwrap();
    network.connect(miner1, miner2, 2.0, 2.0).unwrap();

    network.run_until(10_000.0);

    for id in [miner1, miner2] {
        let Some(miner) = network.miner(id) else {
            continue;
        };
        println!("Miner {} block has {} blocks", id, miner.chain().num_known());
        for (i, block) in miner.chain().main_chain().iter().enumerate() {
            println!("{}\t {:x}\t {}\t {}", i, block.id, block.height, block.miner);
        }
    }

    info!("seed: {:02x?}", network.seed());
}
