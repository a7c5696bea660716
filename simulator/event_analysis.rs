//! Event Analysis Example
//!
//! Run with: cargo run --example event_analysis --release
//!
//! Gathers every protocol event in a shared `CollectorEventSink` and looks at
//! propagation: how long it takes a mined block to be announced by each peer.

use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashMap;
use log::info;
use simple_logger::SimpleLogger;

use mn_rust::mn_memory_backend::MemRecorder;
use mn_rust::{CollectorEventSink, Event, IdRegistry, Network, NetworkConfig};

fn main() {
    SimpleLogger::new().init().unwrap();

    info!("Running simulation with event collection and analysis...");

    let collector = CollectorEventSink::shared();
    let recorder = Rc::new(RefCell::new(MemRecorder::new()));
    let mut network = Network::with_parts(
        NetworkConfig {
            seed: Some([42u8; 32]),
            request_timeout: Some(60.0),
            ..Default::default()
        },
        IdRegistry::new(),
        collector.clone(),
        recorder.clone(),
    );

    let ids: Vec<_> = (0..6)
        .map(|_| network.add_miner(1.0 / 600.0 / 6.0, 200.0 * 1024.0).unwrap())
        .collect();
    for (i, a) in ids.iter().enumerate() {
        let b = ids[(i + 1) % ids.len()];
        network.connect(*a, b, 2.0 + i as f64, 2.0).unwrap();
    }

    network.run_until(100_000.0);

    let events = collector.borrow();
    let counts = events.count_by_type();

    info!("\n=== Event Counts ===");
    info!("  Mined:     {}", counts.mined);
    info!("  Announced: {}", counts.announced);
    info!("  Requested: {}", counts.requested);
    info!("  Answered:  {}", counts.response_received);
    info!("  Orphans:   {}", counts.data_needed);
    info!("  Rejected:  {}", counts.rejected);

    // mined time per block, then the first announcement by every other miner
    let mined_at: HashMap<_, _> = events
        .mined()
        .map(|r| (r.event.block_id(), (r.time, r.miner)))
        .collect();
    let mut delays = Vec::new();
    for record in &events.events {
        if let Event::HeadAnnounced { block_id, .. } = record.event {
            if let Some((time, miner)) = mined_at.get(&block_id) {
                if *miner != record.miner {
                    delays.push(record.time - time);
                }
            }
        }
    }

    if !delays.is_empty() {
        delays.sort_by(|a, b| a.total_cmp(b));
        let mean = delays.iter().sum::<f64>() / delays.len() as f64;
        info!("\n=== Propagation ===");
        info!("  Samples: {}", delays.len());
        info!("  Mean:    {:.2}", mean);
        info!("  Median:  {:.2}", delays[delays.len() / 2]);
        info!("  Max:     {:.2}", delays[delays.len() - 1]);
    }

    info!("\n=== Chains ===");
    info!("  Common prefix height: {}", network.common_prefix_height());
    for summary in network.summaries() {
        info!(
            "  Miner {}: height {} stale {} owned {}",
            summary.id,
            summary.height,
            summary.stale,
            recorder.borrow().owned_by(&summary.id).len()
        );
    }

    if let Err(e) = events.export_to_csv("events.csv") {
        info!("CSV export failed: {}", e);
    } else {
        info!("\nEvents written to events.csv");
    }
}
