//! # mn_rust - Mining Network Simulator
//!
//! A discrete-event simulation of proof-of-work miners gossiping blocks over
//! latency-delayed links. Every miner runs a mining loop, a validation pipeline
//! and a message handler on a shared virtual clock; blocks that arrive before
//! their parent wait as orphans until the parent is fetched.
//!
//! ## Core Components
//!
//! - **Scheduler**: virtual time, cooperative processes, deterministic tie-break
//! - **Link/Channel**: one-way propagation delay between miners
//! - **Miner**: mining, validation and messaging processes around a `ChainView`
//! - **Network**: builder that wires miners together and drives the run
//!
//! ```no_run
//! use mn_rust::{Network, NetworkConfig};
//!
//! let mut network = Network::new(NetworkConfig {
//!     seed: Some([1u8; 32]),
//!     ..NetworkConfig::default()
//! });
//! let a = network.add_miner(0.5 / 600.0, 200.0 * 1024.0).unwrap();
//! let b = network.add_miner(0.5 / 600.0, 200.0 * 1024.0).unwrap();
//! network.connect(a, b, 2.0, 2.0).unwrap();
//! network.run_until(10_000.0);
//!
//! for block in network.main_chain(a).unwrap() {
//!     println!("{:x} at height {}", block.id, block.height);
//! }
//! ```
//!
//! ## Testing and Simulation
//!
//! Scenario files and reporting live in the separate `simulator/` directory,
//! run through the `scenario_runner` binary.

// Core simulation modules
pub mod mn_interface;
pub mod mn_blocks;
pub mod mn_scheduler;
pub mod mn_link;
pub mod mn_chain;
pub mod mn_miner;
pub mod mn_network;
pub mod mn_registry;
pub mod mn_events;

// Recording backends
pub mod mn_memory_backend;

// Re-export commonly used types
pub use mn_blocks::Block;
pub use mn_chain::{ChainView, RejectReason, Verdict};
pub use mn_events::{
    CollectorEventSink, Event, EventSink, LogEventSink, NoOpSink, SharedSink,
};
pub use mn_interface::{
    Action, BlockId, ConfigError, LinkId, MinerId, Origin, ProtocolMessage, Recorder,
    SharedRecorder, Signal, SimTime, GENESIS_MINER,
};
pub use mn_miner::{Miner, MinerConfig, MinerStats};
pub use mn_network::{MinerSummary, Network, NetworkConfig};
pub use mn_registry::IdRegistry;
pub use mn_scheduler::{Outcome, Process, Scheduler, Step};
