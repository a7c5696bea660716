//! Mining network simulator module
//!
//! Scenario layer on top of the library: builds a network from a
//! configuration, runs it, and reports chains and per-miner counters.
//! - YAML-friendly `SimConfig` with full mesh, ring, line or explicit topologies
//! - Console and CSV event sinks
//! - `SimResult` with main chain walks and summary printing

pub mod config;
pub mod event_sinks;
pub mod runner;
pub mod stats;

pub use config::{LinkParams, MinerParams, SimConfig, TopologyMode};
pub use event_sinks::{ConsoleEventSink, CsvEventSink};
pub use runner::SimRunner;
pub use stats::{ChainEntry, SimResult};
