// Simulation Configuration

use serde::Deserialize;

use mn_rust::{NetworkConfig, SimTime};

/// Main simulation configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub horizon: SimTime,
    /// Set from the command line, never read from scenario files
    #[serde(skip)]
    pub seed: Option<[u8; 32]>,
    pub miners: Vec<MinerParams>,
    pub topology: TopologyMode,
    pub block_size_range: (f64, f64),
    pub request_timeout: Option<SimTime>,
    pub enable_event_logging: bool,
    pub csv_output_path: Option<String>,
    /// Print every miner's main chain after the run
    pub print_chains: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct MinerParams {
    pub hashrate: f64,
    pub verify_rate: f64,
}

/// How miners are wired together. Indices refer to positions in `miners`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TopologyMode {
    /// Every pair of miners linked
    FullMesh { delay: SimTime },
    /// Each miner linked to the next one, last back to first
    Ring { delay: SimTime },
    /// Like a ring without the closing link
    Line { delay: SimTime },
    /// Explicit duplex links
    Links { links: Vec<LinkParams> },
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LinkParams {
    pub a: usize,
    pub b: usize,
    pub delay_ab: SimTime,
    pub delay_ba: SimTime,
}

impl TopologyMode {
    /// Duplex pairs `(a, b, delay_ab, delay_ba)` for `n` miners
    pub fn pairs(&self, n: usize) -> Vec<(usize, usize, SimTime, SimTime)> {
        match self {
            TopologyMode::FullMesh { delay } => (0..n)
                .flat_map(|a| (a + 1..n).map(move |b| (a, b, *delay, *delay)))
                .collect(),
            TopologyMode::Ring { delay } => {
                let mut pairs: Vec<_> = (1..n).map(|b| (b - 1, b, *delay, *delay)).collect();
                if n > 2 {
                    pairs.push((n - 1, 0, *delay, *delay));
                }
                pairs
            }
            TopologyMode::Line { delay } => {
                (1..n).map(|b| (b - 1, b, *delay, *delay)).collect()
            }
            TopologyMode::Links { links } => links
                .iter()
                .map(|l| (l.a, l.b, l.delay_ab, l.delay_ba))
                .collect(),
        }
    }
}

impl SimConfig {
    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            seed: self.seed,
            block_size_range: self.block_size_range,
            request_timeout: self.request_timeout,
        }
    }
}

// ============================================================================
// Default Configurations
// ============================================================================

/// Two miners at half the Bitcoin rate each, 2 time units apart
impl Default for SimConfig {
    fn default() -> Self {
        let miner = MinerParams {
            hashrate: 0.5 / 600.0,
            verify_rate: 200.0 * 1024.0,
        };
        let network = NetworkConfig::default();
        Self {
            horizon: 10_000.0,
            seed: None,
            miners: vec![miner, miner],
            topology: TopologyMode::FullMesh { delay: 2.0 },
            block_size_range: network.block_size_range,
            request_timeout: network.request_timeout,
            enable_event_logging: false,
            csv_output_path: None,
            print_chains: false,
        }
    }
}

impl Default for TopologyMode {
    fn default() -> Self {
        TopologyMode::FullMesh { delay: 2.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_pairs() {
        let mesh = TopologyMode::FullMesh { delay: 1.0 }.pairs(4);
        assert_eq!(mesh.len(), 6);

        let ring = TopologyMode::Ring { delay: 1.0 }.pairs(4);
        let ends: Vec<_> = ring.iter().map(|(a, b, _, _)| (*a, *b)).collect();
        assert_eq!(ends, vec![(0, 1), (1, 2), (2, 3), (3, 0)]);

        // two miners: ring and line are the same single link
        assert_eq!(TopologyMode::Ring { delay: 1.0 }.pairs(2).len(), 1);
        assert_eq!(TopologyMode::Line { delay: 1.0 }.pairs(4).len(), 3);
    }

    #[test]
    fn test_yaml_overrides_defaults() {
        let yaml = "
horizon: 500.0
topology:
  mode: links
  links:
    - { a: 0, b: 1, delay_ab: 3.0, delay_ba: 4.0 }
request_timeout: 30.0
";
        let config: SimConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.horizon, 500.0);
        assert_eq!(config.miners.len(), 2);
        assert_eq!(config.request_timeout, Some(30.0));
        assert_eq!(config.topology.pairs(2), vec![(0, 1, 3.0, 4.0)]);
        assert_eq!(config.seed, None);
    }
}
