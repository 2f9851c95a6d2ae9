//! Deterministic fault-injecting datagram link.
//!
//! Real networks drop, reorder, duplicate and corrupt datagrams.  To exercise
//! the reliability machinery without depending on actual network conditions,
//! a [`Simulator`] sits between two endpoints' outboxes and applies a
//! configurable fault model to every datagram carried in one direction:
//!
//! | Fault       | Description                                            |
//! |-------------|--------------------------------------------------------|
//! | Loss        | Drop the datagram with probability `loss_rate`.        |
//! | Corruption  | Flip one random bit with probability `corrupt_rate`.   |
//! | Reordering  | Hold the datagram back until the next one has passed.  |
//! | Duplication | Deliver the datagram twice.                            |
//!
//! The random source is seeded, so a failing run replays exactly.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Fault probabilities, each clamped to `[0.0, 1.0]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulatorConfig {
    pub loss_rate: f64,
    pub corrupt_rate: f64,
    pub reorder_rate: f64,
    pub duplicate_rate: f64,
}

impl SimulatorConfig {
    /// The same probability for every fault.
    pub fn uniform(rate: f64) -> Self {
        Self {
            loss_rate: rate,
            corrupt_rate: rate,
            reorder_rate: rate,
            duplicate_rate: rate,
        }
    }

    fn clamped(self) -> Self {
        Self {
            loss_rate: self.loss_rate.clamp(0.0, 1.0),
            corrupt_rate: self.corrupt_rate.clamp(0.0, 1.0),
            reorder_rate: self.reorder_rate.clamp(0.0, 1.0),
            duplicate_rate: self.duplicate_rate.clamp(0.0, 1.0),
        }
    }
}

/// Running fault counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatorStats {
    pub carried: u64,
    pub lost: u64,
    pub corrupted: u64,
    pub reordered: u64,
    pub duplicated: u64,
}

/// One direction of a simulated network link.
#[derive(Debug)]
pub struct Simulator {
    config: SimulatorConfig,
    rng: StdRng,
    held: VecDeque<Vec<u8>>,
    stats: SimulatorStats,
}

impl Simulator {
    pub fn new(config: SimulatorConfig, seed: u64) -> Self {
        Self {
            config: config.clamped(),
            rng: StdRng::seed_from_u64(seed),
            held: VecDeque::new(),
            stats: SimulatorStats::default(),
        }
    }

    /// A link that delivers everything once, in order.
    pub fn passthrough() -> Self {
        Self::new(SimulatorConfig::default(), 0)
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Change the fault model; datagrams already held back stay held.
    pub fn set_config(&mut self, config: SimulatorConfig) {
        self.config = config.clamped();
    }

    pub fn stats(&self) -> SimulatorStats {
        self.stats
    }

    /// Datagrams currently held back for reordering.
    pub fn held(&self) -> usize {
        self.held.len()
    }

    /// Carry one datagram; returns what arrives at the far end, in order.
    ///
    /// Held-back datagrams are released right after the next datagram that
    /// gets through, so they arrive overtaken.
    pub fn transmit(&mut self, mut datagram: Vec<u8>) -> Vec<Vec<u8>> {
        self.stats.carried += 1;
        let mut arrived = Vec::new();

        if self.rng.random_bool(self.config.loss_rate) {
            self.stats.lost += 1;
            return arrived;
        }

        if !datagram.is_empty() && self.rng.random_bool(self.config.corrupt_rate) {
            let bit = self.rng.random_range(0..datagram.len() * 8);
            datagram[bit / 8] ^= 1 << (bit % 8);
            self.stats.corrupted += 1;
        }

        if self.rng.random_bool(self.config.reorder_rate) {
            self.stats.reordered += 1;
            self.held.push_back(datagram);
            return arrived;
        }

        if self.rng.random_bool(self.config.duplicate_rate) {
            self.stats.duplicated += 1;
            arrived.push(datagram.clone());
        }
        arrived.push(datagram);
        arrived.extend(self.held.drain(..));
        arrived
    }

    /// Release every held-back datagram.
    pub fn flush(&mut self) -> Vec<Vec<u8>> {
        self.held.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datagrams(n: u8) -> Vec<Vec<u8>> {
        (0..n).map(|i| vec![i; 16]).collect()
    }

    #[test]
    fn passthrough_delivers_in_order() {
        let mut sim = Simulator::passthrough();
        let out: Vec<Vec<u8>> = datagrams(10)
            .into_iter()
            .flat_map(|d| sim.transmit(d))
            .collect();
        assert_eq!(out, datagrams(10));
        assert_eq!(sim.stats().carried, 10);
    }

    #[test]
    fn total_loss_delivers_nothing() {
        let mut sim = Simulator::new(
            SimulatorConfig {
                loss_rate: 1.0,
                ..SimulatorConfig::default()
            },
            7,
        );
        assert!(datagrams(5).into_iter().all(|d| sim.transmit(d).is_empty()));
        assert_eq!(sim.stats().lost, 5);
    }

    #[test]
    fn duplication_doubles_every_datagram() {
        let mut sim = Simulator::new(
            SimulatorConfig {
                duplicate_rate: 1.0,
                ..SimulatorConfig::default()
            },
            7,
        );
        assert_eq!(sim.transmit(vec![1, 2, 3]), vec![vec![1, 2, 3], vec![1, 2, 3]]);
    }

    #[test]
    fn corruption_flips_exactly_one_bit() {
        let mut sim = Simulator::new(
            SimulatorConfig {
                corrupt_rate: 1.0,
                ..SimulatorConfig::default()
            },
            42,
        );
        let original = vec![0u8; 32];
        let out = sim.transmit(original.clone());
        let flipped: u32 = out[0]
            .iter()
            .zip(&original)
            .map(|(a, b)| (a ^ b).count_ones())
            .sum();
        assert_eq!(flipped, 1);
    }

    #[test]
    fn reordered_datagram_is_overtaken() {
        let mut sim = Simulator::new(
            SimulatorConfig {
                reorder_rate: 1.0,
                ..SimulatorConfig::default()
            },
            1,
        );
        assert!(sim.transmit(vec![1]).is_empty());
        assert_eq!(sim.held(), 1);

        sim.set_config(SimulatorConfig::default());
        assert_eq!(sim.transmit(vec![2]), vec![vec![2], vec![1]]);
        assert_eq!(sim.held(), 0);
    }

    #[test]
    fn flush_releases_held_datagrams() {
        let mut sim = Simulator::new(
            SimulatorConfig {
                reorder_rate: 1.0,
                ..SimulatorConfig::default()
            },
            1,
        );
        sim.transmit(vec![1]);
        sim.transmit(vec![2]);
        assert_eq!(sim.flush(), vec![vec![1], vec![2]]);
        assert!(sim.flush().is_empty());
    }

    #[test]
    fn same_seed_same_faults() {
        let run = |seed| {
            let mut sim = Simulator::new(SimulatorConfig::uniform(0.3), seed);
            let out: Vec<Vec<u8>> = datagrams(50)
                .into_iter()
                .flat_map(|d| sim.transmit(d))
                .collect();
            (out, sim.stats())
        };
        assert_eq!(run(9), run(9));
    }

    #[test]
    fn rates_are_clamped() {
        let sim = Simulator::new(SimulatorConfig::uniform(3.0), 0);
        assert_eq!(sim.config(), &SimulatorConfig::uniform(1.0));
    }
}
