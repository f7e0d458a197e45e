//! Seeded random simulations.

use atria_core::{Epoch, NodeAddress, ScheduleConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::{Disagreement, Network, Result, SimError};

/// Largest node count: ids 1..=254 keep every address non-null and distinct
/// in the hashed last byte.
pub const MAX_NODES: u16 = 254;

/// Parameters of one simulation run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Seed for tree shape and churn.
    pub seed: u64,
    /// Nodes including the root.
    pub nodes: u16,
    /// Slotframes to run after the tree is built.
    pub epochs: u32,
    /// MAC clock when the root boots.
    pub start_epoch: Epoch,
    /// Probability per epoch that one random node changes parent.
    pub churn: f64,
    pub schedule: ScheduleConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            nodes: 20,
            epochs: 10,
            start_epoch: Epoch::ZERO,
            churn: 0.0,
            schedule: ScheduleConfig::default(),
        }
    }
}

impl SimulationConfig {
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_nodes(mut self, nodes: u16) -> Self {
        self.nodes = nodes;
        self
    }

    #[must_use]
    pub fn with_epochs(mut self, epochs: u32) -> Self {
        self.epochs = epochs;
        self
    }

    #[must_use]
    pub fn with_churn(mut self, churn: f64) -> Self {
        self.churn = churn;
        self
    }

    #[must_use]
    pub fn with_schedule(mut self, schedule: ScheduleConfig) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.nodes == 0 || self.nodes > MAX_NODES {
            return Err(SimError::InvalidConfig(format!(
                "node count must be in 1..={MAX_NODES}, got {}",
                self.nodes
            )));
        }
        if !(0.0..=1.0).contains(&self.churn) {
            return Err(SimError::InvalidConfig(format!(
                "churn must be a probability, got {}",
                self.churn
            )));
        }
        self.schedule.validate()?;
        Ok(())
    }
}

/// Address of simulated node `id`.
pub fn node_address(id: u16) -> NodeAddress {
    NodeAddress::from_node_id(id.min(MAX_NODES) as u8)
}

/// Build a random tree: node 1 is the root, every later node joins below a
/// uniformly chosen earlier one.
pub fn random_network(config: &SimulationConfig, rng: &mut StdRng) -> Result<Network> {
    config.validate()?;
    let mut network = Network::starting_at(node_address(1), config.schedule.clone(), config.start_epoch)?;
    let mut joined = vec![node_address(1)];
    for id in 2..=config.nodes {
        let parent = joined[rng.gen_range(0..joined.len())];
        let node = node_address(id);
        network.join(node, parent)?;
        joined.push(node);
    }
    debug!(nodes = network.len(), seed = config.seed, "random tree built");
    Ok(network)
}

/// Outcome of [`run`].
#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    pub network: Network,
    pub audits: usize,
    pub reparents: usize,
    /// Every disagreement with the epoch it was seen at.
    pub disagreements: Vec<(Epoch, Disagreement)>,
}

impl SimulationOutcome {
    pub fn is_clean(&self) -> bool {
        self.disagreements.is_empty()
    }
}

/// Build a random network and run it for `config.epochs` slotframes,
/// auditing after every topology change and every tick.
pub fn run(config: &SimulationConfig) -> Result<SimulationOutcome> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let network = random_network(config, &mut rng)?;
    let mut outcome = SimulationOutcome {
        network,
        audits: 0,
        reparents: 0,
        disagreements: Vec::new(),
    };
    audit(&mut outcome);

    for _ in 0..config.epochs {
        if config.churn > 0.0 && rng.gen_bool(config.churn) && churn(&mut outcome.network, &mut rng)? {
            outcome.reparents += 1;
            audit(&mut outcome);
        }
        outcome.network.tick()?;
        audit(&mut outcome);
    }

    info!(
        nodes = outcome.network.len(),
        epochs = config.epochs,
        audits = outcome.audits,
        reparents = outcome.reparents,
        disagreements = outcome.disagreements.len(),
        "simulation finished"
    );
    Ok(outcome)
}

fn audit(outcome: &mut SimulationOutcome) {
    let epoch = outcome.network.epoch();
    outcome.audits += 1;
    outcome
        .disagreements
        .extend(outcome.network.audit().into_iter().map(|d| (epoch, d)));
}

/// Move one random non-root node below a random node outside its subtree.
fn churn(network: &mut Network, rng: &mut StdRng) -> Result<bool> {
    let tree = network.tree();
    let root = tree.root();
    let movable: Vec<_> = tree.nodes().filter(|n| *n != root).collect();
    if movable.is_empty() {
        return Ok(false);
    }
    let node = movable[rng.gen_range(0..movable.len())];
    let targets: Vec<_> = tree
        .nodes()
        .filter(|t| !tree.in_subtree(t, &node) && tree.parent(&node) != Some(*t))
        .collect();
    if targets.is_empty() {
        return Ok(false);
    }
    let parent = targets[rng.gen_range(0..targets.len())];
    network.reparent(node, parent)?;
    Ok(true)
}
