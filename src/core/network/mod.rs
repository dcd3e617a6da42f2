//! An id-indexed arena of the junctions, reservoirs and pipes making up a household water
//! distribution network.
//!
//! Every attribute that events are allowed to change (pipe diameter and roughness, junction
//! emitter coefficients) is stored alongside its nominal value so that the network can be
//! returned to its as-built state before events are re-applied.

pub mod builder;

use crate::core::hydraulics::headloss::{
    HAZEN_WILLIAMS_DIAMETER_EXPONENT, HAZEN_WILLIAMS_FLOW_EXPONENT,
};
use crate::core::material_properties::PipeMaterial;
use crate::core::units::metres_to_millimetres;
use crate::errors::ConfigurationError;
use indexmap::IndexMap;
use std::collections::VecDeque;
use std::fmt::{Display, Formatter};

const MIN_BRANCH_DIAMETER_MM: f64 = 6.0;
const MAX_BRANCH_DIAMETER_MM: f64 = 25.0;
const MIN_TRUNK_DIAMETER_MM: f64 = 19.0;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeIndex(pub usize);

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct LinkIndex(pub usize);

#[derive(Clone, Debug, PartialEq)]
pub struct Junction {
    /// current consumer demand, in m^3/s
    pub demand_m3s: f64,
    /// current emitter coefficient K in Q = K * sqrt(pressure head), in m^2.5/s
    pub emitter_coefficient: f64,
    pub fixtures: Vec<String>,
    /// the point where the supply enters the house and the meter sits
    pub service_entry: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Reservoir { head_m: f64 },
    Junction(Junction),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub name: String,
    pub elevation_m: f64,
    pub kind: NodeKind,
}

impl Node {
    pub fn is_fixed_head(&self) -> bool {
        matches!(self.kind, NodeKind::Reservoir { .. })
    }

    pub fn junction(&self) -> Option<&Junction> {
        match &self.kind {
            NodeKind::Junction(junction) => Some(junction),
            NodeKind::Reservoir { .. } => None,
        }
    }

    pub fn junction_mut(&mut self) -> Option<&mut Junction> {
        match &mut self.kind {
            NodeKind::Junction(junction) => Some(junction),
            NodeKind::Reservoir { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pipe {
    pub name: String,
    pub from: NodeIndex,
    pub to: NodeIndex,
    pub length_m: f64,
    pub material: PipeMaterial,
    /// minor loss coefficient summed over fittings
    pub minor_loss: f64,
    pub trunk: bool,
    /// current internal diameter, in m
    pub diameter_m: f64,
    /// current Hazen-Williams C
    pub roughness_c: f64,
    nominal_diameter_m: f64,
    nominal_roughness_c: f64,
}

impl Pipe {
    pub fn nominal_diameter_m(&self) -> f64 {
        self.nominal_diameter_m
    }

    pub fn nominal_roughness_c(&self) -> f64 {
        self.nominal_roughness_c
    }

    fn reset(&mut self) {
        self.diameter_m = self.nominal_diameter_m;
        self.roughness_c = self.nominal_roughness_c;
    }

    /// Hazen-Williams head loss at the current diameter and roughness as a multiple of the
    /// as-built head loss at the same flow.
    pub fn headloss_increase(&self) -> f64 {
        (self.nominal_diameter_m / self.diameter_m).powf(HAZEN_WILLIAMS_DIAMETER_EXPONENT)
            * (self.nominal_roughness_c / self.roughness_c).powf(HAZEN_WILLIAMS_FLOW_EXPONENT)
    }

    /// Widen the pipe where needed so that its head-loss increase does not exceed `limit`.
    pub fn limit_headloss_increase(&mut self, limit: f64) {
        let roughness_increase =
            (self.nominal_roughness_c / self.roughness_c).powf(HAZEN_WILLIAMS_FLOW_EXPONENT);
        let narrowest = self.nominal_diameter_m
            * (roughness_increase / limit).powf(1. / HAZEN_WILLIAMS_DIAMETER_EXPONENT);
        self.diameter_m = self.diameter_m.max(narrowest);
    }
}

/// Parameters for adding a pipe to a network.
#[derive(Clone, Debug)]
pub struct PipeParameters {
    pub material: PipeMaterial,
    pub diameter_m: f64,
    pub length_m: f64,
    pub roughness_c: f64,
    pub minor_loss: f64,
    pub trunk: bool,
}

#[derive(Clone, Debug, Default)]
pub struct WaterNetwork {
    nodes: Vec<Node>,
    pipes: Vec<Pipe>,
    node_lookup: IndexMap<String, NodeIndex>,
    pipe_lookup: IndexMap<String, LinkIndex>,
    default_demand_node: Option<NodeIndex>,
}

impl WaterNetwork {
    pub fn new() -> Self {
        Default::default()
    }

    fn insert_node(&mut self, node: Node) -> Result<NodeIndex, ConfigurationError> {
        if self.node_lookup.contains_key(&node.name) {
            return Err(ConfigurationError::InvalidTopology(format!(
                "duplicate node name '{}'",
                node.name
            )));
        }
        let idx = NodeIndex(self.nodes.len());
        self.node_lookup.insert(node.name.clone(), idx);
        self.nodes.push(node);
        Ok(idx)
    }

    pub fn add_reservoir(
        &mut self,
        name: &str,
        elevation_m: f64,
        head_m: f64,
    ) -> Result<NodeIndex, ConfigurationError> {
        self.insert_node(Node {
            name: name.to_string(),
            elevation_m,
            kind: NodeKind::Reservoir { head_m },
        })
    }

    pub fn add_junction(
        &mut self,
        name: &str,
        elevation_m: f64,
        fixtures: Vec<String>,
        service_entry: bool,
    ) -> Result<NodeIndex, ConfigurationError> {
        self.insert_node(Node {
            name: name.to_string(),
            elevation_m,
            kind: NodeKind::Junction(Junction {
                demand_m3s: 0.,
                emitter_coefficient: 0.,
                fixtures,
                service_entry,
            }),
        })
    }

    pub fn add_pipe(
        &mut self,
        name: &str,
        from: &str,
        to: &str,
        parameters: PipeParameters,
    ) -> Result<LinkIndex, ConfigurationError> {
        if self.pipe_lookup.contains_key(name) {
            return Err(ConfigurationError::InvalidTopology(format!(
                "duplicate pipe name '{name}'"
            )));
        }
        let lookup = |node: &str| {
            self.node_index(node).ok_or_else(|| {
                ConfigurationError::InvalidTopology(format!(
                    "pipe '{name}' refers to unknown node '{node}'"
                ))
            })
        };
        let (from, to) = (lookup(from)?, lookup(to)?);
        if from == to {
            return Err(ConfigurationError::InvalidTopology(format!(
                "pipe '{name}' starts and ends at the same node"
            )));
        }
        let idx = LinkIndex(self.pipes.len());
        self.pipe_lookup.insert(name.to_string(), idx);
        self.pipes.push(Pipe {
            name: name.to_string(),
            from,
            to,
            length_m: parameters.length_m,
            material: parameters.material,
            minor_loss: parameters.minor_loss,
            trunk: parameters.trunk,
            diameter_m: parameters.diameter_m,
            roughness_c: parameters.roughness_c,
            nominal_diameter_m: parameters.diameter_m,
            nominal_roughness_c: parameters.roughness_c,
        });
        Ok(idx)
    }

    pub fn set_default_demand_node(&mut self, name: &str) -> Result<(), ConfigurationError> {
        let idx = self
            .node_index(name)
            .filter(|idx| !self.nodes[idx.0].is_fixed_head())
            .ok_or_else(|| {
                ConfigurationError::InvalidTopology(format!(
                    "default demand node '{name}' is not a junction of the network"
                ))
            })?;
        self.default_demand_node = Some(idx);
        Ok(())
    }

    /// Node receiving demand not attributable to a fixture. Falls back to the first junction
    /// that is not the service entry.
    pub fn default_demand_node(&self) -> Option<NodeIndex> {
        self.default_demand_node.or_else(|| {
            self.junction_indices()
                .find(|idx| !self.is_service_entry(*idx))
                .or_else(|| self.junction_indices().next())
        })
    }

    pub fn node(&self, idx: NodeIndex) -> &Node {
        &self.nodes[idx.0]
    }

    pub fn node_mut(&mut self, idx: NodeIndex) -> &mut Node {
        &mut self.nodes[idx.0]
    }

    pub fn pipe(&self, idx: LinkIndex) -> &Pipe {
        &self.pipes[idx.0]
    }

    pub fn pipe_mut(&mut self, idx: LinkIndex) -> &mut Pipe {
        &mut self.pipes[idx.0]
    }

    pub fn node_index(&self, name: &str) -> Option<NodeIndex> {
        self.node_lookup.get(name).copied()
    }

    pub fn pipe_index(&self, name: &str) -> Option<LinkIndex> {
        self.pipe_lookup.get(name).copied()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn pipes(&self) -> &[Pipe] {
        &self.pipes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn pipe_count(&self) -> usize {
        self.pipes.len()
    }

    pub fn junction_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.is_fixed_head())
            .map(|(idx, _)| NodeIndex(idx))
    }

    pub fn reservoir_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.is_fixed_head())
            .map(|(idx, _)| NodeIndex(idx))
    }

    pub fn is_service_entry(&self, idx: NodeIndex) -> bool {
        self.nodes[idx.0]
            .junction()
            .is_some_and(|junction| junction.service_entry)
    }

    pub fn service_entry(&self) -> Option<NodeIndex> {
        self.junction_indices()
            .find(|idx| self.is_service_entry(*idx))
    }

    /// The pipe feeding the service entry, where the meter is installed.
    pub fn metered_pipe(&self) -> Option<LinkIndex> {
        let entry = self.service_entry()?;
        self.pipes
            .iter()
            .position(|pipe| pipe.to == entry || pipe.from == entry)
            .map(LinkIndex)
    }

    pub fn total_length_m(&self) -> f64 {
        self.pipes.iter().map(|pipe| pipe.length_m).sum()
    }

    /// The material making up the greatest length of pipe.
    pub fn dominant_material(&self) -> Option<PipeMaterial> {
        let mut lengths: IndexMap<PipeMaterial, f64> = IndexMap::new();
        for pipe in &self.pipes {
            *lengths.entry(pipe.material).or_default() += pipe.length_m;
        }
        lengths
            .into_iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(material, _)| material)
    }

    /// For each node, the links touching it and the node at the other end.
    pub fn adjacency(&self) -> Vec<Vec<(LinkIndex, NodeIndex)>> {
        let mut adjacency = vec![vec![]; self.nodes.len()];
        for (idx, pipe) in self.pipes.iter().enumerate() {
            adjacency[pipe.from.0].push((LinkIndex(idx), pipe.to));
            adjacency[pipe.to.0].push((LinkIndex(idx), pipe.from));
        }
        adjacency
    }

    pub fn set_demand(&mut self, idx: NodeIndex, demand_m3s: f64) {
        if let Some(junction) = self.nodes[idx.0].junction_mut() {
            junction.demand_m3s = demand_m3s;
        }
    }

    pub fn clear_demands(&mut self) {
        for node in &mut self.nodes {
            if let Some(junction) = node.junction_mut() {
                junction.demand_m3s = 0.;
            }
        }
    }

    /// Return every event-mutable attribute to its as-built value.
    pub fn reset_dynamic_state(&mut self) {
        for pipe in &mut self.pipes {
            pipe.reset();
        }
        for node in &mut self.nodes {
            if let Some(junction) = node.junction_mut() {
                junction.emitter_coefficient = 0.;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |message: String| Err(ConfigurationError::InvalidTopology(message));

        let Some(root) = self.reservoir_indices().next() else {
            return invalid("network has no reservoir".into());
        };

        for node in &self.nodes {
            if let Some(junction) = node.junction() {
                if junction.demand_m3s < 0. || junction.emitter_coefficient < 0. {
                    return invalid(format!("junction '{}' has a negative demand", node.name));
                }
            }
        }

        for pipe in &self.pipes {
            let diameter_mm = metres_to_millimetres(pipe.nominal_diameter_m);
            if pipe.trunk {
                if diameter_mm < MIN_TRUNK_DIAMETER_MM {
                    return invalid(format!(
                        "trunk pipe '{}' is {diameter_mm} mm, below {MIN_TRUNK_DIAMETER_MM} mm",
                        pipe.name
                    ));
                }
            } else if !(MIN_BRANCH_DIAMETER_MM..=MAX_BRANCH_DIAMETER_MM).contains(&diameter_mm) {
                return invalid(format!(
                    "branch pipe '{}' is {diameter_mm} mm, outside {MIN_BRANCH_DIAMETER_MM}-{MAX_BRANCH_DIAMETER_MM} mm",
                    pipe.name
                ));
            }
            if !(pipe.length_m > 0.) || !(pipe.nominal_roughness_c > 0.) || pipe.minor_loss < 0. {
                return invalid(format!(
                    "pipe '{}' needs a positive length and roughness",
                    pipe.name
                ));
            }
        }

        // every node must be reachable from the supply
        let adjacency = self.adjacency();
        let mut visited = vec![false; self.nodes.len()];
        let mut queue = VecDeque::from([root]);
        visited[root.0] = true;
        while let Some(node) = queue.pop_front() {
            for (_, neighbour) in &adjacency[node.0] {
                if !visited[neighbour.0] {
                    visited[neighbour.0] = true;
                    queue.push_back(*neighbour);
                }
            }
        }
        if let Some(idx) = visited.iter().position(|seen| !seen) {
            return invalid(format!(
                "node '{}' is not connected to the supply",
                self.nodes[idx].name
            ));
        }

        Ok(())
    }
}

impl Display for WaterNetwork {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} nodes, {} pipes, {:.1} m of pipe",
            self.nodes.len(),
            self.pipes.len(),
            self.total_length_m()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn branch(diameter_mm: f64) -> PipeParameters {
        PipeParameters {
            material: PipeMaterial::Copper,
            diameter_m: diameter_mm / 1000.,
            length_m: 5.,
            roughness_c: 130.,
            minor_loss: 0.,
            trunk: false,
        }
    }

    #[fixture]
    fn network() -> WaterNetwork {
        let mut network = WaterNetwork::new();
        network.add_reservoir("street", -1., 40.).unwrap();
        network.add_junction("entry", 0., vec![], true).unwrap();
        network
            .add_junction("kitchen", 0., vec!["kitchen_faucet".into()], false)
            .unwrap();
        network
            .add_pipe(
                "service_main",
                "street",
                "entry",
                PipeParameters {
                    trunk: true,
                    ..branch(19.)
                },
            )
            .unwrap();
        network
            .add_pipe("kitchen_branch", "entry", "kitchen", branch(13.))
            .unwrap();
        network
    }

    #[rstest]
    fn should_validate_connected_network(network: WaterNetwork) {
        assert!(network.validate().is_ok());
        assert_eq!(network.service_entry(), Some(NodeIndex(1)));
        assert_eq!(network.metered_pipe(), Some(LinkIndex(0)));
        assert_eq!(network.default_demand_node(), Some(NodeIndex(2)));
        assert_eq!(network.total_length_m(), 10.);
    }

    #[rstest]
    fn should_reject_disconnected_node(mut network: WaterNetwork) {
        network.add_junction("shed", 0., vec![], false).unwrap();
        assert!(matches!(
            network.validate(),
            Err(ConfigurationError::InvalidTopology(_))
        ));
    }

    #[rstest]
    fn should_reject_implausible_diameters(mut network: WaterNetwork) {
        network.add_junction("loft", 3., vec![], false).unwrap();
        network
            .add_pipe("loft_branch", "kitchen", "loft", branch(40.))
            .unwrap();
        assert!(network.validate().is_err());
    }

    #[rstest]
    fn should_reject_duplicate_and_dangling_names(mut network: WaterNetwork) {
        assert!(network.add_junction("kitchen", 0., vec![], false).is_err());
        assert!(network
            .add_pipe("hose", "kitchen", "garden", branch(13.))
            .is_err());
    }

    #[rstest]
    fn should_reset_event_state_to_nominal(mut network: WaterNetwork) {
        let pipe = network.pipe_index("kitchen_branch").unwrap();
        network.pipe_mut(pipe).diameter_m = 0.005;
        network.pipe_mut(pipe).roughness_c = 80.;
        let kitchen = network.node_index("kitchen").unwrap();
        network
            .node_mut(kitchen)
            .junction_mut()
            .unwrap()
            .emitter_coefficient = 1e-5;

        network.reset_dynamic_state();

        assert_eq!(network.pipe(pipe).diameter_m, 0.013);
        assert_eq!(network.pipe(pipe).roughness_c, 130.);
        assert_eq!(
            network.node(kitchen).junction().unwrap().emitter_coefficient,
            0.
        );
    }
}
