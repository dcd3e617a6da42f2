use super::gradient::pipe_gradient;
use super::{SolverEngine, SteadyState};
use crate::core::network::{LinkIndex, NodeIndex, NodeKind, WaterNetwork};
use crate::errors::HydraulicSolveError;
use std::collections::VecDeque;

/// relaxation applied to emitter flows between passes
const EMITTER_RELAXATION: f64 = 0.5;
/// absolute emitter flow change treated as converged, in m^3/s
const MIN_FLOW_SUM: f64 = 1e-6;

/// Explicit solution for branched networks fed from a single reservoir: flows accumulate
/// from the leaves and heads are walked out from the supply. Emitter flows are found by
/// damped fixed-point iteration. Networks containing a loop are rejected.
#[derive(Clone, Debug)]
pub struct TreeSolver {
    accuracy: f64,
    max_iterations: usize,
}

impl TreeSolver {
    pub fn new(accuracy: f64, max_iterations: usize) -> Self {
        Self {
            accuracy,
            max_iterations,
        }
    }
}

impl Default for TreeSolver {
    fn default() -> Self {
        Self::new(1e-6, 200)
    }
}

struct Tree {
    root: NodeIndex,
    root_head: f64,
    /// nodes in breadth-first order from the root
    order: Vec<NodeIndex>,
    /// the link joining each node to its parent
    parent_link: Vec<Option<LinkIndex>>,
    parent: Vec<Option<NodeIndex>>,
}

fn spanning_tree(network: &WaterNetwork) -> Result<Tree, HydraulicSolveError> {
    let mut reservoirs = network.reservoir_indices();
    let root = reservoirs.next().ok_or(HydraulicSolveError::NoReservoir)?;
    if let Some(second) = reservoirs.next() {
        return Err(HydraulicSolveError::MultipleSources(
            network.node(second).name.clone(),
        ));
    }
    let NodeKind::Reservoir { head_m } = network.node(root).kind else {
        return Err(HydraulicSolveError::NoReservoir);
    };

    let adjacency = network.adjacency();
    let mut parent_link = vec![None; network.node_count()];
    let mut parent = vec![None; network.node_count()];
    let mut visited = vec![false; network.node_count()];
    let mut order = vec![];
    let mut queue = VecDeque::from([root]);
    visited[root.0] = true;
    while let Some(node) = queue.pop_front() {
        order.push(node);
        for (link, neighbour) in &adjacency[node.0] {
            if parent_link[node.0] == Some(*link) {
                continue;
            }
            if visited[neighbour.0] {
                return Err(HydraulicSolveError::LoopedNetwork(
                    network.pipe(*link).name.clone(),
                ));
            }
            visited[neighbour.0] = true;
            parent_link[neighbour.0] = Some(*link);
            parent[neighbour.0] = Some(node);
            queue.push_back(*neighbour);
        }
    }
    if order.len() != network.node_count() {
        return Err(HydraulicSolveError::Singular);
    }

    Ok(Tree {
        root,
        root_head: head_m,
        order,
        parent_link,
        parent,
    })
}

impl SolverEngine for TreeSolver {
    fn solve(&self, network: &WaterNetwork) -> Result<SteadyState, HydraulicSolveError> {
        let tree = spanning_tree(network)?;
        let node_count = network.node_count();
        let mut emitter_flows = vec![0.; node_count];
        let mut heads = vec![tree.root_head; node_count];
        let mut flows = vec![0.; network.pipe_count()];
        let has_emitters = network
            .nodes()
            .iter()
            .filter_map(|node| node.junction())
            .any(|junction| junction.emitter_coefficient > 0.);

        for iteration in 1..=self.max_iterations {
            // accumulate outflows from the leaves back to the supply
            let mut downstream = vec![0.; node_count];
            for node in tree.order.iter().rev() {
                if let Some(junction) = network.node(*node).junction() {
                    downstream[node.0] += junction.demand_m3s + emitter_flows[node.0];
                }
                if let (Some(link), Some(parent)) = (tree.parent_link[node.0], tree.parent[node.0])
                {
                    let pipe = network.pipe(link);
                    flows[link.0] = if pipe.to == *node {
                        downstream[node.0]
                    } else {
                        -downstream[node.0]
                    };
                    downstream[parent.0] += downstream[node.0];
                }
            }

            // walk heads out from the supply
            heads[tree.root.0] = tree.root_head;
            for node in tree.order.iter().skip(1) {
                let (Some(link), Some(parent)) = (tree.parent_link[node.0], tree.parent[node.0])
                else {
                    continue;
                };
                let pipe = network.pipe(link);
                let (_, headloss) = pipe_gradient(pipe, flows[link.0]);
                heads[node.0] = if pipe.to == *node {
                    heads[parent.0] - headloss
                } else {
                    heads[parent.0] + headloss
                };
            }

            if !heads.iter().chain(&flows).all(|v| v.is_finite()) {
                return Err(HydraulicSolveError::NonFinite(iteration));
            }
            if !has_emitters {
                return Ok(SteadyState {
                    heads,
                    flows,
                    emitter_flows,
                    iterations: iteration,
                });
            }

            let mut change_sum = 0.;
            let mut flow_sum = 0.;
            for node in &tree.order {
                let node_ref = network.node(*node);
                let Some(junction) = node_ref.junction() else {
                    continue;
                };
                if junction.emitter_coefficient <= 0. {
                    continue;
                }
                let target = junction.emitter_coefficient
                    * (heads[node.0] - node_ref.elevation_m).max(0.).sqrt();
                let updated = emitter_flows[node.0]
                    + EMITTER_RELAXATION * (target - emitter_flows[node.0]);
                change_sum += (updated - emitter_flows[node.0]).abs();
                flow_sum += updated;
                emitter_flows[node.0] = updated;
            }
            if change_sum / flow_sum.max(MIN_FLOW_SUM) < self.accuracy {
                return Ok(SteadyState {
                    heads,
                    flows,
                    emitter_flows,
                    iterations: iteration,
                });
            }
        }

        Err(HydraulicSolveError::NotConverged {
            iterations: self.max_iterations,
            relative_change: f64::NAN,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hydraulics::gradient::GradientSolver;
    use crate::core::network::builder::build_network;
    use crate::input::ProfileSet;
    use approx::assert_relative_eq;
    use rstest::*;

    #[fixture]
    fn network() -> WaterNetwork {
        let profiles = ProfileSet::bundled().unwrap();
        build_network(profiles.profile("family_home").unwrap()).unwrap()
    }

    #[rstest]
    fn should_agree_with_gradient_solver_on_a_tree(mut network: WaterNetwork) {
        let kitchen = network.node_index("kitchen").unwrap();
        let upstairs = network.node_index("upstairs_bathroom").unwrap();
        network.set_demand(kitchen, 1.2e-4);
        network.set_demand(upstairs, 1.5e-4);
        network
            .node_mut(upstairs)
            .junction_mut()
            .unwrap()
            .emitter_coefficient = 1e-6;

        let tree = TreeSolver::default().solve(&network).unwrap();
        let gradient = GradientSolver::default().solve(&network).unwrap();

        for (a, b) in tree.heads.iter().zip(&gradient.heads) {
            assert_relative_eq!(*a, *b, epsilon = 1e-3);
        }
        for (a, b) in tree.flows.iter().zip(&gradient.flows) {
            assert_relative_eq!(*a, *b, epsilon = 1e-8);
        }
        for residual in tree.continuity_residuals(&network) {
            assert!(residual.abs() < 1e-9);
        }
    }

    #[rstest]
    fn should_reject_looped_networks(mut network: WaterNetwork) {
        network
            .add_pipe(
                "cross_connection",
                "kitchen",
                "bathroom",
                crate::core::network::PipeParameters {
                    material: crate::core::material_properties::PipeMaterial::Pex,
                    diameter_m: 0.013,
                    length_m: 3.,
                    roughness_c: 160.,
                    minor_loss: 0.,
                    trunk: false,
                },
            )
            .unwrap();
        assert!(matches!(
            TreeSolver::default().solve(&network),
            Err(HydraulicSolveError::LoopedNetwork(_))
        ));
    }

    #[rstest]
    fn should_reject_a_second_supply(mut network: WaterNetwork) {
        network.add_reservoir("well", 0., 30.).unwrap();
        assert_eq!(
            TreeSolver::default().solve(&network).unwrap_err(),
            HydraulicSolveError::MultipleSources("well".into())
        );
    }
}
