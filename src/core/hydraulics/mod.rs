pub mod gradient;
pub mod headloss;
pub mod tree;

use crate::core::demand::DemandAllocation;
use crate::core::events::EventScheduler;
use crate::core::network::{LinkIndex, NodeIndex, WaterNetwork};
use crate::core::units::{circular_area, PASCALS_PER_KILOPASCAL};
use crate::errors::HydraulicSolveError;
use crate::input::SimulationFlags;
use crate::simulation_time::SimulationTime;
use gradient::GradientSolver;
use headloss::{clip_velocity, head_to_pressure};
use itertools::Itertools;
use tracing::debug;
use tree::TreeSolver;

/// A solved steady hydraulic state of a network.
#[derive(Clone, Debug, PartialEq)]
pub struct SteadyState {
    /// total head at each node, in m
    pub heads: Vec<f64>,
    /// flow in each link, positive from its start node to its end node, in m^3/s
    pub flows: Vec<f64>,
    /// emitter outflow at each node, in m^3/s
    pub emitter_flows: Vec<f64>,
    pub iterations: usize,
}

impl SteadyState {
    pub fn pressure_head(&self, network: &WaterNetwork, node: NodeIndex) -> f64 {
        self.heads[node.0] - network.node(node).elevation_m
    }

    /// Net inflow less demand and emitter outflow at each junction, in m^3/s.
    pub fn continuity_residuals(&self, network: &WaterNetwork) -> Vec<f64> {
        let mut net_inflow = vec![0.; network.node_count()];
        for (pipe, flow) in network.pipes().iter().zip(&self.flows) {
            net_inflow[pipe.from.0] -= flow;
            net_inflow[pipe.to.0] += flow;
        }
        network
            .junction_indices()
            .filter_map(|idx| {
                network.node(idx).junction().map(|junction| {
                    net_inflow[idx.0] - junction.demand_m3s - self.emitter_flows[idx.0]
                })
            })
            .collect()
    }
}

/// Finds a steady state for the network as it currently stands.
pub trait SolverEngine {
    fn solve(&self, network: &WaterNetwork) -> Result<SteadyState, HydraulicSolveError>;
}

/// Quasi-steady extended-period simulation: one steady solve per step of the grid, with the
/// scheduler's events and the step's demands applied first.
pub struct HydraulicSolver {
    engine: Box<dyn SolverEngine>,
}

impl HydraulicSolver {
    pub fn new(engine: Box<dyn SolverEngine>) -> Self {
        Self { engine }
    }

    pub fn for_flags(flags: SimulationFlags, accuracy: f64, max_iterations: usize) -> Self {
        if flags.contains(SimulationFlags::LIGHT_MODE) {
            Self::new(Box::new(TreeSolver::new(accuracy, max_iterations)))
        } else {
            Self::new(Box::new(GradientSolver::new(accuracy, max_iterations)))
        }
    }

    pub fn run(
        &self,
        network: &mut WaterNetwork,
        demand: &DemandAllocation,
        simulation_time: &SimulationTime,
        scheduler: &mut EventScheduler,
    ) -> Result<HydraulicResults, HydraulicSolveError> {
        let steps = simulation_time.total_steps();
        let mut results = HydraulicResults::with_capacity(network, steps, simulation_time.step_s());

        for t_it in simulation_time.iter() {
            let applied = scheduler.apply_events_to_network(network, t_it.time);
            demand.apply(network, t_it.index);
            let state = self.engine.solve(network)?;

            let leak_outflow = applied
                .leaks
                .iter()
                .map(|leak| leak.node)
                .unique()
                .map(|node| state.emitter_flows[node.0])
                .sum::<f64>();
            scheduler.record_water_loss(leak_outflow * t_it.timestep);

            let location = applied
                .leaks
                .iter()
                .map(|leak| leak.location.as_str())
                .unique()
                .join(";");
            results.record(
                network,
                &state,
                leak_outflow,
                (!location.is_empty()).then_some(location),
            );
        }

        debug!(
            "hydraulic run of {steps} steps took {} solver iterations, {} velocities clipped",
            results.total_iterations, results.clipped_velocities
        );
        Ok(results)
    }
}

/// Time series of the hydraulic state on a uniform grid, indexed by node or link.
#[derive(Clone, Debug)]
pub struct HydraulicResults {
    step_s: f64,
    /// gauge pressure per node, in kPa
    pressures: Vec<Vec<f64>>,
    /// per link, in m^3/s
    flows: Vec<Vec<f64>>,
    /// per link, clipped at the pipe material's velocity cap, in m/s
    velocities: Vec<Vec<f64>>,
    /// per node, in m^3/s
    emitter_flows: Vec<Vec<f64>>,
    leak_outflows: Vec<f64>,
    leak_locations: Vec<Option<String>>,
    total_iterations: usize,
    clipped_velocities: usize,
}

impl HydraulicResults {
    fn with_capacity(network: &WaterNetwork, steps: usize, step_s: f64) -> Self {
        let per_node = vec![Vec::with_capacity(steps); network.node_count()];
        let per_link = vec![Vec::with_capacity(steps); network.pipe_count()];
        Self {
            step_s,
            pressures: per_node.clone(),
            flows: per_link.clone(),
            velocities: per_link,
            emitter_flows: per_node,
            leak_outflows: Vec::with_capacity(steps),
            leak_locations: Vec::with_capacity(steps),
            total_iterations: 0,
            clipped_velocities: 0,
        }
    }

    fn record(
        &mut self,
        network: &WaterNetwork,
        state: &SteadyState,
        leak_outflow: f64,
        leak_location: Option<String>,
    ) {
        for idx in 0..network.node_count() {
            let pressure_head = state.pressure_head(network, NodeIndex(idx));
            self.pressures[idx].push(head_to_pressure(pressure_head) / PASCALS_PER_KILOPASCAL);
            self.emitter_flows[idx].push(state.emitter_flows[idx]);
        }
        for (idx, pipe) in network.pipes().iter().enumerate() {
            let flow = state.flows[idx];
            let velocity = flow / circular_area(pipe.diameter_m);
            let clipped = clip_velocity(velocity, pipe.material);
            if clipped != velocity {
                self.clipped_velocities += 1;
            }
            self.flows[idx].push(flow);
            self.velocities[idx].push(clipped);
        }
        self.leak_outflows.push(leak_outflow);
        self.leak_locations.push(leak_location);
        self.total_iterations += state.iterations;
    }

    pub fn step_s(&self) -> f64 {
        self.step_s
    }

    pub fn len(&self) -> usize {
        self.leak_outflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leak_outflows.is_empty()
    }

    pub fn pressure_series(&self, node: NodeIndex) -> &[f64] {
        &self.pressures[node.0]
    }

    pub fn flow_series(&self, link: LinkIndex) -> &[f64] {
        &self.flows[link.0]
    }

    pub fn velocity_series(&self, link: LinkIndex) -> &[f64] {
        &self.velocities[link.0]
    }

    pub fn emitter_flow_series(&self, node: NodeIndex) -> &[f64] {
        &self.emitter_flows[node.0]
    }

    /// total emitter outflow at leaking junctions per step, in m^3/s
    pub fn leak_outflows(&self) -> &[f64] {
        &self.leak_outflows
    }

    /// the junctions leaking at each step, joined with ';'
    pub fn leak_locations(&self) -> &[Option<String>] {
        &self.leak_locations
    }

    pub fn total_iterations(&self) -> usize {
        self.total_iterations
    }

    pub fn pressure_at(&self, node: NodeIndex, t: f64) -> f64 {
        interpolate(&self.pressures[node.0], self.step_s, t)
    }

    pub fn flow_at(&self, link: LinkIndex, t: f64) -> f64 {
        interpolate(&self.flows[link.0], self.step_s, t)
    }

    pub fn velocity_at(&self, link: LinkIndex, t: f64) -> f64 {
        interpolate(&self.velocities[link.0], self.step_s, t)
    }
}

/// Linear interpolation on a uniform grid starting at t = 0, held flat outside it.
fn interpolate(series: &[f64], step_s: f64, t: f64) -> f64 {
    let Some(last) = series.len().checked_sub(1) else {
        return f64::NAN;
    };
    let position = (t / step_s).clamp(0., last as f64);
    let lower = position.floor() as usize;
    let upper = (lower + 1).min(last);
    let fraction = position - lower as f64;
    series[lower] + (series[upper] - series[lower]) * fraction
}
