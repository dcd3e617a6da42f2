use super::headloss::{
    hazen_williams_resistance, minor_loss_resistance, HAZEN_WILLIAMS_FLOW_EXPONENT,
};
use super::{SolverEngine, SteadyState};
use crate::core::network::{NodeKind, Pipe, WaterNetwork};
use crate::core::units::circular_area;
use crate::errors::HydraulicSolveError;
use nalgebra::{DMatrix, DVector};
use tracing::trace;

/// smallest head-loss gradient used in the linearisation, in m per m^3/s
const MIN_GRADIENT: f64 = 1e-7;
/// below this flow a pipe follows a linear head-loss law through the origin, in m^3/s
const LOW_FLOW: f64 = 1e-6;
/// total flow change treated as converged whatever the flow, in m^3/s
const ABSOLUTE_FLOW_TOLERANCE: f64 = 1e-12;
/// velocity used for the initial flow estimate in every pipe, in m/s
const INITIAL_VELOCITY: f64 = 0.3;
/// flow sums below this are treated as absolute rather than relative change, in m^3/s
const MIN_FLOW_SUM: f64 = 1e-6;
/// emitters are never linearised about a pressure head below this, in m
const MIN_EMITTER_HEAD: f64 = 0.01;

/// Global gradient (Todini-Pilati) solution of heads and flows, the method used by EPANET.
/// Pipes follow Hazen-Williams with minor losses; emitters are treated as links from their
/// junction to the atmosphere.
#[derive(Clone, Debug)]
pub struct GradientSolver {
    accuracy: f64,
    max_iterations: usize,
}

impl GradientSolver {
    pub fn new(accuracy: f64, max_iterations: usize) -> Self {
        Self {
            accuracy,
            max_iterations,
        }
    }
}

impl Default for GradientSolver {
    fn default() -> Self {
        Self::new(1e-6, 200)
    }
}

/// Head-loss gradient and head loss of a pipe carrying `flow`. Below `LOW_FLOW` the
/// Hazen-Williams curve is replaced by the chord through the origin, which keeps the
/// gradient bounded away from zero at stagnant pipes.
pub(super) fn pipe_gradient(pipe: &Pipe, flow: f64) -> (f64, f64) {
    let r = hazen_williams_resistance(pipe.length_m, pipe.diameter_m, pipe.roughness_c);
    let m = minor_loss_resistance(pipe.minor_loss, pipe.diameter_m);
    let q = flow.abs();
    if q < LOW_FLOW {
        let chord = r * LOW_FLOW.powf(HAZEN_WILLIAMS_FLOW_EXPONENT - 1.) + m * LOW_FLOW;
        let gradient = chord.max(MIN_GRADIENT);
        return (gradient, gradient * flow);
    }
    let q_pow = q.powf(HAZEN_WILLIAMS_FLOW_EXPONENT - 1.);
    let gradient = HAZEN_WILLIAMS_FLOW_EXPONENT * r * q_pow + 2. * m * q;
    (gradient.max(MIN_GRADIENT), (r * q_pow + m * q) * flow)
}

fn emitter_gradient(coefficient: f64, flow: f64) -> (f64, f64, f64) {
    let flow = flow.max(coefficient * MIN_EMITTER_HEAD.sqrt());
    let k = 1. / coefficient.powi(2);
    (2. * k * flow, k * flow.powi(2), flow)
}

impl SolverEngine for GradientSolver {
    fn solve(&self, network: &WaterNetwork) -> Result<SteadyState, HydraulicSolveError> {
        let node_count = network.node_count();
        let mut rows: Vec<Option<usize>> = vec![None; node_count];
        let junctions = network.junction_indices().collect::<Vec<_>>();
        for (row, idx) in junctions.iter().enumerate() {
            rows[idx.0] = Some(row);
        }

        let start_head = network
            .reservoir_indices()
            .map(|idx| network.node(idx))
            .filter_map(|node| match node.kind {
                NodeKind::Reservoir { head_m } => Some(head_m),
                _ => None,
            })
            .reduce(f64::max)
            .ok_or(HydraulicSolveError::NoReservoir)?;

        let mut heads = network
            .nodes()
            .iter()
            .map(|node| match node.kind {
                NodeKind::Reservoir { head_m } => head_m,
                _ => start_head,
            })
            .collect::<Vec<_>>();
        let mut flows = network
            .pipes()
            .iter()
            .map(|pipe| INITIAL_VELOCITY * circular_area(pipe.diameter_m))
            .collect::<Vec<_>>();
        let mut emitter_flows = network
            .nodes()
            .iter()
            .map(|node| match node.junction() {
                Some(junction) if junction.emitter_coefficient > 0. => {
                    junction.emitter_coefficient * (start_head - node.elevation_m).max(0.).sqrt()
                }
                _ => 0.,
            })
            .collect::<Vec<_>>();

        let n = junctions.len();
        let mut relative_change = f64::INFINITY;
        for iteration in 1..=self.max_iterations {
            let mut a = DMatrix::<f64>::zeros(n, n);
            let mut f = DVector::<f64>::zeros(n);
            let mut link_terms = Vec::with_capacity(flows.len());

            for (pipe, flow) in network.pipes().iter().zip(&flows) {
                let (gradient, headloss) = pipe_gradient(pipe, *flow);
                let p = 1. / gradient;
                let y = p * headloss;
                let (from, to) = (pipe.from.0, pipe.to.0);
                match (rows[from], rows[to]) {
                    (Some(i), Some(j)) => {
                        a[(i, i)] += p;
                        a[(j, j)] += p;
                        a[(i, j)] -= p;
                        a[(j, i)] -= p;
                        f[i] -= flow - y;
                        f[j] += flow - y;
                    }
                    (Some(i), None) => {
                        a[(i, i)] += p;
                        f[i] -= flow - y;
                        f[i] += p * heads[to];
                    }
                    (None, Some(j)) => {
                        a[(j, j)] += p;
                        f[j] += flow - y;
                        f[j] += p * heads[from];
                    }
                    (None, None) => {}
                }
                link_terms.push((p, y));
            }

            let mut emitter_terms = vec![(0., 0., 0.); node_count];
            for (row, idx) in junctions.iter().enumerate() {
                let node = network.node(*idx);
                let Some(junction) = node.junction() else {
                    continue;
                };
                f[row] -= junction.demand_m3s;
                if junction.emitter_coefficient > 0. {
                    let (gradient, headloss, flow) =
                        emitter_gradient(junction.emitter_coefficient, emitter_flows[idx.0]);
                    let p = 1. / gradient;
                    let y = p * headloss;
                    a[(row, row)] += p;
                    f[row] -= flow - y;
                    f[row] += p * node.elevation_m;
                    emitter_terms[idx.0] = (p, y, flow);
                }
            }

            let solution = a
                .cholesky()
                .ok_or(HydraulicSolveError::Singular)?
                .solve(&f);
            for (row, idx) in junctions.iter().enumerate() {
                heads[idx.0] = solution[row];
            }

            let mut change_sum = 0.;
            let mut flow_sum = 0.;
            for (k, pipe) in network.pipes().iter().enumerate() {
                let (p, y) = link_terms[k];
                let updated = flows[k] - y + p * (heads[pipe.from.0] - heads[pipe.to.0]);
                change_sum += (updated - flows[k]).abs();
                flow_sum += updated.abs();
                flows[k] = updated;
            }
            for idx in &junctions {
                let (p, y, linearised) = emitter_terms[idx.0];
                if p == 0. {
                    continue;
                }
                let elevation = network.node(*idx).elevation_m;
                let updated = (linearised - y + p * (heads[idx.0] - elevation)).max(0.);
                change_sum += (updated - emitter_flows[idx.0]).abs();
                flow_sum += updated;
                emitter_flows[idx.0] = updated;
            }

            if !(heads.iter().chain(&flows).all(|v| v.is_finite()) && change_sum.is_finite()) {
                return Err(HydraulicSolveError::NonFinite(iteration));
            }

            relative_change = change_sum / flow_sum.max(MIN_FLOW_SUM);
            trace!("gradient iteration {iteration}: relative change {relative_change:e}");
            if relative_change < self.accuracy || change_sum < ABSOLUTE_FLOW_TOLERANCE {
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
            relative_change,
        })
    }
}
