//! Progressive failures (leaks and blockages) and the scheduler that applies them to a
//! network as simulated time advances.

pub mod blockage;
pub mod leak;

use crate::core::network::{NodeIndex, WaterNetwork};
use crate::errors::{ConfigurationError, EventApplicationWarning};
use blockage::{BlockageEvent, BlockageGenerator, MAX_HEADLOSS_MULTIPLIER};
use chrono::NaiveDateTime;
use leak::{LeakEvent, LeakGenerator, LeakType};
use rand::Rng;
use std::collections::HashSet;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventState {
    Inactive,
    Active,
    Expired,
}

/// Active from `start_s` to `end_s` inclusive; events with no end never expire.
pub(crate) fn event_state(start_s: f64, end_s: Option<f64>, t: f64) -> EventState {
    if t < start_s {
        EventState::Inactive
    } else if end_s.is_some_and(|end| t > end) {
        EventState::Expired
    } else {
        EventState::Active
    }
}

/// What a realistic failure schedule is drawn from.
#[derive(Clone, Debug)]
pub struct ScheduleParameters {
    pub start: NaiveDateTime,
    pub duration_s: f64,
    pub pipe_age_years: f64,
    pub water_hardness_mg_l: f64,
    pub leak_annual_rate_per_km: f64,
    pub blockage_annual_rate_per_km: f64,
    /// restrict generated leaks to one type
    pub leak_type: Option<LeakType>,
    pub include_leaks: bool,
    pub include_blockages: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventStatistics {
    pub max_simultaneous_events: usize,
    pub cumulative_water_loss_m3: f64,
    pub leak_count: usize,
    pub blockage_count: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AppliedLeak {
    pub id: String,
    pub leak_type: LeakType,
    pub location: String,
    pub node: NodeIndex,
}

/// The events in force after an application, in order of start time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AppliedEvents {
    pub leaks: Vec<AppliedLeak>,
    pub blockages: Vec<String>,
    pub warnings: Vec<EventApplicationWarning>,
}

impl AppliedEvents {
    pub fn active_count(&self) -> usize {
        self.leaks.len() + self.blockages.len()
    }
}

#[derive(Debug, Default)]
pub struct EventScheduler {
    leaks: Vec<LeakEvent>,
    blockages: Vec<BlockageEvent>,
    statistics: EventStatistics,
    warned: HashSet<String>,
}

impl EventScheduler {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn add_leak(&mut self, leak: LeakEvent) {
        let position = self.leaks.partition_point(|l| l.start_s <= leak.start_s);
        self.leaks.insert(position, leak);
        self.statistics.leak_count = self.leaks.len();
    }

    pub fn add_blockage(&mut self, blockage: BlockageEvent) {
        let position = self
            .blockages
            .partition_point(|b| b.start_s <= blockage.start_s);
        self.blockages.insert(position, blockage);
        self.statistics.blockage_count = self.blockages.len();
    }

    pub fn leaks(&self) -> &[LeakEvent] {
        &self.leaks
    }

    pub fn blockages(&self) -> &[BlockageEvent] {
        &self.blockages
    }

    pub fn statistics(&self) -> &EventStatistics {
        &self.statistics
    }

    /// Draw leaks and blockages, as enabled, for the run and add them to the schedule.
    pub fn generate_realistic_schedule(
        &mut self,
        network: &WaterNetwork,
        parameters: &ScheduleParameters,
        rng: &mut impl Rng,
    ) -> Result<(), ConfigurationError> {
        if parameters.include_leaks {
            let leaks = LeakGenerator::new(parameters.leak_annual_rate_per_km)
                .generate(network, parameters, rng)?;
            for leak in leaks {
                self.add_leak(leak);
            }
        }
        if parameters.include_blockages {
            let blockages = BlockageGenerator::new(parameters.blockage_annual_rate_per_km)
                .generate(network, parameters, rng)?;
            for blockage in blockages {
                self.add_blockage(blockage);
            }
        }
        debug!(
            "scheduled {} leaks and {} blockages",
            self.leaks.len(),
            self.blockages.len()
        );
        Ok(())
    }

    pub fn active_leaks(&self, t: f64) -> impl Iterator<Item = &LeakEvent> {
        self.leaks
            .iter()
            .filter(move |leak| leak.state(t) == EventState::Active)
    }

    pub fn active_blockages(&self, t: f64) -> impl Iterator<Item = &BlockageEvent> {
        self.blockages
            .iter()
            .filter(move |blockage| blockage.state(t) == EventState::Active)
    }

    /// Return the network to its as-built state, then apply every event active at `t`.
    /// Calling this again at the same `t` leaves the network unchanged.
    pub fn apply_events_to_network(&mut self, network: &mut WaterNetwork, t: f64) -> AppliedEvents {
        network.reset_dynamic_state();
        let mut applied = AppliedEvents::default();

        for leak in self.leaks.iter().filter(|l| l.state(t) == EventState::Active) {
            let node = network
                .node_index(&leak.location)
                .filter(|idx| !network.node(*idx).is_fixed_head());
            let Some(node) = node else {
                applied.warnings.push(EventApplicationWarning {
                    event: leak.id.clone(),
                    element_kind: "junction",
                    element: leak.location.clone(),
                });
                continue;
            };
            if let Some(junction) = network.node_mut(node).junction_mut() {
                junction.emitter_coefficient += leak.emitter_coefficient(t);
            }
            applied.leaks.push(AppliedLeak {
                id: leak.id.clone(),
                leak_type: leak.leak_type,
                location: leak.location.clone(),
                node,
            });
        }

        for blockage in self
            .blockages
            .iter()
            .filter(|b| b.state(t) == EventState::Active)
        {
            let Some(link) = network.pipe_index(&blockage.pipe) else {
                applied.warnings.push(EventApplicationWarning {
                    event: blockage.id.clone(),
                    element_kind: "pipe",
                    element: blockage.pipe.clone(),
                });
                continue;
            };
            let pipe = network.pipe_mut(link);
            pipe.diameter_m = blockage.effective_diameter_m(pipe.diameter_m, t);
            pipe.roughness_c /= blockage.roughness_c_divisor(t);
            pipe.limit_headloss_increase(MAX_HEADLOSS_MULTIPLIER);
            applied.blockages.push(blockage.id.clone());
        }

        for warning in &applied.warnings {
            if self.warned.insert(warning.event.clone()) {
                warn!("{warning}");
            }
        }

        self.statistics.max_simultaneous_events = self
            .statistics
            .max_simultaneous_events
            .max(applied.active_count());
        applied
    }

    pub fn record_water_loss(&mut self, volume_m3: f64) {
        self.statistics.cumulative_water_loss_m3 += volume_m3;
    }
}
