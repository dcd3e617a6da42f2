//! One house-day end to end: network, demand, events, hydraulics, physics and meter.

use crate::core::demand::{DemandAllocation, DemandGenerator};
use crate::core::events::leak::{LeakEvent, LeakType};
use crate::core::events::{EventScheduler, EventStatistics, ScheduleParameters};
use crate::core::hydraulics::{HydraulicResults, HydraulicSolver};
use crate::core::network::builder::{
    NetworkProvider, ProfileNetworkProvider, SuppliedNetworkProvider,
};
use crate::core::network::{Pipe, WaterNetwork};
use crate::core::sensor::{SensorDataQualityEvent, UltrasonicMeter};
use crate::core::temperature::TemperatureModel;
use crate::core::units::{
    circular_area, cubic_metres_per_second_to_gpm, metres_to_millimetres, PASCALS_PER_KILOPASCAL,
};
use crate::core::water_hammer::{TransientRecord, WaterHammerAnalyzer};
use crate::errors::{ConfigurationError, SimulationError};
use crate::input::{HouseProfile, LeakMode, ProfileSet, SimulationConfig, SimulationFlags};
use crate::output::SensorReading;
use crate::simulation_time::SimulationTime;
use chrono::{Datelike, NaiveDate};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use tracing::{debug, info, instrument};

/// A single unit of cohort work.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct HouseDayJob {
    pub house_id: u32,
    pub day_start: NaiveDate,
}

/// Everything shared, read-only, by the house-days of a run.
pub struct SimulationContext {
    pub profiles: ProfileSet,
    pub config: SimulationConfig,
    /// used for every house instead of building from the profile
    pub network: Option<SuppliedNetworkProvider>,
}

impl SimulationContext {
    pub fn new(profiles: ProfileSet, config: SimulationConfig) -> Self {
        Self {
            profiles,
            config,
            network: None,
        }
    }

    pub fn with_network(mut self, network: SuppliedNetworkProvider) -> Self {
        self.network = Some(network);
        self
    }
}

#[derive(Clone, Debug)]
pub struct HouseDayOutput {
    pub job: HouseDayJob,
    pub profile: String,
    pub rows: Vec<SensorReading>,
    pub leaks: Vec<LeakEvent>,
    pub statistics: EventStatistics,
    pub transients: Vec<TransientRecord>,
    pub quality_events: Vec<SensorDataQualityEvent>,
    pub occupancy: u32,
    pub demand_volume_l: f64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Component {
    Profile = 1,
    Demand,
    Events,
    Meter,
}

fn mix(value: u64) -> u64 {
    let mut z = value.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Seed for one component's random stream. The profile stream ignores the day so that a house
/// keeps its profile for the whole run.
fn component_seed(seed: u64, house_id: u32, day: NaiveDate, component: Component) -> u64 {
    let day = match component {
        Component::Profile => 0,
        _ => day.num_days_from_ce() as u64,
    };
    [house_id as u64, day, component as u64]
        .into_iter()
        .fold(mix(seed), |acc, value| mix(acc ^ value))
}

pub struct HouseSimulator<'a> {
    job: HouseDayJob,
    context: &'a SimulationContext,
    totalizer_carry_in_m3: f64,
}

impl<'a> HouseSimulator<'a> {
    pub fn new(job: HouseDayJob, context: &'a SimulationContext) -> Self {
        Self {
            job,
            context,
            totalizer_carry_in_m3: 0.,
        }
    }

    /// Start the meter totalizer from a previous reading.
    pub fn with_totalizer(mut self, totalizer_m3: f64) -> Self {
        self.totalizer_carry_in_m3 = totalizer_m3;
        self
    }

    fn rng(&self, component: Component) -> Pcg64 {
        Pcg64::seed_from_u64(component_seed(
            self.context.config.seed,
            self.job.house_id,
            self.job.day_start,
            component,
        ))
    }

    #[instrument(skip(self), fields(house_id = self.job.house_id, day = %self.job.day_start))]
    pub fn run(&self) -> Result<HouseDayOutput, SimulationError> {
        let config = &self.context.config;
        let (profile_name, profile) = self
            .context
            .profiles
            .select(&config.profile, &mut self.rng(Component::Profile))?;
        let mut network = match &self.context.network {
            Some(provider) => provider.provide()?,
            None => ProfileNetworkProvider::new(profile).provide()?,
        };
        let time = SimulationTime::for_days(self.job.day_start, 1, config.resolution_s);

        let demand = DemandGenerator::new(profile, &mut self.rng(Component::Demand)).generate(
            time.start_date(),
            time.duration_s(),
            time.step_s(),
        )?;
        let allocation = DemandAllocation::new(&network, &demand)?;

        let mut scheduler = self.schedule(&network, profile, &time)?;
        let results = HydraulicSolver::for_flags(
            config.flags,
            config.solver_accuracy,
            config.solver_max_iterations,
        )
        .run(&mut network, &allocation, &time, &mut scheduler)?;

        let metered = network.metered_pipe().ok_or_else(|| {
            ConfigurationError::InvalidTopology("network has no service main to meter".into())
        })?;
        let main = network.pipe(metered).clone();
        let entry = if network.is_service_entry(main.to) {
            main.to
        } else {
            main.from
        };
        let mut pressures = results.pressure_series(entry).to_vec();

        let temperatures = TemperatureModel::new(
            config.supply_base_temperature_c,
            main.material,
            main.nominal_diameter_m(),
            main.length_m,
        )
        .simulate(results.flow_series(metered), &time);

        let transients = if config.flags.contains(SimulationFlags::ENABLE_TRANSIENTS) {
            self.transients(&scheduler, &network, &results, &main, &time, &mut pressures)
        } else {
            vec![]
        };

        let mut meter = UltrasonicMeter::new(
            config.meter.clone(),
            main.nominal_diameter_m(),
            self.rng(Component::Meter),
        );
        let readings = meter.simulate(
            results.velocity_series(metered),
            &temperatures,
            time.step_s(),
            self.totalizer_carry_in_m3,
        );

        let rows = time
            .iter()
            .zip(&readings.samples)
            .map(|(t_it, sample)| {
                let location = results.leak_locations()[t_it.index].clone();
                SensorReading {
                    timestamp: t_it.timestamp(),
                    house_id: self.job.house_id,
                    flow_m3s: sample.flow_m3s,
                    flow_gpm: sample.flow_m3s.map(cubic_metres_per_second_to_gpm),
                    velocity_ms: sample.velocity_ms,
                    totalizer_m3: sample.totalizer_m3,
                    pressure_kpa: sample.is_present().then_some(pressures[t_it.index]),
                    upstream_transit_s: sample.upstream_transit_s,
                    downstream_transit_s: sample.downstream_transit_s,
                    delta_t_s: sample.delta_t_s,
                    incidence_angle_deg: meter.model().incidence_angle_deg,
                    pipe_diameter_mm: metres_to_millimetres(main.nominal_diameter_m()),
                    pipe_material: main.material,
                    reflection_count: meter.reflection_count(),
                    leak: location.is_some(),
                    leak_location: location.unwrap_or_default(),
                }
            })
            .collect::<Vec<_>>();

        let statistics = scheduler.statistics().clone();
        debug!(
            "{} data quality faults injected, {} transients",
            readings.quality_events.len(),
            transients.len()
        );
        info!(
            "simulated {} rows for profile {profile_name}: {:.0} L demand, {} leaks, {:.4} m3 leaked",
            rows.len(),
            demand.total_volume_l(),
            statistics.leak_count,
            statistics.cumulative_water_loss_m3
        );

        Ok(HouseDayOutput {
            job: self.job,
            profile: profile_name.to_string(),
            rows,
            leaks: scheduler.leaks().to_vec(),
            statistics,
            transients,
            quality_events: readings.quality_events,
            occupancy: demand.occupancy(),
            demand_volume_l: demand.total_volume_l(),
        })
    }

    /// The leak gate, the realistic schedule and any explicitly scheduled leaks.
    fn schedule(
        &self,
        network: &WaterNetwork,
        profile: &HouseProfile,
        time: &SimulationTime,
    ) -> Result<EventScheduler, ConfigurationError> {
        let config = &self.context.config;
        let mut rng = self.rng(Component::Events);
        let mut scheduler = EventScheduler::new();

        if config.flags.contains(SimulationFlags::ENABLE_EVENTS) {
            let include_leaks = match config.leak_mode {
                LeakMode::None => false,
                LeakMode::Fixed(_) => true,
                LeakMode::Random => rng.random_bool(config.leak_probability),
            };
            let parameters = ScheduleParameters {
                start: time.start_datetime(),
                duration_s: time.duration_s(),
                pipe_age_years: profile.pipe_age_years,
                water_hardness_mg_l: profile.water_hardness_mg_l,
                leak_annual_rate_per_km: config.leak_annual_rate_per_km,
                blockage_annual_rate_per_km: config.blockage_annual_rate_per_km,
                leak_type: match config.leak_mode {
                    LeakMode::Fixed(leak_type) => Some(leak_type),
                    _ => None,
                },
                include_leaks,
                include_blockages: config.flags.contains(SimulationFlags::ENABLE_BLOCKAGES),
            };
            scheduler.generate_realistic_schedule(network, &parameters, &mut rng)?;
        }

        for (i, scheduled) in config.scheduled_leaks.iter().enumerate() {
            let leak = LeakEvent::sample(
                format!("scheduled_{i}"),
                scheduled.leak_type,
                scheduled.node.clone(),
                scheduled.start_s,
                scheduled.duration_s.map(|duration| scheduled.start_s + duration),
                &mut rng,
            );
            scheduler.add_leak(match scheduled.initial_diameter_mm {
                Some(diameter_mm) => leak.with_initial_diameter(diameter_mm),
                None => leak,
            });
        }
        Ok(scheduler)
    }

    /// Joukowsky surge for each pressure burst opening during the day, added to the pressure
    /// sample at the first step the burst is active.
    fn transients(
        &self,
        scheduler: &EventScheduler,
        network: &WaterNetwork,
        results: &HydraulicResults,
        main: &Pipe,
        time: &SimulationTime,
        pressures: &mut [f64],
    ) -> Vec<TransientRecord> {
        let analyzer =
            WaterHammerAnalyzer::new(main.material, main.nominal_diameter_m(), main.length_m);
        let main_area = circular_area(main.nominal_diameter_m());
        let mut records = vec![];

        for leak in scheduler
            .leaks()
            .iter()
            .filter(|leak| leak.leak_type == LeakType::PressureBurst)
        {
            let step = (leak.start_s / time.step_s()).ceil() as usize;
            let Some(node) = network.node_index(&leak.location) else {
                continue;
            };
            if step >= pressures.len() {
                continue;
            }
            let pressure_pa =
                results.pressure_at(node, leak.start_s - time.step_s()) * PASCALS_PER_KILOPASCAL;
            let burst_flow = leak.orifice_flow_m3s(leak.start_s, pressure_pa);
            let record = analyzer.analyze(
                &leak.id,
                &leak.location,
                leak.start_s,
                burst_flow / main_area,
                self.context.config.burst_opening_time_s,
            );
            pressures[step] += record.surge_kpa;
            records.push(record);
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{ProfileSelection, ScheduledLeak, SensorConfigSet};
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn context(configure: impl FnOnce(&mut SimulationConfig)) -> SimulationContext {
        let meter = SensorConfigSet::bundled()
            .unwrap()
            .meter("clamp_on_standard")
            .unwrap()
            .clone();
        let mut config = SimulationConfig::new(meter);
        config.resolution_s = 600.;
        config.profile = ProfileSelection::Named("starter_home".into());
        configure(&mut config);
        SimulationContext::new(ProfileSet::bundled().unwrap(), config)
    }

    fn job(house_id: u32) -> HouseDayJob {
        HouseDayJob {
            house_id,
            day_start: NaiveDate::from_ymd_opt(2025, 1, 14).unwrap(),
        }
    }

    fn burst_at_noon(config: &mut SimulationConfig) {
        config.leak_mode = LeakMode::None;
        config.scheduled_leaks = vec![ScheduledLeak {
            node: "bathroom".into(),
            leak_type: LeakType::PressureBurst,
            start_s: 12. * 3_600.,
            duration_s: Some(2. * 3_600.),
            initial_diameter_mm: Some(6.),
        }];
    }

    #[rstest]
    fn component_seeds_should_differ() {
        let day = NaiveDate::from_ymd_opt(2025, 1, 14).unwrap();
        let next_day = day.succ_opt().unwrap();
        let seeds = [
            component_seed(42, 1, day, Component::Demand),
            component_seed(42, 1, day, Component::Meter),
            component_seed(42, 2, day, Component::Demand),
            component_seed(42, 1, next_day, Component::Demand),
            component_seed(43, 1, day, Component::Demand),
        ];
        for (i, a) in seeds.iter().enumerate() {
            for b in &seeds[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(
            component_seed(42, 1, day, Component::Profile),
            component_seed(42, 1, next_day, Component::Profile)
        );
    }

    #[rstest]
    fn should_be_reproducible() {
        let context = context(|_| {});
        let first = HouseSimulator::new(job(3), &context).run().unwrap();
        let second = HouseSimulator::new(job(3), &context).run().unwrap();
        let other = HouseSimulator::new(job(4), &context).run().unwrap();

        assert_eq!(first.rows, second.rows);
        assert_eq!(first.leaks, second.leaks);
        assert_eq!(first.demand_volume_l, second.demand_volume_l);
        assert_ne!(first.rows, other.rows);
    }

    #[rstest]
    fn rows_should_be_on_a_gap_free_grid() {
        let context = context(|_| {});
        let output = HouseSimulator::new(job(1), &context).run().unwrap();

        assert_eq!(output.rows.len(), 144);
        assert_eq!(
            output.rows[0].timestamp,
            job(1).day_start.and_hms_opt(0, 0, 0).unwrap()
        );
        for pair in output.rows.windows(2) {
            assert_eq!(
                pair[1].timestamp - pair[0].timestamp,
                chrono::Duration::seconds(600)
            );
        }
        assert!(output.rows.iter().all(|row| row.house_id == 1));
    }

    #[rstest]
    fn no_leak_mode_should_never_flag_leaks() {
        let context = context(|config| config.leak_mode = LeakMode::None);
        for house_id in 0..5 {
            let output = HouseSimulator::new(job(house_id), &context).run().unwrap();
            assert!(output.leaks.is_empty());
            assert!(output.rows.iter().all(|row| !row.leak && row.leak_location.is_empty()));
        }
    }

    #[rstest]
    fn fixed_leak_mode_should_always_leak() {
        let context = context(|config| config.leak_mode = LeakMode::Fixed(LeakType::Gradual));
        let output = HouseSimulator::new(job(2), &context).run().unwrap();
        assert!(!output.leaks.is_empty());
        assert!(output
            .leaks
            .iter()
            .all(|leak| leak.leak_type == LeakType::Gradual));
    }

    #[rstest]
    fn transients_should_only_run_when_enabled() {
        let without = context(burst_at_noon);
        let with = context(|config| {
            burst_at_noon(config);
            config.flags |= SimulationFlags::ENABLE_TRANSIENTS;
        });
        let quiet = HouseSimulator::new(job(1), &without).run().unwrap();
        let surged = HouseSimulator::new(job(1), &with).run().unwrap();

        assert!(quiet.transients.is_empty());
        assert_eq!(surged.transients.len(), 1);
        let record = &surged.transients[0];
        assert!(record.surge_kpa > 0.);
        assert_eq!(record.location, "bathroom");

        let burst_step = 72;
        for (step, (a, b)) in quiet.rows.iter().zip(&surged.rows).enumerate() {
            match (a.pressure_kpa, b.pressure_kpa) {
                (Some(a), Some(b)) if step == burst_step => assert!(b > a),
                (a, b) => assert_eq!(a, b),
            }
        }
    }
}
