use crate::core::units::SECONDS_PER_DAY;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};

/// A fixed-resolution grid of simulation instants starting at midnight of a calendar day.
#[derive(Clone, Debug)]
pub struct SimulationTime {
    start_date: NaiveDate,
    duration_s: f64,
    step_s: f64,
}

impl SimulationTime {
    pub fn new(start_date: NaiveDate, duration_s: f64, step_s: f64) -> Self {
        Self {
            start_date,
            duration_s,
            step_s,
        }
    }

    pub fn for_days(start_date: NaiveDate, days: u32, step_s: f64) -> Self {
        Self::new(start_date, (days * SECONDS_PER_DAY) as f64, step_s)
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn start_datetime(&self) -> NaiveDateTime {
        self.start_date.and_time(chrono::NaiveTime::MIN)
    }

    pub fn duration_s(&self) -> f64 {
        self.duration_s
    }

    pub fn step_s(&self) -> f64 {
        self.step_s
    }

    pub fn total_steps(&self) -> usize {
        (self.duration_s / self.step_s).ceil() as usize
    }

    pub fn iter(&self) -> SimulationTimeIterator {
        SimulationTimeIterator {
            current_index: 0,
            simulation_time: self.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SimulationTimeIterator {
    current_index: usize,
    simulation_time: SimulationTime,
}

impl Iterator for SimulationTimeIterator {
    type Item = SimulationTimeIteration;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_index >= self.simulation_time.total_steps() {
            return None;
        }
        let index = self.current_index;
        self.current_index += 1;
        Some(SimulationTimeIteration {
            index,
            time: index as f64 * self.simulation_time.step_s,
            timestep: self.simulation_time.step_s,
            start: self.simulation_time.start_datetime(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.simulation_time.total_steps() - self.current_index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SimulationTimeIterator {}

#[derive(Clone, Copy, Debug)]
pub struct SimulationTimeIteration {
    pub index: usize,
    /// seconds since the start of the simulation
    pub time: f64,
    pub timestep: f64,
    start: NaiveDateTime,
}

impl SimulationTimeIteration {
    pub fn timestamp(&self) -> NaiveDateTime {
        self.start + Duration::milliseconds((self.time * 1000.).round() as i64)
    }

    /// Calendar month, 1 to 12
    pub fn month(&self) -> u32 {
        self.timestamp().month()
    }

    pub fn day_of_year(&self) -> u32 {
        self.timestamp().ordinal()
    }
}
