use crate::core::material_properties::PipeMaterial;
use chrono::{NaiveDate, NaiveDateTime};
use formatx::formatx;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::fs::File;
use std::io;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Column names of a house-day file, in order.
pub const SENSOR_READING_COLUMNS: [&str; 16] = [
    "timestamp",
    "house_id",
    "flow_m3s",
    "flow_gpm",
    "velocity_ms",
    "totalizer_m3",
    "pressure_kpa",
    "upstream_transit_s",
    "downstream_transit_s",
    "delta_t_s",
    "incidence_angle_deg",
    "pipe_diameter_mm",
    "pipe_material",
    "reflection_count",
    "leak",
    "leak_location",
];

pub trait Output: Debug {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write>;
}

/// Writes each location key to its own file in a directory, named by a `formatx` template
/// with a single `{}` placeholder for the key.
#[derive(Debug)]
pub struct FileOutput {
    directory_path: PathBuf,
    file_template: String,
}

impl FileOutput {
    pub fn new(directory_path: PathBuf, file_template: String) -> Self {
        Self {
            directory_path,
            file_template,
        }
    }

    /// Output for house-day CSV files, each named `{prefix}{key}.csv`.
    pub fn for_house_days(directory_path: PathBuf, prefix: &str) -> Self {
        Self::new(directory_path, format!("{prefix}{{}}.csv"))
    }

    pub fn directory_path(&self) -> &Path {
        &self.directory_path
    }

    pub fn path_for_location_key(&self, location_key: &str) -> anyhow::Result<PathBuf> {
        let file_name = formatx!(&self.file_template, location_key).map_err(|e| {
            anyhow::anyhow!("bad output file template '{}': {e:?}", self.file_template)
        })?;
        Ok(self.directory_path.join(file_name))
    }
}

impl Output for FileOutput {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write> {
        Ok(BufWriter::new(File::create(
            self.path_for_location_key(location_key)?,
        )?))
    }
}

/// One row of meter output for a house at one instant.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SensorReading {
    pub timestamp: NaiveDateTime,
    pub house_id: u32,
    pub flow_m3s: Option<f64>,
    pub flow_gpm: Option<f64>,
    pub velocity_ms: Option<f64>,
    pub totalizer_m3: f64,
    pub pressure_kpa: Option<f64>,
    pub upstream_transit_s: Option<f64>,
    pub downstream_transit_s: Option<f64>,
    pub delta_t_s: Option<f64>,
    pub incidence_angle_deg: f64,
    pub pipe_diameter_mm: f64,
    pub pipe_material: PipeMaterial,
    pub reflection_count: u32,
    pub leak: bool,
    /// empty when no leak is active
    pub leak_location: String,
}

/// Location key for a house-day file.
pub fn house_day_key(house_id: u32, day: NaiveDate) -> String {
    format!("house_{house_id:05}_{}", day.format("%Y-%m-%d"))
}

pub fn write_house_day(
    output: &impl Output,
    location_key: &str,
    rows: &[SensorReading],
) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(output.writer_for_location_key(location_key)?);
    if rows.is_empty() {
        writer.write_record(SENSOR_READING_COLUMNS)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_house_day(reader: impl Read) -> Result<Vec<SensorReading>, csv::Error> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers()?.clone();
    if headers.iter().ne(SENSOR_READING_COLUMNS) {
        return Err(csv::Error::from(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected columns: {headers:?}"),
        )));
    }
    reader.deserialize().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn rows(house_id: u32, count: usize) -> Vec<SensorReading> {
        let start = NaiveDate::from_ymd_opt(2025, 2, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..count)
            .map(|i| SensorReading {
                timestamp: start + chrono::Duration::minutes(i as i64),
                house_id,
                flow_m3s: (i % 7 != 3).then_some(1.5e-4 * i as f64),
                flow_gpm: (i % 7 != 3).then_some(2.38 * i as f64),
                velocity_ms: (i % 7 != 3).then_some(0.53),
                totalizer_m3: 0.01 * i as f64,
                pressure_kpa: (i % 7 != 3).then_some(352.1),
                upstream_transit_s: (i % 7 != 3).then_some(5.93e-5),
                downstream_transit_s: (i % 7 != 3).then_some(5.92e-5),
                delta_t_s: (i % 7 != 3).then_some(1e-7),
                incidence_angle_deg: 60.,
                pipe_diameter_mm: 19.,
                pipe_material: PipeMaterial::Copper,
                reflection_count: 3,
                leak: i > 5,
                leak_location: if i > 5 { "kitchen".into() } else { String::new() },
            })
            .collect()
    }

    #[rstest]
    fn should_name_house_day_files() {
        let output = FileOutput::for_house_days("/tmp/out".into(), "cohort_a_");
        let key = house_day_key(42, NaiveDate::from_ymd_opt(2025, 3, 9).unwrap());
        assert_eq!(key, "house_00042_2025-03-09");
        assert_eq!(
            output.path_for_location_key(&key).unwrap(),
            PathBuf::from("/tmp/out/cohort_a_house_00042_2025-03-09.csv")
        );
    }

    #[rstest]
    fn house_day_should_round_trip_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = FileOutput::for_house_days(dir.path().to_path_buf(), "");
        let written = rows(7, 30);

        write_house_day(&output, "house_00007_2025-02-01", &written).unwrap();
        let path = output
            .path_for_location_key("house_00007_2025-02-01")
            .unwrap();
        let header = std::fs::read_to_string(&path)
            .unwrap()
            .lines()
            .next()
            .unwrap()
            .to_string();
        let read = read_house_day(File::open(&path).unwrap()).unwrap();

        assert_eq!(header, SENSOR_READING_COLUMNS.join(","));
        assert_eq!(read.len(), written.len());
        assert_eq!(read, written);
    }

    #[rstest]
    fn empty_house_day_should_still_have_a_header() {
        let dir = tempfile::tempdir().unwrap();
        let output = FileOutput::for_house_days(dir.path().to_path_buf(), "");
        write_house_day(&output, "empty", &[]).unwrap();
        let path = output.path_for_location_key("empty").unwrap();
        assert!(read_house_day(File::open(path).unwrap()).unwrap().is_empty());
    }

    #[rstest]
    fn should_reject_foreign_columns() {
        let csv = "time,flow\n2025-01-01T00:00:00,1.0\n";
        assert!(read_house_day(csv.as_bytes()).is_err());
    }
}
