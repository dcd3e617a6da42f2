//! Merging per-house files into one dataset file for the cohort run.

use crate::errors::ConsolidationError;
use crate::output::{SensorReading, SENSOR_READING_COLUMNS};
use chrono::NaiveDateTime;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConsolidationSummary {
    pub path: PathBuf,
    pub files: usize,
    pub rows_written: usize,
    pub duplicates_dropped: usize,
}

pub fn consolidated_path(directory: &Path, prefix: &str) -> PathBuf {
    directory.join(format!("{prefix}consolidated.csv"))
}

/// Per-house files in `directory` written with `prefix`, in name order.
pub fn house_day_files(directory: &Path, prefix: &str) -> Result<Vec<PathBuf>, ConsolidationError> {
    let stem = format!("{prefix}house_");
    let mut files = vec![];
    for entry in WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy();
        if entry.file_type().is_file() && name.starts_with(&stem) && name.ends_with(".csv") {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// House id encoded in a per-house file name, `{prefix}house_{id}_{day}.csv`.
fn file_house_id(file: &Path, prefix: &str) -> Option<u32> {
    let name = file.file_name()?.to_str()?;
    let rest = name.strip_prefix(prefix)?.strip_prefix("house_")?;
    rest.split(['_', '.']).next()?.parse().ok()
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ConsolidationError {
    let path = path.to_path_buf();
    move |source| ConsolidationError::Io { path, source }
}

fn csv_error(path: &Path) -> impl FnOnce(csv::Error) -> ConsolidationError {
    let path = path.to_path_buf();
    move |source| ConsolidationError::Csv { path, source }
}

type ReadingKey = (u32, NaiveDateTime);

/// Stream every per-house file into `{prefix}consolidated.csv`, dropping repeated
/// `(house_id, timestamp)` rows after the first, then delete the per-house files. Rows already
/// in an existing consolidated file come first. On any failure the per-house files are left
/// in place and no staging file remains.
///
/// Duplicates are looked for within each house's group of files and against the existing
/// rows of that house, so memory grows with the largest house rather than the cohort.
pub fn consolidate(
    directory: &Path,
    prefix: &str,
) -> Result<ConsolidationSummary, ConsolidationError> {
    let files = house_day_files(directory, prefix)?;
    let path = consolidated_path(directory, prefix);
    let staging = path.with_extension("csv.partial");

    let written = write_staging(&staging, &path, &files, prefix).and_then(|summary| {
        fs::rename(&staging, &path).map_err(io_error(&path))?;
        Ok(summary)
    });
    let mut summary = match written {
        Ok(summary) => summary,
        Err(e) => {
            if let Err(cleanup) = fs::remove_file(&staging) {
                debug!("no staging file removed at {}: {cleanup}", staging.display());
            }
            return Err(e);
        }
    };
    summary.path = path.clone();

    for file in &files {
        fs::remove_file(file).map_err(io_error(file))?;
    }
    info!(
        "consolidated {} files into {} ({} rows, {} duplicates dropped)",
        summary.files,
        path.display(),
        summary.rows_written,
        summary.duplicates_dropped
    );
    Ok(summary)
}

fn write_staging(
    staging: &Path,
    existing: &Path,
    files: &[PathBuf],
    prefix: &str,
) -> Result<ConsolidationSummary, ConsolidationError> {
    let mut summary = ConsolidationSummary {
        files: files.len(),
        ..Default::default()
    };
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(BufWriter::new(
            File::create(staging).map_err(io_error(staging))?,
        ));
    writer
        .write_record(SENSOR_READING_COLUMNS)
        .map_err(csv_error(staging))?;

    // keys already consolidated for the houses about to be appended
    let incoming = files
        .iter()
        .filter_map(|file| file_house_id(file, prefix))
        .collect::<HashSet<_>>();
    let mut previous: HashMap<u32, HashSet<ReadingKey>> = HashMap::new();
    if existing.exists() {
        let mut reader = csv::Reader::from_path(existing).map_err(csv_error(existing))?;
        for record in reader.deserialize::<SensorReading>() {
            let reading = record.map_err(csv_error(existing))?;
            if incoming.contains(&reading.house_id) {
                previous
                    .entry(reading.house_id)
                    .or_default()
                    .insert((reading.house_id, reading.timestamp));
            }
            writer.serialize(&reading).map_err(csv_error(staging))?;
            summary.rows_written += 1;
        }
        debug!("carried over {}", existing.display());
    }

    let mut group = None;
    let mut seen: HashSet<ReadingKey> = HashSet::new();
    for file in files {
        let house = file_house_id(file, prefix);
        if house != group {
            group = house;
            seen = house
                .and_then(|id| previous.remove(&id))
                .unwrap_or_default();
        }
        let mut reader = csv::Reader::from_path(file).map_err(csv_error(file))?;
        for record in reader.deserialize::<SensorReading>() {
            let reading = record.map_err(csv_error(file))?;
            if seen.insert((reading.house_id, reading.timestamp)) {
                writer.serialize(&reading).map_err(csv_error(staging))?;
                summary.rows_written += 1;
            } else {
                summary.duplicates_dropped += 1;
            }
        }
        debug!("consolidated {}", file.display());
    }
    writer.flush().map_err(io_error(staging))?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::material_properties::PipeMaterial;
    use crate::output::{read_house_day, write_house_day, FileOutput};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rstest::*;

    fn reading(house_id: u32, minute: i64, flow: f64) -> SensorReading {
        SensorReading {
            timestamp: NaiveDate::from_ymd_opt(2025, 4, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                + chrono::Duration::minutes(minute),
            house_id,
            flow_m3s: Some(flow),
            flow_gpm: Some(flow * 15_850.),
            velocity_ms: Some(0.1),
            totalizer_m3: 0.,
            pressure_kpa: Some(340.),
            upstream_transit_s: None,
            downstream_transit_s: None,
            delta_t_s: None,
            incidence_angle_deg: 60.,
            pipe_diameter_mm: 19.,
            pipe_material: PipeMaterial::Pex,
            reflection_count: 3,
            leak: false,
            leak_location: String::new(),
        }
    }

    #[rstest]
    fn should_merge_and_drop_duplicates_keeping_first() {
        let dir = tempfile::tempdir().unwrap();
        let output = FileOutput::for_house_days(dir.path().to_path_buf(), "run_");
        write_house_day(
            &output,
            "house_00001_2025-04-01",
            &[reading(1, 0, 1.), reading(1, 1, 2.)],
        )
        .unwrap();
        write_house_day(
            &output,
            "house_00001_2025-04-01b",
            &[reading(1, 1, 99.), reading(1, 2, 3.)],
        )
        .unwrap();
        write_house_day(&output, "house_00002_2025-04-01", &[reading(2, 0, 4.)]).unwrap();
        // a file from another run is left alone
        write_house_day(
            &FileOutput::for_house_days(dir.path().to_path_buf(), "other_"),
            "house_00009_2025-04-01",
            &[reading(9, 0, 1.)],
        )
        .unwrap();

        let summary = consolidate(dir.path(), "run_").unwrap();

        assert_eq!(summary.files, 3);
        assert_eq!(summary.rows_written, 4);
        assert_eq!(summary.duplicates_dropped, 1);
        let rows = read_house_day(File::open(&summary.path).unwrap()).unwrap();
        let flows = rows.iter().map(|r| r.flow_m3s.unwrap()).collect::<Vec<_>>();
        assert_eq!(flows, [1., 2., 3., 4.]);
        assert!(house_day_files(dir.path(), "run_").unwrap().is_empty());
        assert_eq!(house_day_files(dir.path(), "other_").unwrap().len(), 1);
    }

    #[rstest]
    fn should_keep_house_files_when_a_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let output = FileOutput::for_house_days(dir.path().to_path_buf(), "");
        write_house_day(&output, "house_00001_2025-04-01", &[reading(1, 0, 1.)]).unwrap();
        fs::write(
            dir.path().join("house_00002_2025-04-01.csv"),
            "timestamp,house_id\nnot a time,2\n",
        )
        .unwrap();

        assert!(consolidate(dir.path(), "").is_err());
        assert_eq!(house_day_files(dir.path(), "").unwrap().len(), 2);
        assert!(!consolidated_path(dir.path(), "").exists());
        assert!(!dir.path().join("consolidated.csv.partial").exists());
    }

    #[rstest]
    fn should_write_a_readable_file_when_every_house_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let output = FileOutput::for_house_days(dir.path().to_path_buf(), "");
        write_house_day(&output, "house_00001_2025-04-01", &[]).unwrap();
        write_house_day(&output, "house_00002_2025-04-01", &[]).unwrap();

        let summary = consolidate(dir.path(), "").unwrap();

        assert_eq!(summary.files, 2);
        assert_eq!(summary.rows_written, 0);
        let rows = read_house_day(File::open(&summary.path).unwrap()).unwrap();
        assert!(rows.is_empty());
        assert!(!dir.path().join("consolidated.csv.partial").exists());
    }

    #[rstest]
    #[case("house_00042_2025-04-01.csv", "", Some(42))]
    #[case("run_house_00007_2025-04-01.csv", "run_", Some(7))]
    #[case("house_extra_2025-04-01.csv", "", None)]
    fn should_read_house_id_from_file_name(
        #[case] name: &str,
        #[case] prefix: &str,
        #[case] expected: Option<u32>,
    ) {
        assert_eq!(file_house_id(Path::new(name), prefix), expected);
    }

    #[rstest]
    fn duplicates_should_be_found_per_house() {
        let dir = tempfile::tempdir().unwrap();
        let output = FileOutput::for_house_days(dir.path().to_path_buf(), "");
        write_house_day(&output, "house_00001_2025-04-01", &[reading(1, 0, 1.)]).unwrap();
        write_house_day(&output, "house_00002_2025-04-01", &[reading(2, 0, 2.)]).unwrap();
        consolidate(dir.path(), "").unwrap();
        write_house_day(
            &output,
            "house_00002_2025-04-01",
            &[reading(2, 0, 20.), reading(2, 1, 3.)],
        )
        .unwrap();
        write_house_day(&output, "house_00003_2025-04-01", &[reading(3, 0, 4.)]).unwrap();

        let summary = consolidate(dir.path(), "").unwrap();

        assert_eq!(summary.rows_written, 4);
        assert_eq!(summary.duplicates_dropped, 1);
        let rows = read_house_day(File::open(&summary.path).unwrap()).unwrap();
        let flows = rows.iter().map(|r| r.flow_m3s.unwrap()).collect::<Vec<_>>();
        assert_eq!(flows, [1., 2., 3., 4.]);
    }

    #[rstest]
    fn should_append_to_an_existing_consolidated_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = FileOutput::for_house_days(dir.path().to_path_buf(), "");
        write_house_day(&output, "house_00001_2025-04-01", &[reading(1, 0, 1.)]).unwrap();
        consolidate(dir.path(), "").unwrap();
        write_house_day(
            &output,
            "house_00001_2025-04-02",
            &[reading(1, 0, 5.), reading(1, 1440, 6.)],
        )
        .unwrap();

        let summary = consolidate(dir.path(), "").unwrap();

        assert_eq!(summary.rows_written, 2);
        assert_eq!(summary.duplicates_dropped, 1);
    }
}
