//! Bulk loading of consolidated sensor data into Postgres.

use anyhow::Context;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS sensor_readings (
    timestamp TIMESTAMP NOT NULL,
    house_id INTEGER NOT NULL,
    flow_m3s DOUBLE PRECISION,
    flow_gpm DOUBLE PRECISION,
    velocity_ms DOUBLE PRECISION,
    totalizer_m3 DOUBLE PRECISION NOT NULL,
    pressure_kpa DOUBLE PRECISION,
    upstream_transit_s DOUBLE PRECISION,
    downstream_transit_s DOUBLE PRECISION,
    delta_t_s DOUBLE PRECISION,
    incidence_angle_deg DOUBLE PRECISION NOT NULL,
    pipe_diameter_mm DOUBLE PRECISION NOT NULL,
    pipe_material TEXT NOT NULL,
    reflection_count INTEGER NOT NULL,
    leak BOOLEAN NOT NULL,
    leak_location TEXT NOT NULL
)";

const COPY_STATEMENT: &str = "COPY sensor_readings FROM STDIN (FORMAT csv, HEADER true)";

/// Connection settings from `DATABASE_URL` when set, otherwise from the libpq `PG*`
/// variables.
pub fn connect_options() -> anyhow::Result<PgConnectOptions> {
    match std::env::var("DATABASE_URL") {
        Ok(url) => PgConnectOptions::from_str(&url).context("invalid DATABASE_URL"),
        Err(_) => Ok(PgConnectOptions::new()),
    }
}

/// Load each file with a single COPY, so a failed file leaves no rows behind. Returns the
/// number of rows loaded.
pub fn load_files(files: &[&Path]) -> anyhow::Result<u64> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let mut connection = PgConnection::connect_with(&connect_options()?)
            .await
            .context("could not connect to the database")?;
        sqlx::query(CREATE_TABLE).execute(&mut connection).await?;

        let mut rows = 0;
        for path in files {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("could not open {}", path.display()))?;
            let mut copy = connection.copy_in_raw(COPY_STATEMENT).await?;
            let sent = copy.read_from(file).await.map(|_| ());
            if let Err(e) = sent {
                warn!("aborting load of {}: {e}", path.display());
                copy.abort(e.to_string()).await?;
                return Err(e.into());
            }
            let loaded = copy.finish().await?;
            info!("loaded {loaded} rows from {}", path.display());
            rows += loaded;
        }
        connection.close().await?;
        Ok(rows)
    })
}
