//! OSRM-backed distances against a live `osrm-routed` container.
//!
//! Needs Docker and a preprocessed (MLD) Nevada extract in `OSRM_DATA_DIR`
//! (default `osrm-data`), e.g. `nevada-latest.osrm.*`. Run with `--ignored`.

mod fixtures;

use std::env;
use std::time::{Duration, Instant};

use testcontainers::core::{IntoContainerPort, Mount};
use testcontainers::runners::SyncRunner;
use testcontainers::{Container, GenericImage, ImageExt, ReuseDirective, TestcontainersError};

use cash_planner::haversine::HaversineMatrix;
use cash_planner::osrm::{OsrmClient, OsrmConfig};
use cash_planner::traits::DistanceMatrixProvider;
use cash_planner::{PlanNotice, Planner, PlannerConfig, Strategy, TimeBudget};

use fixtures::{ATMS, VAULTS, henderson_forecast, henderson_snapshot};

fn osrm_container() -> Result<(Container<GenericImage>, String), TestcontainersError> {
    let data_dir = env::var("OSRM_DATA_DIR").unwrap_or_else(|_| "osrm-data".to_string());
    let data_dir = std::fs::canonicalize(&data_dir)
        .map_err(|err| TestcontainersError::other(format!("OSRM data dir {data_dir}: {err}")))?;

    let image = GenericImage::new("osrm/osrm-backend", "latest")
        .with_exposed_port(5000.tcp())
        .with_mount(Mount::bind_mount(data_dir.to_string_lossy().to_string(), "/data"))
        .with_cmd(vec!["osrm-routed", "--algorithm", "mld", "/data/nevada-latest.osrm"])
        .with_container_name("cash-planner-osrm-nevada")
        .with_startup_timeout(Duration::from_secs(30))
        .with_reuse(ReuseDirective::Always);

    let container = image.start()?;
    let port = container.get_host_port_ipv4(5000.tcp())?;
    Ok((container, format!("http://127.0.0.1:{port}")))
}

/// Poll until the server answers with a full matrix or 15 seconds pass.
fn wait_for_matrix(client: &OsrmClient, locations: &[(f64, f64)]) -> Vec<Vec<f64>> {
    let start = Instant::now();
    let mut last = Vec::new();
    while start.elapsed() < Duration::from_secs(15) {
        last = client.matrix_for(locations);
        if last.len() == locations.len() {
            break;
        }
        std::thread::sleep(Duration::from_millis(500));
    }
    last
}

#[test]
#[ignore = "needs Docker and a preprocessed OSRM extract"]
fn osrm_table_returns_road_kilometres() {
    let (_container, base_url) = osrm_container().expect("start OSRM container");
    let client = OsrmClient::new(OsrmConfig {
        base_url,
        ..OsrmConfig::default()
    })
    .expect("build OSRM client");

    let locations: Vec<(f64, f64)> = VAULTS.iter().chain(ATMS).map(|site| site.coords()).collect();
    let matrix = wait_for_matrix(&client, &locations);
    assert_eq!(matrix.len(), locations.len());

    for (i, row) in matrix.iter().enumerate() {
        assert_eq!(row.len(), locations.len());
        assert_eq!(row[i], 0.0);
        for (j, km) in row.iter().enumerate() {
            // Roads are never shorter than the great circle (allow for snapping).
            let straight = HaversineMatrix::haversine_km(locations[i], locations[j]);
            assert!(*km + 0.5 >= straight, "{i}->{j}: road {km} km < straight {straight} km");
        }
    }
}

#[test]
#[ignore = "needs Docker and a preprocessed OSRM extract"]
fn planner_runs_on_road_distances() {
    let (_container, base_url) = osrm_container().expect("start OSRM container");
    let client = OsrmClient::new(OsrmConfig {
        base_url,
        ..OsrmConfig::default()
    })
    .expect("build OSRM client");
    let locations: Vec<(f64, f64)> = VAULTS.iter().chain(ATMS).map(|site| site.coords()).collect();
    wait_for_matrix(&client, &locations);

    let planner = Planner::with_provider(PlannerConfig::default(), client);
    let snapshot = henderson_snapshot(150_000, 60_000);
    let plan = planner
        .plan_allocation(&snapshot, &henderson_forecast(20_000.0), Strategy::LinearCost, &TimeBudget::unbounded())
        .expect("allocation");
    assert!(
        !plan
            .notices
            .iter()
            .any(|notice| matches!(notice, PlanNotice::DistanceFallback { .. }))
    );

    let routes = planner
        .plan_routes(&plan, &snapshot, &TimeBudget::unbounded())
        .expect("routes");
    routes.verify(&plan, &snapshot).expect("route invariants");
    assert!(routes.total_distance_km > 0.0);
}
