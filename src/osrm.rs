//! OSRM HTTP adapter for road distances.

use serde::Deserialize;
use tracing::warn;

use crate::traits::DistanceMatrixProvider;

#[derive(Debug, Clone)]
pub struct OsrmConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout_secs: u64,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "car".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Road-network distances from an OSRM `table` service.
///
/// Failures yield an empty matrix, which the planner replaces with haversine distances.
#[derive(Debug, Clone)]
pub struct OsrmClient {
    config: OsrmConfig,
    client: reqwest::blocking::Client,
}

impl OsrmClient {
    pub fn new(config: OsrmConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn table_url(&self, locations: &[(f64, f64)]) -> String {
        let coords = locations
            .iter()
            .map(|(lat, lng)| format!("{:.6},{:.6}", lng, lat))
            .collect::<Vec<_>>()
            .join(";");

        format!(
            "{}/table/v1/{}/{}?annotations=distance",
            self.config.base_url.trim_end_matches('/'),
            self.config.profile,
            coords
        )
    }
}

impl DistanceMatrixProvider for OsrmClient {
    fn matrix_for(&self, locations: &[(f64, f64)]) -> Vec<Vec<f64>> {
        if locations.is_empty() {
            return Vec::new();
        }

        let response = self
            .client
            .get(self.table_url(locations))
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.json::<OsrmTableResponse>());

        match response {
            Ok(body) => body.into_km(),
            Err(err) => {
                warn!(error = %err, "OSRM table request failed");
                Vec::new()
            }
        }
    }

    fn name(&self) -> &str {
        "osrm"
    }
}

#[derive(Debug, Deserialize)]
struct OsrmTableResponse {
    /// Metres; `null` entries mark unroutable pairs.
    distances: Option<Vec<Vec<Option<f64>>>>,
}

impl OsrmTableResponse {
    /// Convert to kilometres. Any unroutable pair poisons the matrix so the caller falls back.
    fn into_km(self) -> Vec<Vec<f64>> {
        let Some(rows) = self.distances else {
            return Vec::new();
        };
        let mut km = Vec::with_capacity(rows.len());
        for row in rows {
            let mut converted = Vec::with_capacity(row.len());
            for value in row {
                match value {
                    Some(metres) => converted.push(metres / 1000.0),
                    None => return Vec::new(),
                }
            }
            km.push(converted);
        }
        km
    }
}
