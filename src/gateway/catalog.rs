//! Simulated MAST target lookup.

use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::data::model::{LightCurvePoint, ParsedDataset, ROW_LIMIT};
use crate::error::{PipelineError, Result};

const CADENCE_DAYS: f64 = 0.02;
const TRANSIT_PERIOD: f64 = 10.5;
const TRANSIT_DEPTH: f64 = 0.015;
/// Fraction of the period spent in transit, centred on phase 0.5.
const TRANSIT_WIDTH: f64 = 0.1;
const NOISE_AMPLITUDE: f64 = 0.0005;
const FLUX_ERROR: f64 = 0.0005;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetMetadata {
    pub ra: String,
    pub dec: String,
    pub mission: String,
    pub magnitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetLookup {
    pub target: String,
    pub dataset: ParsedDataset,
    pub metadata: TargetMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveLink {
    pub name: &'static str,
    pub url: String,
}

pub struct TargetCatalog {
    latency: Duration,
    rng: Mutex<StdRng>,
}

impl TargetCatalog {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    pub fn with_seed(latency: Duration, seed: u64) -> Self {
        Self {
            latency,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Resolve a `KIC` / `TIC` identifier (case-insensitive) to a synthetic
    /// light curve after the configured latency.
    pub async fn fetch_by_target_id(&self, target_id: &str) -> Result<TargetLookup> {
        tokio::time::sleep(self.latency).await;

        let mission = match mission_for(target_id) {
            Some(m) => m,
            None => return Err(PipelineError::TargetNotFound(target_id.to_string())),
        };
        let points = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            synthetic_light_curve(&mut *rng)
        };
        log::debug!("catalog: {} points for {target_id}", points.len());

        Ok(TargetLookup {
            target: target_id.to_string(),
            dataset: ParsedDataset::from_points(&points),
            metadata: TargetMetadata {
                ra: "19h 44m 59.91s".to_string(),
                dec: "+44° 16' 47.8\"".to_string(),
                mission: mission.to_string(),
                magnitude: 11.7,
            },
        })
    }
}

fn mission_for(target_id: &str) -> Option<&'static str> {
    let lower = target_id.to_ascii_lowercase();
    if lower.contains("kic") {
        Some("Kepler")
    } else if lower.contains("tic") {
        Some("TESS")
    } else {
        None
    }
}

/// Flat light curve with one box-shaped dip per period cycle.
pub fn synthetic_light_curve<R: Rng + ?Sized>(rng: &mut R) -> Vec<LightCurvePoint> {
    (0..ROW_LIMIT)
        .map(|i| {
            let time = i as f64 * CADENCE_DAYS;
            let noise = (rng.random::<f64>() - 0.5) * 2.0 * NOISE_AMPLITUDE;
            let phase = (time % TRANSIT_PERIOD) / TRANSIT_PERIOD;
            let in_transit = (phase - 0.5).abs() < TRANSIT_WIDTH / 2.0;
            let depth = if in_transit { TRANSIT_DEPTH } else { 0.0 };
            LightCurvePoint {
                time,
                flux: 1.0 + noise - depth,
                flux_error: Some(FLUX_ERROR),
            }
        })
        .collect()
}

/// External archive pages for a `KIC` or `TIC` target.
pub fn archive_links(target_id: &str) -> Vec<ArchiveLink> {
    let Some(number) = first_number(target_id) else {
        return Vec::new();
    };
    match mission_for(target_id) {
        Some("Kepler") => vec![
            ArchiveLink {
                name: "NASA Exoplanet Archive",
                url: format!(
                    "https://exoplanetarchive.ipac.caltech.edu/cgi-bin/DisplayOverview/nph-DisplayOverview?objname=KIC+{number}"
                ),
            },
            ArchiveLink {
                name: "SIMBAD",
                url: format!("https://simbad.u-strasbg.fr/simbad/sim-basic?Ident=KIC+{number}"),
            },
        ],
        Some(_) => vec![
            ArchiveLink {
                name: "ExoFOP-TESS",
                url: format!("https://exofop.ipac.caltech.edu/tess/target.php?id={number}"),
            },
            ArchiveLink {
                name: "NASA Exoplanet Archive",
                url: format!(
                    "https://exoplanetarchive.ipac.caltech.edu/cgi-bin/DisplayOverview/nph-DisplayOverview?objname=TIC+{number}"
                ),
            },
        ],
        None => Vec::new(),
    }
}

fn first_number(s: &str) -> Option<&str> {
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let rest = &s[start..];
    let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    Some(&rest[..end])
}
