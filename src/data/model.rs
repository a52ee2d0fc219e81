use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Hard cap on data rows kept from any source.
pub const ROW_LIMIT: usize = 1000;

/// Columns that mark a table of exoplanet / host-star parameters.
pub const PARAMETER_COLUMNS: &[&str] = &[
    "pl_name",
    "hostname",
    "pl_rade",
    "pl_orbper",
    "pl_trandep",
    "pl_trandurh",
    "st_mass",
    "st_rad",
    "st_teff",
    "kepid",
    "toi",
    "tid",
];

// ---------------------------------------------------------------------------
// CellValue – a single cell of an ingested row
// ---------------------------------------------------------------------------

/// A dynamically-typed cell. Numeric-looking text is coerced to `Number`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    /// `null` coming back from the remote ingestion service.
    Empty,
}

impl CellValue {
    /// Coerce raw text: finite numbers become `Number`, everything else
    /// (including `nan` / `inf`) stays text.
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => CellValue::Number(v),
            _ => CellValue::Text(raw.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Text(s) => s.is_empty(),
            CellValue::Empty => true,
            CellValue::Number(_) => false,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(v) => write!(f, "{v}"),
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Empty => Ok(()),
        }
    }
}

/// One CSV data line keyed by header name.
pub type RawRow = BTreeMap<String, CellValue>;

// ---------------------------------------------------------------------------
// ParsedDataset
// ---------------------------------------------------------------------------

/// Which accepted schema a dataset matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetProfile {
    /// Has `time` and `flux` columns.
    #[serde(alias = "lightcurve")]
    LightCurve,
    /// Has at least one column from [`PARAMETER_COLUMNS`].
    #[serde(alias = "exoplanet_parameters")]
    ParameterTable,
}

impl DatasetProfile {
    /// Resolve the profile for a header set, light curves taking precedence.
    /// Returns the missing light-curve columns when neither profile matches.
    pub fn detect(headers: &[String]) -> Result<Self, Vec<String>> {
        let has = |name: &str| headers.iter().any(|h| h == name);

        let missing: Vec<String> = ["time", "flux"]
            .into_iter()
            .filter(|c| !has(*c))
            .map(|c| c.to_string())
            .collect();
        if missing.is_empty() {
            return Ok(DatasetProfile::LightCurve);
        }
        if PARAMETER_COLUMNS.iter().copied().any(has) {
            return Ok(DatasetProfile::ParameterTable);
        }
        Err(missing)
    }
}

/// A validated, row-capped table. Replaced wholesale on each ingestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedDataset {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
    pub profile: DatasetProfile,
    /// Cap applied at construction; rows past it were dropped.
    #[serde(rename = "rowCountLimit")]
    pub row_count_limit: usize,
}

impl ParsedDataset {
    /// Build a dataset, padding every row with empty values for absent
    /// headers and truncating to [`ROW_LIMIT`].
    pub fn new(headers: Vec<String>, mut rows: Vec<RawRow>, profile: DatasetProfile) -> Self {
        rows.truncate(ROW_LIMIT);
        for row in &mut rows {
            for h in &headers {
                row.entry(h.clone())
                    .or_insert_with(|| CellValue::Text(String::new()));
            }
        }
        ParsedDataset {
            headers,
            rows,
            profile,
            row_count_limit: ROW_LIMIT,
        }
    }

    /// Build a light-curve dataset from points (`time,flux,flux_err`).
    pub fn from_points(points: &[LightCurvePoint]) -> Self {
        let headers = vec!["time".to_string(), "flux".to_string(), "flux_err".to_string()];
        let rows = points
            .iter()
            .map(|p| {
                let mut row = RawRow::new();
                row.insert("time".into(), CellValue::Number(p.time));
                row.insert("flux".into(), CellValue::Number(p.flux));
                row.insert(
                    "flux_err".into(),
                    p.flux_error
                        .map(CellValue::Number)
                        .unwrap_or_else(|| CellValue::Text(String::new())),
                );
                row
            })
            .collect();
        ParsedDataset::new(headers, rows, DatasetProfile::LightCurve)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First `n` rows for tabular preview.
    pub fn preview(&self, n: usize) -> &[RawRow] {
        &self.rows[..n.min(self.rows.len())]
    }

    /// Extract the time series. Rows whose `time` or `flux` is not numeric
    /// are skipped; parameter tables yield an empty series.
    pub fn light_curve_points(&self) -> Vec<LightCurvePoint> {
        self.rows
            .iter()
            .filter_map(|row| {
                let time = row.get("time")?.as_f64()?;
                let flux = row.get("flux")?.as_f64()?;
                let flux_error = row.get("flux_err").and_then(CellValue::as_f64);
                Some(LightCurvePoint {
                    time,
                    flux,
                    flux_error,
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightCurvePoint {
    pub time: f64,
    pub flux: f64,
    #[serde(rename = "flux_err", default, skip_serializing_if = "Option::is_none")]
    pub flux_error: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeFlux {
    pub time: f64,
    pub flux: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodPower {
    pub period: f64,
    pub power: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseFlux {
    pub phase: f64,
    pub flux: f64,
}

/// Chart series derived from one classification run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedSignals {
    pub raw: Vec<LightCurvePoint>,
    pub detrended: Vec<TimeFlux>,
    pub periodogram: Vec<PeriodPower>,
    /// Sorted ascending by phase.
    pub phase_folded: Vec<PhaseFlux>,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Prediction {
    #[serde(alias = "CONFIRMED")]
    Confirmed,
    #[serde(alias = "CANDIDATE")]
    Candidate,
    #[serde(rename = "Not a Planet", alias = "NotPlanet", alias = "FALSE POSITIVE")]
    NotPlanet,
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prediction::Confirmed => write!(f, "Confirmed"),
            Prediction::Candidate => write!(f, "Candidate"),
            Prediction::NotPlanet => write!(f, "Not a Planet"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Probabilities {
    pub confirmed: f64,
    pub candidate: f64,
    pub not_planet: f64,
}

impl Probabilities {
    pub fn sum(&self) -> f64 {
        self.confirmed + self.candidate + self.not_planet
    }

    /// Class with the highest probability. Ties resolve in the order
    /// confirmed, candidate, not-a-planet.
    pub fn argmax(&self) -> (Prediction, f64) {
        let mut best = (Prediction::Confirmed, self.confirmed);
        if self.candidate > best.1 {
            best = (Prediction::Candidate, self.candidate);
        }
        if self.not_planet > best.1 {
            best = (Prediction::NotPlanet, self.not_planet);
        }
        best
    }

    /// Rescale so the three classes sum to one. `None` when any value is
    /// negative or non-finite, or when all are zero.
    pub fn normalized(&self) -> Option<Self> {
        let values = [self.confirmed, self.candidate, self.not_planet];
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return None;
        }
        let total = self.sum();
        if total <= 0.0 {
            return None;
        }
        Some(Probabilities {
            confirmed: self.confirmed / total,
            candidate: self.candidate / total,
            not_planet: self.not_planet / total,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Explainability {
    #[serde(default)]
    pub feature_importance: Vec<FeatureImportance>,
    #[serde(default)]
    pub rationale: Vec<String>,
}

/// Classifier verdict. `prediction` is always the argmax of
/// `probabilities` and `confidence` its value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub prediction: Prediction,
    pub confidence: f64,
    pub probabilities: Probabilities,
    pub explainability: Explainability,
}

impl ClassificationResult {
    /// Derive prediction and confidence from normalised probabilities.
    pub fn from_probabilities(
        probabilities: Probabilities,
        explainability: Explainability,
    ) -> Option<Self> {
        let probabilities = probabilities.normalized()?;
        let (prediction, confidence) = probabilities.argmax();
        Some(ClassificationResult {
            prediction,
            confidence,
            probabilities,
            explainability,
        })
    }
}
