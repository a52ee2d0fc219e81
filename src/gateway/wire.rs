//! JSON bodies exchanged with the classification service.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::model::{
    DatasetProfile, Explainability, LightCurvePoint, PeriodPower, PhaseFlux, Probabilities,
    RawRow, TimeFlux,
};

#[derive(Debug, Serialize)]
pub struct ClassifyRequest<'a> {
    pub data: &'a [RawRow],
    pub model_type: &'static str,
    pub dataset: &'static str,
    pub threshold: f64,
}

/// Chart series as returned by the service; any may be missing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCharts {
    pub raw: Option<Vec<LightCurvePoint>>,
    pub detrended: Option<Vec<TimeFlux>>,
    pub periodogram: Option<Vec<PeriodPower>>,
    pub phase_folded: Option<Vec<PhaseFlux>>,
}

#[derive(Debug, Deserialize)]
pub struct ClassifyResponse {
    /// Kept as text; the verdict is re-derived from `probabilities`.
    #[serde(default)]
    pub prediction: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    pub probabilities: Probabilities,
    #[serde(default)]
    pub explainability: Explainability,
    #[serde(default)]
    pub charts: Option<WireCharts>,
}

/// FastAPI-style error body.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    pub headers: Vec<String>,
    pub data: Vec<RawRow>,
    #[serde(rename = "dataType")]
    pub data_type: DatasetProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    #[serde(default)]
    pub models_loaded: BTreeMap<String, bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::CellValue;

    #[test]
    fn response_without_charts() {
        let json = r#"{
            "prediction": "Not a Planet",
            "confidence": 0.8,
            "probabilities": {"confirmed": 0.2, "candidate": 0.0, "notPlanet": 0.8},
            "explainability": {"featureImportance": [{"feature": "koi_depth", "importance": 0.3}],
                               "rationale": ["May be stellar activity"]}
        }"#;
        let resp: ClassifyResponse = serde_json::from_str(json).unwrap();
        assert!(resp.charts.is_none());
        assert_eq!(resp.probabilities.not_planet, 0.8);
        assert_eq!(resp.explainability.feature_importance[0].feature, "koi_depth");
    }

    #[test]
    fn empty_chart_object_has_no_series() {
        let json = r#"{"probabilities": {"confirmed": 1, "candidate": 0, "notPlanet": 0},
                       "charts": {}}"#;
        let resp: ClassifyResponse = serde_json::from_str(json).unwrap();
        let charts = resp.charts.unwrap();
        assert!(charts.raw.is_none() && charts.phase_folded.is_none());
    }

    #[test]
    fn request_uses_service_field_names() {
        let mut row = RawRow::new();
        row.insert("time".into(), CellValue::Number(1.0));
        let rows = vec![row];
        let req = ClassifyRequest {
            data: &rows,
            model_type: "mlp",
            dataset: "tess",
            threshold: 0.5,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["model_type"], "mlp");
        assert_eq!(v["dataset"], "tess");
        assert_eq!(v["data"][0]["time"], 1.0);
    }

    #[test]
    fn upload_response_with_nulls() {
        let json = r#"{"success": true, "headers": ["pl_name", "st_teff"],
            "data": [{"pl_name": "K2-18 b", "st_teff": null}],
            "rows": 1, "dataType": "exoplanet_parameters"}"#;
        let resp: UploadResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.data_type, DatasetProfile::ParameterTable);
        assert!(resp.data[0]["st_teff"].is_empty());
    }
}
