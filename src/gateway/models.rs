use std::fmt;

use serde::{Deserialize, Serialize};

/// Model selected when a session starts.
pub const DEFAULT_MODEL_ID: &str = "random_forest_k2";

// ---------------------------------------------------------------------------
// Model catalogue entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub metrics: ModelMetrics,
}

fn descriptor(id: &str, name: &str, description: &str, p: f64, r: f64, f1: f64) -> ModelDescriptor {
    ModelDescriptor {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        metrics: ModelMetrics {
            precision: p,
            recall: r,
            f1,
        },
    }
}

/// Built-in list used whenever the service cannot be asked.
pub fn fallback_models() -> Vec<ModelDescriptor> {
    vec![
        descriptor(
            "random_forest_k2",
            "Random Forest (K2)",
            "Random Forest classifier trained on K2 mission data with SMOTE",
            0.91,
            0.88,
            0.89,
        ),
        descriptor(
            "mlp_k2",
            "Neural Network (K2)",
            "Multi-layer Perceptron trained on K2 mission data",
            0.87,
            0.85,
            0.86,
        ),
        descriptor(
            "random_forest_tess",
            "Random Forest (TESS)",
            "Random Forest classifier trained on TESS mission data with SMOTE",
            0.89,
            0.86,
            0.87,
        ),
        descriptor(
            "mlp_tess",
            "Neural Network (TESS)",
            "Multi-layer Perceptron trained on TESS mission data",
            0.85,
            0.83,
            0.84,
        ),
    ]
}

// ---------------------------------------------------------------------------
// ModelSelection – model id resolved once into structured dispatch
// ---------------------------------------------------------------------------

/// Training corpus of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetFamily {
    K2,
    Tess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    RandomForest,
    Mlp,
}

impl DatasetFamily {
    pub fn wire_name(self) -> &'static str {
        match self {
            DatasetFamily::K2 => "k2",
            DatasetFamily::Tess => "tess",
        }
    }
}

impl ModelVariant {
    pub fn wire_name(self) -> &'static str {
        match self {
            ModelVariant::RandomForest => "random_forest",
            ModelVariant::Mlp => "mlp",
        }
    }
}

/// A model id plus the `{family, variant}` it dispatches to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ModelSelection {
    pub id: String,
    pub family: DatasetFamily,
    pub variant: ModelVariant,
}

impl ModelSelection {
    /// `mlp` anywhere in the id selects the neural variant, `tess` the TESS
    /// corpus. Everything else is a K2 random forest.
    pub fn resolve(model_id: &str) -> Self {
        let lower = model_id.to_ascii_lowercase();
        let variant = if lower.contains("mlp") {
            ModelVariant::Mlp
        } else {
            ModelVariant::RandomForest
        };
        let family = if lower.contains("tess") {
            DatasetFamily::Tess
        } else {
            DatasetFamily::K2
        };
        ModelSelection {
            id: model_id.to_string(),
            family,
            variant,
        }
    }
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self::resolve(DEFAULT_MODEL_ID)
    }
}

impl fmt::Display for ModelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}/{})",
            self.id,
            self.variant.wire_name(),
            self.family.wire_name()
        )
    }
}
