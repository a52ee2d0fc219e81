//! Offline stand-in for the classification service.
//!
//! Draws probabilities from an injected RNG and computes the chart series
//! locally, so a session works without a backend.

use std::sync::Mutex;

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::models::{fallback_models, ModelDescriptor, ModelSelection, ModelVariant};
use super::{check_threshold, ClassificationOutcome, Classifier};
use crate::data::model::{
    ClassificationResult, Explainability, FeatureImportance, ParsedDataset, Probabilities,
};
use crate::data::transform::{add_jitter, derive_signals, SignalConfig};
use crate::error::{PipelineError, Result};

const FEATURE_IMPORTANCE: [(&str, f64); 8] = [
    ("Transit Depth", 0.34),
    ("Period", 0.28),
    ("Transit Duration", 0.21),
    ("SNR", 0.17),
    ("Odd-Even Metric", 0.15),
    ("Secondary Eclipse", 0.09),
    ("Phase Coherence", 0.07),
    ("Ingress/Egress Symmetry", 0.05),
];

const RATIONALE: [&str; 4] = [
    "High signal-to-noise ratio detected",
    "Consistent odd-even transit depth",
    "No secondary eclipse signal",
    "Period suggests habitable zone",
];

/// Periodogram jitter, relative to the strongest peak.
const JITTER_FRACTION: f64 = 0.05;

pub struct MockClassifier<R = StdRng> {
    rng: Mutex<R>,
    signals: SignalConfig,
}

impl MockClassifier<StdRng> {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }
}

impl Default for MockClassifier<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng + Send> MockClassifier<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng: Mutex::new(rng),
            signals: SignalConfig::default(),
        }
    }

    fn run(
        &self,
        dataset: &ParsedDataset,
        selection: &ModelSelection,
        threshold: f64,
    ) -> Result<ClassificationOutcome> {
        check_threshold(threshold)?;
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let r: f64 = rng.random();
        let (confirmed, candidate) = match selection.variant {
            ModelVariant::Mlp => (0.15 + r * 0.3, 0.45 + r * 0.2),
            ModelVariant::RandomForest => (0.1 + r * 0.2, 0.3 + r * 0.3),
        };
        // the neural draw can overshoot 1; the remainder floors at zero and
        // normalisation rescales the rest
        let probabilities = Probabilities {
            confirmed,
            candidate,
            not_planet: (1.0 - confirmed - candidate).max(0.0),
        };
        let result = ClassificationResult::from_probabilities(probabilities, explainability())
            .ok_or_else(|| PipelineError::Classification {
                status: None,
                message: "mock classifier produced invalid probabilities".to_string(),
            })?;

        let mut charts = derive_signals(&dataset.light_curve_points(), &self.signals)?;
        let peak = charts
            .periodogram
            .iter()
            .map(|p| p.power)
            .fold(0.0, f64::max);
        add_jitter(&mut charts.periodogram, &mut *rng, peak * JITTER_FRACTION);

        log::debug!(
            "mock classification with {selection}: {} ({:.3})",
            result.prediction,
            result.confidence
        );
        Ok(ClassificationOutcome { result, charts })
    }
}

fn explainability() -> Explainability {
    Explainability {
        feature_importance: FEATURE_IMPORTANCE
            .iter()
            .map(|&(feature, importance)| FeatureImportance {
                feature: feature.to_string(),
                importance,
            })
            .collect(),
        rationale: RATIONALE.iter().map(|s| s.to_string()).collect(),
    }
}

impl<R: Rng + Send> Classifier for MockClassifier<R> {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn classify<'a>(
        &'a self,
        dataset: &'a ParsedDataset,
        selection: &'a ModelSelection,
        threshold: f64,
    ) -> BoxFuture<'a, Result<ClassificationOutcome>> {
        future::ready(self.run(dataset, selection, threshold)).boxed()
    }

    fn list_models(&self) -> BoxFuture<'_, Vec<ModelDescriptor>> {
        future::ready(fallback_models()).boxed()
    }
}
