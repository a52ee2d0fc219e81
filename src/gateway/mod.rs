/// Everything that talks to (or stands in for) the classification service.
///
/// ```text
///   ParsedDataset + ModelSelection + threshold
///        │
///        ▼
///   ┌────────────┐  HTTP   ┌──────────────────────┐
///   │ Classifier │ ──────► │ classification API   │
///   └────────────┘         └──────────────────────┘
///        │ charts missing?
///        ▼
///   data::transform::derive_signals
/// ```
pub mod catalog;
pub mod client;
pub mod mock;
pub mod models;
pub mod wire;

#[cfg(test)]
pub(crate) mod test_server;

use futures::future::BoxFuture;

use crate::data::model::{ClassificationResult, DerivedSignals, LightCurvePoint, ParsedDataset};
use crate::data::transform::{derive_signals, SignalConfig};
use crate::error::{PipelineError, Result};
use models::{ModelDescriptor, ModelSelection};
use wire::WireCharts;

pub use catalog::TargetCatalog;
pub use client::{ClassificationGateway, RemoteIngest};
pub use mock::MockClassifier;

/// A verdict together with complete chart series.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationOutcome {
    pub result: ClassificationResult,
    pub charts: DerivedSignals,
}

/// Something that can classify a dataset and list its models.
pub trait Classifier: Send + Sync {
    fn name(&self) -> &'static str;

    fn classify<'a>(
        &'a self,
        dataset: &'a ParsedDataset,
        selection: &'a ModelSelection,
        threshold: f64,
    ) -> BoxFuture<'a, Result<ClassificationOutcome>>;

    /// Never fails; implementations fall back to a built-in list.
    fn list_models(&self) -> BoxFuture<'_, Vec<ModelDescriptor>>;
}

pub fn check_threshold(threshold: f64) -> Result<()> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(PipelineError::InvalidArgument(format!(
            "threshold must be within [0, 1], got {threshold}"
        )))
    }
}

/// Fill every series the service left out from the local transforms.
pub(crate) fn complete_charts(
    points: &[LightCurvePoint],
    charts: Option<WireCharts>,
    config: &SignalConfig,
) -> Result<DerivedSignals> {
    let WireCharts {
        raw,
        detrended,
        periodogram,
        phase_folded,
    } = charts.unwrap_or_default();

    let incomplete =
        raw.is_none() || detrended.is_none() || periodogram.is_none() || phase_folded.is_none();
    let mut local = if incomplete {
        log::debug!("synthesising missing chart series from {} points", points.len());
        derive_signals(points, config)?
    } else {
        DerivedSignals::default()
    };

    let mut phase_folded = phase_folded.unwrap_or_else(|| std::mem::take(&mut local.phase_folded));
    phase_folded.sort_by(|a, b| a.phase.total_cmp(&b.phase));

    Ok(DerivedSignals {
        raw: raw.unwrap_or_else(|| std::mem::take(&mut local.raw)),
        detrended: detrended.unwrap_or_else(|| std::mem::take(&mut local.detrended)),
        periodogram: periodogram.unwrap_or_else(|| std::mem::take(&mut local.periodogram)),
        phase_folded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{PhaseFlux, TimeFlux};

    fn points() -> Vec<LightCurvePoint> {
        (0..50)
            .map(|i| LightCurvePoint {
                time: i as f64 * 0.5,
                flux: 1.0,
                flux_error: None,
            })
            .collect()
    }

    #[test]
    fn threshold_bounds() {
        assert!(check_threshold(0.0).is_ok());
        assert!(check_threshold(1.0).is_ok());
        assert!(check_threshold(1.01).is_err());
        assert!(check_threshold(f64::NAN).is_err());
    }

    #[test]
    fn missing_charts_are_synthesised() {
        let signals = complete_charts(&points(), None, &SignalConfig::default()).unwrap();
        assert_eq!(signals.raw.len(), 50);
        assert_eq!(signals.detrended.len(), 50);
        assert_eq!(signals.periodogram.len(), 200);
        assert_eq!(signals.phase_folded.len(), 50);
    }

    #[test]
    fn server_series_are_kept_and_gaps_filled() {
        let wire = WireCharts {
            detrended: Some(vec![TimeFlux { time: 0.0, flux: 2.0 }]),
            phase_folded: Some(vec![
                PhaseFlux { phase: 0.7, flux: 1.0 },
                PhaseFlux { phase: 0.1, flux: 1.0 },
            ]),
            ..WireCharts::default()
        };
        let signals = complete_charts(&points(), Some(wire), &SignalConfig::default()).unwrap();
        assert_eq!(signals.detrended.len(), 1);
        assert_eq!(signals.raw.len(), 50);
        assert_eq!(signals.phase_folded[0].phase, 0.1);
    }
}
