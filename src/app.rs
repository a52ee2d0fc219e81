use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use crate::config::GatewayConfig;
use crate::data::loader::read_csv_file;
use crate::data::model::{ClassificationResult, ParsedDataset};
use crate::data::strategy::{FallbackIngest, IngestStrategy, LocalIngest};
use crate::error::{PipelineError, Result};
use crate::gateway::catalog::TargetMetadata;
use crate::gateway::models::{ModelDescriptor, ModelSelection};
use crate::gateway::{
    check_threshold, ClassificationGateway, Classifier, MockClassifier, RemoteIngest,
    TargetCatalog,
};
use crate::runlog::LogKind;
use crate::state::{AppState, RunRecord, SearchStatus};

/// Target label for runs on uploaded files.
const UPLOAD_TARGET: &str = "Uploaded CSV";

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Lets a caller abandon a running classification.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // the sender lives as long as `self`, so this only returns once cancelled
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Releases the processing flag however the run ends.
struct ProcessingGuard<'a> {
    state: &'a Mutex<AppState>,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        lock(self.state).set_is_processing(false);
    }
}

fn lock(state: &Mutex<AppState>) -> MutexGuard<'_, AppState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One analysis session: the state store plus the services that feed it.
///
/// Every operation records its progress in the run log. Failures go to the
/// run log as the short user message and to `log::warn!` with the full
/// diagnostic, and never touch the previous dataset or result.
pub struct App {
    state: Arc<Mutex<AppState>>,
    classifier: Box<dyn Classifier>,
    ingest: Box<dyn IngestStrategy>,
    catalog: TargetCatalog,
}

impl App {
    pub fn new(
        state: Arc<Mutex<AppState>>,
        classifier: Box<dyn Classifier>,
        ingest: Box<dyn IngestStrategy>,
        catalog: TargetCatalog,
    ) -> Self {
        Self {
            state,
            classifier,
            ingest,
            catalog,
        }
    }

    /// Wire up the remote service, or the offline mock when `config.offline`.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let catalog = TargetCatalog::new(config.catalog_latency);
        let state = Arc::new(Mutex::new(AppState::default()));
        if config.offline {
            log::info!("offline mode: using the local mock classifier");
            return Ok(Self::new(
                state,
                Box::new(MockClassifier::new()),
                Box::new(FallbackIngest::local_only()),
                catalog,
            ));
        }

        let gateway = ClassificationGateway::new(config.clone())?;
        let ingest = FallbackIngest::new(vec![
            Box::new(RemoteIngest::new(gateway.clone())),
            Box::new(LocalIngest),
        ]);
        Ok(Self::new(state, Box::new(gateway), Box::new(ingest), catalog))
    }

    pub fn state(&self) -> Arc<Mutex<AppState>> {
        Arc::clone(&self.state)
    }

    /// Read the state under its lock.
    pub fn with_state<T>(&self, f: impl FnOnce(&AppState) -> T) -> T {
        f(&lock(&self.state))
    }

    fn update<T>(&self, f: impl FnOnce(&mut AppState) -> T) -> T {
        f(&mut lock(&self.state))
    }

    fn info(&self, message: impl Into<String>) {
        self.update(|s| s.add_log(LogKind::Info, message));
    }

    fn fail(&self, context: &str, err: PipelineError) -> PipelineError {
        log::warn!("{context}: {err}");
        self.update(|s| s.add_log(LogKind::Error, err.user_message()));
        err
    }

    // ---- Ingestion ----

    /// Read and parse a `.csv` file from disk.
    pub async fn load_csv_file(&self, path: &Path) -> Result<usize> {
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if !is_csv {
            let err = PipelineError::InvalidArgument("Invalid file type. CSV required.".to_string());
            return Err(self.fail(&path.display().to_string(), err));
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.info(format!("Parsing {file_name}..."));

        let parsed = match read_csv_file(path).await {
            Ok(text) => self.ingest.ingest(&file_name, &text).await,
            Err(err) => Err(err),
        };
        self.accept_upload(&file_name, parsed)
    }

    /// Parse CSV text that is already in memory.
    pub async fn load_csv_text(&self, file_name: &str, contents: &str) -> Result<usize> {
        self.info(format!("Parsing {file_name}..."));
        let parsed = self.ingest.ingest(file_name, contents).await;
        self.accept_upload(file_name, parsed)
    }

    fn accept_upload(&self, file_name: &str, parsed: Result<ParsedDataset>) -> Result<usize> {
        match parsed {
            Ok(dataset) => {
                let rows = dataset.len();
                self.update(|s| {
                    s.set_target_id(None);
                    s.set_parsed_data(Some(dataset));
                    s.add_log(LogKind::Success, format!("Successfully parsed {rows} rows"));
                });
                Ok(rows)
            }
            Err(err) => Err(self.fail(file_name, err)),
        }
    }

    // ---- Target lookup ----

    pub async fn search_target(&self, target_id: &str) -> Result<TargetMetadata> {
        let target_id = target_id.trim();
        if target_id.is_empty() {
            self.update(|s| s.add_log(LogKind::Error, "Please enter a target ID"));
            return Err(PipelineError::InvalidArgument("empty target id".to_string()));
        }

        self.update(|s| {
            s.set_search_status(SearchStatus::Loading);
            s.add_log(LogKind::Info, format!("Querying MAST for {target_id}..."));
        });

        match self.catalog.fetch_by_target_id(target_id).await {
            Ok(lookup) => {
                self.update(|s| {
                    s.set_target_id(Some(lookup.target));
                    s.set_parsed_data(Some(lookup.dataset));
                    s.set_search_status(SearchStatus::Success);
                    s.add_log(LogKind::Success, format!("Retrieved data for {target_id}"));
                });
                Ok(lookup.metadata)
            }
            Err(err) => {
                self.update(|s| s.set_search_status(SearchStatus::Error));
                Err(self.fail(target_id, err))
            }
        }
    }

    // ---- Model controls ----

    pub async fn refresh_models(&self) -> Vec<ModelDescriptor> {
        let models = self.classifier.list_models().await;
        log::debug!("{} models available from {}", models.len(), self.classifier.name());
        self.update(|s| s.set_models(models.clone()));
        models
    }

    pub fn select_model(&self, model_id: &str) -> ModelSelection {
        let selection = ModelSelection::resolve(model_id);
        self.update(|s| {
            if !s.models().is_empty() && !s.models().iter().any(|m| m.id == model_id) {
                log::warn!("model '{model_id}' is not in the current model list");
            }
            s.set_selected_model(selection.clone());
        });
        selection
    }

    pub fn set_threshold(&self, threshold: f64) -> Result<()> {
        self.update(|s| s.set_threshold(threshold))
            .map_err(|err| self.fail("threshold", err))
    }

    // ---- Classification ----

    /// Classify the loaded dataset with the selected model.
    ///
    /// Returns `Ok(None)` when `cancel` fires first; nothing in the state
    /// changes except the processing flag and a log entry. Dropping the
    /// future behaves the same, minus the log entry.
    pub async fn run_classification(
        &self,
        cancel: &CancelHandle,
    ) -> Result<Option<ClassificationResult>> {
        let claimed = self.update(|s| {
            if s.is_processing() {
                return Err(PipelineError::ConcurrentRequestRejected);
            }
            let Some(dataset) = s.parsed_data().cloned() else {
                return Err(PipelineError::InvalidArgument(
                    "No data loaded. Please upload or search for data first.".to_string(),
                ));
            };
            check_threshold(s.threshold())?;
            s.set_is_processing(true);
            Ok((
                dataset,
                s.selected_model().clone(),
                s.threshold(),
                s.target_id().unwrap_or(UPLOAD_TARGET).to_string(),
            ))
        });
        let (dataset, selection, threshold, target) = match claimed {
            Ok(claim) => claim,
            Err(err) => return Err(self.fail("classification not started", err)),
        };
        let _guard = ProcessingGuard { state: &self.state };

        self.info(format!(
            "Running {} with threshold {threshold:.2}...",
            selection.id
        ));

        let outcome = tokio::select! {
            outcome = self.classifier.classify(&dataset, &selection, threshold) => outcome,
            _ = cancel.cancelled() => {
                self.info("Classification cancelled");
                return Ok(None);
            }
        };

        match outcome {
            Ok(outcome) => {
                let result = outcome.result;
                self.update(|s| {
                    s.set_classification_result(Some(result.clone()));
                    s.set_charts(Some(outcome.charts));
                    s.add_log(
                        LogKind::Success,
                        format!(
                            "Classification complete: {} ({:.1}% confidence)",
                            result.prediction,
                            result.confidence * 100.0
                        ),
                    );
                    s.add_recent_run(RunRecord::new(target, &result));
                });
                Ok(Some(result))
            }
            Err(err) => {
                log::warn!("classification with {selection} failed: {err}");
                self.update(|s| {
                    s.add_log(
                        LogKind::Error,
                        format!("Classification failed: {}", err.user_message()),
                    )
                });
                Err(err)
            }
        }
    }
}
