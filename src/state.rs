use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::broadcast;

use crate::data::model::{ClassificationResult, DerivedSignals, ParsedDataset, Prediction};
use crate::error::Result;
use crate::gateway::check_threshold;
use crate::gateway::models::{ModelDescriptor, ModelSelection};
use crate::runlog::{LogEntry, LogKind, RunLog};

/// Recent runs kept before the oldest are evicted.
pub const RECENT_RUN_CAPACITY: usize = 20;

const DEFAULT_THRESHOLD: f64 = 0.5;
const CHANGE_BUFFER: usize = 64;

static RUN_SEQUENCE: AtomicU64 = AtomicU64::new(0);

// ---------------------------------------------------------------------------
// Records and notifications
// ---------------------------------------------------------------------------

/// One completed classification, as shown in the run history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    pub id: String,
    pub target: String,
    pub prediction: Prediction,
    pub confidence: f64,
    /// RFC 3339, UTC.
    pub timestamp: String,
}

impl RunRecord {
    pub fn new(target: impl Into<String>, result: &ClassificationResult) -> Self {
        let now = OffsetDateTime::now_utc();
        let seq = RUN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self {
            // millis alone repeat within one millisecond
            id: format!("run-{}-{seq}", now.unix_timestamp_nanos() / 1_000_000),
            target: target.into(),
            prediction: result.prediction,
            confidence: result.confidence,
            timestamp: now.format(&Rfc3339).unwrap_or_default(),
        }
    }
}

/// Which field a setter replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    ParsedData,
    TargetId,
    SearchStatus,
    SelectedModel,
    Threshold,
    Processing,
    ClassificationResult,
    Charts,
    Models,
    Logs,
    RecentRuns,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// The full session state, independent of rendering.
///
/// Every setter replaces its field wholesale and broadcasts a
/// [`StateChange`]; there is no other way to mutate the store.
pub struct AppState {
    /// Loaded dataset (None until a file is parsed or a target fetched).
    parsed_data: Option<ParsedDataset>,

    /// Catalog id the current dataset came from; None for uploads.
    target_id: Option<String>,

    search_status: SearchStatus,

    selected_model: ModelSelection,
    threshold: f64,

    /// True while a classification is in flight.
    is_processing: bool,

    /// Last successful verdict and its chart series.
    classification_result: Option<ClassificationResult>,
    charts: Option<DerivedSignals>,

    models: Vec<ModelDescriptor>,

    logs: RunLog,
    recent_runs: VecDeque<RunRecord>,

    changes: broadcast::Sender<StateChange>,
}

impl Default for AppState {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            parsed_data: None,
            target_id: None,
            search_status: SearchStatus::Idle,
            selected_model: ModelSelection::default(),
            threshold: DEFAULT_THRESHOLD,
            is_processing: false,
            classification_result: None,
            charts: None,
            models: Vec::new(),
            logs: RunLog::default(),
            recent_runs: VecDeque::new(),
            changes,
        }
    }
}

impl AppState {
    /// Receive a [`StateChange`] after every mutation.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.changes.subscribe()
    }

    fn notify(&self, change: StateChange) {
        // no subscribers is fine
        let _ = self.changes.send(change);
    }

    // ---- Readers ----

    pub fn parsed_data(&self) -> Option<&ParsedDataset> {
        self.parsed_data.as_ref()
    }

    pub fn target_id(&self) -> Option<&str> {
        self.target_id.as_deref()
    }

    pub fn search_status(&self) -> SearchStatus {
        self.search_status
    }

    pub fn selected_model(&self) -> &ModelSelection {
        &self.selected_model
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_processing(&self) -> bool {
        self.is_processing
    }

    pub fn classification_result(&self) -> Option<&ClassificationResult> {
        self.classification_result.as_ref()
    }

    pub fn charts(&self) -> Option<&DerivedSignals> {
        self.charts.as_ref()
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn logs(&self) -> &RunLog {
        &self.logs
    }

    /// Newest first.
    pub fn recent_runs(&self) -> impl Iterator<Item = &RunRecord> {
        self.recent_runs.iter()
    }

    // ---- Setters ----

    pub fn set_parsed_data(&mut self, data: Option<ParsedDataset>) {
        self.parsed_data = data;
        self.notify(StateChange::ParsedData);
    }

    pub fn set_target_id(&mut self, id: Option<String>) {
        self.target_id = id;
        self.notify(StateChange::TargetId);
    }

    pub fn set_search_status(&mut self, status: SearchStatus) {
        self.search_status = status;
        self.notify(StateChange::SearchStatus);
    }

    pub fn set_selected_model(&mut self, selection: ModelSelection) {
        self.selected_model = selection;
        self.notify(StateChange::SelectedModel);
    }

    /// Rejects values outside `[0, 1]` and leaves the current one.
    pub fn set_threshold(&mut self, threshold: f64) -> Result<()> {
        check_threshold(threshold)?;
        self.threshold = threshold;
        self.notify(StateChange::Threshold);
        Ok(())
    }

    pub fn set_is_processing(&mut self, processing: bool) {
        self.is_processing = processing;
        self.notify(StateChange::Processing);
    }

    /// Claim the processing flag. False when it is already taken.
    pub fn try_begin_processing(&mut self) -> bool {
        if self.is_processing {
            return false;
        }
        self.set_is_processing(true);
        true
    }

    pub fn set_classification_result(&mut self, result: Option<ClassificationResult>) {
        self.classification_result = result;
        self.notify(StateChange::ClassificationResult);
    }

    pub fn set_charts(&mut self, charts: Option<DerivedSignals>) {
        self.charts = charts;
        self.notify(StateChange::Charts);
    }

    pub fn set_models(&mut self, models: Vec<ModelDescriptor>) {
        self.models = models;
        self.notify(StateChange::Models);
    }

    // ---- Appends ----

    pub fn add_log(&mut self, kind: LogKind, message: impl Into<String>) -> LogEntry {
        let entry = self.logs.push(kind, message).clone();
        self.notify(StateChange::Logs);
        entry
    }

    pub fn clear_logs(&mut self) {
        self.logs.clear();
        self.notify(StateChange::Logs);
    }

    pub fn add_recent_run(&mut self, run: RunRecord) {
        self.recent_runs.push_front(run);
        self.recent_runs.truncate(RECENT_RUN_CAPACITY);
        self.notify(StateChange::RecentRuns);
    }
}
