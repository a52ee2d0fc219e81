use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;

use super::models::{fallback_models, ModelDescriptor, ModelSelection};
use super::wire::{ClassifyRequest, ClassifyResponse, ErrorBody, ServiceHealth, UploadResponse};
use super::{check_threshold, complete_charts, ClassificationOutcome, Classifier};
use crate::config::GatewayConfig;
use crate::data::loader;
use crate::data::model::{ClassificationResult, ParsedDataset};
use crate::data::strategy::IngestStrategy;
use crate::data::transform::SignalConfig;
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// HTTP gateway to the classification service
// ---------------------------------------------------------------------------

/// Client for the remote classification API.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct ClassificationGateway {
    config: GatewayConfig,
    client: reqwest::Client,
    signals: SignalConfig,
}

impl ClassificationGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.metadata_timeout)
            .build()?;
        Ok(Self {
            config,
            client,
            signals: SignalConfig::default(),
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Classify `dataset` with one request, bounded by the classification
    /// timeout. Chart series the service omits are computed locally.
    ///
    /// Dropping the returned future aborts the outstanding request.
    pub async fn classify(
        &self,
        dataset: &ParsedDataset,
        selection: &ModelSelection,
        threshold: f64,
    ) -> Result<ClassificationOutcome> {
        check_threshold(threshold)?;
        let request = ClassifyRequest {
            data: &dataset.rows,
            model_type: selection.variant.wire_name(),
            dataset: selection.family.wire_name(),
            threshold,
        };
        let url = self.config.endpoint("classify");
        let timeout = self.config.classify_timeout;
        log::info!(
            "POST {url}: {} rows, model {selection}, threshold {threshold:.2}",
            dataset.len()
        );

        let call = async {
            let response = self
                .client
                .post(&url)
                .json(&request)
                .timeout(timeout)
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(rejection(status, &body));
            }
            Ok::<_, PipelineError>(response.json::<ClassifyResponse>().await?)
        };
        let body = tokio::time::timeout(timeout, call).await.map_err(|_| {
            PipelineError::unavailable(format!("no response within {}s", timeout.as_secs_f64()))
        })??;

        let result = into_result(&body)?;
        let charts = complete_charts(&dataset.light_curve_points(), body.charts, &self.signals)?;
        Ok(ClassificationOutcome { result, charts })
    }

    /// Models offered by the service, or the built-in list when it cannot be
    /// reached or answers with nothing usable.
    pub async fn list_models(&self) -> Vec<ModelDescriptor> {
        let url = self.config.endpoint("models");
        let fetched = async {
            let response = self
                .client
                .get(&url)
                .timeout(self.config.metadata_timeout)
                .send()
                .await?
                .error_for_status()?;
            Ok::<_, reqwest::Error>(response.json::<Vec<ModelDescriptor>>().await?)
        }
        .await;

        match fetched {
            Ok(models) if !models.is_empty() => models,
            Ok(_) => {
                log::warn!("{url} returned no models, using built-in list");
                fallback_models()
            }
            Err(err) => {
                log::warn!("failed to fetch models from {url}, using built-in list: {err}");
                fallback_models()
            }
        }
    }

    pub async fn health(&self) -> Result<ServiceHealth> {
        let response = self
            .client
            .get(self.config.endpoint("health"))
            .timeout(self.config.metadata_timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::unavailable(format!("health check returned {status}")));
        }
        Ok(response.json().await?)
    }

    /// Let the service parse an uploaded CSV file.
    pub async fn upload(&self, file_name: &str, contents: &str) -> Result<ParsedDataset> {
        let part = Part::text(contents.to_string())
            .file_name(file_name.to_string())
            .mime_str("text/csv")?;
        let response = self
            .client
            .post(self.config.endpoint("upload"))
            .multipart(Form::new().part("file", part))
            .timeout(self.config.metadata_timeout)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = error_detail(&body)
                .unwrap_or_else(|| format!("upload rejected with status {}", status.as_u16()));
            if status.is_server_error() {
                return Err(PipelineError::unavailable(detail));
            }
            // 4xx: local detection decides the schema.
            log::warn!("upload of {file_name} rejected ({}): {detail}", status.as_u16());
            return loader::ingest(contents);
        }
        let body: UploadResponse = response
            .json()
            .await
            .map_err(|err| PipelineError::format(None, format!("unreadable upload response: {err}")))?;
        Ok(ParsedDataset::new(body.headers, body.data, body.data_type))
    }
}

fn error_detail(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.detail)
        .filter(|d| !d.trim().is_empty())
}

fn rejection(status: StatusCode, body: &str) -> PipelineError {
    let message = error_detail(body)
        .unwrap_or_else(|| format!("Classification failed with status {}", status.as_u16()));
    PipelineError::Classification {
        status: Some(status.as_u16()),
        message,
    }
}

fn into_result(body: &ClassifyResponse) -> Result<ClassificationResult> {
    let result =
        ClassificationResult::from_probabilities(body.probabilities, body.explainability.clone())
            .ok_or_else(|| PipelineError::Classification {
                status: None,
                message: "Classification service returned invalid probabilities".to_string(),
            })?;

    if let Some(reported) = &body.prediction {
        if *reported != result.prediction.to_string() {
            log::warn!(
                "service reported '{reported}' but probabilities favour '{}'",
                result.prediction
            );
        }
    }
    if let Some(confidence) = body.confidence {
        if (confidence - result.confidence).abs() > 1e-6 {
            log::debug!(
                "service confidence {confidence} adjusted to {}",
                result.confidence
            );
        }
    }
    Ok(result)
}

impl Classifier for ClassificationGateway {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn classify<'a>(
        &'a self,
        dataset: &'a ParsedDataset,
        selection: &'a ModelSelection,
        threshold: f64,
    ) -> BoxFuture<'a, Result<ClassificationOutcome>> {
        ClassificationGateway::classify(self, dataset, selection, threshold).boxed()
    }

    fn list_models(&self) -> BoxFuture<'_, Vec<ModelDescriptor>> {
        ClassificationGateway::list_models(self).boxed()
    }
}

// ---------------------------------------------------------------------------
// Remote ingestion strategy
// ---------------------------------------------------------------------------

/// Parses uploads on the service via `POST /upload`.
#[derive(Clone)]
pub struct RemoteIngest {
    gateway: ClassificationGateway,
}

impl RemoteIngest {
    pub fn new(gateway: ClassificationGateway) -> Self {
        Self { gateway }
    }
}

impl IngestStrategy for RemoteIngest {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn ingest<'a>(
        &'a self,
        file_name: &'a str,
        contents: &'a str,
    ) -> BoxFuture<'a, Result<ParsedDataset>> {
        self.gateway.upload(file_name, contents).boxed()
    }
}
