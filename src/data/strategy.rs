use futures::future::BoxFuture;
use futures::FutureExt;

use super::loader;
use super::model::ParsedDataset;
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Ingestion strategies
// ---------------------------------------------------------------------------

/// One way of turning uploaded CSV text into a [`ParsedDataset`].
pub trait IngestStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn ingest<'a>(
        &'a self,
        file_name: &'a str,
        contents: &'a str,
    ) -> BoxFuture<'a, Result<ParsedDataset>>;
}

/// In-process parsing with [`loader::ingest`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalIngest;

impl IngestStrategy for LocalIngest {
    fn name(&self) -> &'static str {
        "local"
    }

    fn ingest<'a>(
        &'a self,
        _file_name: &'a str,
        contents: &'a str,
    ) -> BoxFuture<'a, Result<ParsedDataset>> {
        futures::future::ready(loader::ingest(contents)).boxed()
    }
}

/// Tries each strategy in order.
///
/// Only [`PipelineError::ServiceUnavailable`] moves on to the next strategy;
/// any other outcome of a strategy that answered is final.
pub struct FallbackIngest {
    strategies: Vec<Box<dyn IngestStrategy>>,
}

impl FallbackIngest {
    pub fn new(strategies: Vec<Box<dyn IngestStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn local_only() -> Self {
        Self::new(vec![Box::new(LocalIngest)])
    }
}

impl IngestStrategy for FallbackIngest {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn ingest<'a>(
        &'a self,
        file_name: &'a str,
        contents: &'a str,
    ) -> BoxFuture<'a, Result<ParsedDataset>> {
        async move {
            let mut last_err = None;
            for strategy in &self.strategies {
                match strategy.ingest(file_name, contents).await {
                    Err(err @ PipelineError::ServiceUnavailable { .. }) => {
                        log::warn!(
                            "{} ingestion unavailable for {file_name}, trying next: {err}",
                            strategy.name()
                        );
                        last_err = Some(err);
                    }
                    other => {
                        log::debug!("{file_name} ingested by {} strategy", strategy.name());
                        return other;
                    }
                }
            }
            match last_err {
                Some(err) => Err(err),
                None => loader::ingest(contents),
            }
        }
        .boxed()
    }
}
