use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Pipeline error taxonomy
// ---------------------------------------------------------------------------

/// Every failure the ingestion / transform / classification pipeline can
/// surface.
///
/// `Display` carries the full diagnostic for developer logs, while
/// [`PipelineError::user_message`] is the short summary shown in the run log.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Malformed input text.
    #[error("format error{}: {message}", line_suffix(.line))]
    Format { line: Option<usize>, message: String },

    /// The dataset does not match any accepted schema profile.
    #[error("missing required columns: {}", join_columns(.missing))]
    Validation { missing: Vec<String> },

    #[error("target '{0}' not found in catalog")]
    TargetNotFound(String),

    /// Transport-level failure (unreachable service, timeout).
    #[error("classification service unavailable: {detail}")]
    ServiceUnavailable { detail: String, hint: String },

    /// The service answered but rejected the request.
    #[error("classification failed ({}): {message}", status_label(.status))]
    Classification { status: Option<u16>, message: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("a classification is already running for this session")]
    ConcurrentRequestRejected,

    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, PipelineError>;

fn line_suffix(line: &Option<usize>) -> String {
    line.map(|l| format!(" at line {l}")).unwrap_or_default()
}

fn join_columns(missing: &[String]) -> String {
    missing.join(", ")
}

fn status_label(status: &Option<u16>) -> String {
    status
        .map(|s| format!("HTTP {s}"))
        .unwrap_or_else(|| "malformed response".to_string())
}

impl PipelineError {
    pub fn format(line: Option<usize>, message: impl Into<String>) -> Self {
        PipelineError::Format {
            line,
            message: message.into(),
        }
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        PipelineError::ServiceUnavailable {
            detail: detail.into(),
            hint: "Make sure the classification API is running and reachable at the configured URL"
                .to_string(),
        }
    }

    /// Short, user-facing summary suitable for the run log.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Format { line: Some(l), .. } => {
                format!("Failed to parse CSV (line {l})")
            }
            PipelineError::Format { line: None, message } => {
                format!("Failed to parse CSV: {message}")
            }
            PipelineError::Validation { missing } => {
                format!("Validation failed: missing required columns: {}", missing.join(", "))
            }
            PipelineError::TargetNotFound(_) => "Target not found in MAST archive".to_string(),
            PipelineError::ServiceUnavailable { hint, .. } => {
                format!("Classification service unavailable. {hint}")
            }
            PipelineError::Classification { message, .. } => message.clone(),
            PipelineError::InvalidArgument(msg) => format!("Invalid parameter: {msg}"),
            PipelineError::ConcurrentRequestRejected => {
                "A classification is already in progress".to_string()
            }
            PipelineError::Io { path, .. } => format!("Failed to read {}", path.display()),
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PipelineError::unavailable(format!("request timed out: {err}"))
        } else if err.is_decode() {
            PipelineError::Classification {
                status: None,
                message: format!("Unreadable response from classification service: {err}"),
            }
        } else {
            PipelineError::unavailable(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_error_mentions_line() {
        let err = PipelineError::format(Some(7), "bad utf-8");
        assert_eq!(err.to_string(), "format error at line 7: bad utf-8");
        assert_eq!(err.user_message(), "Failed to parse CSV (line 7)");
    }

    #[test]
    fn validation_lists_missing_columns() {
        let err = PipelineError::Validation {
            missing: vec!["time".into(), "flux".into()],
        };
        assert!(err.to_string().contains("time, flux"));
        assert!(err.user_message().starts_with("Validation failed"));
    }

    #[test]
    fn unavailable_keeps_hint_in_user_message() {
        let err = PipelineError::unavailable("connection refused");
        assert!(err.to_string().contains("connection refused"));
        assert!(!err.user_message().contains("connection refused"));
        assert!(err.user_message().contains("configured URL"));
    }
}
