//! Error taxonomy for the menu ingestion pipeline.
//!
//! [`ServiceError`] is what an external collaborator (vision service,
//! completion endpoint) reports. The pipeline lifts it into an
//! [`AnalysisError`] tagged with the stage that failed, which is the only
//! error a caller ever sees on the completion handle.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Pipeline stage that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Vision,
    Categorization,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Vision => "vision",
            Stage::Categorization => "categorization",
        };
        f.write_str(name)
    }
}

/// Failure reported by an external service call.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request never produced a usable response (connect, TLS, timeout, body read).
    #[error("request failed: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not have the expected shape.
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ServiceError::Decode(err.to_string())
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}

/// Terminal outcome of a failed analysis run.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{stage} transport failed: {message}")]
    Transport { stage: Stage, message: String },

    #[error("{stage} response could not be decoded: {message}")]
    Decode { stage: Stage, message: String },

    /// Completion text could not be mapped to a menu. `raw` keeps the
    /// unmodified completion for diagnostics.
    #[error("categorization result is not a valid menu: {message}")]
    Parse { message: String, raw: String },

    /// The background run ended without publishing an outcome.
    #[error("analysis was interrupted before it produced a result")]
    Interrupted,
}

/// Coarse, stable classification of an [`AnalysisError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCause {
    VisionTransport,
    VisionDecode,
    LlmTransport,
    LlmDecode,
    ResultParse,
    Interrupted,
}

impl AnalysisError {
    /// Lift a collaborator failure into a stage-tagged analysis error.
    pub fn from_service(stage: Stage, err: ServiceError) -> Self {
        match err {
            ServiceError::Transport(message) => AnalysisError::Transport { stage, message },
            ServiceError::Status { status, body } => AnalysisError::Transport {
                stage,
                message: format!("status {}: {}", status, body),
            },
            ServiceError::Decode(message) => AnalysisError::Decode { stage, message },
        }
    }

    pub fn cause(&self) -> ErrorCause {
        match self {
            AnalysisError::Transport { stage: Stage::Vision, .. } => ErrorCause::VisionTransport,
            AnalysisError::Decode { stage: Stage::Vision, .. } => ErrorCause::VisionDecode,
            AnalysisError::Transport { .. } => ErrorCause::LlmTransport,
            AnalysisError::Decode { .. } => ErrorCause::LlmDecode,
            AnalysisError::Parse { .. } => ErrorCause::ResultParse,
            AnalysisError::Interrupted => ErrorCause::Interrupted,
        }
    }

    /// Raw completion text attached to the error, if any.
    pub fn raw_completion(&self) -> Option<&str> {
        match self {
            AnalysisError::Parse { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_maps_to_transport() {
        let err = AnalysisError::from_service(
            Stage::Vision,
            ServiceError::Status {
                status: 500,
                body: "boom".to_string(),
            },
        );
        assert_eq!(err.cause(), ErrorCause::VisionTransport);
        assert_eq!(err.to_string(), "vision transport failed: status 500: boom");
    }

    #[test]
    fn test_decode_cause_depends_on_stage() {
        let vision = AnalysisError::from_service(Stage::Vision, ServiceError::Decode("x".into()));
        let llm =
            AnalysisError::from_service(Stage::Categorization, ServiceError::Decode("x".into()));
        assert_eq!(vision.cause(), ErrorCause::VisionDecode);
        assert_eq!(llm.cause(), ErrorCause::LlmDecode);
    }

    #[test]
    fn test_parse_error_keeps_raw_text() {
        let err = AnalysisError::Parse {
            message: "expected value".to_string(),
            raw: "Sorry, I cannot help".to_string(),
        };
        assert_eq!(err.cause(), ErrorCause::ResultParse);
        assert_eq!(err.raw_completion(), Some("Sorry, I cannot help"));
    }

    #[test]
    fn test_cause_serializes_kebab_case() {
        let json = serde_json::to_string(&ErrorCause::LlmTransport).unwrap();
        assert_eq!(json, "\"llm-transport\"");
    }
}
