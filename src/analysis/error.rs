use std::fmt;

use thiserror::Error;

use crate::model_client::ModelError;

/// No JSON object could be parsed out of the model's reply.
#[derive(Debug, Error)]
pub enum RecoveryError {
    // `raw` is the untouched model output, kept for diagnostics only.
    #[error("model output is not a parseable JSON object: {reason}")]
    Malformed { raw: String, reason: String },
}

impl RecoveryError {
    pub fn raw(&self) -> &str {
        match self {
            RecoveryError::Malformed { raw, .. } => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    Missing,
    WrongType { expected: &'static str },
    DuplicateNodeId(String),
    DanglingLink(String),
    UnknownVariantType(String),
}

/// Hard validation failure, always tied to the offending field path
/// (for example `graph.links[0].target`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ValidationError {
    pub path: String,
    pub kind: ValidationErrorKind,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, kind: ValidationErrorKind) -> Self {
        Self { path: path.into(), kind }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ValidationErrorKind::Missing => write!(f, "required field `{}` is missing", self.path),
            ValidationErrorKind::WrongType { expected } => {
                write!(f, "field `{}` must be {}", self.path, expected)
            }
            ValidationErrorKind::DuplicateNodeId(id) => {
                write!(f, "field `{}` repeats node id \"{}\"", self.path, id)
            }
            ValidationErrorKind::DanglingLink(id) => {
                write!(f, "field `{}` references unknown node id \"{}\"", self.path, id)
            }
            ValidationErrorKind::UnknownVariantType(t) => {
                write!(f, "field `{}` has unknown variant type \"{}\"", self.path, t)
            }
        }
    }
}

#[derive(Debug, Error)]
#[error("could not read attachment {name}: {source}")]
pub struct AttachmentError {
    pub name: String,
    #[source]
    pub source: std::io::Error,
}

/// Coarse classification shown next to the user-facing message.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    EmptySubmission,
    AttachmentRead,
    ModelRequest,
    Malformed,
    Validation,
    SessionBusy,
    Internal,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no files were selected for analysis")]
    EmptySubmission,
    #[error(transparent)]
    AttachmentRead(#[from] AttachmentError),
    #[error("model request failed: {0}")]
    ModelRequest(#[from] ModelError),
    #[error(transparent)]
    Recovery(#[from] RecoveryError),
    #[error("analysis result is invalid: {0}")]
    Validation(#[from] ValidationError),
    #[error("an analysis is already in progress; reset the session first")]
    SessionBusy,
    // The analysis task died without producing an outcome (a panic)
    #[error("analysis task failed: {0}")]
    Internal(String),
}

impl AnalysisError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AnalysisError::EmptySubmission => ErrorClass::EmptySubmission,
            AnalysisError::AttachmentRead(_) => ErrorClass::AttachmentRead,
            AnalysisError::ModelRequest(_) => ErrorClass::ModelRequest,
            AnalysisError::Recovery(_) => ErrorClass::Malformed,
            AnalysisError::Validation(_) => ErrorClass::Validation,
            AnalysisError::SessionBusy => ErrorClass::SessionBusy,
            AnalysisError::Internal(_) => ErrorClass::Internal,
        }
    }

    /// Single message for the UI. Diagnostic detail stays on the error value.
    pub fn user_message(&self) -> String {
        match self {
            AnalysisError::EmptySubmission => "Select at least one document to analyze.".to_string(),
            AnalysisError::AttachmentRead(e) => format!("Could not read \"{}\".", e.name),
            AnalysisError::ModelRequest(e) => format!("The analysis service failed: {}", e),
            AnalysisError::Recovery(_) => {
                "Failed to parse analysis result from the model. The model output might be malformed.".to_string()
            }
            AnalysisError::Validation(e) => format!("The model returned an incomplete analysis ({}).", e),
            AnalysisError::SessionBusy => "An analysis is already running.".to_string(),
            AnalysisError::Internal(_) => "The analysis stopped unexpectedly. Please try again.".to_string(),
        }
    }
}
