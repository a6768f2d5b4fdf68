pub mod error;
pub mod recovery;
pub mod result;
pub mod validate;

pub use error::{AnalysisError, ErrorClass, RecoveryError, ValidationError, ValidationErrorKind};
pub use result::{AnalysisResult, GraphLink, GraphNode, MethodGraph, NodeGroup};
pub use validate::{ValidationReport, ValidationWarning};

// Recovery and validation stay two separate passes; this only chains them.
pub fn parse_response(raw: &str) -> Result<ValidationReport, AnalysisError> {
    let value = recovery::recover(raw)?;
    let report = validate::validate_report(&value)?;
    Ok(report)
}
