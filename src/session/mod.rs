pub mod attachments;
pub mod orchestrator;
pub mod progress;

pub use attachments::FileAttachment;
pub use orchestrator::{AnalysisStatus, Orchestrator, SessionError, SessionSnapshot};
