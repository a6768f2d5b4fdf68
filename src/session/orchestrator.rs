//! Single-flight analysis lifecycle.
//!
//! `Idle -> Analyzing -> {Complete | Error}`, and back to `Idle` only through
//! `reset`. The orchestrator is owned by one thread; the request itself runs
//! as a task on a tokio runtime and reports back over a channel. Every event
//! carries the id of the request that produced it, and events for anything
//! other than the current request are dropped.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::attachments::{self, FileAttachment};
use crate::analysis::{self, AnalysisError, AnalysisResult, ErrorClass, ValidationReport, ValidationWarning};
use crate::model_client::{self, ModelClient};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AnalysisStatus {
    Idle,
    Analyzing,
    Complete,
    Error,
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnalysisStatus::Idle => "IDLE",
            AnalysisStatus::Analyzing => "ANALYZING",
            AnalysisStatus::Complete => "COMPLETE",
            AnalysisStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionError {
    pub message: String,
    pub class: ErrorClass,
}

#[derive(Debug)]
pub struct AnalysisSession {
    status: AnalysisStatus,
    result: Option<Arc<AnalysisResult>>,
    warnings: Vec<ValidationWarning>,
    error: Option<SessionError>,
    attachments: Vec<FileAttachment>,
    request_id: Option<Uuid>,
    started_at: Option<Instant>,
}

impl Default for AnalysisSession {
    fn default() -> Self {
        Self {
            status: AnalysisStatus::Idle,
            result: None,
            warnings: Vec::new(),
            error: None,
            attachments: Vec::new(),
            request_id: None,
            started_at: None,
        }
    }
}

/// Read-only view handed to the UI.
#[derive(Clone, Debug)]
pub struct SessionSnapshot {
    pub status: AnalysisStatus,
    pub result: Option<Arc<AnalysisResult>>,
    pub warnings: Vec<ValidationWarning>,
    pub error: Option<String>,
    pub error_class: Option<ErrorClass>,
    pub files: Vec<String>,
    pub elapsed: Option<Duration>,
}

#[derive(Debug)]
enum AnalysisEvent {
    AttachmentsEncoded { request_id: Uuid, attachments: Vec<FileAttachment> },
    Finished { request_id: Uuid, outcome: Result<ValidationReport, AnalysisError> },
}

impl AnalysisEvent {
    fn request_id(&self) -> Uuid {
        match self {
            AnalysisEvent::AttachmentsEncoded { request_id, .. } | AnalysisEvent::Finished { request_id, .. } => *request_id,
        }
    }
}

pub struct Orchestrator {
    session: AnalysisSession,
    client: Arc<dyn ModelClient>,
    runtime: Handle,
    temperature: Option<f32>,
    events_tx: UnboundedSender<AnalysisEvent>,
    events_rx: UnboundedReceiver<AnalysisEvent>,
    task: Option<JoinHandle<()>>,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn ModelClient>, runtime: Handle) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            session: AnalysisSession::default(),
            client,
            runtime,
            temperature: None,
            events_tx,
            events_rx,
            task: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn status(&self) -> AnalysisStatus { self.session.status }
    pub fn result(&self) -> Option<&Arc<AnalysisResult>> { self.session.result.as_ref() }
    pub fn error(&self) -> Option<&SessionError> { self.session.error.as_ref() }
    pub fn attachments(&self) -> &[FileAttachment] { &self.session.attachments }

    pub fn snapshot(&self) -> SessionSnapshot {
        let s = &self.session;
        SessionSnapshot {
            status: s.status,
            result: s.result.clone(),
            warnings: s.warnings.clone(),
            error: s.error.as_ref().map(|e| e.message.clone()),
            error_class: s.error.as_ref().map(|e| e.class),
            files: s.attachments.iter().map(|a| a.name.clone()).collect(),
            elapsed: s.started_at.map(|t| t.elapsed()),
        }
    }

    /// Start an analysis of `files`. Only valid from `Idle`.
    pub fn submit(&mut self, files: Vec<PathBuf>) -> Result<Uuid, AnalysisError> {
        if self.session.status != AnalysisStatus::Idle {
            log::warn!("submit rejected: session is {}", self.session.status);
            return Err(AnalysisError::SessionBusy);
        }
        if files.is_empty() {
            let err = AnalysisError::EmptySubmission;
            self.session.error = Some(SessionError { message: err.user_message(), class: err.class() });
            return Err(err);
        }

        let request_id = Uuid::now_v7();
        self.session = AnalysisSession {
            status: AnalysisStatus::Analyzing,
            request_id: Some(request_id),
            started_at: Some(Instant::now()),
            ..AnalysisSession::default()
        };
        log::info!("{} -> {} (request {}, {} file(s))", AnalysisStatus::Idle, AnalysisStatus::Analyzing, request_id, files.len());

        let client = Arc::clone(&self.client);
        let tx = self.events_tx.clone();
        let temperature = self.temperature;
        self.task = Some(self.runtime.spawn(async move {
            // A panic in the client or the parser still has to settle the session
            let outcome = match AssertUnwindSafe(analyze(request_id, files, client, temperature, &tx)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(payload) => Err(AnalysisError::Internal(panic_message(payload.as_ref()))),
            };
            // Receiver gone means the orchestrator was dropped; nothing to report to
            let _ = tx.send(AnalysisEvent::Finished { request_id, outcome });
        }));
        Ok(request_id)
    }

    /// Back to `Idle` from any state. An in-flight request is abandoned and
    /// anything it still reports is ignored.
    pub fn reset(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(id) = self.session.request_id {
            log::info!("request {} abandoned by reset", id);
        }
        log::info!("{} -> {}", self.session.status, AnalysisStatus::Idle);
        self.session = AnalysisSession::default();
    }

    /// Apply whatever the background task has reported so far. Never blocks.
    pub fn poll(&mut self) -> bool {
        let mut applied = false;
        while let Ok(event) = self.events_rx.try_recv() {
            applied |= self.apply(event);
        }
        applied
    }

    /// Wait for the next event of the running request and apply it.
    /// Returns false straight away when nothing is in flight.
    pub async fn next_event(&mut self) -> bool {
        if self.session.status != AnalysisStatus::Analyzing {
            return self.poll();
        }
        match self.events_rx.recv().await {
            Some(event) => self.apply(event),
            None => false,
        }
    }

    pub async fn wait_until_settled(&mut self) -> AnalysisStatus {
        while self.session.status == AnalysisStatus::Analyzing {
            self.next_event().await;
        }
        self.session.status
    }

    fn apply(&mut self, event: AnalysisEvent) -> bool {
        let id = event.request_id();
        if self.session.request_id != Some(id) {
            log::debug!("dropping stale event for request {}", id);
            return false;
        }
        match event {
            AnalysisEvent::AttachmentsEncoded { attachments, .. } => {
                self.session.attachments = attachments;
            }
            AnalysisEvent::Finished { outcome, .. } => {
                self.task = None;
                self.session.request_id = None;
                match outcome {
                    Ok(report) => {
                        log::info!(
                            "{} -> {} (request {}, {} nodes, {} links, {} warning(s))",
                            AnalysisStatus::Analyzing,
                            AnalysisStatus::Complete,
                            id,
                            report.result.graph.nodes.len(),
                            report.result.graph.links.len(),
                            report.warnings.len()
                        );
                        self.session.result = Some(Arc::new(report.result));
                        self.session.warnings = report.warnings;
                        self.session.status = AnalysisStatus::Complete;
                    }
                    Err(err) => {
                        log_failure(id, &err);
                        self.session.error = Some(SessionError { message: err.user_message(), class: err.class() });
                        self.session.status = AnalysisStatus::Error;
                    }
                }
            }
        }
        true
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn analyze(
    request_id: Uuid,
    files: Vec<PathBuf>,
    client: Arc<dyn ModelClient>,
    temperature: Option<f32>,
    tx: &UnboundedSender<AnalysisEvent>,
) -> Result<ValidationReport, AnalysisError> {
    // Barrier: the request goes out only once every file is encoded
    let attachments = attachments::encode_all(&files).await?;
    let _ = tx.send(AnalysisEvent::AttachmentsEncoded { request_id, attachments: attachments.clone() });
    let request = model_client::build_analysis_request(&attachments, temperature);
    let raw = client.generate(&request).await?;
    analysis::parse_response(&raw)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

fn log_failure(id: Uuid, err: &AnalysisError) {
    log::error!("{} -> {} (request {}): {}", AnalysisStatus::Analyzing, AnalysisStatus::Error, id, err);
    match err {
        AnalysisError::Recovery(e) => {
            let raw = e.raw();
            let shown: String = raw.chars().take(500).collect();
            log::error!("unparseable model output ({} chars): {}", raw.chars().count(), shown);
        }
        AnalysisError::Validation(e) => log::error!("offending field: {}", e.path),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_client::{ModelError, ModelRequest};
    use async_trait::async_trait;

    struct Fixed(&'static str);

    #[async_trait]
    impl ModelClient for Fixed {
        async fn generate(&self, _request: &ModelRequest) -> Result<String, ModelError> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn stale_events_do_not_touch_the_session() {
        let mut orch = Orchestrator::new(Arc::new(Fixed("{}")), Handle::current());
        let forged = Uuid::now_v7();
        orch.events_tx
            .send(AnalysisEvent::Finished { request_id: forged, outcome: Err(AnalysisError::EmptySubmission) })
            .unwrap();
        assert!(!orch.poll());
        assert_eq!(orch.status(), AnalysisStatus::Idle);
        assert!(orch.error().is_none());
    }

    struct Exploding;

    #[async_trait]
    impl ModelClient for Exploding {
        async fn generate(&self, _request: &ModelRequest) -> Result<String, ModelError> {
            panic!("client blew up")
        }
    }

    #[tokio::test]
    async fn panicking_client_settles_in_error() {
        let dir = tempfile::tempdir().unwrap();
        let paper = dir.path().join("paper.pdf");
        std::fs::write(&paper, b"%PDF-1.4").unwrap();
        let mut orch = Orchestrator::new(Arc::new(Exploding), Handle::current());
        orch.submit(vec![paper]).unwrap();

        let settled = tokio::time::timeout(Duration::from_secs(5), orch.wait_until_settled()).await;
        assert_eq!(settled.ok(), Some(AnalysisStatus::Error));
        let err = orch.error().unwrap();
        assert_eq!(err.class, ErrorClass::Internal);
        assert!(orch.result().is_none());
    }

    #[test]
    fn panic_payloads_become_messages() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&String::from("bang")), "bang");
        assert_eq!(panic_message(&42u8), "panic with non-string payload");
    }

    #[tokio::test]
    async fn next_event_returns_immediately_when_idle() {
        let mut orch = Orchestrator::new(Arc::new(Fixed("{}")), Handle::current());
        assert!(!orch.next_event().await);
    }
}
