//! Execution envelope
//!
//! The envelope is what an agent actually talks to: it validates a
//! submission, wraps the body for the host dialect, runs it through
//! the session, encodes the raw result defensively, and folds every
//! failure along the way into a FAULT outcome. Submitting a script
//! therefore cannot fail as a Rust call; it can only report a fault.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::BridgeConfig;
use crate::encode::encode;
use crate::error::{SessionResult, SubmitError};
use crate::script::{self, SelectionDetail};
use crate::session::{RollbackReport, Session, SessionStatus, UndoMode};

/// One script submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Script body; it reports back by assigning the output slot.
    pub script: String,
    /// Label for the host's undo history entry. Must be non-empty when
    /// `undo_mode` groups the submission.
    pub undo_name: String,
    /// Undo treatment for the submission.
    pub undo_mode: UndoMode,
}

impl ExecutionRequest {
    /// A submission with an explicit undo treatment.
    pub fn new(
        script: impl Into<String>,
        undo_name: impl Into<String>,
        undo_mode: UndoMode,
    ) -> Self {
        Self {
            script: script.into(),
            undo_name: undo_name.into(),
            undo_mode,
        }
    }

    /// A submission that reads without grouping anything in the undo
    /// history. Only sensible for bodies that do not mutate.
    pub fn read_only(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            undo_name: String::new(),
            undo_mode: UndoMode::None,
        }
    }
}

/// How a submission ended. Exactly one of the payloads exists by
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// The script ran to completion.
    Success {
        /// Defensively encoded JSON text of the script's result.
        result: String,
    },
    /// The script did not produce a result.
    Fault {
        /// What failed, phrased for the submitting agent.
        description: String,
    },
}

impl ExecutionOutcome {
    /// True for [`ExecutionOutcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }

    /// The encoded result, when the submission succeeded.
    pub fn result(&self) -> Option<&str> {
        match self {
            ExecutionOutcome::Success { result } => Some(result),
            ExecutionOutcome::Fault { .. } => None,
        }
    }

    /// The fault description, when the submission failed.
    pub fn description(&self) -> Option<&str> {
        match self {
            ExecutionOutcome::Success { .. } => None,
            ExecutionOutcome::Fault { description } => Some(description),
        }
    }
}

/// Transactional execution surface over one [`Session`].
pub struct Envelope {
    session: Session,
}

impl Envelope {
    /// Envelope over an existing session.
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Envelope over a session wired up from `config`.
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(Session::from_config(config))
    }

    /// The underlying session, for connection management.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Submit a script body. Never fails; failures become FAULT
    /// outcomes describing what went wrong.
    pub fn submit(&mut self, request: &ExecutionRequest) -> ExecutionOutcome {
        let submission = Uuid::new_v4();
        let started = Instant::now();
        tracing::debug!(
            submission = %submission,
            undo_mode = request.undo_mode.as_str(),
            "submitting script to host"
        );
        let outcome = match self.try_submit(request) {
            Ok(result) => ExecutionOutcome::Success { result },
            Err(err) => ExecutionOutcome::Fault {
                description: err.to_string(),
            },
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            ExecutionOutcome::Success { .. } => {
                tracing::debug!(submission = %submission, elapsed_ms, "script submission succeeded");
            }
            ExecutionOutcome::Fault { description } => {
                tracing::debug!(
                    submission = %submission,
                    elapsed_ms,
                    fault = %description,
                    "script submission faulted"
                );
            }
        }
        outcome
    }

    fn try_submit(&mut self, request: &ExecutionRequest) -> Result<String, SubmitError> {
        if request.undo_mode != UndoMode::None && request.undo_name.trim().is_empty() {
            return Err(SubmitError::InvalidRequest(
                "undo_name must be non-empty when an undo mode groups the submission".to_string(),
            ));
        }
        let wrapped = script::wrap_body(&request.script);
        let undo_name = match request.undo_mode {
            UndoMode::None => None,
            _ => Some(request.undo_name.as_str()),
        };
        let raw = self
            .session
            .evaluate(&wrapped, request.undo_mode, undo_name)?;
        Ok(encode(&raw))
    }

    /// Evaluate a read-only expression and return its encoded value.
    pub fn evaluate_expression(&mut self, expression: &str) -> ExecutionOutcome {
        self.submit(&ExecutionRequest::read_only(script::expression_body(
            expression,
        )))
    }

    /// Summarise the active document.
    pub fn document_overview(&mut self) -> ExecutionOutcome {
        self.submit(&ExecutionRequest::read_only(script::DOCUMENT_OVERVIEW_BODY))
    }

    /// Describe the current selection.
    pub fn selection_summary(&mut self, detail: SelectionDetail) -> ExecutionOutcome {
        self.submit(&ExecutionRequest::read_only(script::selection_summary_body(
            detail,
        )))
    }

    /// Undo up to `steps` most recent history entries, most recent
    /// first.
    pub fn rollback(&mut self, steps: u32) -> SessionResult<RollbackReport> {
        self.session.rollback(steps)
    }

    /// Handshake with the host and report the connection state.
    pub fn status(&mut self) -> SessionResult<SessionStatus> {
        self.session.status()
    }

    /// Wrap this envelope for use from several threads.
    pub fn into_shared(self) -> SharedEnvelope {
        SharedEnvelope {
            inner: Arc::new(Mutex::new(self)),
        }
    }
}

/// Cloneable, thread-safe handle to an [`Envelope`]. The inner lock
/// serialises submissions, which is exactly the discipline the host
/// demands: one script at a time, no interleaving.
#[derive(Clone)]
pub struct SharedEnvelope {
    inner: Arc<Mutex<Envelope>>,
}

impl SharedEnvelope {
    /// See [`Envelope::submit`].
    pub fn submit(&self, request: &ExecutionRequest) -> ExecutionOutcome {
        self.inner.lock().submit(request)
    }

    /// See [`Envelope::evaluate_expression`].
    pub fn evaluate_expression(&self, expression: &str) -> ExecutionOutcome {
        self.inner.lock().evaluate_expression(expression)
    }

    /// See [`Envelope::document_overview`].
    pub fn document_overview(&self) -> ExecutionOutcome {
        self.inner.lock().document_overview()
    }

    /// See [`Envelope::selection_summary`].
    pub fn selection_summary(&self, detail: SelectionDetail) -> ExecutionOutcome {
        self.inner.lock().selection_summary(detail)
    }

    /// See [`Envelope::rollback`].
    pub fn rollback(&self, steps: u32) -> SessionResult<RollbackReport> {
        self.inner.lock().rollback(steps)
    }

    /// See [`Envelope::status`].
    pub fn status(&self) -> SessionResult<SessionStatus> {
        self.inner.lock().status()
    }
}
