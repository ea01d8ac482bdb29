//! Host session
//!
//! [`Session`] owns at most one live gateway handle and acquires it
//! lazily: nothing is dialed until the first operation needs the host.
//! Every operation re-validates a cached handle with a handshake probe
//! first; a stale handle is dropped and the dial happens exactly once
//! more before the operation is reported as unreachable. The operation
//! itself is never replayed after a mid-call connection loss, because
//! the host may already have applied part of its effects.

use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::BridgeConfig;
use crate::error::{GatewayError, GatewayResult, SessionError, SessionResult};
use crate::gateway::{HttpConnector, StdioConnector, TcpConnector};
use crate::value::RawValue;

/// Undo treatment for one script submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndoMode {
    /// No undo grouping; the host records steps as it pleases.
    None,
    /// The whole submission becomes one named entry in the host's undo
    /// history.
    Entire,
    /// Like [`UndoMode::Entire`] but with host bookkeeping reduced for
    /// speed.
    FastEntireScript,
}

impl UndoMode {
    /// Wire spelling of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            UndoMode::None => "none",
            UndoMode::Entire => "entire",
            UndoMode::FastEntireScript => "fast_entire_script",
        }
    }
}

impl FromStr for UndoMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(UndoMode::None),
            "entire" => Ok(UndoMode::Entire),
            "fast_entire_script" | "fast-entire-script" | "fast" => {
                Ok(UndoMode::FastEntireScript)
            }
            other => Err(format!(
                "unknown undo mode '{other}' (expected none, entire or fast_entire_script)"
            )),
        }
    }
}

/// What the gateway reports about the host in its handshake reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    /// Gateway protocol version.
    pub protocol_version: String,
    /// Host application name.
    pub application: String,
    /// Host application version string.
    pub version: String,
    /// Name of the active document, or `None` when nothing is open.
    pub document: Option<String>,
}

/// Result of a rollback request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackReport {
    /// How many history entries were actually undone.
    pub undone: u32,
    /// Labels of the undone entries, most recent first.
    pub labels: Vec<String>,
}

/// Connection state reported by [`Session::status`].
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// Handshake information from the live handle.
    pub host: HostInfo,
    /// When the current handle was dialed.
    pub connected_at: DateTime<Utc>,
    /// Dial target description.
    pub target: String,
}

/// A live, exclusive channel to the host gateway.
///
/// Calls block until the host replies; the session imposes no timeout
/// of its own, because a long-running layout operation is
/// indistinguishable from a slow one.
pub trait HostPort: Send {
    /// Handshake probe; also refreshes host and document information.
    fn hello(&mut self) -> GatewayResult<HostInfo>;

    /// Run a prepared script and return the raw result graph.
    fn evaluate(
        &mut self,
        script: &str,
        undo_mode: UndoMode,
        undo_name: Option<&str>,
    ) -> GatewayResult<RawValue>;

    /// Undo up to `steps` most recent history entries.
    fn rollback(&mut self, steps: u32) -> GatewayResult<RollbackReport>;
}

/// Dials a [`HostPort`]. Implementations carry their own target.
pub trait Connector: Send {
    /// Open a fresh port.
    fn connect(&self) -> GatewayResult<Box<dyn HostPort>>;

    /// Human-readable dial target for logs and errors.
    fn describe(&self) -> String;
}

/// Lazily connected host session. See the module docs for the handle
/// lifecycle.
pub struct Session {
    connector: Box<dyn Connector>,
    port: Option<Box<dyn HostPort>>,
    info: Option<HostInfo>,
    connected_at: Option<DateTime<Utc>>,
    slow_eval: Duration,
}

impl Session {
    /// Session over an explicit connector, with the process-default
    /// slow-call threshold.
    pub fn new(connector: Box<dyn Connector>) -> Self {
        Self {
            connector,
            port: None,
            info: None,
            connected_at: None,
            slow_eval: crate::config::default_config().slow_eval_threshold(),
        }
    }

    /// Session wired up from a [`BridgeConfig`]: a stdio adapter
    /// command wins over an HTTP endpoint, which wins over the TCP
    /// address.
    pub fn from_config(config: &BridgeConfig) -> Self {
        let connector: Box<dyn Connector> = if let Some(command) = &config.bridge_command {
            Box::new(StdioConnector::new(command.clone(), &config.client_name))
        } else if let Some(url) = &config.gateway_url {
            Box::new(HttpConnector::new(url, &config.client_name))
        } else {
            Box::new(TcpConnector::new(&config.gateway_addr, &config.client_name))
        };
        let mut session = Self::new(connector);
        session.slow_eval = config.slow_eval_threshold();
        session
    }

    /// Override the slow-call warning threshold.
    pub fn set_slow_eval_threshold(&mut self, threshold: Duration) {
        self.slow_eval = threshold;
    }

    /// Dial target description of the underlying connector.
    pub fn target(&self) -> String {
        self.connector.describe()
    }

    /// True when a previous call left a handle cached. Makes no claim
    /// about the host still being alive; the next operation probes.
    pub fn has_cached_handle(&self) -> bool {
        self.port.is_some()
    }

    /// Probe the cached handle, dropping it when stale. Never dials.
    pub fn is_connected(&mut self) -> bool {
        let Some(port) = self.port.as_mut() else {
            return false;
        };
        match port.hello() {
            Ok(info) => {
                self.info = Some(info);
                true
            }
            Err(_) => {
                self.drop_port();
                false
            }
        }
    }

    /// Drop the cached handle. The next operation re-dials.
    pub fn disconnect(&mut self) {
        self.drop_port();
    }

    /// Handshake with the host (dialing if necessary) and report the
    /// connection state. Works with or without an open document.
    pub fn status(&mut self) -> SessionResult<SessionStatus> {
        self.acquire_port()?;
        // acquire_port leaves info and connected_at populated.
        match (self.info.clone(), self.connected_at) {
            (Some(host), Some(connected_at)) => Ok(SessionStatus {
                host,
                connected_at,
                target: self.connector.describe(),
            }),
            _ => Err(SessionError::Unreachable {
                detail: format!("{}: handshake reply missing", self.connector.describe()),
            }),
        }
    }

    /// Run a prepared script against the active document.
    pub fn evaluate(
        &mut self,
        script: &str,
        undo_mode: UndoMode,
        undo_name: Option<&str>,
    ) -> SessionResult<RawValue> {
        self.acquire()?;
        let slow_after = self.slow_eval;
        let Some(port) = self.port.as_mut() else {
            return Err(SessionError::Unreachable {
                detail: "no gateway handle after acquisition".to_string(),
            });
        };
        let started = Instant::now();
        let result = port.evaluate(script, undo_mode, undo_name);
        let elapsed = started.elapsed();
        if elapsed > slow_after {
            tracing::warn!(
                elapsed_secs = elapsed.as_secs_f64(),
                undo_mode = undo_mode.as_str(),
                "host evaluation ran past the slow-call threshold"
            );
        }
        result.map_err(|err| self.classify_call_failure(err))
    }

    /// Undo up to `steps` most recent history entries, most recent
    /// first.
    pub fn rollback(&mut self, steps: u32) -> SessionResult<RollbackReport> {
        self.acquire()?;
        let Some(port) = self.port.as_mut() else {
            return Err(SessionError::Unreachable {
                detail: "no gateway handle after acquisition".to_string(),
            });
        };
        let result = port.rollback(steps);
        result.map_err(|err| self.classify_call_failure(err))
    }

    /// Acquire a validated handle and require an open document.
    fn acquire(&mut self) -> SessionResult<()> {
        self.acquire_port()?;
        self.require_document()
    }

    /// Acquire a validated handle: probe the cached one, and on a
    /// stale probe dial exactly once more.
    fn acquire_port(&mut self) -> SessionResult<()> {
        if let Some(port) = self.port.as_mut() {
            match port.hello() {
                Ok(info) => {
                    self.info = Some(info);
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!(error = %err, "cached gateway handle went stale, redialing");
                    self.drop_port();
                }
            }
        }
        let unreachable = |err: GatewayError| SessionError::Unreachable {
            detail: format!("{}: {err}", self.connector.describe()),
        };
        let mut port = self.connector.connect().map_err(unreachable)?;
        let info = port.hello().map_err(unreachable)?;
        tracing::info!(
            application = %info.application,
            version = %info.version,
            document = info.document.as_deref().unwrap_or("<none>"),
            "connected to host gateway"
        );
        self.port = Some(port);
        self.info = Some(info);
        self.connected_at = Some(Utc::now());
        Ok(())
    }

    fn require_document(&self) -> SessionResult<()> {
        let has_document = self
            .info
            .as_ref()
            .is_some_and(|info| info.document.is_some());
        if has_document {
            Ok(())
        } else {
            Err(SessionError::NoDocument)
        }
    }

    /// Map a failure of an in-flight call. Connection-level failures
    /// invalidate the cached handle for the next operation; the failed
    /// call is never replayed.
    fn classify_call_failure(&mut self, err: GatewayError) -> SessionError {
        match err {
            GatewayError::Fault(fault) => match fault.code.as_deref() {
                Some("script_fault") => {
                    let line = fault.line();
                    SessionError::Script {
                        message: fault.message,
                        line,
                    }
                }
                Some("no_document") => SessionError::NoDocument,
                _ => SessionError::Gateway(GatewayError::Fault(fault)),
            },
            err @ (GatewayError::Io(_)
            | GatewayError::Json(_)
            | GatewayError::Http(_)
            | GatewayError::MalformedResponse(_)) => {
                tracing::warn!(error = %err, "gateway call failed mid-flight, dropping handle");
                self.drop_port();
                SessionError::Unreachable {
                    detail: err.to_string(),
                }
            }
            err => SessionError::Gateway(err),
        }
    }

    fn drop_port(&mut self) {
        self.port = None;
        self.info = None;
        self.connected_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undo_mode_round_trips_through_strings() {
        for mode in [UndoMode::None, UndoMode::Entire, UndoMode::FastEntireScript] {
            assert_eq!(mode.as_str().parse::<UndoMode>(), Ok(mode));
        }
        assert_eq!("fast".parse::<UndoMode>(), Ok(UndoMode::FastEntireScript));
        assert!("sometimes".parse::<UndoMode>().is_err());
    }

    #[test]
    fn undo_mode_serde_spelling_matches_wire_form() {
        let json = serde_json::to_string(&UndoMode::FastEntireScript).unwrap();
        assert_eq!(json, "\"fast_entire_script\"");
        let back: UndoMode = serde_json::from_str("\"entire\"").unwrap();
        assert_eq!(back, UndoMode::Entire);
    }

    #[test]
    fn from_config_prefers_stdio_then_http_then_tcp() {
        let mut config = BridgeConfig::default();
        config.gateway_url = Some("http://127.0.0.1:9000/rpc".to_string());
        config.bridge_command = Some(vec!["adapter".to_string()]);
        assert!(Session::from_config(&config).target().starts_with("stdio"));

        config.bridge_command = None;
        assert!(Session::from_config(&config).target().starts_with("http"));

        config.gateway_url = None;
        assert!(Session::from_config(&config).target().starts_with("tcp"));
    }
}
