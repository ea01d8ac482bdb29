//! Galley – A transactional scripting bridge to a live page-layout host
//!
//! This crate lets an agent submit script bodies against the stateful
//! document of a desktop publishing application running in a separate
//! process, with:
//! - An execution envelope that folds every failure into a fault
//!   outcome instead of raising
//! - Undo grouping per submission and rollback of recent submissions
//! - A total, bounded, defensive encoder for whatever value graph a
//!   script leaves behind (cycles, live host objects, faulting reads)
//! - A lazily dialed, self-revalidating session with exactly one
//!   re-dial per operation
//! - Gateway transports over TCP, spawned stdio adapters, or HTTP

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod encode;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod script;
pub mod session;
pub mod value;

// Re-export key types for convenience
pub use config::BridgeConfig;
pub use encode::encode;
pub use envelope::{Envelope, ExecutionOutcome, ExecutionRequest, SharedEnvelope};
pub use error::{GatewayError, SessionError, SubmitError};
pub use gateway::{GatewayClient, HttpConnector, StdioConnector, TcpConnector};
pub use script::SelectionDetail;
pub use session::{
    Connector, HostInfo, HostPort, RollbackReport, Session, SessionStatus, UndoMode,
};
pub use value::{HostObject, Member, ObjectRef, RawValue, SequenceRef};

/// Current version of the galley bridge
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol version for gateway communication
pub const PROTOCOL_VERSION: &str = "1.0.0";
