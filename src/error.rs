//! Error types for the worker hub.

use uuid::Uuid;

/// Failure handling one inbound envelope.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors decoding an inbound envelope.
///
/// All of these are answered with an `error` envelope; none closes the connection.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Envelope is missing its type")]
    MissingType,

    #[error("Unknown message type: {0}")]
    UnknownKind(String),

    #[error("{kind} envelope requires a workerId")]
    MissingWorkerId { kind: String },

    #[error("Invalid {kind} payload: {reason}")]
    InvalidPayload { kind: String, reason: String },
}

/// Errors resolving the recipient of a routed message.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("Worker {worker_id} is not connected")]
    NotConnected { worker_id: String },

    #[error("Connection {id} is not registered")]
    UnknownConnection { id: Uuid },

    #[error("Sender is not identified as worker {expected}")]
    NotIdentified { expected: String },

    #[error("A {role} connection cannot send {kind}")]
    WrongRole { role: String, kind: String },

    #[error("Failed to deliver to worker {worker_id}")]
    SendFailed { worker_id: String },
}
