//! Wire envelope — the uniform JSON wrapper for every socket message.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::model::WorkerState;
use crate::error::ProtocolError;

/// Kind of envelope, carried in the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnvelopeKind {
    /// Worker identifies itself.
    Connect,
    /// Full or partial worker state report.
    StateUpdate,
    /// Command addressed to a worker.
    Command,
    /// Synchronous status query.
    StatusRequest,
    /// Answer to a status query.
    StatusResponse,
    /// Failure report to the sender.
    Error,
    /// Liveness acknowledgement of an inbound message.
    Ack,
}

impl EnvelopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::StateUpdate => "stateUpdate",
            Self::Command => "command",
            Self::StatusRequest => "statusRequest",
            Self::StatusResponse => "statusResponse",
            Self::Error => "error",
            Self::Ack => "ack",
        }
    }
}

impl std::fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EnvelopeKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connect" => Ok(Self::Connect),
            "stateUpdate" => Ok(Self::StateUpdate),
            "command" => Ok(Self::Command),
            "statusRequest" => Ok(Self::StatusRequest),
            "statusResponse" => Ok(Self::StatusResponse),
            "error" => Ok(Self::Error),
            "ack" => Ok(Self::Ack),
            _ => Err(format!("Unknown message type: {}", s)),
        }
    }
}

/// A single message on the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    /// Correlation id for `statusRequest` / `statusResponse`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default = "empty_object")]
    pub payload: Value,
    /// Epoch milliseconds.
    #[serde(default = "now_millis")]
    pub timestamp: i64,
}

/// Payload of a `command` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPayload {
    /// Opaque command name, forwarded without interpretation.
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// Payload of an `error` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

impl Envelope {
    pub fn new(kind: EnvelopeKind, payload: Value) -> Self {
        Self {
            kind,
            worker_id: None,
            request_id: None,
            payload,
            timestamp: now_millis(),
        }
    }

    pub fn with_worker(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    pub fn with_request(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn ack() -> Self {
        Self::new(EnvelopeKind::Ack, empty_object())
    }

    pub fn error(message: impl Into<String>) -> Self {
        let payload = ErrorPayload {
            message: message.into(),
        };
        Self::new(
            EnvelopeKind::Error,
            serde_json::to_value(payload).unwrap_or_else(|_| empty_object()),
        )
    }

    pub fn connect(worker_id: impl Into<String>) -> Self {
        Self::new(EnvelopeKind::Connect, empty_object()).with_worker(worker_id)
    }

    pub fn state_update(state: &WorkerState) -> Self {
        Self::new(EnvelopeKind::StateUpdate, state_value(state)).with_worker(state.id.clone())
    }

    pub fn command(worker_id: impl Into<String>, command: &CommandPayload) -> Self {
        Self::new(
            EnvelopeKind::Command,
            serde_json::to_value(command).unwrap_or_else(|_| empty_object()),
        )
        .with_worker(worker_id)
    }

    pub fn status_request(worker_id: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(EnvelopeKind::StatusRequest, empty_object())
            .with_worker(worker_id)
            .with_request(request_id)
    }

    pub fn status_response(request_id: Option<String>, state: &WorkerState) -> Self {
        Self {
            request_id,
            ..Self::new(EnvelopeKind::StatusResponse, state_value(state)).with_worker(state.id.clone())
        }
    }

    /// Decode an inbound frame.
    ///
    /// Distinguishes malformed JSON, a missing `type`, an unknown `type`, and a
    /// known type whose fields fail to decode.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?;
        if kind.parse::<EnvelopeKind>().is_err() {
            return Err(ProtocolError::UnknownKind(kind.to_string()));
        }
        let kind = kind.to_string();
        serde_json::from_value(value).map_err(|e| ProtocolError::InvalidPayload {
            kind,
            reason: e.to_string(),
        })
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// The worker id this envelope addresses, or a protocol error naming the kind.
    pub fn require_worker_id(&self) -> Result<&str, ProtocolError> {
        match self.worker_id.as_deref() {
            Some(id) if !id.trim().is_empty() => Ok(id),
            _ => Err(ProtocolError::MissingWorkerId {
                kind: self.kind.to_string(),
            }),
        }
    }

    /// Decode the payload into a typed shape.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| ProtocolError::InvalidPayload {
            kind: self.kind.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Current time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

fn state_value(state: &WorkerState) -> Value {
    serde_json::to_value(state).unwrap_or_else(|_| empty_object())
}
