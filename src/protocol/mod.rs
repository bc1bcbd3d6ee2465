//! Wire protocol — envelopes and the worker state model.

pub mod envelope;
pub mod model;

pub use envelope::{CommandPayload, Envelope, EnvelopeKind, ErrorPayload, now_millis};
pub use model::{StatePatch, Vec3, WorkerState, WorkerStatus};
