//! Worker state data model — status, pose, and partial updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reported status of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Connected and waiting for work.
    Idle,
    /// Executing a task.
    Working,
    /// Reported a fault.
    Error,
    /// Not connected (disconnected, evicted, or terminated).
    Offline,
}

impl Default for WorkerStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Working => write!(f, "working"),
            Self::Error => write!(f, "error"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

impl std::str::FromStr for WorkerStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "working" => Ok(Self::Working),
            "error" => Ok(Self::Error),
            "offline" => Ok(Self::Offline),
            _ => Err(format!("Unknown worker status: {}", s)),
        }
    }
}

/// A point or orientation in 3D space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Last-known state of a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerState {
    /// Worker identifier.
    pub id: String,
    /// Whether the worker is live and accepting commands.
    pub active: bool,
    /// Current status.
    pub status: WorkerStatus,
    /// Position in world space.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec3>,
    /// Orientation as Euler angles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Vec3>,
    /// Battery charge, 0–100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<f64>,
    /// Label of the task being executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
    /// When the record last changed (epoch milliseconds on the wire).
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl WorkerState {
    /// A freshly seen worker: active and idle, with no pose or battery yet.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            active: true,
            status: WorkerStatus::Idle,
            position: None,
            rotation: None,
            battery_level: None,
            current_task: None,
            timestamp: Utc::now(),
        }
    }

    /// Synthetic record for a worker that cannot be reached.
    pub fn offline(id: impl Into<String>) -> Self {
        Self {
            active: false,
            status: WorkerStatus::Offline,
            ..Self::new(id)
        }
    }

    /// Mark offline while keeping pose, battery and task as historical context.
    pub fn set_offline(&mut self) {
        self.active = false;
        self.status = WorkerStatus::Offline;
        self.timestamp = Utc::now();
    }

    pub fn is_offline(&self) -> bool {
        self.status == WorkerStatus::Offline
    }
}

/// A full or partial state report.
///
/// Fields left out of the report are left untouched when the patch is applied.
/// `id` and `timestamp` are accepted on the wire but ignored: the identifier
/// comes from the envelope and the store stamps its own time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkerStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl StatePatch {
    /// Shallow-merge this patch into `state` and stamp the current time.
    pub fn apply_to(&self, state: &mut WorkerState) {
        if let Some(active) = self.active {
            state.active = active;
        }
        if let Some(status) = self.status {
            state.status = status;
        }
        if let Some(position) = self.position {
            state.position = Some(position);
        }
        if let Some(rotation) = self.rotation {
            state.rotation = Some(rotation);
        }
        if let Some(level) = self.battery_level {
            state.battery_level = Some(level.clamp(0.0, 100.0));
        }
        if let Some(ref task) = self.current_task {
            state.current_task = Some(task.clone());
        }
        state.timestamp = Utc::now();
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_none()
            && self.status.is_none()
            && self.position.is_none()
            && self.rotation.is_none()
            && self.battery_level.is_none()
            && self.current_task.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_worker_is_active_and_idle() {
        let state = WorkerState::new("w1");
        assert!(state.active);
        assert_eq!(state.status, WorkerStatus::Idle);
        assert!(state.battery_level.is_none());
    }

    #[test]
    fn patch_merges_only_present_fields() {
        let mut state = WorkerState::new("w1");
        state.battery_level = Some(90.0);
        state.current_task = Some("survey".into());

        let patch = StatePatch {
            status: Some(WorkerStatus::Working),
            position: Some(Vec3::new(1.0, 2.0, 3.0)),
            ..Default::default()
        };
        patch.apply_to(&mut state);

        assert_eq!(state.status, WorkerStatus::Working);
        assert_eq!(state.position, Some(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(state.battery_level, Some(90.0));
        assert_eq!(state.current_task.as_deref(), Some("survey"));
    }

    #[test]
    fn battery_level_is_clamped() {
        let mut state = WorkerState::new("w1");
        StatePatch {
            battery_level: Some(140.0),
            ..Default::default()
        }
        .apply_to(&mut state);
        assert_eq!(state.battery_level, Some(100.0));

        StatePatch {
            battery_level: Some(-3.0),
            ..Default::default()
        }
        .apply_to(&mut state);
        assert_eq!(state.battery_level, Some(0.0));
    }

    #[test]
    fn set_offline_keeps_history() {
        let mut state = WorkerState::new("w1");
        state.battery_level = Some(42.0);
        state.position = Some(Vec3::new(0.5, 0.0, -1.0));
        state.set_offline();

        assert!(!state.active);
        assert!(state.is_offline());
        assert_eq!(state.battery_level, Some(42.0));
        assert!(state.position.is_some());
    }

    #[test]
    fn state_serializes_camel_case_with_millis() {
        let mut state = WorkerState::new("w1");
        state.battery_level = Some(80.0);
        state.current_task = Some("dock".into());
        let json = serde_json::to_value(&state).unwrap();

        assert_eq!(json["id"], "w1");
        assert_eq!(json["status"], "idle");
        assert_eq!(json["batteryLevel"].as_f64(), Some(80.0));
        assert_eq!(json["currentTask"], "dock");
        assert!(json["timestamp"].is_i64());
        assert!(json.get("position").is_none());
    }

    #[test]
    fn partial_report_deserializes() {
        let patch: StatePatch =
            serde_json::from_str(r#"{"batteryLevel": 80, "status": "idle", "extra": true}"#)
                .unwrap();
        assert_eq!(patch.battery_level, Some(80.0));
        assert_eq!(patch.status, Some(WorkerStatus::Idle));
        assert!(patch.active.is_none());
        assert!(!patch.is_empty());
        assert!(StatePatch::default().is_empty());
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!("sleeping".parse::<WorkerStatus>().is_err());
        assert!(serde_json::from_str::<StatePatch>(r#"{"status": "sleeping"}"#).is_err());
    }
}
