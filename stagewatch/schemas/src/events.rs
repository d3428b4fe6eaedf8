//! Stage event types.
//!
//! A stage event records one stage of one pipeline run entering a status.
//! Events are immutable once produced and are identified by `id`; the same
//! event may be delivered more than once through different channels.

use std::fmt;

use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single stage transition reported by the pipeline.
///
/// # Examples
///
/// ```
/// use stagewatch_schemas::{EventStatus, StageEvent};
///
/// let event = StageEvent::builder()
///     .id("evt-1")
///     .run_id("run-1")
///     .stage("parsing_jd")
///     .status(EventStatus::Completed)
///     .build();
///
/// assert!(event.error.is_none());
/// assert!(event.metadata.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "schema_gen", derive(schemars::JsonSchema))]
pub struct StageEvent {
    /// Unique identifier of the event, used as the deduplication key
    #[builder(into)]
    pub id: String,

    /// Identifier of the pipeline run this event belongs to
    #[serde(rename = "pipeline_run_id", alias = "run_id")]
    #[builder(into)]
    pub run_id: String,

    /// Name of the stage, normally one of the configured stage names
    #[builder(into)]
    pub stage: String,

    /// Status the stage entered
    pub status: EventStatus,

    /// Error message, only meaningful for `failed` events
    #[serde(default)]
    #[builder(into)]
    pub error: Option<String>,

    /// Opaque metadata attached by the producer
    #[serde(default)]
    #[builder(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Creation time as reported by the producer
    #[serde(default = "Utc::now")]
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}

impl StageEvent {
    /// Returns true if this event reports a failure
    pub fn is_failure(&self) -> bool {
        self.status == EventStatus::Failed
    }
}

/// Status a stage can report.
///
/// Statuses that are not part of the known set are preserved as
/// [`EventStatus::Unknown`] so that a newer producer never breaks
/// deserialization of an older consumer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventStatus {
    Started,
    Completed,
    Failed,
    Cancelled,
    Unknown(String),
}

impl EventStatus {
    pub fn as_str(&self) -> &str {
        match self {
            EventStatus::Started => "started",
            EventStatus::Completed => "completed",
            EventStatus::Failed => "failed",
            EventStatus::Cancelled => "cancelled",
            EventStatus::Unknown(raw) => raw.as_str(),
        }
    }
}

impl From<String> for EventStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "started" => EventStatus::Started,
            "completed" => EventStatus::Completed,
            "failed" => EventStatus::Failed,
            "cancelled" => EventStatus::Cancelled,
            _ => EventStatus::Unknown(value),
        }
    }
}

impl From<&str> for EventStatus {
    fn from(value: &str) -> Self {
        EventStatus::from(value.to_string())
    }
}

impl From<EventStatus> for String {
    fn from(value: EventStatus) -> Self {
        match value {
            EventStatus::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "schema_gen")]
impl schemars::JsonSchema for EventStatus {
    fn schema_name() -> String {
        "EventStatus".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}
