use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Med,
    High,
}

impl Priority {
    /// Ranking weight; higher is placed first.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 3,
            Priority::Med => 2,
            Priority::Low => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Med => "med",
            Priority::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Priority::Low),
            "med" => Some(Priority::Med),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

/// Local time-of-day window as `"HH:mm"` strings. Parsed strictly at placement
/// time; if either end is malformed the working hours are used instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferredWindow {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecurrenceFrequency {
    Daily,
    Weekly,
    Monthly,
}

impl RecurrenceFrequency {
    pub fn as_str(self) -> &'static str {
        match self {
            RecurrenceFrequency::Daily => "DAILY",
            RecurrenceFrequency::Weekly => "WEEKLY",
            RecurrenceFrequency::Monthly => "MONTHLY",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "DAILY" => Some(RecurrenceFrequency::Daily),
            "WEEKLY" => Some(RecurrenceFrequency::Weekly),
            "MONTHLY" => Some(RecurrenceFrequency::Monthly),
            _ => None,
        }
    }
}

/// Recurrence metadata carried through scheduling untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceDescriptor {
    pub freq: RecurrenceFrequency,
    pub interval: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_weekday: Option<Vec<u32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(
        default,
        rename = "deadlineISO",
        skip_serializing_if = "Option::is_none"
    )]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_window: Option<PreferredWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<RecurrenceDescriptor>,
}

impl TaskRequest {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            duration_min: None,
            priority: None,
            deadline: None,
            preferred_window: None,
            recurrence: None,
        }
    }

    pub fn with_duration(mut self, minutes: i64) -> Self {
        self.duration_min = Some(minutes);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_preferred_window(mut self, start: &str, end: &str) -> Self {
        self.preferred_window = Some(PreferredWindow {
            start: start.to_string(),
            end: end.to_string(),
        });
        self
    }

    pub fn with_recurrence(mut self, recurrence: RecurrenceDescriptor) -> Self {
        self.recurrence = Some(recurrence);
        self
    }
}

/// A task with duration and priority resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedTask {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub duration_min: i64,
    pub priority: Priority,
    #[serde(
        default,
        rename = "deadlineISO",
        skip_serializing_if = "Option::is_none"
    )]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_window: Option<PreferredWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<RecurrenceDescriptor>,
}

/// Scheduler output. `start_at`/`end_at` are absent when no slot was found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTask {
    #[serde(flatten)]
    pub task: NormalizedTask,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub auto: bool,
}

impl ScheduledTask {
    pub fn placed(task: NormalizedTask, start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> Self {
        Self {
            task,
            start_at: Some(start_at),
            end_at: Some(end_at),
            auto: true,
        }
    }

    pub fn unplaced(task: NormalizedTask) -> Self {
        Self {
            task,
            start_at: None,
            end_at: None,
            auto: false,
        }
    }

    pub fn is_placed(&self) -> bool {
        self.start_at.is_some() && self.end_at.is_some()
    }

    pub fn interval(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.start_at, self.end_at) {
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        }
    }
}

/// A persisted task as returned by the commitment store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTask {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub duration_min: Option<i64>,
    pub priority: Priority,
    pub recurrence_rule_id: Option<String>,
    pub auto_scheduled: bool,
    pub created_at: String,
    pub updated_at: String,
}
