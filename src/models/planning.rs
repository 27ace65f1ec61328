use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::models::task::{Priority, StoredTask, TaskRequest};
use crate::services::schedule_utils;

/// Local start/end time-of-day of a working day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl WorkHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Builds from `"HH:mm"` strings; malformed components fall back to zero.
    pub fn from_hm(start: &str, end: &str) -> Self {
        Self {
            start: schedule_utils::parse_hm(start),
            end: schedule_utils::parse_hm(end),
        }
    }
}

/// Per-run placement rules.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulingConstraints {
    /// ISO weekdays, Monday = 1 .. Sunday = 7.
    pub working_days: Vec<u32>,
    pub work_hours: WorkHours,
    pub horizon_days: u32,
    pub no_overlap: bool,
    pub timezone: Tz,
}

impl SchedulingConstraints {
    pub fn is_working_day(&self, weekday: u32) -> bool {
        self.working_days.contains(&weekday)
    }
}

/// A block the scheduler must not collide with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingCommitment {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

impl ExistingCommitment {
    pub fn new(start_at: DateTime<Utc>, end_at: DateTime<Utc>) -> Self {
        Self { start_at, end_at }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoursInput {
    pub start: String,
    pub end: String,
}

/// Request-level constraint overrides; missing fields fall back to settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintOverrides {
    #[serde(default)]
    pub working_days: Option<Vec<u32>>,
    #[serde(default)]
    pub work_hours: Option<HoursInput>,
    #[serde(default)]
    pub no_overlap: Option<bool>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub horizon_days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlannerRequest {
    #[serde(default)]
    pub brief: Option<String>,
    #[serde(default)]
    pub tasks: Option<Vec<TaskRequest>>,
    #[serde(default)]
    pub constraints: Option<ConstraintOverrides>,
    #[serde(default)]
    pub autoschedule: bool,
    #[serde(default)]
    pub sync_to_calendar: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedTaskSummary {
    pub id: String,
    pub title: String,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    pub scheduled: Vec<PlannedTaskSummary>,
    pub created: usize,
    pub updated: usize,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalEvent {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CalendarQuery {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub include_external: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "camelCase")]
pub enum CalendarItem {
    Task(StoredTask),
    External(ExternalEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarView {
    pub items: Vec<CalendarItem>,
}
