use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::{AppError, AppResult};
use crate::models::task::{Priority, StoredTask};
use crate::services::schedule_utils;

const BASE_SELECT: &str = r#"
    SELECT
        id,
        user_id,
        title,
        description,
        status,
        start_at,
        end_at,
        duration_min,
        priority,
        recurrence_rule_id,
        auto_scheduled,
        created_at,
        updated_at
    FROM tasks
"#;

#[derive(Debug, Clone)]
pub struct TaskRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub start_at: Option<String>,
    pub end_at: Option<String>,
    pub duration_min: Option<i64>,
    pub priority: String,
    pub recurrence_rule_id: Option<String>,
    pub auto_scheduled: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl TaskRow {
    pub fn from_record(record: &StoredTask) -> Self {
        Self {
            id: record.id.clone(),
            user_id: record.user_id.clone(),
            title: record.title.clone(),
            description: record.description.clone(),
            status: record.status.clone(),
            start_at: record.start_at.map(schedule_utils::format_instant),
            end_at: record.end_at.map(schedule_utils::format_instant),
            duration_min: record.duration_min,
            priority: record.priority.as_str().to_string(),
            recurrence_rule_id: record.recurrence_rule_id.clone(),
            auto_scheduled: record.auto_scheduled,
            created_at: record.created_at.clone(),
            updated_at: record.updated_at.clone(),
        }
    }

    pub fn into_record(self) -> AppResult<StoredTask> {
        let priority = Priority::parse(&self.priority).ok_or_else(|| {
            AppError::database(format!("task {} has unknown priority {}", self.id, self.priority))
        })?;

        Ok(StoredTask {
            start_at: parse_stored_instant(&self.id, self.start_at)?,
            end_at: parse_stored_instant(&self.id, self.end_at)?,
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            description: self.description,
            status: self.status,
            duration_min: self.duration_min,
            priority,
            recurrence_rule_id: self.recurrence_rule_id,
            auto_scheduled: self.auto_scheduled,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl TryFrom<&Row<'_>> for TaskRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(TaskRow {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            status: row.get("status")?,
            start_at: row.get("start_at")?,
            end_at: row.get("end_at")?,
            duration_min: row.get("duration_min")?,
            priority: row.get("priority")?,
            recurrence_rule_id: row.get("recurrence_rule_id")?,
            auto_scheduled: row.get::<_, i64>("auto_scheduled")? != 0,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub struct TaskRepository;

impl TaskRepository {
    pub fn insert(conn: &Connection, row: &TaskRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO tasks (
                    id,
                    user_id,
                    title,
                    description,
                    status,
                    start_at,
                    end_at,
                    duration_min,
                    priority,
                    recurrence_rule_id,
                    auto_scheduled,
                    created_at,
                    updated_at
                ) VALUES (
                    :id,
                    :user_id,
                    :title,
                    :description,
                    :status,
                    :start_at,
                    :end_at,
                    :duration_min,
                    :priority,
                    :recurrence_rule_id,
                    :auto_scheduled,
                    :created_at,
                    :updated_at
                )
            "#,
            named_params! {
                ":id": &row.id,
                ":user_id": &row.user_id,
                ":title": &row.title,
                ":description": &row.description,
                ":status": &row.status,
                ":start_at": &row.start_at,
                ":end_at": &row.end_at,
                ":duration_min": &row.duration_min,
                ":priority": &row.priority,
                ":recurrence_rule_id": &row.recurrence_rule_id,
                ":auto_scheduled": row.auto_scheduled as i64,
                ":created_at": &row.created_at,
                ":updated_at": &row.updated_at,
            },
        )?;

        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<TaskRow>> {
        let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", BASE_SELECT))?;
        let row = stmt
            .query_row([id], |row| TaskRow::try_from(row))
            .optional()?;
        Ok(row)
    }

    /// Tasks of `user_id` with both ends set that intersect `[from, to)`.
    /// Bounds are RFC 3339 UTC strings as produced by `format_instant`.
    pub fn list_timed_overlapping(
        conn: &Connection,
        user_id: &str,
        from: Option<&str>,
        to: Option<&str>,
    ) -> AppResult<Vec<TaskRow>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE user_id = :user_id
                AND start_at IS NOT NULL
                AND end_at IS NOT NULL
                AND (:to IS NULL OR start_at < :to)
                AND (:from IS NULL OR end_at > :from)
              ORDER BY start_at ASC",
            BASE_SELECT
        ))?;
        let rows = stmt
            .query_map(
                named_params! { ":user_id": user_id, ":from": from, ":to": to },
                |row| TaskRow::try_from(row),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Calendar listing: tasks whose start falls in `[from, to]`; unscheduled
    /// tasks are only included when no bound is given. Ordered by start.
    pub fn list_for_calendar(
        conn: &Connection,
        user_id: &str,
        from: Option<&str>,
        to: Option<&str>,
    ) -> AppResult<Vec<TaskRow>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE user_id = :user_id
                AND (:from IS NULL OR start_at >= :from)
                AND (:to IS NULL OR start_at <= :to)
              ORDER BY start_at ASC, created_at ASC",
            BASE_SELECT
        ))?;
        let rows = stmt
            .query_map(
                named_params! { ":user_id": user_id, ":from": from, ":to": to },
                |row| TaskRow::try_from(row),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count_for_user(conn: &Connection, user_id: &str) -> AppResult<i64> {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )?)
    }
}

fn parse_stored_instant(
    id: &str,
    raw: Option<String>,
) -> AppResult<Option<chrono::DateTime<chrono::Utc>>> {
    match raw {
        Some(value) => schedule_utils::parse_instant(&value)
            .map(Some)
            .ok_or_else(|| AppError::database(format!("task {id} has invalid timestamp {value}"))),
        None => Ok(None),
    }
}
