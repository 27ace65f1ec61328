use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::repositories::recurrence_rule_repository::{
    RecurrenceRuleRepository, RecurrenceRuleRow,
};
use crate::db::repositories::task_repository::{TaskRepository, TaskRow};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::planning::{ExistingCommitment, TimeRange};
use crate::models::recurrence::RecurrenceRuleRecord;
use crate::models::task::{ScheduledTask, StoredTask};
use crate::services::schedule_utils;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistOptions {
    /// IANA name stamped on created recurrence rules.
    pub timezone: String,
    pub auto_scheduled: bool,
}

/// Source of committed time blocks and sink for finished schedules.
pub trait CommitmentStore: Send + Sync {
    fn fetch_existing(
        &self,
        user_id: &str,
        range: Option<TimeRange>,
    ) -> AppResult<Vec<ExistingCommitment>>;

    fn persist(
        &self,
        user_id: &str,
        scheduled: &[ScheduledTask],
        options: &PersistOptions,
    ) -> AppResult<Vec<StoredTask>>;

    fn list_calendar(
        &self,
        user_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<StoredTask>>;
}

#[derive(Clone)]
pub struct SqliteCommitmentStore {
    db: DbPool,
}

impl SqliteCommitmentStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &DbPool {
        &self.db
    }

    pub fn get_task(&self, id: &str) -> AppResult<StoredTask> {
        self.db
            .with_connection(|conn| TaskRepository::find_by_id(conn, id))?
            .ok_or_else(AppError::not_found)?
            .into_record()
    }

    pub fn get_recurrence_rule(&self, id: &str) -> AppResult<RecurrenceRuleRecord> {
        self.db
            .with_connection(|conn| RecurrenceRuleRepository::find_by_id(conn, id))?
            .ok_or_else(AppError::not_found)?
            .into_record()
    }
}

impl CommitmentStore for SqliteCommitmentStore {
    fn fetch_existing(
        &self,
        user_id: &str,
        range: Option<TimeRange>,
    ) -> AppResult<Vec<ExistingCommitment>> {
        let from = range.map(|r| schedule_utils::format_instant(r.from));
        let to = range.map(|r| schedule_utils::format_instant(r.to));

        let rows = self.db.with_connection(|conn| {
            TaskRepository::list_timed_overlapping(conn, user_id, from.as_deref(), to.as_deref())
        })?;

        let mut commitments = Vec::with_capacity(rows.len());
        for row in rows {
            let task = row.into_record()?;
            if let (Some(start_at), Some(end_at)) = (task.start_at, task.end_at) {
                commitments.push(ExistingCommitment::new(start_at, end_at));
            }
        }

        debug!(target: "app::db", user_id, count = commitments.len(), "existing commitments fetched");
        Ok(commitments)
    }

    fn persist(
        &self,
        user_id: &str,
        scheduled: &[ScheduledTask],
        options: &PersistOptions,
    ) -> AppResult<Vec<StoredTask>> {
        let now = Utc::now().to_rfc3339();

        let stored = self.db.with_transaction(|tx| {
            let mut stored = Vec::with_capacity(scheduled.len());

            for item in scheduled {
                let recurrence_rule_id = match &item.task.recurrence {
                    Some(recurrence) => {
                        let rule = RecurrenceRuleRecord {
                            id: Uuid::new_v4().to_string(),
                            user_id: user_id.to_string(),
                            freq: recurrence.freq,
                            interval: recurrence.interval,
                            by_weekday: recurrence.by_weekday.clone(),
                            until: None,
                            count: None,
                            timezone: options.timezone.clone(),
                            created_at: now.clone(),
                        };
                        RecurrenceRuleRepository::insert(
                            tx,
                            &RecurrenceRuleRow::from_record(&rule)?,
                        )?;
                        Some(rule.id)
                    }
                    None => None,
                };

                let record = StoredTask {
                    id: Uuid::new_v4().to_string(),
                    user_id: user_id.to_string(),
                    title: item.task.title.clone(),
                    description: item.task.description.clone(),
                    status: "todo".to_string(),
                    start_at: item.start_at,
                    end_at: item.end_at,
                    duration_min: Some(item.task.duration_min),
                    priority: item.task.priority,
                    recurrence_rule_id,
                    auto_scheduled: options.auto_scheduled,
                    created_at: now.clone(),
                    updated_at: now.clone(),
                };
                TaskRepository::insert(tx, &TaskRow::from_record(&record))?;
                stored.push(record);
            }

            Ok(stored)
        })?;

        info!(target: "app::db", user_id, count = stored.len(), "schedule persisted");
        Ok(stored)
    }

    fn list_calendar(
        &self,
        user_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<StoredTask>> {
        let from = from.map(schedule_utils::format_instant);
        let to = to.map(schedule_utils::format_instant);

        let rows = self.db.with_connection(|conn| {
            TaskRepository::list_for_calendar(conn, user_id, from.as_deref(), to.as_deref())
        })?;

        rows.into_iter()
            .map(|row| row.into_record())
            .collect::<AppResult<Vec<_>>>()
    }
}
