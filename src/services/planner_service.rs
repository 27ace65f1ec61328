use std::sync::Arc;

use chrono::{DateTime, Days, Duration, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::planning::{
    CalendarItem, CalendarQuery, CalendarView, ConstraintOverrides, PlanResponse,
    PlannedTaskSummary, PlannerRequest, SchedulingConstraints, TimeRange, WorkHours,
};
use crate::models::settings::{parse_timezone, PlannerSettings};
use crate::models::task::{ScheduledTask, TaskRequest};
use crate::services::auto_scheduler::AutoScheduler;
use crate::services::brief_extraction::BriefExtractionService;
use crate::services::calendar_service::ExternalCalendar;
use crate::services::commitment_store::{CommitmentStore, PersistOptions};
use crate::services::schedule_utils;
use crate::services::task_ranker::normalize_tasks;

/// Orchestrates extraction, placement, persistence and calendar sync for one
/// planning request.
#[derive(Clone)]
pub struct PlannerService {
    settings: PlannerSettings,
    scheduler: AutoScheduler,
    extraction: BriefExtractionService,
    store: Arc<dyn CommitmentStore>,
    calendar: Arc<dyn ExternalCalendar>,
}

impl PlannerService {
    pub fn new(
        settings: PlannerSettings,
        extraction: BriefExtractionService,
        store: Arc<dyn CommitmentStore>,
        calendar: Arc<dyn ExternalCalendar>,
    ) -> Self {
        Self {
            scheduler: AutoScheduler::from_settings(&settings),
            settings,
            extraction,
            store,
            calendar,
        }
    }

    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    pub async fn create_plan(
        &self,
        user_id: &str,
        request: PlannerRequest,
        now: DateTime<Utc>,
    ) -> AppResult<PlanResponse> {
        let overrides = request.constraints.clone().unwrap_or_default();
        let timezone = self.resolve_timezone(&overrides)?;

        let mut tasks = request.tasks.clone().unwrap_or_default();
        validate_tasks(&tasks)?;
        validate_working_days(overrides.working_days.as_deref())?;

        if let Some(brief) = request.brief.as_deref() {
            if self.extraction.is_enabled() && !brief.trim().is_empty() {
                let extracted = self
                    .extraction
                    .parse_brief(brief, timezone.name(), now)
                    .await?;
                info!(
                    target: "app::planner",
                    user_id,
                    provider = self.extraction.provider_id(),
                    extracted = extracted.len(),
                    "brief merged into plan"
                );
                tasks.extend(extracted);
            }
        }

        let mut notes = Vec::new();
        let scheduled = if request.autoschedule {
            let constraints = self.build_constraints(&overrides, timezone);
            let range = existing_range(now, &constraints);
            let existing = self.store.fetch_existing(user_id, range)?;
            let scheduled = self.scheduler.schedule(&tasks, &constraints, &existing, now);

            notes.extend(scheduled.iter().filter(|task| !task.is_placed()).map(|task| {
                format!(
                    "Could not schedule \"{}\" within {} days",
                    task.task.title, constraints.horizon_days
                )
            }));
            scheduled
        } else {
            normalize_tasks(&tasks, self.scheduler.defaults())
                .into_iter()
                .map(ScheduledTask::unplaced)
                .collect()
        };

        let stored = self.store.persist(
            user_id,
            &scheduled,
            &PersistOptions {
                timezone: timezone.name().to_string(),
                auto_scheduled: request.autoschedule,
            },
        )?;

        if request.sync_to_calendar != Some(false) {
            let ack = self.calendar.sync_tasks(user_id, &stored).await?;
            if !ack.ok {
                warn!(
                    target: "app::planner",
                    user_id,
                    provider = self.calendar.provider_id(),
                    "calendar sync not acknowledged"
                );
                notes.push("Calendar sync was not acknowledged".to_string());
            }
        }

        info!(
            target: "app::planner",
            user_id,
            created = stored.len(),
            unscheduled = scheduled.iter().filter(|task| !task.is_placed()).count(),
            autoschedule = request.autoschedule,
            "plan created"
        );

        Ok(PlanResponse {
            scheduled: stored
                .iter()
                .map(|task| PlannedTaskSummary {
                    id: task.id.clone(),
                    title: task.title.clone(),
                    start_at: task.start_at,
                    end_at: task.end_at,
                    priority: task.priority,
                })
                .collect(),
            created: stored.len(),
            updated: 0,
            notes,
        })
    }

    pub async fn get_calendar(&self, user_id: &str, query: CalendarQuery) -> AppResult<CalendarView> {
        if let (Some(from), Some(to)) = (query.from, query.to) {
            if from > to {
                return Err(AppError::validation("calendar range starts after it ends"));
            }
        }

        let mut items: Vec<CalendarItem> = self
            .store
            .list_calendar(user_id, query.from, query.to)?
            .into_iter()
            .map(CalendarItem::Task)
            .collect();

        if query.include_external {
            let external = self
                .calendar
                .list_external_events(user_id, query.from, query.to)
                .await?;
            items.extend(external.into_iter().map(CalendarItem::External));
        }

        Ok(CalendarView { items })
    }

    fn resolve_timezone(&self, overrides: &ConstraintOverrides) -> AppResult<Tz> {
        match overrides.timezone.as_deref() {
            Some(raw) if !raw.trim().is_empty() => parse_timezone(raw),
            _ => Ok(self.settings.timezone),
        }
    }

    fn build_constraints(&self, overrides: &ConstraintOverrides, timezone: Tz) -> SchedulingConstraints {
        SchedulingConstraints {
            working_days: overrides
                .working_days
                .clone()
                .unwrap_or_else(|| self.settings.default_working_days.clone()),
            work_hours: overrides
                .work_hours
                .as_ref()
                .map(|hours| WorkHours::from_hm(&hours.start, &hours.end))
                .unwrap_or(self.settings.default_work_hours),
            horizon_days: overrides
                .horizon_days
                .unwrap_or(self.settings.default_horizon_days),
            no_overlap: overrides.no_overlap.unwrap_or(self.settings.no_overlap),
            timezone,
        }
    }
}

fn validate_tasks(tasks: &[TaskRequest]) -> AppResult<()> {
    for (index, task) in tasks.iter().enumerate() {
        if task.title.trim().is_empty() {
            return Err(AppError::validation(format!("task {index} has an empty title")));
        }
        if let Some(minutes) = task.duration_min {
            if minutes <= 0 {
                return Err(AppError::validation(format!(
                    "task \"{}\" must have a positive duration",
                    task.title
                )));
            }
        }
    }
    Ok(())
}

fn validate_working_days(days: Option<&[u32]>) -> AppResult<()> {
    match days {
        Some(days) if days.iter().any(|day| !(1..=7).contains(day)) => Err(AppError::validation(
            "working days must be ISO weekdays between 1 and 7",
        )),
        _ => Ok(()),
    }
}

/// `[start of local today, start of the local day after the horizon)`.
///
/// Both ends are local midnights so a 25-hour day inside the horizon still
/// covers the whole last day the scheduler may use.
fn existing_range(now: DateTime<Utc>, constraints: &SchedulingConstraints) -> Option<TimeRange> {
    let tz = constraints.timezone;
    let today = schedule_utils::local_date(now, tz);
    let from = schedule_utils::zoned_instant(tz, today, 0, 0).unwrap_or(now - Duration::days(1));
    let days_after = Days::new(u64::from(constraints.horizon_days) + 1);
    let to = match today
        .checked_add_days(days_after)
        .and_then(|day| schedule_utils::zoned_instant(tz, day, 0, 0))
    {
        Some(midnight) => midnight,
        None => now.checked_add_days(days_after)?,
    };
    Some(TimeRange { from, to })
}
