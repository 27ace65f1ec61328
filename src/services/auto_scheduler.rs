use chrono::{DateTime, Days, NaiveDate, Utc};
use tracing::{debug, info};

use crate::models::planning::{ExistingCommitment, SchedulingConstraints, WorkHours};
use crate::models::settings::PlannerSettings;
use crate::models::task::{NormalizedTask, ScheduledTask, TaskRequest};
use crate::services::schedule_utils;
use crate::services::task_ranker::{normalize_tasks, rank_tasks, TaskDefaults};

/// Granularity of the slot search.
pub const SLOT_STEP_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

/// Intervals a placement must avoid: the existing commitments plus everything
/// placed so far in the current run.
#[derive(Debug, Clone, Default)]
pub struct BusySet {
    intervals: Vec<(DateTime<Utc>, DateTime<Utc>)>,
}

impl BusySet {
    pub fn from_commitments(existing: &[ExistingCommitment]) -> Self {
        Self {
            intervals: existing
                .iter()
                .map(|commitment| (commitment.start_at, commitment.end_at))
                .collect(),
        }
    }

    pub fn is_free(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        !self
            .intervals
            .iter()
            .any(|(busy_start, busy_end)| schedule_utils::overlaps(start, end, *busy_start, *busy_end))
    }

    pub fn insert(&mut self, slot: Slot) {
        self.intervals.push((slot.start_at, slot.end_at));
    }
}

/// The task's preferred window when both ends are well-formed, otherwise the
/// constraints' working hours.
pub fn resolve_window(task: &NormalizedTask, constraints: &SchedulingConstraints) -> WorkHours {
    task.preferred_window
        .as_ref()
        .and_then(|window| {
            let start = schedule_utils::parse_hm_strict(&window.start)?;
            let end = schedule_utils::parse_hm_strict(&window.end)?;
            Some(WorkHours::new(start, end))
        })
        .unwrap_or(constraints.work_hours)
}

/// First free slot for `task` on the local calendar `day`, walking the window in
/// `SLOT_STEP_MINUTES` increments. `None` means the day has no room.
pub fn find_slot(
    day: NaiveDate,
    task: &NormalizedTask,
    constraints: &SchedulingConstraints,
    busy: &BusySet,
) -> Option<Slot> {
    if task.duration_min <= 0 {
        return None;
    }

    let window = resolve_window(task, constraints);
    let tz = constraints.timezone;
    let mut candidate = schedule_utils::zoned_instant_at(tz, day, window.start)?;
    let limit = schedule_utils::zoned_instant_at(tz, day, window.end)?;

    loop {
        let end = schedule_utils::add_minutes(candidate, task.duration_min)?;
        if end > limit {
            return None;
        }
        if !constraints.no_overlap || busy.is_free(candidate, end) {
            return Some(Slot {
                start_at: candidate,
                end_at: end,
            });
        }
        candidate = schedule_utils::add_minutes(candidate, SLOT_STEP_MINUTES)?;
    }
}

/// Greedy placement of tasks into working windows across a day horizon.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoScheduler {
    defaults: TaskDefaults,
}

impl AutoScheduler {
    pub fn new(defaults: TaskDefaults) -> Self {
        Self { defaults }
    }

    pub fn from_settings(settings: &PlannerSettings) -> Self {
        Self::new(TaskDefaults {
            duration_min: settings.default_duration_min,
            priority: settings.default_priority,
        })
    }

    pub fn defaults(&self) -> &TaskDefaults {
        &self.defaults
    }

    /// Places every task at the earliest free slot, highest rank first.
    ///
    /// Days are counted in calendar days from the local date of `now` in the
    /// constraints' timezone, up to and including `horizon_days`. Tasks that fit
    /// nowhere come back without an interval. Output follows ranked order.
    pub fn schedule(
        &self,
        tasks: &[TaskRequest],
        constraints: &SchedulingConstraints,
        existing: &[ExistingCommitment],
        now: DateTime<Utc>,
    ) -> Vec<ScheduledTask> {
        let ranked = rank_tasks(normalize_tasks(tasks, &self.defaults));
        let mut busy = BusySet::from_commitments(existing);
        let today = schedule_utils::local_date(now, constraints.timezone);
        let mut scheduled = Vec::with_capacity(ranked.len());

        for task in ranked {
            match self.place(&task, constraints, &busy, today) {
                Some(slot) => {
                    debug!(
                        target: "app::scheduler",
                        title = %task.title,
                        start_at = %schedule_utils::format_instant(slot.start_at),
                        end_at = %schedule_utils::format_instant(slot.end_at),
                        "task placed"
                    );
                    busy.insert(slot);
                    scheduled.push(ScheduledTask::placed(task, slot.start_at, slot.end_at));
                }
                None => {
                    debug!(
                        target: "app::scheduler",
                        title = %task.title,
                        horizon_days = constraints.horizon_days,
                        "no slot within horizon"
                    );
                    scheduled.push(ScheduledTask::unplaced(task));
                }
            }
        }

        info!(
            target: "app::scheduler",
            total = scheduled.len(),
            placed = scheduled.iter().filter(|task| task.is_placed()).count(),
            existing = existing.len(),
            "auto-schedule finished"
        );

        scheduled
    }

    fn place(
        &self,
        task: &NormalizedTask,
        constraints: &SchedulingConstraints,
        busy: &BusySet,
        today: NaiveDate,
    ) -> Option<Slot> {
        (0..=u64::from(constraints.horizon_days))
            .map_while(|offset| today.checked_add_days(Days::new(offset)))
            .filter(|day| constraints.is_working_day(schedule_utils::day_of_week(*day)))
            .find_map(|day| find_slot(day, task, constraints, busy))
    }
}
