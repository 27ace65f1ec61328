use std::cmp::Ordering;

use crate::models::task::{NormalizedTask, Priority, TaskRequest};

/// Values applied to tasks that omit duration or priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskDefaults {
    pub duration_min: i64,
    pub priority: Priority,
}

impl Default for TaskDefaults {
    fn default() -> Self {
        Self {
            duration_min: crate::models::settings::DEFAULT_DURATION_MIN,
            priority: Priority::Med,
        }
    }
}

pub fn normalize_task(task: &TaskRequest, defaults: &TaskDefaults) -> NormalizedTask {
    NormalizedTask {
        title: task.title.clone(),
        description: task.description.clone(),
        duration_min: task.duration_min.unwrap_or(defaults.duration_min),
        priority: task.priority.unwrap_or(defaults.priority),
        deadline: task.deadline,
        preferred_window: task.preferred_window.clone(),
        recurrence: task.recurrence.clone(),
    }
}

/// Fills defaults, keeping input order.
pub fn normalize_tasks(tasks: &[TaskRequest], defaults: &TaskDefaults) -> Vec<NormalizedTask> {
    tasks
        .iter()
        .map(|task| normalize_task(task, defaults))
        .collect()
}

/// Placement order: priority (high first), then earliest deadline (none last),
/// then longest duration. Ties keep their input order.
pub fn compare_for_placement(a: &NormalizedTask, b: &NormalizedTask) -> Ordering {
    b.priority
        .rank()
        .cmp(&a.priority.rank())
        .then_with(|| match (a.deadline, b.deadline) {
            (Some(a_due), Some(b_due)) => a_due.cmp(&b_due),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| b.duration_min.cmp(&a.duration_min))
}

pub fn rank_tasks(mut tasks: Vec<NormalizedTask>) -> Vec<NormalizedTask> {
    // sort_by is stable
    tasks.sort_by(compare_for_placement);
    tasks
}
