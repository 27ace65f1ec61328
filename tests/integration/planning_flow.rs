use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use smart_planner::db::DbPool;
use smart_planner::error::AppResult;
use smart_planner::models::planning::{
    CalendarItem, CalendarQuery, ConstraintOverrides, ExternalEvent, HoursInput, PlannerRequest,
};
use smart_planner::models::settings::PlannerSettings;
use smart_planner::models::task::{
    Priority, RecurrenceDescriptor, RecurrenceFrequency, StoredTask, TaskRequest,
};
use smart_planner::services::brief_extraction::testing::StaticExtractor;
use smart_planner::services::brief_extraction::BriefExtractionService;
use smart_planner::services::calendar_service::{ExternalCalendar, SyncAck};
use smart_planner::services::commitment_store::SqliteCommitmentStore;
use smart_planner::services::planner_service::PlannerService;
use smart_planner::services::task_ranker::TaskDefaults;
use tempfile::{tempdir, TempDir};

#[derive(Default)]
struct RecordingCalendar {
    synced: Mutex<Vec<String>>,
}

#[async_trait]
impl ExternalCalendar for RecordingCalendar {
    async fn list_external_events(
        &self,
        _user_id: &str,
        _from: Option<DateTime<Utc>>,
        _to: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<ExternalEvent>> {
        Ok(vec![ExternalEvent {
            id: Some("ext-1".into()),
            title: "Team offsite".into(),
            start_at: Some(utc(6, 9, 0)),
            end_at: Some(utc(6, 17, 0)),
        }])
    }

    async fn sync_tasks(&self, _user_id: &str, tasks: &[StoredTask]) -> AppResult<SyncAck> {
        let mut synced = self.synced.lock().unwrap();
        synced.extend(tasks.iter().map(|task| task.id.clone()));
        Ok(SyncAck::ok(tasks.len()))
    }

    fn provider_id(&self) -> &'static str {
        "recording"
    }
}

struct Harness {
    _dir: TempDir,
    store: Arc<SqliteCommitmentStore>,
    calendar: Arc<RecordingCalendar>,
    planner: PlannerService,
}

fn utc(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, day, hour, minute, 0).unwrap()
}

fn harness(extraction: BriefExtractionService) -> Harness {
    let dir = tempdir().expect("temp dir");
    let pool = DbPool::new(dir.path().join("planner.sqlite")).expect("db pool");
    let store = Arc::new(SqliteCommitmentStore::new(pool));
    let calendar = Arc::new(RecordingCalendar::default());
    let settings = PlannerSettings {
        timezone: chrono_tz::UTC,
        ..PlannerSettings::default()
    };
    let planner = PlannerService::new(settings, extraction, store.clone(), calendar.clone());

    Harness {
        _dir: dir,
        store,
        calendar,
        planner,
    }
}

fn autoschedule(tasks: Vec<TaskRequest>) -> PlannerRequest {
    PlannerRequest {
        tasks: Some(tasks),
        autoschedule: true,
        ..PlannerRequest::default()
    }
}

#[tokio::test]
async fn plans_persist_and_later_plans_respect_them() {
    let h = harness(BriefExtractionService::disabled());
    let now = utc(5, 6, 0);

    let first = h
        .planner
        .create_plan(
            "user-1",
            autoschedule(vec![TaskRequest::new("Write report").with_duration(60)]),
            now,
        )
        .await
        .expect("first plan");
    assert_eq!(first.scheduled[0].start_at, Some(utc(5, 8, 0)));

    let second = h
        .planner
        .create_plan(
            "user-1",
            autoschedule(vec![TaskRequest::new("Review PRs").with_duration(30)]),
            now,
        )
        .await
        .expect("second plan");
    assert_eq!(second.scheduled[0].start_at, Some(utc(5, 9, 0)));
    assert_eq!(second.scheduled[0].end_at, Some(utc(5, 9, 30)));

    // Another user's commitments do not block this one.
    let other = h
        .planner
        .create_plan(
            "user-2",
            autoschedule(vec![TaskRequest::new("Unrelated").with_duration(60)]),
            now,
        )
        .await
        .expect("other user plan");
    assert_eq!(other.scheduled[0].start_at, Some(utc(5, 8, 0)));

    let synced = h.calendar.synced.lock().unwrap();
    assert_eq!(synced.len(), 3);
    assert_eq!(synced[0], first.scheduled[0].id);
}

#[tokio::test]
async fn recurrence_rules_are_stored_with_plan_timezone() {
    let h = harness(BriefExtractionService::disabled());
    let request = PlannerRequest {
        tasks: Some(vec![TaskRequest::new("Standup")
            .with_duration(15)
            .with_recurrence(RecurrenceDescriptor {
                freq: RecurrenceFrequency::Weekly,
                interval: 1,
                by_weekday: Some(vec![1, 3, 5]),
            })]),
        constraints: Some(ConstraintOverrides {
            timezone: Some("America/El_Salvador".into()),
            ..ConstraintOverrides::default()
        }),
        autoschedule: true,
        ..PlannerRequest::default()
    };

    let response = h
        .planner
        .create_plan("user-1", request, utc(5, 6, 0))
        .await
        .expect("plan");

    // 08:00 in El Salvador (UTC-6) is 14:00Z.
    assert_eq!(response.scheduled[0].start_at, Some(utc(5, 14, 0)));

    let task = h.store.get_task(&response.scheduled[0].id).expect("task");
    let rule_id = task.recurrence_rule_id.expect("rule id");
    let rule = h.store.get_recurrence_rule(&rule_id).expect("rule");
    assert_eq!(rule.freq, RecurrenceFrequency::Weekly);
    assert_eq!(rule.interval, 1);
    assert_eq!(rule.timezone, "America/El_Salvador");
    assert!(task.auto_scheduled);
}

#[tokio::test]
async fn unplaceable_tasks_are_stored_without_times_and_noted() {
    let h = harness(BriefExtractionService::disabled());
    let request = PlannerRequest {
        tasks: Some(vec![
            TaskRequest::new("Fits").with_duration(60),
            TaskRequest::new("Too long").with_duration(180),
        ]),
        constraints: Some(ConstraintOverrides {
            work_hours: Some(HoursInput {
                start: "09:00".into(),
                end: "11:00".into(),
            }),
            horizon_days: Some(0),
            ..ConstraintOverrides::default()
        }),
        autoschedule: true,
        sync_to_calendar: Some(false),
        ..PlannerRequest::default()
    };

    let response = h
        .planner
        .create_plan("user-1", request, utc(5, 6, 0))
        .await
        .expect("plan");

    assert_eq!(response.created, 2);
    assert_eq!(
        response.notes,
        vec!["Could not schedule \"Too long\" within 0 days".to_string()]
    );

    // Ranked by duration: the long task is tried first and fails.
    let long = &response.scheduled[0];
    assert_eq!(long.title, "Too long");
    assert!(long.start_at.is_none());
    let stored = h.store.get_task(&long.id).expect("stored");
    assert_eq!(stored.start_at, None);
    assert_eq!(stored.duration_min, Some(180));

    assert!(h.calendar.synced.lock().unwrap().is_empty());
}

#[tokio::test]
async fn brief_tasks_are_merged_after_manual_tasks() {
    let extraction = BriefExtractionService::new(
        Arc::new(StaticExtractor(serde_json::json!([
            { "title": "Call the bank", "priority": "high" }
        ]))),
        true,
        TaskDefaults {
            duration_min: 45,
            priority: Priority::Med,
        },
    );
    let h = harness(extraction);

    let request = PlannerRequest {
        brief: Some("remember to call the bank".into()),
        tasks: Some(vec![TaskRequest::new("Inbox").with_duration(30)]),
        autoschedule: true,
        ..PlannerRequest::default()
    };
    let response = h
        .planner
        .create_plan("user-1", request, utc(5, 6, 0))
        .await
        .expect("plan");

    assert_eq!(response.created, 2);
    let bank = &response.scheduled[0];
    assert_eq!(bank.title, "Call the bank");
    assert_eq!(bank.priority, Priority::High);
    assert_eq!(bank.start_at, Some(utc(5, 8, 0)));
    assert_eq!(bank.end_at, Some(utc(5, 8, 45)));
    assert_eq!(response.scheduled[1].start_at, Some(utc(5, 8, 45)));
}

#[tokio::test]
async fn calendar_lists_stored_tasks_then_external_events() {
    let h = harness(BriefExtractionService::disabled());
    h.planner
        .create_plan(
            "user-1",
            autoschedule(vec![
                TaskRequest::new("Low").with_priority(Priority::Low),
                TaskRequest::new("High").with_priority(Priority::High),
            ]),
            utc(5, 6, 0),
        )
        .await
        .expect("plan");

    let view = h
        .planner
        .get_calendar(
            "user-1",
            CalendarQuery {
                from: Some(utc(5, 0, 0)),
                to: Some(utc(6, 0, 0)),
                include_external: true,
            },
        )
        .await
        .expect("calendar");

    let titles: Vec<&str> = view
        .items
        .iter()
        .map(|item| match item {
            CalendarItem::Task(task) => task.title.as_str(),
            CalendarItem::External(event) => event.title.as_str(),
        })
        .collect();
    assert_eq!(titles, vec!["High", "Low", "Team offsite"]);
}
