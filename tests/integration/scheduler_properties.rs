use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use smart_planner::models::planning::{ExistingCommitment, SchedulingConstraints, WorkHours};
use smart_planner::models::task::{Priority, ScheduledTask, TaskRequest};
use smart_planner::services::auto_scheduler::AutoScheduler;
use smart_planner::services::schedule_utils;

fn utc(month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, month, day, hour, minute, 0)
        .single()
        .expect("valid datetime")
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
}

fn constraints(timezone: Tz, horizon_days: u32) -> SchedulingConstraints {
    SchedulingConstraints {
        working_days: vec![1, 2, 3, 4, 5],
        work_hours: WorkHours::new(hm(8, 0), hm(18, 0)),
        horizon_days,
        no_overlap: true,
        timezone,
    }
}

/// Monday 2025-05-05 07:00 UTC.
fn monday_morning() -> DateTime<Utc> {
    utc(5, 5, 7, 0)
}

fn find<'a>(scheduled: &'a [ScheduledTask], title: &str) -> &'a ScheduledTask {
    scheduled
        .iter()
        .find(|task| task.task.title == title)
        .unwrap_or_else(|| panic!("task {title} missing from output"))
}

fn mixed_tasks(seed: u32) -> Vec<TaskRequest> {
    let priorities = [Priority::Low, Priority::Med, Priority::High];
    (0..12)
        .map(|index| {
            let value = seed.wrapping_mul(31).wrapping_add(index * 17);
            let mut task = TaskRequest::new(format!("task-{seed}-{index}"))
                .with_duration(i64::from(15 + (value % 8) * 45))
                .with_priority(priorities[(value % 3) as usize]);
            if value % 4 == 0 {
                task = task.with_preferred_window("13:00", "17:30");
            }
            if value % 5 == 0 {
                task = task.with_deadline(monday_morning() + Duration::days(i64::from(value % 6)));
            }
            task
        })
        .collect()
}

#[test]
fn placed_intervals_never_overlap_each_other_or_existing() {
    let scheduler = AutoScheduler::default();
    let existing = vec![
        ExistingCommitment::new(utc(5, 5, 9, 0), utc(5, 5, 10, 30)),
        ExistingCommitment::new(utc(5, 6, 12, 0), utc(5, 6, 15, 0)),
        ExistingCommitment::new(utc(5, 7, 8, 0), utc(5, 7, 18, 0)),
    ];

    for seed in 0..8 {
        let scheduled = scheduler.schedule(
            &mixed_tasks(seed),
            &constraints(chrono_tz::UTC, 10),
            &existing,
            monday_morning(),
        );

        let mut intervals: Vec<(DateTime<Utc>, DateTime<Utc>)> =
            scheduled.iter().filter_map(ScheduledTask::interval).collect();
        intervals.extend(existing.iter().map(|c| (c.start_at, c.end_at)));

        for (i, a) in intervals.iter().enumerate() {
            for b in intervals.iter().skip(i + 1) {
                assert!(
                    !schedule_utils::overlaps(a.0, a.1, b.0, b.1),
                    "seed {seed}: {a:?} overlaps {b:?}"
                );
            }
        }
    }
}

#[test]
fn higher_priority_gets_earlier_or_equal_slot() {
    let scheduler = AutoScheduler::default();
    let tasks = vec![
        TaskRequest::new("low").with_duration(60).with_priority(Priority::Low),
        TaskRequest::new("med").with_duration(60).with_priority(Priority::Med),
        TaskRequest::new("high").with_duration(60).with_priority(Priority::High),
    ];

    let scheduled = scheduler.schedule(&tasks, &constraints(chrono_tz::UTC, 7), &[], monday_morning());

    let start = |title: &str| find(&scheduled, title).start_at.expect("placed");
    assert!(start("high") <= start("med"));
    assert!(start("med") <= start("low"));
    assert_eq!(start("high"), utc(5, 5, 8, 0));
    assert_eq!(scheduled[0].task.title, "high");
}

#[test]
fn earlier_deadline_breaks_priority_ties() {
    let scheduler = AutoScheduler::default();
    let tasks = vec![
        TaskRequest::new("friday")
            .with_duration(60)
            .with_priority(Priority::High)
            .with_deadline(utc(5, 9, 17, 0)),
        TaskRequest::new("tuesday")
            .with_duration(60)
            .with_priority(Priority::High)
            .with_deadline(utc(5, 6, 17, 0)),
        TaskRequest::new("no-deadline")
            .with_duration(60)
            .with_priority(Priority::High),
    ];

    let scheduled = scheduler.schedule(&tasks, &constraints(chrono_tz::UTC, 7), &[], monday_morning());

    assert_eq!(find(&scheduled, "tuesday").start_at, Some(utc(5, 5, 8, 0)));
    assert_eq!(find(&scheduled, "friday").start_at, Some(utc(5, 5, 9, 0)));
    assert_eq!(find(&scheduled, "no-deadline").start_at, Some(utc(5, 5, 10, 0)));
}

#[test]
fn weekends_are_never_used_with_weekday_working_days() {
    let scheduler = AutoScheduler::default();
    // Ten full-day tasks cannot fit in one week, so some spill past a weekend.
    let tasks: Vec<TaskRequest> = (0..10)
        .map(|index| TaskRequest::new(format!("block-{index}")).with_duration(600))
        .collect();

    for tz in [chrono_tz::UTC, chrono_tz::America::El_Salvador, chrono_tz::Asia::Tokyo] {
        let scheduled = scheduler.schedule(&tasks, &constraints(tz, 21), &[], monday_morning());
        for task in &scheduled {
            let start = task.start_at.expect("placed within three weeks");
            let weekday = schedule_utils::zoned_day_of_week(start, tz);
            assert!((1..=5).contains(&weekday), "{tz:?}: placed on weekday {weekday}");
        }
    }
}

#[test]
fn tasks_longer_than_any_window_stay_unplaced() {
    let scheduler = AutoScheduler::default();
    let tasks = vec![
        TaskRequest::new("impossible").with_duration(601),
        TaskRequest::new("fine").with_duration(30),
    ];

    let scheduled = scheduler.schedule(&tasks, &constraints(chrono_tz::UTC, 30), &[], monday_morning());

    let impossible = find(&scheduled, "impossible");
    assert!(impossible.start_at.is_none());
    assert!(impossible.end_at.is_none());
    assert!(!impossible.auto);
    assert_eq!(find(&scheduled, "fine").start_at, Some(utc(5, 5, 8, 0)));
}

#[test]
fn identical_inputs_produce_identical_output() {
    let scheduler = AutoScheduler::default();
    let existing = vec![ExistingCommitment::new(utc(5, 5, 9, 0), utc(5, 5, 10, 0))];
    let tasks = mixed_tasks(3);
    let rules = constraints(chrono_tz::America::New_York, 14);

    let first = serde_json::to_vec(&scheduler.schedule(&tasks, &rules, &existing, monday_morning()))
        .expect("serialize");
    let second = serde_json::to_vec(&scheduler.schedule(&tasks, &rules, &existing, monday_morning()))
        .expect("serialize");

    assert_eq!(first, second);
}

#[test]
fn single_task_lands_monday_at_eight() {
    let scheduler = AutoScheduler::default();
    let tasks = vec![TaskRequest::new("focus").with_duration(60).with_priority(Priority::Med)];

    let scheduled = scheduler.schedule(&tasks, &constraints(chrono_tz::UTC, 7), &[], monday_morning());

    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].start_at, Some(utc(5, 5, 8, 0)));
    assert_eq!(scheduled[0].end_at, Some(utc(5, 5, 9, 0)));
    assert!(scheduled[0].auto);
}

#[test]
fn second_full_day_task_rolls_to_next_working_day() {
    let scheduler = AutoScheduler::default();
    let tasks = vec![
        TaskRequest::new("first").with_duration(480),
        TaskRequest::new("second").with_duration(480),
    ];

    let scheduled = scheduler.schedule(&tasks, &constraints(chrono_tz::UTC, 7), &[], monday_morning());

    assert_eq!(scheduled[0].start_at, Some(utc(5, 5, 8, 0)));
    assert_eq!(scheduled[0].end_at, Some(utc(5, 5, 16, 0)));
    assert_eq!(scheduled[1].start_at, Some(utc(5, 6, 8, 0)));
    assert_eq!(scheduled[1].end_at, Some(utc(5, 6, 16, 0)));
}

#[test]
fn friday_overflow_skips_to_monday() {
    let scheduler = AutoScheduler::default();
    let friday_morning = utc(5, 9, 7, 0);
    let tasks = vec![
        TaskRequest::new("friday").with_duration(480),
        TaskRequest::new("monday").with_duration(480),
    ];

    let scheduled = scheduler.schedule(&tasks, &constraints(chrono_tz::UTC, 7), &[], friday_morning);

    assert_eq!(scheduled[1].start_at, Some(utc(5, 12, 8, 0)));
}
