use chrono::NaiveTime;
use chrono_tz::Tz;

use crate::error::{AppError, AppResult};
use crate::models::planning::WorkHours;
use crate::models::task::Priority;

pub const DEFAULT_TIMEZONE: &str = "America/El_Salvador";
pub const DEFAULT_DURATION_MIN: i64 = 30;
pub const DEFAULT_HORIZON_DAYS: u32 = 30;

/// Planner-wide defaults. Built once (from code or the environment) and passed
/// explicitly into the services that need them.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerSettings {
    pub default_duration_min: i64,
    pub default_priority: Priority,
    pub default_horizon_days: u32,
    pub timezone: Tz,
    pub default_working_days: Vec<u32>,
    pub default_work_hours: WorkHours,
    pub no_overlap: bool,
    pub use_ai_planner: bool,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            default_duration_min: DEFAULT_DURATION_MIN,
            default_priority: Priority::Med,
            default_horizon_days: DEFAULT_HORIZON_DAYS,
            timezone: chrono_tz::America::El_Salvador,
            default_working_days: vec![1, 2, 3, 4, 5],
            default_work_hours: WorkHours::new(hm(8, 0), hm(18, 0)),
            no_overlap: true,
            use_ai_planner: false,
        }
    }
}

impl PlannerSettings {
    /// Reads `PLANNER_TIMEZONE`, `PLANNER_DEFAULT_TASK_MIN`,
    /// `PLANNER_RECURRENCE_HORIZON_DAYS` and `USE_AI_PLANNER`.
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`PlannerSettings::from_env`] over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(raw) = lookup("PLANNER_TIMEZONE") {
            settings.timezone = parse_timezone(&raw)?;
        }

        if let Some(raw) = lookup("PLANNER_DEFAULT_TASK_MIN") {
            let minutes = raw.trim().parse::<i64>().map_err(|_| {
                AppError::validation(format!("PLANNER_DEFAULT_TASK_MIN is not an integer: {raw}"))
            })?;
            if minutes <= 0 {
                return Err(AppError::validation(
                    "PLANNER_DEFAULT_TASK_MIN must be positive",
                ));
            }
            settings.default_duration_min = minutes;
        }

        if let Some(raw) = lookup("PLANNER_RECURRENCE_HORIZON_DAYS") {
            settings.default_horizon_days = raw.trim().parse::<u32>().map_err(|_| {
                AppError::validation(format!(
                    "PLANNER_RECURRENCE_HORIZON_DAYS is not a day count: {raw}"
                ))
            })?;
        }

        settings.use_ai_planner = lookup("USE_AI_PLANNER")
            .map(|value| value.trim() == "true")
            .unwrap_or(false);

        Ok(settings)
    }
}

pub fn parse_timezone(raw: &str) -> AppResult<Tz> {
    raw.trim()
        .parse::<Tz>()
        .map_err(|err| AppError::validation(format!("unknown timezone {raw}: {err}")))
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_planner_conventions() {
        let settings = PlannerSettings::default();
        assert_eq!(settings.default_duration_min, 30);
        assert_eq!(settings.default_horizon_days, 30);
        assert_eq!(settings.timezone.name(), DEFAULT_TIMEZONE);
        assert_eq!(settings.default_working_days, vec![1, 2, 3, 4, 5]);
        assert_eq!(settings.default_work_hours.start, hm(8, 0));
        assert_eq!(settings.default_work_hours.end, hm(18, 0));
        assert!(settings.no_overlap);
        assert!(!settings.use_ai_planner);
    }

    #[test]
    fn parse_timezone_accepts_iana_names_only() {
        assert_eq!(
            parse_timezone(" America/New_York ").expect("zone"),
            chrono_tz::America::New_York
        );
        assert!(matches!(
            parse_timezone("GMT+25"),
            Err(AppError::Validation { .. })
        ));
    }

    #[test]
    fn lookup_without_variables_yields_defaults() {
        let settings = PlannerSettings::from_lookup(vars(&[])).expect("settings");
        assert_eq!(settings, PlannerSettings::default());
    }

    #[test]
    fn lookup_overrides_each_setting() {
        let settings = PlannerSettings::from_lookup(vars(&[
            ("PLANNER_TIMEZONE", "Asia/Tokyo"),
            ("PLANNER_DEFAULT_TASK_MIN", " 45 "),
            ("PLANNER_RECURRENCE_HORIZON_DAYS", "14"),
            ("USE_AI_PLANNER", "true"),
        ]))
        .expect("settings");

        assert_eq!(settings.timezone, chrono_tz::Asia::Tokyo);
        assert_eq!(settings.default_duration_min, 45);
        assert_eq!(settings.default_horizon_days, 14);
        assert!(settings.use_ai_planner);
    }

    #[test]
    fn ai_planner_flag_requires_literal_true() {
        let settings =
            PlannerSettings::from_lookup(vars(&[("USE_AI_PLANNER", "yes")])).expect("settings");
        assert!(!settings.use_ai_planner);
    }

    #[test]
    fn invalid_default_duration_is_rejected() {
        for raw in ["0", "-15", "half an hour", "12.5"] {
            let result = PlannerSettings::from_lookup(vars(&[("PLANNER_DEFAULT_TASK_MIN", raw)]));
            assert!(
                matches!(result, Err(AppError::Validation { .. })),
                "accepted {raw}"
            );
        }
    }

    #[test]
    fn unknown_timezone_and_bad_horizon_are_rejected() {
        assert!(matches!(
            PlannerSettings::from_lookup(vars(&[("PLANNER_TIMEZONE", "Mars/Olympus")])),
            Err(AppError::Validation { .. })
        ));
        assert!(matches!(
            PlannerSettings::from_lookup(vars(&[("PLANNER_RECURRENCE_HORIZON_DAYS", "-1")])),
            Err(AppError::Validation { .. })
        ));
    }
}
