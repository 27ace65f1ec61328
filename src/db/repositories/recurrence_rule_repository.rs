use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::{AppError, AppResult};
use crate::models::recurrence::RecurrenceRuleRecord;
use crate::models::task::RecurrenceFrequency;

#[derive(Debug, Clone)]
pub struct RecurrenceRuleRow {
    pub id: String,
    pub user_id: String,
    pub freq: String,
    pub interval: i64,
    pub by_weekday: Option<String>,
    pub until: Option<String>,
    pub count: Option<i64>,
    pub timezone: String,
    pub created_at: String,
}

impl RecurrenceRuleRow {
    pub fn from_record(record: &RecurrenceRuleRecord) -> AppResult<Self> {
        let by_weekday = match &record.by_weekday {
            Some(days) => Some(serde_json::to_string(days)?),
            None => None,
        };

        Ok(Self {
            id: record.id.clone(),
            user_id: record.user_id.clone(),
            freq: record.freq.as_str().to_string(),
            interval: i64::from(record.interval),
            by_weekday,
            until: record.until.clone(),
            count: record.count.map(i64::from),
            timezone: record.timezone.clone(),
            created_at: record.created_at.clone(),
        })
    }

    pub fn into_record(self) -> AppResult<RecurrenceRuleRecord> {
        let freq = RecurrenceFrequency::parse(&self.freq).ok_or_else(|| {
            AppError::database(format!("recurrence rule {} has unknown freq {}", self.id, self.freq))
        })?;
        let by_weekday = match self.by_weekday {
            Some(raw) if !raw.is_empty() => Some(serde_json::from_str(&raw)?),
            _ => None,
        };

        Ok(RecurrenceRuleRecord {
            id: self.id,
            user_id: self.user_id,
            freq,
            interval: u32::try_from(self.interval).unwrap_or(1),
            by_weekday,
            until: self.until,
            count: self.count.and_then(|value| u32::try_from(value).ok()),
            timezone: self.timezone,
            created_at: self.created_at,
        })
    }
}

impl TryFrom<&Row<'_>> for RecurrenceRuleRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(RecurrenceRuleRow {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            freq: row.get("freq")?,
            interval: row.get("interval")?,
            by_weekday: row.get("by_weekday")?,
            until: row.get("until")?,
            count: row.get("count")?,
            timezone: row.get("timezone")?,
            created_at: row.get("created_at")?,
        })
    }
}

pub struct RecurrenceRuleRepository;

impl RecurrenceRuleRepository {
    pub fn insert(conn: &Connection, row: &RecurrenceRuleRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO recurrence_rules (
                    id, user_id, freq, interval, by_weekday, until, count, timezone, created_at
                ) VALUES (
                    :id, :user_id, :freq, :interval, :by_weekday, :until, :count, :timezone, :created_at
                )
            "#,
            named_params! {
                ":id": &row.id,
                ":user_id": &row.user_id,
                ":freq": &row.freq,
                ":interval": row.interval,
                ":by_weekday": &row.by_weekday,
                ":until": &row.until,
                ":count": &row.count,
                ":timezone": &row.timezone,
                ":created_at": &row.created_at,
            },
        )?;
        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<RecurrenceRuleRow>> {
        let mut stmt = conn.prepare(
            "SELECT id, user_id, freq, interval, by_weekday, until, count, timezone, created_at
             FROM recurrence_rules WHERE id = ?1",
        )?;
        let row = stmt
            .query_row([id], |row| RecurrenceRuleRow::try_from(row))
            .optional()?;
        Ok(row)
    }
}
