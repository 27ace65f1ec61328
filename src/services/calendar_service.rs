use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AppResult;
use crate::models::planning::ExternalEvent;
use crate::models::task::StoredTask;

/// Acknowledgement returned after pushing tasks to a calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncAck {
    pub ok: bool,
    #[serde(default)]
    pub synced: usize,
}

impl SyncAck {
    pub fn ok(synced: usize) -> Self {
        Self { ok: true, synced }
    }
}

/// External calendar integration. Events listed here are display-only and
/// never block placement.
#[async_trait]
pub trait ExternalCalendar: Send + Sync {
    async fn list_external_events(
        &self,
        user_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<ExternalEvent>>;

    async fn sync_tasks(&self, user_id: &str, tasks: &[StoredTask]) -> AppResult<SyncAck>;

    fn provider_id(&self) -> &'static str;
}

/// Calendar used when no integration is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCalendar;

#[async_trait]
impl ExternalCalendar for NoopCalendar {
    async fn list_external_events(
        &self,
        _user_id: &str,
        _from: Option<DateTime<Utc>>,
        _to: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<ExternalEvent>> {
        Ok(Vec::new())
    }

    async fn sync_tasks(&self, user_id: &str, tasks: &[StoredTask]) -> AppResult<SyncAck> {
        debug!(target: "app::planner", user_id, count = tasks.len(), "calendar sync skipped (noop)");
        Ok(SyncAck::ok(0))
    }

    fn provider_id(&self) -> &'static str {
        "noop"
    }
}
