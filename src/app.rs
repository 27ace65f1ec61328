use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::db::DbPool;
use crate::error::AppResult;
use crate::models::settings::PlannerSettings;
use crate::services::brief_extraction::{BriefExtractionService, ExtractorConfig};
use crate::services::calendar_service::{ExternalCalendar, NoopCalendar};
use crate::services::commitment_store::SqliteCommitmentStore;
use crate::services::planner_service::PlannerService;

const DATABASE_FILE: &str = "smart-planner.sqlite";

/// Wired application services sharing one database.
#[derive(Clone)]
pub struct AppState {
    db_pool: DbPool,
    planner: Arc<PlannerService>,
}

impl AppState {
    /// Builds every service from explicit settings.
    pub fn new(
        db_pool: DbPool,
        settings: PlannerSettings,
        extractor_config: &ExtractorConfig,
        calendar: Arc<dyn ExternalCalendar>,
    ) -> AppResult<Self> {
        let extraction = BriefExtractionService::from_settings(&settings, extractor_config)?;
        let store = Arc::new(SqliteCommitmentStore::new(db_pool.clone()));
        let planner = Arc::new(PlannerService::new(settings, extraction, store, calendar));

        Ok(Self { db_pool, planner })
    }

    /// Reads configuration from the environment, installs logging under
    /// `data_dir/logs` and opens `data_dir/smart-planner.sqlite`.
    pub fn bootstrap(data_dir: &Path) -> AppResult<Self> {
        Self::bootstrap_with(data_dir, |key| std::env::var(key).ok())
    }

    pub fn bootstrap_with<F>(data_dir: &Path, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        crate::utils::logger::init_logging(&data_dir.join("logs"))?;

        let settings = PlannerSettings::from_lookup(&lookup)?;
        let extractor_config = ExtractorConfig::from_lookup(&lookup);
        std::fs::create_dir_all(data_dir)?;
        let pool = DbPool::new(data_dir.join(DATABASE_FILE))?;

        info!(
            target: "app::planner",
            timezone = settings.timezone.name(),
            ai_enabled = settings.use_ai_planner,
            provider = extractor_config.provider.as_str(),
            "planner ready"
        );

        Self::new(pool, settings, &extractor_config, Arc::new(NoopCalendar))
    }

    pub fn db_pool(&self) -> &DbPool {
        &self.db_pool
    }

    pub fn planner(&self) -> Arc<PlannerService> {
        Arc::clone(&self.planner)
    }
}
