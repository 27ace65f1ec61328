use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde_json::{json, Value as JsonValue};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AiErrorCode, AppError, AppResult};
use crate::models::settings::PlannerSettings;
use crate::models::task::TaskRequest;
use crate::services::prompt_templates::build_brief_request_body;
use crate::services::schedule_utils;
use crate::services::task_ranker::TaskDefaults;

const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
const DEFAULT_TEMPERATURE: f32 = 0.2;
const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Input handed to an extractor for one brief.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractArgs {
    pub brief: String,
    pub timezone: String,
    pub today_iso: String,
    pub defaults: TaskDefaults,
}

/// Turns free text into an untrusted JSON value expected to be an array of tasks.
#[async_trait]
pub trait BriefExtractor: Send + Sync {
    async fn extract_tasks(&self, args: &ExtractArgs) -> AppResult<JsonValue>;

    fn provider_id(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Groq,
    Ollama,
    OpenAi,
}

impl ProviderKind {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "ollama" => ProviderKind::Ollama,
            "openai" => ProviderKind::OpenAi,
            _ => ProviderKind::Groq,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Groq => "groq",
            ProviderKind::Ollama => "ollama",
            ProviderKind::OpenAi => "openai",
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::Groq => GROQ_BASE_URL,
            ProviderKind::Ollama => OLLAMA_BASE_URL,
            ProviderKind::OpenAi => OPENAI_BASE_URL,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorConfig {
    pub provider: ProviderKind,
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub http_timeout: StdDuration,
    /// Delay before each attempt; its length is the attempt budget.
    pub backoff: Vec<StdDuration>,
}

impl ExtractorConfig {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            api_key: None,
            base_url: provider.default_base_url().to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            http_timeout: StdDuration::from_secs(30),
            backoff: vec![
                StdDuration::from_secs(0),
                StdDuration::from_millis(500),
                StdDuration::from_secs(1),
                StdDuration::from_secs(2),
            ],
        }
    }

    /// Reads `AI_PROVIDER`, the provider's API key, `AI_MODEL`,
    /// `AI_TEMPERATURE` and `AI_BASE_URL`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let provider = lookup("AI_PROVIDER")
            .map(|value| ProviderKind::parse(&value))
            .unwrap_or(ProviderKind::Groq);
        let mut config = Self::new(provider);

        config.api_key = match provider {
            ProviderKind::Groq => non_empty("GROQ_API_KEY"),
            ProviderKind::OpenAi => non_empty("OPENAI_API_KEY"),
            ProviderKind::Ollama => Some("ollama".to_string()),
        };

        if let Some(model) = non_empty("AI_MODEL") {
            config.model = model;
        }

        if let Some(raw) = lookup("AI_TEMPERATURE") {
            match raw.trim().parse::<f32>() {
                Ok(value) if value.is_finite() => config.temperature = value,
                _ => warn!(target: "app::ai", value = %raw, "ignoring invalid AI_TEMPERATURE"),
            }
        }

        if let Some(base_url) = non_empty("AI_BASE_URL") {
            config.base_url = base_url;
        }

        config
    }
}

/// Chat-completions client for Groq, Ollama and OpenAI.
pub struct OpenAiCompatibleExtractor {
    client: reqwest::Client,
    provider: ProviderKind,
    api_key: Option<String>,
    endpoint: String,
    model: String,
    temperature: f32,
    backoff: Vec<StdDuration>,
}

impl OpenAiCompatibleExtractor {
    pub fn try_new(config: &ExtractorConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Some(StdDuration::from_secs(90)))
            .build()
            .map_err(|err| AppError::other(format!("failed to build AI HTTP client: {err}")))?;

        let base_url = config.base_url.trim_end_matches('/');

        Ok(Self {
            client,
            provider: config.provider,
            api_key: config.api_key.clone(),
            endpoint: format!("{base_url}/chat/completions"),
            model: config.model.clone(),
            temperature: config.temperature,
            backoff: if config.backoff.is_empty() {
                vec![StdDuration::ZERO]
            } else {
                config.backoff.clone()
            },
        })
    }

    async fn invoke_chat(&self, args: &ExtractArgs) -> AppResult<JsonValue> {
        let correlation_id = Uuid::new_v4().to_string();
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            AppError::ai_with_details(
                AiErrorCode::MissingApiKey,
                format!("no API key configured for {}", self.provider.as_str()),
                Some(correlation_id.as_str()),
                None,
            )
        })?;

        let request_body = build_brief_request_body(&self.model, self.temperature, args);
        let mut last_error: Option<AppError> = None;

        for (attempt, delay) in self.backoff.iter().enumerate() {
            if !delay.is_zero() {
                sleep(*delay).await;
            }

            debug!(
                target: "app::ai",
                provider = self.provider.as_str(),
                attempt = attempt + 1,
                correlation_id = %correlation_id,
                brief_len = args.brief.len(),
                "invoking brief extraction"
            );

            let start = Instant::now();
            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(api_key)
                .json(&request_body)
                .send()
                .await;

            let (error, retryable) = match response {
                Ok(resp) if resp.status().is_success() => {
                    debug!(
                        target: "app::ai",
                        correlation_id = %correlation_id,
                        latency_ms = start.elapsed().as_millis() as u64,
                        "brief extraction responded"
                    );

                    let body: JsonValue = resp.json().await.map_err(|err| {
                        AppError::ai_with_details(
                            AiErrorCode::InvalidResponse,
                            "failed to decode chat completion body",
                            Some(correlation_id.as_str()),
                            Some(json!({ "reason": err.to_string() })),
                        )
                    })?;

                    let content = message_text(&body);
                    return Ok(parse_content(&content, &correlation_id));
                }
                Ok(resp) => {
                    let status = resp.status();
                    let (error, retryable) = map_http_error(status, &correlation_id);
                    warn!(
                        target: "app::ai",
                        correlation_id = %correlation_id,
                        status = status.as_u16(),
                        retryable,
                        "brief extraction returned non-success status"
                    );
                    (error, retryable)
                }
                Err(err) => {
                    let (error, retryable) = error_from_reqwest(err, &correlation_id);
                    warn!(
                        target: "app::ai",
                        correlation_id = %correlation_id,
                        retryable,
                        "brief extraction request failed"
                    );
                    (error, retryable)
                }
            };

            if !retryable || attempt + 1 == self.backoff.len() {
                return Err(error);
            }
            last_error = Some(error);
        }

        Err(last_error.unwrap_or_else(|| {
            AppError::ai_with_details(
                AiErrorCode::ProviderUnavailable,
                "brief extraction failed",
                Some(correlation_id.as_str()),
                None,
            )
        }))
    }
}

#[async_trait]
impl BriefExtractor for OpenAiCompatibleExtractor {
    async fn extract_tasks(&self, args: &ExtractArgs) -> AppResult<JsonValue> {
        self.invoke_chat(args).await
    }

    fn provider_id(&self) -> &'static str {
        self.provider.as_str()
    }
}

/// Extractor used when AI planning is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledExtractor;

#[async_trait]
impl BriefExtractor for DisabledExtractor {
    async fn extract_tasks(&self, _args: &ExtractArgs) -> AppResult<JsonValue> {
        Ok(JsonValue::Array(Vec::new()))
    }

    fn provider_id(&self) -> &'static str {
        "disabled"
    }
}

pub fn build_extractor(
    settings: &PlannerSettings,
    config: &ExtractorConfig,
) -> AppResult<Arc<dyn BriefExtractor>> {
    if !settings.use_ai_planner {
        return Ok(Arc::new(DisabledExtractor));
    }

    info!(
        target: "app::ai",
        provider = config.provider.as_str(),
        model = %config.model,
        has_key = config.api_key.is_some(),
        "brief extraction enabled"
    );
    Ok(Arc::new(OpenAiCompatibleExtractor::try_new(config)?))
}

/// Validates and normalizes extractor output.
#[derive(Clone)]
pub struct BriefExtractionService {
    extractor: Arc<dyn BriefExtractor>,
    enabled: bool,
    defaults: TaskDefaults,
}

impl BriefExtractionService {
    pub fn new(extractor: Arc<dyn BriefExtractor>, enabled: bool, defaults: TaskDefaults) -> Self {
        Self {
            extractor,
            enabled,
            defaults,
        }
    }

    pub fn from_settings(settings: &PlannerSettings, config: &ExtractorConfig) -> AppResult<Self> {
        Ok(Self::new(
            build_extractor(settings, config)?,
            settings.use_ai_planner,
            TaskDefaults {
                duration_min: settings.default_duration_min,
                priority: settings.default_priority,
            },
        ))
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledExtractor), false, TaskDefaults::default())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn provider_id(&self) -> &'static str {
        self.extractor.provider_id()
    }

    /// Extracts tasks from `brief`. Every returned task has duration and
    /// priority set.
    pub async fn parse_brief(
        &self,
        brief: &str,
        timezone: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<TaskRequest>> {
        if !self.enabled || brief.trim().is_empty() {
            return Ok(Vec::new());
        }

        let args = ExtractArgs {
            brief: brief.to_string(),
            timezone: timezone.to_string(),
            today_iso: schedule_utils::format_instant(now),
            defaults: self.defaults,
        };

        let raw = self.extractor.extract_tasks(&args).await?;
        validate_extracted(&raw)?;

        let tasks: Vec<TaskRequest> = serde_json::from_value(raw).map_err(|err| {
            AppError::validation_with_details(
                "extracted tasks could not be decoded",
                json!({ "reason": err.to_string() }),
            )
        })?;

        debug!(
            target: "app::ai",
            provider = self.extractor.provider_id(),
            count = tasks.len(),
            "brief extracted"
        );

        Ok(tasks
            .into_iter()
            .map(|mut task| {
                task.duration_min = Some(task.duration_min.unwrap_or(self.defaults.duration_min));
                task.priority = Some(task.priority.unwrap_or(self.defaults.priority));
                task
            })
            .collect())
    }
}

pub fn extracted_tasks_schema() -> JsonValue {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "required": ["title"],
            "properties": {
                "title": { "type": "string", "minLength": 2 },
                "description": { "type": "string" },
                "durationMin": { "type": "integer", "minimum": 5 },
                "priority": { "enum": ["low", "med", "high"] },
                "deadlineISO": { "type": "string", "format": "date-time" },
                "preferredWindow": {
                    "type": "object",
                    "required": ["start", "end"],
                    "properties": {
                        "start": { "type": "string" },
                        "end": { "type": "string" }
                    }
                },
                "recurrence": {
                    "type": "object",
                    "required": ["freq", "interval"],
                    "properties": {
                        "freq": { "enum": ["DAILY", "WEEKLY", "MONTHLY"] },
                        "interval": { "type": "integer", "minimum": 1 },
                        "byWeekday": {
                            "type": "array",
                            "items": { "type": "integer", "minimum": 1, "maximum": 7 }
                        }
                    }
                },
                "dependencies": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            }
        }
    })
}

fn validate_extracted(raw: &JsonValue) -> AppResult<()> {
    let schema_value = extracted_tasks_schema();
    let schema = jsonschema::JSONSchema::compile(&schema_value)
        .map_err(|err| AppError::other(format!("invalid extracted task schema: {err}")))?;

    if let Err(errors) = schema.validate(raw) {
        let issues: Vec<JsonValue> = errors
            .map(|err| {
                let path = err.instance_path.to_string();
                json!({
                    "path": if path.is_empty() { "/".to_string() } else { path },
                    "message": err.to_string(),
                })
            })
            .collect();

        return Err(AppError::validation_with_details(
            "extracted tasks failed validation",
            json!({ "issues": issues }),
        ));
    }

    Ok(())
}

/// Concatenates `choices[0].message.content`, which may be a string or a list
/// of parts.
fn message_text(body: &JsonValue) -> String {
    match body.pointer("/choices/0/message/content") {
        Some(JsonValue::String(text)) => text.clone(),
        Some(JsonValue::Array(parts)) => parts
            .iter()
            .map(|part| match part {
                JsonValue::String(text) => text.as_str(),
                JsonValue::Object(map) => map
                    .get("text")
                    .and_then(JsonValue::as_str)
                    .or_else(|| map.get("content").and_then(JsonValue::as_str))
                    .unwrap_or(""),
                _ => "",
            })
            .collect(),
        _ => String::new(),
    }
}

/// Non-JSON content degrades to an empty list.
fn parse_content(content: &str, correlation_id: &str) -> JsonValue {
    let trimmed = content.trim();
    let cleaned = if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```JSON")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    };

    match serde_json::from_str(cleaned) {
        Ok(value) => value,
        Err(err) => {
            warn!(
                target: "app::ai",
                correlation_id = %correlation_id,
                error = %err,
                "model content was not JSON; treating as empty"
            );
            JsonValue::Array(Vec::new())
        }
    }
}

fn map_http_error(status: StatusCode, correlation_id: &str) -> (AppError, bool) {
    let (code, message, retryable) = match status {
        StatusCode::UNAUTHORIZED => (
            AiErrorCode::MissingApiKey,
            "AI provider rejected the API key".to_string(),
            false,
        ),
        StatusCode::FORBIDDEN => (
            AiErrorCode::Forbidden,
            "AI provider denied access".to_string(),
            false,
        ),
        StatusCode::TOO_MANY_REQUESTS => (
            AiErrorCode::RateLimited,
            "AI provider rate limit reached".to_string(),
            true,
        ),
        status if status.is_server_error() => (
            AiErrorCode::ProviderUnavailable,
            format!("AI provider unavailable (status {})", status.as_u16()),
            true,
        ),
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => (
            AiErrorCode::InvalidRequest,
            format!("AI provider rejected the request (status {})", status.as_u16()),
            false,
        ),
        status => (
            AiErrorCode::Unknown,
            format!("AI provider returned status {}", status.as_u16()),
            false,
        ),
    };

    (
        AppError::ai_with_details(code, message, Some(correlation_id), None),
        retryable,
    )
}

fn error_from_reqwest(err: reqwest::Error, correlation_id: &str) -> (AppError, bool) {
    if err.is_timeout() {
        (
            AppError::ai_with_details(
                AiErrorCode::HttpTimeout,
                "AI provider request timed out",
                Some(correlation_id),
                None,
            ),
            true,
        )
    } else if err.is_connect() {
        (
            AppError::ai_with_details(
                AiErrorCode::ProviderUnavailable,
                "could not connect to AI provider",
                Some(correlation_id),
                None,
            ),
            true,
        )
    } else if let Some(status) = err.status() {
        map_http_error(status, correlation_id)
    } else {
        (
            AppError::ai_with_details(
                AiErrorCode::Unknown,
                format!("AI provider request failed: {err}"),
                Some(correlation_id),
                None,
            ),
            false,
        )
    }
}

pub mod testing {
    use super::*;

    /// Exposes the status mapping to integration tests.
    pub fn map_http_error(status: StatusCode) -> (AppError, bool) {
        super::map_http_error(status, "test-correlation-id")
    }

    /// Config pointing at `base_url` with no retry delays.
    pub fn config_for(base_url: &str, timeout: StdDuration, attempts: usize) -> ExtractorConfig {
        let mut config = ExtractorConfig::new(ProviderKind::OpenAi);
        config.api_key = Some("test-key".to_string());
        config.base_url = base_url.trim_end_matches('/').to_string();
        config.http_timeout = timeout;
        config.backoff = vec![StdDuration::ZERO; attempts.max(1)];
        config
    }

    pub fn sample_args(brief: &str) -> ExtractArgs {
        ExtractArgs {
            brief: brief.to_string(),
            timezone: "UTC".to_string(),
            today_iso: "2025-05-05T08:00:00Z".to_string(),
            defaults: TaskDefaults::default(),
        }
    }

    /// Fixed-output extractor for service-level tests.
    pub struct StaticExtractor(pub JsonValue);

    #[async_trait]
    impl BriefExtractor for StaticExtractor {
        async fn extract_tasks(&self, _args: &ExtractArgs) -> AppResult<JsonValue> {
            Ok(self.0.clone())
        }

        fn provider_id(&self) -> &'static str {
            "static"
        }
    }
}
