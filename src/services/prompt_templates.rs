use serde_json::{json, Value as JsonValue};

use crate::services::brief_extraction::ExtractArgs;

/// System prompt for turning a free-text brief into a JSON array of tasks.
pub fn brief_extraction_system_prompt(args: &ExtractArgs) -> String {
    format!(
        r#"You are an expert planner. Return ONLY a JSON array of tasks.
Fields per task:
  "title": string (required),
  "description": string (optional),
  "durationMin": integer minutes (optional),
  "priority": "low" | "med" | "high" (optional),
  "deadlineISO": ISO-8601 timestamp (optional),
  "preferredWindow": {{ "start": "HH:mm", "end": "HH:mm" }} (optional),
  "recurrence": {{ "freq": "DAILY" | "WEEKLY" | "MONTHLY", "interval": integer, "byWeekday": integer[] with Monday = 1 }} (optional).
Timezone: {timezone}. Today: {today}. Default duration: {duration} minutes.
Do not explain anything. Do not wrap the array in markdown. JSON only."#,
        timezone = args.timezone,
        today = args.today_iso,
        duration = args.defaults.duration_min,
    )
}

/// User message carrying the brief itself.
pub fn build_brief_user_message(brief: &str) -> String {
    format!(
        "User brief:\n\"\"\"\n{}\n\"\"\"\nReturn EXCLUSIVELY a valid JSON array (no comments, no extra text).",
        brief.trim()
    )
}

/// Full chat-completions request body.
pub fn build_brief_request_body(model: &str, temperature: f32, args: &ExtractArgs) -> JsonValue {
    json!({
        "model": model,
        "temperature": temperature,
        "messages": [
            { "role": "system", "content": brief_extraction_system_prompt(args) },
            { "role": "user", "content": build_brief_user_message(&args.brief) }
        ]
    })
}
