pub mod auto_scheduler;
pub mod brief_extraction;
pub mod calendar_service;
pub mod commitment_store;
pub mod planner_service;
pub mod prompt_templates;
pub mod schedule_utils;
pub mod task_ranker;
