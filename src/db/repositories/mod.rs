pub mod recurrence_rule_repository;
pub mod task_repository;
