pub mod planning;
pub mod recurrence;
pub mod settings;
pub mod task;
