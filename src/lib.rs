pub mod app;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use app::AppState;
pub use error::{AppError, AppResult};
