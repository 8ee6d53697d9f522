pub mod config;
pub mod error;
pub mod identity;
pub mod logging;

pub use error::{AppError, AppResult};
