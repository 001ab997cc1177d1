// rdspool - IAM-authenticated PostgreSQL connection pool for AWS Lambda

pub mod api;
pub mod config;
pub mod db;
pub mod utils;

// Re-export commonly used types
pub use utils::error::{RdsPoolError, Result};
