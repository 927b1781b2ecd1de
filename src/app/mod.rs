pub mod cli;
pub mod error;

// Re-export commonly used types
pub use cli::{CliApp, exit_code};
pub use error::AppError;
