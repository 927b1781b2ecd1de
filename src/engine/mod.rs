pub mod catchup;
pub mod error;
pub mod processor;

// Re-export commonly used types
pub use catchup::CatchupEngine;
pub use error::{EngineError, ProcessorError};
pub use processor::{EventProcessor, FnProcessor, ProcessingRequest, invoke};
