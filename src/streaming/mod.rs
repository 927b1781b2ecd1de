pub mod error;
pub mod handle;
pub mod registry;
pub mod scoped;

// Re-export commonly used types
pub use error::{AbortOnError, ErrorPolicy, ProcessingError, RetryOnError};
pub use handle::{ProcessorStatus, StreamProcessorControl, StreamProcessorHandle};
pub use registry::StreamProcessors;
pub use scoped::ScopedStreamProcessor;
