pub mod error;
pub mod event_log;
pub mod state_repository;
pub mod traits;

// Re-export commonly used types
pub use error::StorageError;
pub use event_log::{InMemoryEventLog, InMemoryStream, StreamFilter};
pub use state_repository::InMemoryStateRepository;
pub use traits::{EventSource, StoredStreamProcessorState, StreamProcessorStateRepository};
