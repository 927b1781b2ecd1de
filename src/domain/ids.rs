use std::fmt;

use serde::{Deserialize, Serialize};

/// Declares a string-backed identifier newtype
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Isolation boundary for one customer's data and execution
    TenantId
);

string_id!(
    /// Isolation boundary for one event log and the processors reading it
    ScopeId
);

string_id!(
    /// Name of the consumer (event handler, filter, projection) behind a stream processor
    EventProcessorId
);

string_id!(
    /// Identifies the (possibly filtered) stream a processor reads
    StreamId
);

string_id!(
    /// Sub-division of a stream that progresses and fails independently
    PartitionId
);

impl ScopeId {
    /// The scope every tenant's own event log lives in
    pub fn default_scope() -> Self {
        Self::new("default")
    }
}

impl PartitionId {
    /// Partition of every event in an unpartitioned stream
    pub fn none() -> Self {
        Self::new("")
    }
}

impl StreamId {
    /// The unfiltered event log of a scope
    pub fn event_log() -> Self {
        Self::new("event-log")
    }
}

/// Identifies one stream processor within a tenant
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamProcessorId {
    pub scope: ScopeId,
    pub event_processor: EventProcessorId,
    pub source_stream: StreamId,
}

impl StreamProcessorId {
    pub fn new(
        scope: impl Into<ScopeId>,
        event_processor: impl Into<EventProcessorId>,
        source_stream: impl Into<StreamId>,
    ) -> Self {
        Self {
            scope: scope.into(),
            event_processor: event_processor.into(),
            source_stream: source_stream.into(),
        }
    }
}

impl fmt::Display for StreamProcessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.scope, self.event_processor, self.source_stream
        )
    }
}
