use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Prefix carried by ids the client mints for events that have not been
/// confirmed by the event store yet.
pub const LOCAL_ID_PREFIX: &str = "local-";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn from_string(value: impl Into<String>) -> Self {
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
    /// Identifier of a committed (or locally echoed) event.
    EventId
);
string_id!(ConversationId);
string_id!(DeviceId);
string_id!(
    /// Correlation key between a `tool_request` and its `tool_result`.
    RequestId
);
string_id!(TaskId);
string_id!(AttachmentId);

impl EventId {
    /// Mints a temporary id for an optimistic local echo.
    pub fn new_local() -> Self {
        Self(format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }
}

impl DeviceId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Monotonically increasing generation counter for streaming runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl RunId {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

/// Milliseconds since the Unix epoch, as assigned by the event store.
pub type Timestamp = i64;
