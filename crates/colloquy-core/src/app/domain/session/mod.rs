pub mod event_store;
pub mod log;

pub use event_store::{EventPage, EventStore, EventStoreError, InMemoryEventStore, ListOrder, Page};
pub use log::{ConversationLog, IdReplacements};
