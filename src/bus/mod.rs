pub mod events;
pub mod platform;

pub use events::{
    Conversation, Direction, HealthStatus, InboundMessage, NewEntry, OutboundRequest,
    TimelineEntry,
};
pub use platform::Platform;
