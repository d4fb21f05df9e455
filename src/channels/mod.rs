pub mod base;
pub mod delivery;

pub use base::{DEFAULT_CHUNK_LIMIT, PlatformSender, split_message};
pub use delivery::OutboundDelivery;
