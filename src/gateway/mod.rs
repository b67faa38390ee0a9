pub mod actix_ws;
pub mod events;

pub use events::EventBroadcaster;
