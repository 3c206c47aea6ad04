//! Subscriber sessions and the shared sampling stream they attach to.

pub mod connection;
pub mod hub;
pub mod protocol;

pub use connection::{Session, SessionReport, SessionState, Subscriber};
pub use hub::{HubStats, Subscription, TelemetryHub};
pub use protocol::ServerMessage;
