//! Connection lifecycle and stream reconciliation.
//!
//! Everything here is transport-agnostic: the [`ConnectionManager`] drives any
//! [`Transport`](crate::transport::Transport), the registry routes frames by
//! channel id, and the three state holders fold incoming data.

pub mod connection;
pub mod history;
pub mod presence;
pub mod reconnect;
pub mod registry;
pub mod state;
pub mod window;

pub use connection::{ConnectionEvent, ConnectionManager};
pub use history::{DedupPolicy, HistoryMerger, Identified};
pub use presence::PresenceTracker;
pub use reconnect::ReconnectPolicy;
pub use registry::{SubscriptionHandle, SubscriptionRegistry, Unsubscribed, WireSubscription};
pub use state::ConnectionState;
pub use window::RollingWindow;
