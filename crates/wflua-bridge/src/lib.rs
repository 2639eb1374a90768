//! Signal and lifetime bridge.
//!
//! The bridge turns the host's per-object signals into plain C callbacks that
//! a foreign runtime can own:
//!
//! - A [`Connection`] is one handler binding, subscribed to at most one
//!   `(emitter, signal)` pair at a time.
//! - The [`Registry`] indexes `emitter -> signal -> connections` and fans an
//!   emission out in subscription order.
//! - A [`LifetimeTracker`] parked in the emitter's custom data slot notices the
//!   emitter's destruction, purges its registry entry and fires the lifetime
//!   callbacks registered on it.
//!
//! [`Bridge`] ties the three to a host implementing
//! [`Emitters`](wflua_core::Emitters). Everything is single threaded.
//!
//! ```ignore
//! let bridge = Bridge::new(host);
//! let conn = unsafe { bridge.create_connection(callback, data1, data2) };
//! bridge.subscribe(view, "title-changed", &conn);
//! // ...
//! bridge.destroy_connection(conn);
//! ```

mod bridge;
mod connection;
mod lifetime;
mod registry;

pub use bridge::{Bridge, BridgeStats};
pub use connection::{Connection, ConnectionState, SignalCallback};
pub use lifetime::{LifetimeCallback, LifetimeError, LifetimeSubscription, LifetimeTracker, TRACKER_KEY};
pub use registry::{Insertion, Purge, Registry, RegistryError, Removal, SnapshotEntry};
