//! Upstream routing for a bithorde daemon.
//!
//! A router keeps one persistent connection per configured friend peer:
//! friends with a known address are dialed (and redialed, forever) by a
//! [`connector::FriendConnector`]; passive friends only ever dial in. Asset
//! requests that cannot be answered locally become [`forwarded::ForwardedAsset`]s,
//! which multicast the request to every connected friend that has not
//! already seen it and serve whichever upstream answers first, inside the
//! request's remaining deadline budget.

pub mod config;
pub mod connector;
pub mod forwarded;
pub mod peer;
pub mod router;

pub use config::Friend;
pub use connector::{FriendConnector, RECONNECT_INTERVAL};
pub use forwarded::ForwardedAsset;
pub use peer::{BindError, Hookup, Peer};
pub use router::{Router, DEFAULT_BIND_TIMEOUT, FORWARD_GRACE};
