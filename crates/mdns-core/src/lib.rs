//! Local-network service discovery over mDNS.
//!
//! Application-agnostic: announcements and browse results carry opaque
//! key/value properties; what they mean is up to the caller.

pub mod announce;
pub mod discover;
pub mod error;
pub mod model;
pub mod net;

pub use error::DiscoveryError;
