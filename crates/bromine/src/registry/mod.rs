//! Registries that survive reconnects.
//!
//! All three stores are written by the client facade and read by the
//! connection runner, concurrently and without external locking.

mod comeback;
mod replay;
mod subscription;

pub use comeback::{ComebackEntry, ComebackRegistry};
pub use replay::ReplayRegistry;
pub use subscription::{SubscriptionEntry, SubscriptionRegistry};
