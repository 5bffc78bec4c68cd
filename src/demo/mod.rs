//! Demo host: a tiny simulated world plus the services that expose it.
//!
//! Used by the `openclaw` binary and the integration tests as a concrete
//! [`HostContext`](crate::core::HostContext) implementation.

pub mod services;
pub mod world;

pub use services::{GameService, PlayerService};
pub use world::{TaskInfo, Vec2, World};
