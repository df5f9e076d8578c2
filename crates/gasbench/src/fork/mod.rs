//! Fork session management.
//!
//! A fork session is a local process exposing the state of a live network over JSON-RPC. The
//! [`ForkManager`] allocates a port, spawns the process through a [`ForkBackend`], polls it until
//! it is healthy and keeps it registered until it is torn down.

mod backend;
pub use backend::{AnvilBackend, ForkBackend, LaunchRequest};

mod manager;
pub use manager::{ForkManager, TeardownFailure, TeardownReport};

mod port;
pub use port::{PortAllocator, PortLease};
