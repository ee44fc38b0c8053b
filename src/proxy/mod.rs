//! Proxy service module
//!
//! This module implements the forwarding proxy itself: the accept loop and
//! shutdown coordination, per-request dispatch, plain request forwarding
//! through the parent, and CONNECT tunnel chaining.
//!
//! Requests flow `server` -> `handler::dispatch` -> either `forwarder` or
//! `tunnel`, with `blocklist` consulted first and `upstream` owning every
//! connection to the parent proxy.

pub mod blocklist;
pub mod forwarder;
pub mod handler;
pub mod server;
pub mod tunnel;
pub mod upstream;

pub use blocklist::is_blocked;
pub use handler::{dispatch, ProxyState};
pub use server::{Proxy, SHUTDOWN_GRACE_PERIOD};
pub use upstream::{ProxyCredential, Upstream};
