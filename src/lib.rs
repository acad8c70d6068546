//! Workspace entry crate.
//!
//! Re-exports the [`core_service`] façade so host applications can depend on a
//! single crate and toggle the desktop defaults through the `desktop-shims`
//! feature instead of wiring each workspace crate by hand.

pub use core_service::*;
