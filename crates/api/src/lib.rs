//! Archon api: the resource lifecycle on top of a [`archon_core::ResourceClient`].
//!
//! Each resource type gets a [`Coordinator`] which turns attribute trees into
//! server calls, waits for convergence where the kind requires it and reads the
//! observed state back. [`Provider`] registers one coordinator per type name.

#![forbid(unsafe_code)]

pub mod coordinator;
pub mod mock;
pub mod poller;
pub mod provider;

pub use coordinator::{Coordinator, Lifecycle, ResourceState};
pub use poller::{fmt_duration, format_events, Poller, PollerConfig};
pub use provider::{ArchonClient, Provider};
