//! `cluster` crate: the boundary between the job lifecycle and live
//! Kubernetes clusters.
//!
//! The engine never talks to a cluster API directly. It asks a
//! [`ClusterResolver`] for a [`ClusterHandle`] and performs read-only lookups
//! through it. [`snapshot::SnapshotResolver`] serves those lookups from an
//! in-memory snapshot.

pub mod error;
pub mod objects;
pub mod traits;
pub mod snapshot;

pub use error::ClusterError;
pub use objects::{Deployment, LabelSelector, Service};
pub use traits::{ClusterHandle, ClusterResolver};
