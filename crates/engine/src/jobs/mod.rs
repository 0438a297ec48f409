//! Lifecycle implementations, one module per job type.

pub mod canary_deploy;

pub use canary_deploy::CanaryDeployJob;
