//! `engine` crate: workflow models and the job lifecycle protocol.
//!
//! A job moves through authoring calls (`instantiate`, `set_preset`,
//! `set_options`, `clear_options`, `clear_selection_field`,
//! `update_with_latest_setting`, `merge_args`, `lint_job`) and, once saved, a
//! single execution-time `to_jobs` that expands it into [`JobTask`]s.

pub mod models;
pub mod specs;
pub mod error;
pub mod rank;
pub mod naming;
pub mod store;
pub mod license;
pub mod lifecycle;
pub mod jobs;
pub mod workflow;

pub use models::{ErrorPolicy, Job, JobTask, JobTaskSpec, JobType, Stage, WorkflowDefinition};
pub use error::{EngineError, LintFailure, ResolutionFailure};
pub use lifecycle::{JobLifecycle, JobRegistry, LifecycleContext};
pub use store::{MemoryWorkflowStore, StoreError, WorkflowStore};
pub use license::{LicenseChecker, LicenseTier, StaticLicense};
pub use workflow::{StageTasks, WorkflowController};
