//! Core domain models for the release pipeline
//!
//! This module defines configuration, templating, environments and the task
//! model that the execution layer works on.

pub mod config;
pub mod environment;
pub mod error;
pub mod state;
pub mod store;
pub mod task;
pub mod template;
pub mod version;

pub use config::{ConfigLoader, LoadedConfig, PipelineConfig, Settings};
pub use environment::{ConnectionDescriptor, ConnectionRole, Credentials, Environment, RemoteHost};
pub use error::{PipelineError, Result};
pub use state::*;
pub use store::ConfigStore;
pub use task::{Action, StepRef, Task, WatchRule};
pub use template::TemplateResolver;
pub use version::ReleaseVersion;
