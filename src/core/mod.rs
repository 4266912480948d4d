// Public modules
pub mod cache;
pub mod config;
pub mod confirm;
pub mod dependencies;
pub mod environment;
pub mod error;
pub mod git;
pub mod hooks;
pub mod manifest;
pub mod notify;
pub mod pipeline;
pub mod process;
pub mod version;
pub mod workspace;

// Re-export common types for convenience
pub use config::DeployConfig;
pub use environment::Environment;
pub use error::{Error, ErrorCode, Result};
pub use pipeline::{DeploymentRequest, Pipeline, PipelineOutcome};
