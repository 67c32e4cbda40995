//! Engine-level errors
//!
//! These describe faults of the engine itself. Anything the guest does wrong is
//! reported through `ExecutionResult`, never through this type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to load runtime catalog: {0}")]
    Catalog(String),

    #[error("workspace root {path} is unusable: {source}")]
    WorkspaceRoot {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("internal engine failure: {0}")]
    Internal(String),
}
