//! Error types for CLI operations.

use contracts::ContractError;
use dispatcher::DispatchError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration could not be loaded
    #[error("Failed to load configuration: {0}")]
    Config(#[from] ContractError),

    /// A named dispatcher is not part of the topology
    #[error("Unknown dispatcher: {name}")]
    UnknownDispatcher { name: String },

    /// Building or driving a dispatcher failed
    #[error("Dispatcher '{name}' failed: {source}")]
    Dispatch {
        name: String,
        #[source]
        source: DispatchError,
    },

    /// Pipeline execution error
    #[error("Pipeline execution failed: {message}")]
    PipelineExecution { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn dispatch(name: impl Into<String>, source: DispatchError) -> Self {
        Self::Dispatch {
            name: name.into(),
            source,
        }
    }

    pub fn pipeline_execution(message: impl Into<String>) -> Self {
        Self::PipelineExecution {
            message: message.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
