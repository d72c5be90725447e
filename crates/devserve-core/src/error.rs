use thiserror::Error;

/// Error types for supervisor operations
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Failed to spawn `{command}`: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No module loader installed for foreground mode")]
    NoModuleLoader,

    #[error("Failed to load module `{script}`: {message}")]
    ModuleLoad { script: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl SupervisorError {
    pub fn configuration(message: impl Into<String>) -> Self {
        SupervisorError::Configuration(message.into())
    }

    pub fn module_load(script: impl Into<String>, message: impl Into<String>) -> Self {
        SupervisorError::ModuleLoad {
            script: script.into(),
            message: message.into(),
        }
    }

    /// Check if this error means the primary child never launched
    pub fn is_spawn_failure(&self) -> bool {
        matches!(self, SupervisorError::SpawnFailed { .. })
    }
}
