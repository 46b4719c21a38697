use std::sync::Arc;

/// Errors produced while activating a project's dependency graph.
///
/// The type is `Clone` so a recorded node outcome can be handed to every
/// caller of [`crate::orchestration::ServiceWrapper::wait`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum ComposeError {
    /// A node finished but the whole graph has to be visited again.
    #[error("restart requested")]
    Restart,

    #[error("service '{service}' does not support the '{operation}' operation")]
    Unsupported { service: String, operation: String },

    #[error("no such service: {0}")]
    NoSuchService(String),

    #[error("service '{service}' has a dependency on an undefined service '{dependency}'")]
    UndefinedDependency { service: String, dependency: String },

    #[error("cycle detected in path {path}")]
    Cycle { path: String },

    #[error("name '{0}' is defined both as a service and as a container")]
    AmbiguousName(String),

    #[error("worker for '{0}' panicked")]
    Panicked(String),

    #[error("{0:#}")]
    Backend(Arc<anyhow::Error>),
}

impl ComposeError {
    pub fn is_restart(&self) -> bool {
        matches!(self, Self::Restart)
    }

    pub fn unsupported(service: &str, operation: &str) -> Self {
        Self::Unsupported {
            service: service.to_string(),
            operation: operation.to_string(),
        }
    }
}

impl From<anyhow::Error> for ComposeError {
    fn from(err: anyhow::Error) -> Self {
        Self::Backend(Arc::new(err))
    }
}

pub type ComposeResult<T> = Result<T, ComposeError>;
