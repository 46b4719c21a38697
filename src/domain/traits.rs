use super::config::{ProjectConfigs, ServiceConfig};
use super::dependency::DependencyEdge;
use super::error::ComposeResult;
use super::{Container, ContainerSpec};
use anyhow::Result;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    pub no_cache: bool,
    pub pull: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOptions {
    /// Remove and recreate containers that already exist
    pub force_recreate: bool,
    /// Do not build the image of a build-only node before creating it; the
    /// image must then already exist in the runtime
    pub no_build: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpOptions {
    pub create: CreateOptions,
}

/// Capabilities a node must offer to take part in graph activation.
///
/// `create` must be idempotent: calling it on a node that already exists is a
/// successful no-op.
pub trait Service: Send + Sync + Debug {
    fn build(&self, options: &BuildOptions) -> ComposeResult<()>;

    fn create(&self, options: &CreateOptions) -> ComposeResult<()>;

    fn up(&self, options: &UpOptions) -> ComposeResult<()>;

    fn log(&self, follow: bool) -> ComposeResult<()>;

    /// Outgoing edges, fixed for the lifetime of this instance
    fn dependent_services(&self) -> Vec<DependencyEdge>;

    fn config(&self) -> &ServiceConfig;

    fn name(&self) -> &str;

    /// Backend identifier, empty when nothing has been created yet
    fn id(&self) -> String;
}

/// Builds service instances for the nodes of a project
pub trait ServiceFactory: Send + Sync {
    fn create(
        &self,
        configs: &ProjectConfigs,
        name: &str,
        config: &ServiceConfig,
    ) -> Result<Arc<dyn Service>>;
}

/// Trait for container runtime operations
pub trait ContainerRuntime: Send + Sync + Debug {
    /// Get the current state of a container
    fn get_container(&self, name: &str) -> Result<Container>;

    /// Create a new container from a spec
    fn create_container(&self, spec: &ContainerSpec) -> Result<()>;

    /// Start a container
    fn start_container(&self, name: &str) -> Result<()>;

    /// Remove a container
    fn remove_container(&self, name: &str) -> Result<()>;

    /// Build an image
    fn build_image(
        &self,
        tag: &str,
        containerfile: &Path,
        context_dir: &Path,
        options: &BuildOptions,
    ) -> Result<()>;

    /// Stream a container's logs to stdout
    fn logs(&self, name: &str, follow: bool) -> Result<()>;
}
