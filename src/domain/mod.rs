pub mod config;
mod container;
pub mod dependency;
pub mod error;
pub mod events;
pub mod project;
pub mod traits;

pub use config::{
    BuildConfig, DependencyConfig, HostConfig, NetworkConfig, ProjectConfigs, SecretConfig,
    ServiceConfig, VolumeConfig,
};
pub use container::{Container, ContainerSpec, ContainerState};
pub use dependency::{DependencyEdge, DependencyKind, default_dependent_services};
pub use error::{ComposeError, ComposeResult};
pub use events::{Event, EventType};
pub use project::ProjectSettings;
pub use traits::{
    BuildOptions, ContainerRuntime, CreateOptions, Service, ServiceFactory, UpOptions,
};
