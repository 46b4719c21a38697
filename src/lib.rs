pub mod cli;
pub mod domain;
pub mod infra;
pub mod orchestration;

// Make test_support available for integration tests
pub mod test_support;

pub use domain::{
    ComposeError, ComposeResult, ContainerRuntime, DependencyEdge, DependencyKind, Event,
    EventType, ProjectConfigs, Service, ServiceConfig, ServiceFactory,
};
pub use infra::{PodmanAdapter, PodmanServiceFactory};
pub use orchestration::{EventBus, Project, TraversalDriver};
