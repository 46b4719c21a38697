pub mod config;
pub mod podman_adapter;
pub mod podman_service;

pub use config::{LoadedProject, load_project_configs, load_settings};
pub use podman_adapter::PodmanAdapter;
pub use podman_service::{ContainerBackedService, PodmanServiceFactory, container_name};
