use crate::domain::dependency::namespace_target;
use crate::domain::{
    BuildOptions, ComposeError, ComposeResult, ContainerRuntime, ContainerSpec, ContainerState,
    CreateOptions, DependencyEdge, ProjectConfigs, Service, ServiceConfig, ServiceFactory,
    UpOptions, default_dependent_services,
};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

pub const PROJECT_LABEL: &str = "stackbox.project";

/// Container name of `node` inside `project`
pub fn container_name(project: &str, node: &str) -> String {
    format!("{project}_{node}")
}

/// A node realized as one podman container
#[derive(Debug)]
pub struct ContainerBackedService {
    project: String,
    name: String,
    config: ServiceConfig,
    edges: Vec<DependencyEdge>,
    runtime: Arc<dyn ContainerRuntime>,
}

impl ContainerBackedService {
    pub fn new(
        project: &str,
        name: &str,
        config: ServiceConfig,
        configs: &ProjectConfigs,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Self {
        let edges = default_dependent_services(configs, &config);
        Self {
            project: project.to_string(),
            name: name.to_string(),
            config,
            edges,
            runtime,
        }
    }

    pub fn container_name(&self) -> String {
        container_name(&self.project, &self.name)
    }

    /// Configured image, or the tag a `build` section produces
    pub fn image(&self) -> String {
        match self.config.image.as_deref() {
            Some(image) if !image.trim().is_empty() => image.to_string(),
            _ => container_name(&self.project, &self.name),
        }
    }

    /// Translates the config into a runtime spec, resolving node references
    /// to container names
    pub fn container_spec(&self) -> ContainerSpec {
        let mut labels = vec![(PROJECT_LABEL.to_string(), self.project.clone())];
        labels.extend(
            self.config
                .labels
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );

        ContainerSpec {
            name: self.container_name(),
            image: self.image(),
            command: self.config.command.clone(),
            ports: self.config.ports.clone(),
            env: self.config.environment.clone(),
            volumes: self.config.volumes.clone(),
            links: self
                .edges
                .iter()
                .filter(|edge| edge.optional)
                .map(|edge| container_name(&self.project, &edge.target))
                .collect(),
            volumes_from: self
                .config
                .volumes_from
                .iter()
                .map(|reference| self.resolve_volumes_from(reference))
                .collect(),
            network: self
                .config
                .network_mode
                .as_deref()
                .map(|mode| self.resolve_namespace(mode, true)),
            ipc: self
                .config
                .ipc
                .as_deref()
                .map(|ipc| self.resolve_namespace(ipc, false)),
            labels,
        }
    }

    fn is_node(&self, target: &str) -> bool {
        self.edges.iter().any(|edge| edge.target == target)
    }

    fn resolve_namespace(&self, reference: &str, bare_is_node: bool) -> String {
        if let Some(target) = namespace_target(reference) {
            if self.is_node(target) {
                return format!("container:{}", container_name(&self.project, target));
            }
            return reference.to_string();
        }

        if bare_is_node && self.is_node(reference) {
            return format!("container:{}", container_name(&self.project, reference));
        }
        reference.to_string()
    }

    fn resolve_volumes_from(&self, reference: &str) -> String {
        let (target, mode) = match reference.rsplit_once(':') {
            Some((target, mode)) if mode == "ro" || mode == "rw" => (target, Some(mode)),
            _ => (reference, None),
        };
        let target = namespace_target(target).unwrap_or(target);

        if !self.is_node(target) {
            return reference.to_string();
        }

        let container = container_name(&self.project, target);
        match mode {
            Some(mode) => format!("{container}:{mode}"),
            None => container,
        }
    }

    fn build_image(&self, options: &BuildOptions) -> ComposeResult<()> {
        let Some(build) = self.config.build.as_ref() else {
            return Err(ComposeError::unsupported(&self.name, "build"));
        };

        let tag = self.image();
        info!("Building image {tag} for {}", self.name);
        self.runtime
            .build_image(&tag, &build.dockerfile(), build.context(), options)?;
        Ok(())
    }
}

impl Service for ContainerBackedService {
    fn build(&self, options: &BuildOptions) -> ComposeResult<()> {
        self.build_image(options)
    }

    fn create(&self, options: &CreateOptions) -> ComposeResult<()> {
        let name = self.container_name();
        let container = self.runtime.get_container(&name)?;

        if container.exists() {
            if !options.force_recreate {
                debug!("{name} already exists");
                return Ok(());
            }
            info!("Recreating {name}");
            self.runtime.remove_container(&name)?;
        }

        if self.config.image.is_none() && self.config.build.is_some() && !options.no_build {
            self.build_image(&BuildOptions::default())?;
        }

        info!("Creating {name}");
        self.runtime.create_container(&self.container_spec())?;
        Ok(())
    }

    fn up(&self, options: &UpOptions) -> ComposeResult<()> {
        self.create(&options.create)?;

        let name = self.container_name();
        let container = self.runtime.get_container(&name)?;
        if container.state == ContainerState::Running {
            debug!("{name} is already running");
            return Ok(());
        }

        info!("Starting {name}");
        self.runtime.start_container(&name)?;
        Ok(())
    }

    fn log(&self, follow: bool) -> ComposeResult<()> {
        self.runtime.logs(&self.container_name(), follow)?;
        Ok(())
    }

    fn dependent_services(&self) -> Vec<DependencyEdge> {
        self.edges.clone()
    }

    fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> String {
        match self.runtime.get_container(&self.container_name()) {
            Ok(container) => container.id.unwrap_or_default(),
            Err(e) => {
                debug!("Could not inspect {}: {e:#}", self.name);
                String::new()
            }
        }
    }
}

/// Creates a [`ContainerBackedService`] per node
#[derive(Debug)]
pub struct PodmanServiceFactory {
    project: String,
    runtime: Arc<dyn ContainerRuntime>,
}

impl PodmanServiceFactory {
    pub fn new(project: &str, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            project: project.to_string(),
            runtime,
        }
    }
}

impl ServiceFactory for PodmanServiceFactory {
    fn create(
        &self,
        configs: &ProjectConfigs,
        name: &str,
        config: &ServiceConfig,
    ) -> Result<Arc<dyn Service>> {
        Ok(Arc::new(ContainerBackedService::new(
            &self.project,
            name,
            config.clone(),
            configs,
            Arc::clone(&self.runtime),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BuildConfig, DependencyKind};
    use crate::test_support::MockRuntime;
    use std::path::PathBuf;

    fn image(image: &str) -> ServiceConfig {
        ServiceConfig {
            image: Some(image.to_string()),
            ..Default::default()
        }
    }

    fn service(
        runtime: &Arc<MockRuntime>,
        configs: &ProjectConfigs,
        name: &str,
    ) -> ContainerBackedService {
        let config = configs.get(name).cloned().unwrap();
        ContainerBackedService::new("shop", name, config, configs, runtime.clone())
    }

    fn configs(nodes: Vec<(&str, ServiceConfig)>) -> ProjectConfigs {
        let mut configs = ProjectConfigs::default();
        for (name, config) in nodes {
            configs.add_service(name, config).unwrap();
        }
        configs
    }

    #[test]
    fn create_is_idempotent() {
        let runtime = Arc::new(MockRuntime::new());
        let configs = configs(vec![("db", image("postgres"))]);
        let db = service(&runtime, &configs, "db");

        db.create(&CreateOptions::default()).unwrap();
        db.create(&CreateOptions::default()).unwrap();

        let creates = runtime
            .get_commands()
            .iter()
            .filter(|c| c.as_str() == "create:shop_db")
            .count();
        assert_eq!(creates, 1);
    }

    #[test]
    fn force_recreate_removes_first() {
        let runtime = Arc::new(MockRuntime::new());
        runtime.add_container("shop_db", ContainerState::Running);
        let configs = configs(vec![("db", image("postgres"))]);
        let db = service(&runtime, &configs, "db");

        let options = CreateOptions {
            force_recreate: true,
            ..Default::default()
        };
        db.create(&options).unwrap();

        let commands = runtime.get_commands();
        let remove = commands.iter().position(|c| c == "remove:shop_db").unwrap();
        let create = commands.iter().position(|c| c == "create:shop_db").unwrap();
        assert!(remove < create);
    }

    #[test]
    fn up_creates_then_starts() {
        let runtime = Arc::new(MockRuntime::new());
        let configs = configs(vec![("db", image("postgres"))]);
        let db = service(&runtime, &configs, "db");

        db.up(&UpOptions::default()).unwrap();

        assert_eq!(runtime.get_state("shop_db"), Some(ContainerState::Running));
        assert_eq!(db.id(), "id-shop_db");
    }

    #[test]
    fn up_leaves_running_container_alone() {
        let runtime = Arc::new(MockRuntime::new());
        runtime.add_container("shop_db", ContainerState::Running);
        let configs = configs(vec![("db", image("postgres"))]);

        service(&runtime, &configs, "db")
            .up(&UpOptions::default())
            .unwrap();

        let commands = runtime.get_commands();
        assert!(!commands.iter().any(|c| c.starts_with("start:")));
        assert!(!commands.iter().any(|c| c.starts_with("create:")));
    }

    #[test]
    fn build_without_build_section_is_unsupported() {
        let runtime = Arc::new(MockRuntime::new());
        let configs = configs(vec![("db", image("postgres"))]);

        let err = service(&runtime, &configs, "db")
            .build(&BuildOptions::default())
            .unwrap_err();
        assert!(matches!(err, ComposeError::Unsupported { .. }));
    }

    #[test]
    fn create_builds_missing_image() {
        let runtime = Arc::new(MockRuntime::new());
        let api = ServiceConfig {
            build: Some(BuildConfig::Context(PathBuf::from("/src/api"))),
            ..Default::default()
        };
        let configs = configs(vec![("api", api)]);
        let api = service(&runtime, &configs, "api");

        api.create(&CreateOptions::default()).unwrap();

        assert_eq!(
            runtime.get_commands(),
            vec![
                "get_container:shop_api",
                "build_image:shop_api",
                "create:shop_api"
            ]
        );
        assert_eq!(runtime.get_spec("shop_api").unwrap().image, "shop_api");
    }

    #[test]
    fn no_build_skips_image_build() {
        let runtime = Arc::new(MockRuntime::new());
        let api = ServiceConfig {
            build: Some(BuildConfig::Context(PathBuf::from("/src/api"))),
            ..Default::default()
        };
        let configs = configs(vec![("api", api)]);
        let options = CreateOptions {
            no_build: true,
            ..Default::default()
        };

        service(&runtime, &configs, "api").create(&options).unwrap();

        assert_eq!(
            runtime.get_commands(),
            vec!["get_container:shop_api", "create:shop_api"]
        );
    }

    #[test]
    fn runtime_failure_becomes_backend_error() {
        let runtime = Arc::new(MockRuntime::new());
        runtime.set_fail_on("start");
        let configs = configs(vec![("db", image("postgres"))]);

        let err = service(&runtime, &configs, "db")
            .up(&UpOptions::default())
            .unwrap_err();
        assert!(matches!(err, ComposeError::Backend(_)));
    }

    #[test]
    fn spec_resolves_node_references() {
        let runtime = Arc::new(MockRuntime::new());
        let web = ServiceConfig {
            image: Some("nginx".into()),
            links: vec!["api:backend".into()],
            volumes_from: vec!["data:ro".into(), "external".into()],
            network_mode: Some("service:vpn".into()),
            ipc: Some("host".into()),
            ..Default::default()
        };
        let configs = configs(vec![
            ("api", image("api")),
            ("data", image("busybox")),
            ("vpn", image("wireguard")),
            ("web", web),
        ]);
        let web = service(&runtime, &configs, "web");

        let spec = web.container_spec();

        assert_eq!(spec.name, "shop_web");
        assert_eq!(spec.links, vec!["shop_api"]);
        assert_eq!(spec.volumes_from, vec!["shop_data:ro", "external"]);
        assert_eq!(spec.network.as_deref(), Some("container:shop_vpn"));
        assert_eq!(spec.ipc.as_deref(), Some("host"));
        assert_eq!(spec.labels[0], (PROJECT_LABEL.to_string(), "shop".to_string()));

        let kinds: Vec<_> = web.dependent_services().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DependencyKind::Link,
                DependencyKind::VolumesFrom,
                DependencyKind::NetNamespace
            ]
        );
    }

    #[test]
    fn factory_builds_container_services() {
        let runtime: Arc<dyn ContainerRuntime> = Arc::new(MockRuntime::new());
        let configs = configs(vec![("db", image("postgres"))]);
        let factory = PodmanServiceFactory::new("shop", runtime);

        let db = factory
            .create(&configs, "db", configs.get("db").unwrap())
            .unwrap();
        assert_eq!(db.name(), "db");
        assert!(db.dependent_services().is_empty());
    }
}
