use super::error::{ComposeError, ComposeResult};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::PathBuf;

/// Configuration record of one node (service or standalone container)
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub build: Option<BuildConfig>,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub environment: Vec<String>,
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default)]
    pub volumes: Vec<String>,
    /// `name` or `name:alias`
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub volumes_from: Vec<String>,
    #[serde(default)]
    pub network_mode: Option<String>,
    #[serde(default)]
    pub ipc: Option<String>,
    #[serde(default)]
    pub labels: IndexMap<String, String>,
}

/// `build: ./dir` or `build: { context: ./dir, dockerfile: Containerfile }`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum BuildConfig {
    Context(PathBuf),
    Detailed {
        context: PathBuf,
        #[serde(default)]
        dockerfile: Option<PathBuf>,
    },
}

impl BuildConfig {
    pub fn context(&self) -> &PathBuf {
        match self {
            Self::Context(context) | Self::Detailed { context, .. } => context,
        }
    }

    /// Containerfile path, relative to the context when not absolute
    pub fn dockerfile(&self) -> PathBuf {
        let file = match self {
            Self::Detailed {
                dockerfile: Some(file),
                ..
            } => file.clone(),
            _ => PathBuf::from("Containerfile"),
        };
        self.context().join(file)
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct VolumeConfig {
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub driver_opts: IndexMap<String, String>,
    #[serde(default)]
    pub external: bool,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct NetworkConfig {
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub external: bool,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct SecretConfig {
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub external: bool,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct HostConfig {
    pub address: String,
    #[serde(default)]
    pub labels: IndexMap<String, String>,
}

/// Another project whose nodes this one expects to exist
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct DependencyConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub services: Vec<String>,
}

/// The configuration tables of a project.
///
/// Services and containers share a single node namespace. Every insertion of a
/// node config marks that node dirty so the next restart pass rebuilds it.
#[derive(Debug, Clone, Default)]
pub struct ProjectConfigs {
    services: IndexMap<String, ServiceConfig>,
    containers: IndexMap<String, ServiceConfig>,
    pub volumes: IndexMap<String, VolumeConfig>,
    pub networks: IndexMap<String, NetworkConfig>,
    pub secrets: IndexMap<String, SecretConfig>,
    pub hosts: IndexMap<String, HostConfig>,
    pub dependencies: IndexMap<String, DependencyConfig>,
    reload: Vec<String>,
}

impl ProjectConfigs {
    pub fn add_service(&mut self, name: &str, config: ServiceConfig) -> ComposeResult<()> {
        if self.containers.contains_key(name) {
            return Err(ComposeError::AmbiguousName(name.to_string()));
        }
        self.services.insert(name.to_string(), config);
        self.mark_dirty(name);
        Ok(())
    }

    pub fn add_container(&mut self, name: &str, config: ServiceConfig) -> ComposeResult<()> {
        if self.services.contains_key(name) {
            return Err(ComposeError::AmbiguousName(name.to_string()));
        }
        self.containers.insert(name.to_string(), config);
        self.mark_dirty(name);
        Ok(())
    }

    /// Looks a node up across the service and container tables
    pub fn get(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.get(name).or_else(|| self.containers.get(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_container(&self, name: &str) -> bool {
        self.containers.contains_key(name)
    }

    /// All node names: services first, then containers, in declaration order
    pub fn node_names(&self) -> Vec<String> {
        self.services
            .keys()
            .chain(self.containers.keys())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services.len() + self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mark_dirty(&mut self, name: &str) {
        if !self.reload.iter().any(|n| n == name) {
            self.reload.push(name.to_string());
        }
    }

    pub fn pending_reload(&self) -> &[String] {
        &self.reload
    }

    /// Drains the reload set
    pub fn take_reload(&mut self) -> Vec<String> {
        std::mem::take(&mut self.reload)
    }

    /// Applies `other` on top of `self`; entries in `other` win by key.
    pub fn merge(&mut self, other: ProjectConfigs) -> ComposeResult<()> {
        for (name, config) in other.services {
            self.add_service(&name, config)?;
        }
        for (name, config) in other.containers {
            self.add_container(&name, config)?;
        }
        self.volumes.extend(other.volumes);
        self.networks.extend(other.networks);
        self.secrets.extend(other.secrets);
        self.hosts.extend(other.hosts);
        self.dependencies.extend(other.dependencies);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(name: &str) -> ServiceConfig {
        ServiceConfig {
            image: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn services_and_containers_share_a_namespace() {
        let mut configs = ProjectConfigs::default();
        configs.add_service("db", image("postgres")).unwrap();
        configs.add_container("proxy", image("nginx")).unwrap();

        assert!(configs.contains("db"));
        assert!(configs.contains("proxy"));
        assert!(configs.is_container("proxy"));
        assert_eq!(configs.node_names(), vec!["db", "proxy"]);

        let err = configs.add_container("db", image("mysql")).unwrap_err();
        assert!(matches!(err, ComposeError::AmbiguousName(name) if name == "db"));
    }

    #[test]
    fn adding_configs_marks_nodes_dirty_once() {
        let mut configs = ProjectConfigs::default();
        configs.add_service("db", image("postgres")).unwrap();
        configs.add_service("db", image("postgres:16")).unwrap();
        configs.add_service("web", image("nginx")).unwrap();

        assert_eq!(configs.take_reload(), vec!["db", "web"]);
        assert!(configs.pending_reload().is_empty());
        assert_eq!(configs.get("db").unwrap().image.as_deref(), Some("postgres:16"));
    }

    #[test]
    fn merge_overrides_by_name() {
        let mut base = ProjectConfigs::default();
        base.add_service("db", image("postgres:15")).unwrap();
        base.volumes.insert("data".into(), VolumeConfig::default());

        let mut over = ProjectConfigs::default();
        over.add_service("db", image("postgres:16")).unwrap();
        over.add_service("cache", image("redis")).unwrap();

        base.merge(over).unwrap();

        assert_eq!(base.len(), 2);
        assert_eq!(base.get("db").unwrap().image.as_deref(), Some("postgres:16"));
        assert!(base.volumes.contains_key("data"));
    }

    #[test]
    fn build_config_resolves_dockerfile() {
        let short = BuildConfig::Context(PathBuf::from("./api"));
        assert_eq!(short.dockerfile(), PathBuf::from("./api/Containerfile"));

        let detailed = BuildConfig::Detailed {
            context: PathBuf::from("./web"),
            dockerfile: Some(PathBuf::from("Dockerfile.dev")),
        };
        assert_eq!(detailed.dockerfile(), PathBuf::from("./web/Dockerfile.dev"));
    }
}
