use crate::domain::{
    BuildConfig, DependencyConfig, HostConfig, NetworkConfig, ProjectConfigs, ProjectSettings,
    SecretConfig, ServiceConfig, VolumeConfig,
};
use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const SETTINGS_FILE_NAME: &str = "stackbox.toml";

/// One compose file as written on disk
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct ComposeFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub services: IndexMap<String, ServiceConfig>,
    #[serde(default)]
    pub containers: IndexMap<String, ServiceConfig>,
    #[serde(default)]
    pub volumes: IndexMap<String, Option<VolumeConfig>>,
    #[serde(default)]
    pub networks: IndexMap<String, Option<NetworkConfig>>,
    #[serde(default)]
    pub secrets: IndexMap<String, Option<SecretConfig>>,
    #[serde(default)]
    pub hosts: IndexMap<String, HostConfig>,
    #[serde(default)]
    pub dependencies: IndexMap<String, DependencyConfig>,
}

/// Result of loading a project's compose files
#[derive(Debug, Default)]
pub struct LoadedProject {
    /// Last `name:` found across the files
    pub name: Option<String>,
    pub configs: ProjectConfigs,
}

pub fn parse_compose(content: &str) -> Result<ComposeFile> {
    let file: ComposeFile = serde_yml::from_str(content)?;
    Ok(file)
}

/// Validates a node name against container naming rules
pub fn validate_node_name(name: &str) -> Result<()> {
    let Some(first_char) = name.trim().chars().next() else {
        bail!("Empty node name found");
    };

    if !first_char.is_alphanumeric() {
        bail!("Node name '{}' must start with a letter or digit", name);
    }

    for c in name.chars() {
        if !c.is_alphanumeric() && c != '_' && c != '.' && c != '-' {
            bail!("Node name '{}' contains invalid character '{}'", name, c);
        }
    }

    Ok(())
}

fn validate_node(name: &str, config: &ServiceConfig) -> Result<()> {
    validate_node_name(name)?;

    let has_image = config
        .image
        .as_deref()
        .is_some_and(|image| !image.trim().is_empty());
    if !has_image && config.build.is_none() {
        bail!("Node '{}' needs an 'image' or a 'build' section", name);
    }

    Ok(())
}

/// Makes a relative build context relative to the compose file's directory
fn anchor_build(config: &mut ServiceConfig, base_dir: &Path) {
    let Some(build) = config.build.as_mut() else {
        return;
    };

    match build {
        BuildConfig::Context(context) | BuildConfig::Detailed { context, .. } => {
            if context.is_relative() {
                *context = base_dir.join(&*context);
            }
        }
    }
}

fn expand_path(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path.to_string_lossy().as_ref()).into_owned())
}

pub fn load_compose_file(path: &Path) -> Result<ComposeFile> {
    let path = expand_path(path);
    let content = fs::read_to_string(&path).with_context(|| format!("reading {:?}", path))?;
    parse_compose(&content).with_context(|| format!("parsing {:?}", path))
}

/// Loads and merges compose files in order; later files override earlier
/// ones by node name and by table key.
pub fn load_project_configs(paths: &[PathBuf]) -> Result<LoadedProject> {
    if paths.is_empty() {
        bail!("No compose file given");
    }

    let mut loaded = LoadedProject::default();

    for path in paths {
        let file = load_compose_file(path)?;
        let base_dir = expand_path(path)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        info!(
            "Loading {} service(s) and {} container(s) from {:?}",
            file.services.len(),
            file.containers.len(),
            path
        );

        if file.name.is_some() {
            loaded.name = file.name;
        }

        let mut configs = ProjectConfigs::default();
        for (name, mut config) in file.services {
            validate_node(&name, &config).with_context(|| format!("in {:?}", path))?;
            anchor_build(&mut config, &base_dir);
            configs.add_service(&name, config)?;
        }
        for (name, mut config) in file.containers {
            validate_node(&name, &config).with_context(|| format!("in {:?}", path))?;
            anchor_build(&mut config, &base_dir);
            configs.add_container(&name, config)?;
        }

        configs.volumes = file
            .volumes
            .into_iter()
            .map(|(k, v)| (k, v.unwrap_or_default()))
            .collect();
        configs.networks = file
            .networks
            .into_iter()
            .map(|(k, v)| (k, v.unwrap_or_default()))
            .collect();
        configs.secrets = file
            .secrets
            .into_iter()
            .map(|(k, v)| (k, v.unwrap_or_default()))
            .collect();
        configs.hosts = file.hosts;
        configs.dependencies = file.dependencies;

        loaded
            .configs
            .merge(configs)
            .with_context(|| format!("merging {:?}", path))?;
    }

    debug!("Loaded {} node(s)", loaded.configs.len());
    Ok(loaded)
}

/// Reads stackbox.toml from `dir`, defaulting every setting when absent
pub fn load_settings(dir: &Path) -> Result<ProjectSettings> {
    let path = expand_path(dir).join(SETTINGS_FILE_NAME);
    if !path.exists() {
        return Ok(ProjectSettings::default());
    }

    let content = fs::read_to_string(&path).with_context(|| format!("reading {:?}", path))?;
    toml::from_str(&content).with_context(|| format!("parsing {:?}", path))
}
