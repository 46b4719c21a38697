use super::config::{ProjectConfigs, ServiceConfig};
use std::fmt;

/// How a dependent node relates to its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    Link,
    NetNamespace,
    IpcNamespace,
    VolumesFrom,
    DependsOn,
    NetworkMode,
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Link => "link",
            Self::NetNamespace => "net-namespace",
            Self::IpcNamespace => "ipc-namespace",
            Self::VolumesFrom => "volumes-from",
            Self::DependsOn => "depends-on",
            Self::NetworkMode => "network-mode",
        };
        f.write_str(s)
    }
}

/// A typed edge from a dependent node to `target`.
///
/// Optional edges may be dropped when they close a cycle; mandatory ones may not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub target: String,
    pub alias: String,
    pub kind: DependencyKind,
    pub optional: bool,
}

impl DependencyEdge {
    /// Builds an edge from `name` or `name:alias`. Links are the only optional kind.
    pub fn parse(spec: &str, kind: DependencyKind) -> Self {
        let (target, alias) = match spec.split_once(':') {
            Some((target, alias)) if !alias.is_empty() => (target, alias),
            Some((target, _)) => (target, target),
            None => (spec, spec),
        };

        Self {
            target: target.to_string(),
            alias: alias.to_string(),
            kind,
            optional: kind == DependencyKind::Link,
        }
    }

    pub fn mandatory(target: &str, kind: DependencyKind) -> Self {
        Self {
            target: target.to_string(),
            alias: target.to_string(),
            kind,
            optional: false,
        }
    }
}

/// Derives the dependency edges of a node from its configuration.
///
/// Namespace and volume references only produce an edge when they name a node
/// known to `configs`; anything else refers to an external container.
pub fn default_dependent_services(
    configs: &ProjectConfigs,
    config: &ServiceConfig,
) -> Vec<DependencyEdge> {
    let mut edges = Vec::new();

    for link in &config.links {
        edges.push(DependencyEdge::parse(link, DependencyKind::Link));
    }

    for volumes_from in &config.volumes_from {
        push_namespace(&mut edges, configs, volumes_from, DependencyKind::VolumesFrom);
    }

    for dep in &config.depends_on {
        edges.push(DependencyEdge::mandatory(dep, DependencyKind::DependsOn));
    }

    if let Some(mode) = config.network_mode.as_deref() {
        push_namespace(&mut edges, configs, mode, DependencyKind::NetNamespace);
    }

    if let Some(ipc) = config.ipc.as_deref() {
        push_namespace(&mut edges, configs, ipc, DependencyKind::IpcNamespace);
    }

    edges
}

fn push_namespace(
    edges: &mut Vec<DependencyEdge>,
    configs: &ProjectConfigs,
    reference: &str,
    kind: DependencyKind,
) {
    let (target, kind) = match namespace_target(reference) {
        Some(target) => (target, kind),
        // A bare network mode naming a node shares that node's network
        None if kind == DependencyKind::NetNamespace => (reference, DependencyKind::NetworkMode),
        None if kind == DependencyKind::VolumesFrom => (strip_access_mode(reference), kind),
        None => return,
    };

    if configs.contains(target) {
        edges.push(DependencyEdge::mandatory(target, kind));
    }
}

/// Extracts the node name from `service:name[:ro]` / `container:name[:rw]`.
pub fn namespace_target(reference: &str) -> Option<&str> {
    let rest = reference
        .strip_prefix("service:")
        .or_else(|| reference.strip_prefix("container:"))?;
    Some(strip_access_mode(rest))
}

fn strip_access_mode(reference: &str) -> &str {
    reference
        .strip_suffix(":ro")
        .or_else(|| reference.strip_suffix(":rw"))
        .unwrap_or(reference)
}
