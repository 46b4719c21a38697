#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    Stopped,
    NotCreated,
}

#[derive(Debug, Clone)]
pub struct Container {
    pub id: Option<String>,
    pub state: ContainerState,
}

impl Container {
    pub fn new(id: Option<String>, state: ContainerState) -> Self {
        Self { id, state }
    }

    pub fn missing() -> Self {
        Self::new(None, ContainerState::NotCreated)
    }

    pub fn exists(&self) -> bool {
        self.state != ContainerState::NotCreated
    }
}

/// Everything the runtime needs to create one container.
///
/// Node references (links, namespaces, volumes-from) are already resolved to
/// container names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub ports: Vec<String>,
    pub env: Vec<String>,
    pub volumes: Vec<String>,
    /// Containers that must be started before this one
    pub links: Vec<String>,
    pub volumes_from: Vec<String>,
    pub network: Option<String>,
    pub ipc: Option<String>,
    pub labels: Vec<(String, String)>,
}
