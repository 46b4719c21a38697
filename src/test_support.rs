use crate::domain::{
    BuildOptions, ComposeError, ComposeResult, Container, ContainerRuntime, ContainerSpec,
    ContainerState, CreateOptions, DependencyEdge, ProjectConfigs, Service, ServiceConfig,
    ServiceFactory, UpOptions,
};
use anyhow::{Result, anyhow, bail};
use indexmap::IndexMap;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct MockContainer {
    pub name: String,
    pub state: ContainerState,
    pub spec: Option<ContainerSpec>,
}

/// In-memory [`ContainerRuntime`] that records every command it receives
#[derive(Debug)]
pub struct MockRuntime {
    containers: RwLock<HashMap<String, MockContainer>>,
    commands: RwLock<Vec<String>>,
    fail_on: RwLock<Option<String>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self {
            containers: RwLock::new(HashMap::new()),
            commands: RwLock::new(Vec::new()),
            fail_on: RwLock::new(None),
        }
    }

    pub fn add_container(&self, name: &str, state: ContainerState) {
        self.containers.write().unwrap().insert(
            name.to_string(),
            MockContainer {
                name: name.to_string(),
                state,
                spec: None,
            },
        );
    }

    pub fn set_fail_on(&self, operation: &str) {
        *self.fail_on.write().unwrap() = Some(operation.to_string());
    }

    pub fn get_commands(&self) -> Vec<String> {
        self.commands.read().unwrap().clone()
    }

    pub fn get_state(&self, name: &str) -> Option<ContainerState> {
        self.containers
            .read()
            .unwrap()
            .get(name)
            .map(|c| c.state.clone())
    }

    pub fn get_spec(&self, name: &str) -> Option<ContainerSpec> {
        self.containers
            .read()
            .unwrap()
            .get(name)
            .and_then(|c| c.spec.clone())
    }

    fn record_command(&self, cmd: &str) {
        self.commands.write().unwrap().push(cmd.to_string());
    }

    fn check_fail(&self, operation: &str) -> Result<()> {
        if let Some(ref fail_on) = *self.fail_on.read().unwrap() {
            if fail_on == operation {
                bail!("Mock failure on: {}", operation);
            }
        }
        Ok(())
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerRuntime for MockRuntime {
    fn get_container(&self, name: &str) -> Result<Container> {
        self.record_command(&format!("get_container:{}", name));
        self.check_fail("get_container")?;

        let state = self
            .containers
            .read()
            .unwrap()
            .get(name)
            .map(|c| c.state.clone())
            .unwrap_or(ContainerState::NotCreated);

        let id = (state != ContainerState::NotCreated).then(|| format!("id-{name}"));
        Ok(Container::new(id, state))
    }

    fn create_container(&self, spec: &ContainerSpec) -> Result<()> {
        self.record_command(&format!("create:{}", spec.name));
        self.check_fail("create")?;

        self.containers.write().unwrap().insert(
            spec.name.clone(),
            MockContainer {
                name: spec.name.clone(),
                state: ContainerState::Stopped,
                spec: Some(spec.clone()),
            },
        );
        Ok(())
    }

    fn start_container(&self, name: &str) -> Result<()> {
        self.record_command(&format!("start:{}", name));
        self.check_fail("start")?;

        if let Some(container) = self.containers.write().unwrap().get_mut(name) {
            container.state = ContainerState::Running;
        }
        Ok(())
    }

    fn remove_container(&self, name: &str) -> Result<()> {
        self.record_command(&format!("remove:{}", name));
        self.check_fail("remove")?;

        self.containers.write().unwrap().remove(name);
        Ok(())
    }

    fn build_image(
        &self,
        tag: &str,
        _containerfile: &Path,
        _context_dir: &Path,
        _options: &BuildOptions,
    ) -> Result<()> {
        self.record_command(&format!("build_image:{}", tag));
        self.check_fail("build_image")?;
        Ok(())
    }

    fn logs(&self, name: &str, _follow: bool) -> Result<()> {
        self.record_command(&format!("logs:{}", name));
        self.check_fail("logs")?;
        Ok(())
    }
}

/// Scripted result of one operation call on a [`MockService`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Fail(&'static str),
    Restart,
    Unsupported,
    Panic(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Started,
    Finished,
}

#[derive(Debug, Clone)]
struct Call {
    name: String,
    operation: String,
    phase: Phase,
    seq: u64,
}

#[derive(Debug, Default)]
struct Journal {
    seq: u64,
    calls: Vec<Call>,
    scripts: HashMap<(String, String), VecDeque<Outcome>>,
    delays: HashMap<String, Duration>,
    instances: HashMap<String, usize>,
}

#[derive(Debug, Default)]
struct MockState {
    nodes: RwLock<IndexMap<String, Vec<DependencyEdge>>>,
    journal: Mutex<Journal>,
}

/// [`ServiceFactory`] handing out [`MockService`]s with registered edges.
///
/// Clones share the same journal, so a test can keep one handle while the
/// project owns another.
#[derive(Debug, Clone, Default)]
pub struct MockFactory {
    state: Arc<MockState>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a node and its outgoing edges
    pub fn node(&self, name: &str, edges: Vec<DependencyEdge>) {
        self.state
            .nodes
            .write()
            .unwrap()
            .insert(name.to_string(), edges);
    }

    /// Queues outcomes for successive `operation` calls on `name`; then `Ok`
    pub fn script(&self, name: &str, operation: &str, outcomes: Vec<Outcome>) {
        self.state
            .journal
            .lock()
            .unwrap()
            .scripts
            .insert((name.to_string(), operation.to_string()), outcomes.into());
    }

    /// Makes every operation on `name` take at least `delay`
    pub fn delay(&self, name: &str, delay: Duration) {
        self.state
            .journal
            .lock()
            .unwrap()
            .delays
            .insert(name.to_string(), delay);
    }

    /// One image-only config per registered node, in registration order
    pub fn project_configs(&self) -> ProjectConfigs {
        let mut configs = ProjectConfigs::default();
        for name in self.state.nodes.read().unwrap().keys() {
            let config = ServiceConfig {
                image: Some(format!("mock/{name}")),
                ..Default::default()
            };
            configs.add_service(name, config).unwrap();
        }
        configs
    }

    pub fn service(&self, name: &str) -> Arc<dyn Service> {
        let edges = self
            .state
            .nodes
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default();

        *self
            .state
            .journal
            .lock()
            .unwrap()
            .instances
            .entry(name.to_string())
            .or_default() += 1;

        Arc::new(MockService {
            name: name.to_string(),
            edges,
            config: ServiceConfig {
                image: Some(format!("mock/{name}")),
                ..Default::default()
            },
            state: Arc::clone(&self.state),
        })
    }

    /// How many times `operation` started on `name`
    pub fn calls(&self, name: &str, operation: &str) -> usize {
        self.journal_calls()
            .iter()
            .filter(|c| c.name == name && c.operation == operation && c.phase == Phase::Started)
            .count()
    }

    /// Node names in the order `operation` started on them
    pub fn started_order(&self, operation: &str) -> Vec<String> {
        self.journal_calls()
            .into_iter()
            .filter(|c| c.operation == operation && c.phase == Phase::Started)
            .map(|c| c.name)
            .collect()
    }

    /// Sequence number of the first start of `operation` on `name`
    pub fn start_seq(&self, name: &str, operation: &str) -> Option<u64> {
        self.journal_calls()
            .iter()
            .find(|c| c.name == name && c.operation == operation && c.phase == Phase::Started)
            .map(|c| c.seq)
    }

    /// True when the last call on `first` finished before the first call on `second` started
    pub fn finished_before(&self, first: &str, second: &str) -> bool {
        let calls = self.journal_calls();
        let finished = calls
            .iter()
            .filter(|c| c.name == first && c.phase == Phase::Finished)
            .map(|c| c.seq)
            .max();
        let started = calls
            .iter()
            .filter(|c| c.name == second && c.phase == Phase::Started)
            .map(|c| c.seq)
            .min();
        matches!((finished, started), (Some(f), Some(s)) if f < s)
    }

    /// How many service instances were built for `name`
    pub fn instances(&self, name: &str) -> usize {
        self.state
            .journal
            .lock()
            .unwrap()
            .instances
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    fn journal_calls(&self) -> Vec<Call> {
        self.state.journal.lock().unwrap().calls.clone()
    }
}

impl ServiceFactory for MockFactory {
    fn create(
        &self,
        _configs: &ProjectConfigs,
        name: &str,
        _config: &ServiceConfig,
    ) -> Result<Arc<dyn Service>> {
        if !self.state.nodes.read().unwrap().contains_key(name) {
            return Err(anyhow!("mock node {name} is not registered"));
        }
        Ok(self.service(name))
    }
}

#[derive(Debug)]
pub struct MockService {
    name: String,
    edges: Vec<DependencyEdge>,
    config: ServiceConfig,
    state: Arc<MockState>,
}

impl MockService {
    fn record(&self, operation: &str, phase: Phase) {
        let mut journal = self.state.journal.lock().unwrap();
        journal.seq += 1;
        let seq = journal.seq;
        journal.calls.push(Call {
            name: self.name.clone(),
            operation: operation.to_string(),
            phase,
            seq,
        });
    }

    fn perform(&self, operation: &str) -> ComposeResult<()> {
        self.record(operation, Phase::Started);

        let (delay, outcome) = {
            let mut journal = self.state.journal.lock().unwrap();
            let delay = journal.delays.get(&self.name).copied();
            let outcome = journal
                .scripts
                .get_mut(&(self.name.clone(), operation.to_string()))
                .and_then(|queue| queue.pop_front())
                .unwrap_or(Outcome::Ok);
            (delay, outcome)
        };

        if let Some(delay) = delay {
            thread::sleep(delay);
        }

        self.record(operation, Phase::Finished);

        match outcome {
            Outcome::Ok => Ok(()),
            Outcome::Fail(msg) => Err(anyhow!("{msg}").into()),
            Outcome::Restart => Err(ComposeError::Restart),
            Outcome::Unsupported => Err(ComposeError::unsupported(&self.name, operation)),
            Outcome::Panic(msg) => panic!("{msg}"),
        }
    }
}

impl Service for MockService {
    fn build(&self, _options: &BuildOptions) -> ComposeResult<()> {
        self.perform("build")
    }

    fn create(&self, _options: &CreateOptions) -> ComposeResult<()> {
        self.perform("create")
    }

    fn up(&self, _options: &UpOptions) -> ComposeResult<()> {
        self.perform("up")
    }

    fn log(&self, _follow: bool) -> ComposeResult<()> {
        self.perform("log")
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
        format!("mock-{}", self.name)
    }
}
