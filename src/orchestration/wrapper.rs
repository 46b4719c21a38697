use super::event_bus::EventBus;
use crate::domain::{ComposeError, ComposeResult, EventType, Service};
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// Wrappers of one pass, keyed by node name in traversal order
pub type WrapperMap = IndexMap<String, ServiceWrapper>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperStatus {
    Unexecuted,
    Running,
    Succeeded,
    Failed,
    Ignored,
    /// Did not run because a dependency asked for a restart
    HeldBack,
}

#[derive(Debug, Clone)]
enum State {
    Unexecuted,
    Running,
    Done(ComposeResult<()>),
    HeldBack,
    Ignored,
}

/// Completion signal of one wrapper, awaited by the driver and by dependents
#[derive(Debug)]
struct Completion {
    state: Mutex<State>,
    changed: Condvar,
}

impl Completion {
    fn new() -> Self {
        Self {
            state: Mutex::new(State::Unexecuted),
            changed: Condvar::new(),
        }
    }

    fn set(&self, state: State) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
        self.changed.notify_all();
    }

    fn get(&self) -> State {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn wait(&self) -> ComposeResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match &*state {
                State::Done(result) => return result.clone(),
                State::HeldBack => return Err(ComposeError::Restart),
                State::Ignored => return Ok(()),
                State::Unexecuted | State::Running => {
                    state = self
                        .changed
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }
}

/// Executes one node's action at most once per pass.
pub struct ServiceWrapper {
    name: String,
    service: Arc<dyn Service>,
    events: Arc<EventBus>,
    completion: Arc<Completion>,
    ignored: HashSet<String>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ServiceWrapper {
    pub fn new(name: &str, service: Arc<dyn Service>, events: Arc<EventBus>) -> Self {
        Self {
            name: name.to_string(),
            service,
            events,
            completion: Arc::new(Completion::new()),
            ignored: HashSet::new(),
            worker: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service(&self) -> &Arc<dyn Service> {
        &self.service
    }

    pub fn status(&self) -> WrapperStatus {
        match self.completion.get() {
            State::Unexecuted => WrapperStatus::Unexecuted,
            State::Running => WrapperStatus::Running,
            State::Done(Ok(())) => WrapperStatus::Succeeded,
            State::Done(Err(_)) => WrapperStatus::Failed,
            State::Ignored => WrapperStatus::Ignored,
            State::HeldBack => WrapperStatus::HeldBack,
        }
    }

    pub fn ignores_dep(&self, target: &str) -> bool {
        self.ignored.contains(target)
    }

    /// Runs `action` on a worker thread unless this wrapper already executed.
    ///
    /// With `wrappers`, the worker first waits for every dependency that has
    /// not been ignored. A dependency that asked for a restart holds this node
    /// back: it is marked held back without running `action`.
    pub fn execute<F>(
        &self,
        wrappers: Option<&WrapperMap>,
        start: EventType,
        done: EventType,
        action: F,
    ) where
        F: FnOnce(&dyn Service) -> ComposeResult<()> + Send + 'static,
    {
        if matches!(self.completion.get(), State::Done(_)) {
            debug!("{} already executed, skipping", self.name);
            return;
        }

        let deps = wrappers.map(|w| self.dependency_signals(w)).unwrap_or_default();
        self.completion.set(State::Running);

        let name = self.name.clone();
        let service = Arc::clone(&self.service);
        let events = Arc::clone(&self.events);
        let completion = Arc::clone(&self.completion);

        let spawned = thread::Builder::new()
            .name(format!("stackbox-{name}"))
            .spawn(move || {
                for (dep, signal) in deps {
                    if let Err(ComposeError::Restart) = signal.wait() {
                        events.notify(EventType::ProjectReload, &dep, BTreeMap::new());
                        completion.set(State::HeldBack);
                        return;
                    }
                }

                events.notify(start, service.name(), BTreeMap::new());

                let result = panic::catch_unwind(AssertUnwindSafe(|| action(service.as_ref())))
                    .unwrap_or_else(|_| Err(ComposeError::Panicked(name.clone())));

                match &result {
                    Ok(()) => events.notify(done, service.name(), BTreeMap::new()),
                    Err(ComposeError::Restart) => {
                        events.notify(done, service.name(), BTreeMap::new());
                        events.notify(
                            EventType::ProjectReloadTrigger,
                            service.name(),
                            BTreeMap::new(),
                        );
                    }
                    Err(e) => error!("Failed {} {}: {}", start, name, e),
                }

                completion.set(State::Done(result));
            });

        match spawned {
            Ok(handle) => {
                *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
            }
            Err(e) => {
                error!("Could not spawn worker for {}: {}", self.name, e);
                let err =
                    anyhow::Error::new(e).context(format!("spawning worker for {}", self.name));
                self.completion.set(State::Done(Err(err.into())));
            }
        }
    }

    /// Blocks until this wrapper was executed or ignored and returns its outcome
    pub fn wait(&self) -> ComposeResult<()> {
        let result = self.completion.wait();
        self.join_worker()?;
        result
    }

    /// Marks this wrapper as deliberately skipped for the pass
    pub fn ignore(&self) {
        self.completion.set(State::Ignored);
    }

    /// Stops waiting on `target` for the rest of the pass
    pub fn ignore_dep(&mut self, target: &str) {
        self.ignored.insert(target.to_string());
    }

    /// Prepares the wrapper for another pass.
    ///
    /// Executed wrappers stay executed; a restart request they returned is
    /// cleared. Only wrappers held back by a dependency's restart, or ignored,
    /// run again.
    pub fn reset(&mut self) -> ComposeResult<()> {
        self.join_worker()?;
        self.ignored.clear();

        match self.completion.get() {
            State::Done(Err(ComposeError::Restart)) => {
                self.completion.set(State::Done(Ok(())));
            }
            State::HeldBack | State::Ignored | State::Running => {
                self.completion.set(State::Unexecuted);
            }
            State::Done(_) | State::Unexecuted => {}
        }
        Ok(())
    }

    fn dependency_signals(&self, wrappers: &WrapperMap) -> Vec<(String, Arc<Completion>)> {
        let mut signals = Vec::new();
        for dep in self.service.dependent_services() {
            if self.ignored.contains(&dep.target) {
                continue;
            }
            match wrappers.get(&dep.target) {
                Some(wrapper) => signals.push((dep.target, Arc::clone(&wrapper.completion))),
                None => error!("Failed to find {} for {}", dep.target, self.name),
            }
        }
        signals
    }

    fn join_worker(&self) -> ComposeResult<()> {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match handle {
            Some(handle) => handle
                .join()
                .map_err(|_| ComposeError::Panicked(self.name.clone())),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ServiceWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceWrapper")
            .field("name", &self.name)
            .field("status", &self.status())
            .field("ignored", &self.ignored)
            .finish()
    }
}
