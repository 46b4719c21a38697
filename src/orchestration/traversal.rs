use super::event_bus::EventBus;
use super::wrapper::{ServiceWrapper, WrapperMap};
use crate::domain::{ComposeError, ComposeResult, ProjectConfigs, Service, ServiceFactory};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Launches one selected wrapper; expected to call [`ServiceWrapper::execute`]
pub type WrapperAction = dyn Fn(&ServiceWrapper, &WrapperMap);

/// Runs inline against the target of an optional edge that closed a cycle
pub type CycleAction = dyn Fn(&dyn Service) -> ComposeResult<()>;

/// Invoked between passes when a node asked for a restart
pub type ReloadCallback = Box<dyn FnMut(&mut ProjectConfigs) -> anyhow::Result<()> + Send>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Launch {
    Run(String),
    Ignore(String),
}

/// Walks the dependency graph of a project and launches node actions in
/// dependency order, one pass after another until no node asks for a restart.
pub struct TraversalDriver<'a> {
    configs: &'a mut ProjectConfigs,
    factory: &'a dyn ServiceFactory,
    events: &'a Arc<EventBus>,
    reload_callback: Option<&'a mut ReloadCallback>,
    include_dependencies: bool,
}

impl<'a> TraversalDriver<'a> {
    pub fn new(
        configs: &'a mut ProjectConfigs,
        factory: &'a dyn ServiceFactory,
        events: &'a Arc<EventBus>,
    ) -> Self {
        Self {
            configs,
            factory,
            events,
            reload_callback: None,
            include_dependencies: false,
        }
    }

    pub fn with_reload_callback(mut self, callback: Option<&'a mut ReloadCallback>) -> Self {
        self.reload_callback = callback;
        self
    }

    /// Extends a non-empty selection with everything the selected nodes depend on
    pub fn include_dependencies(mut self, include: bool) -> Self {
        self.include_dependencies = include;
        self
    }

    /// Runs `action` for every selected node (all nodes when `selected` is
    /// empty) and returns the first error that is not a restart request.
    ///
    /// Every selected node is waited for, even after a failure.
    pub fn for_each(
        &mut self,
        selected: &[String],
        action: &WrapperAction,
        cycle_action: Option<&CycleAction>,
    ) -> ComposeResult<()> {
        let mut selected: HashSet<String> = selected.iter().cloned().collect();
        let mut wrappers = WrapperMap::new();
        let mut pass = 0usize;

        loop {
            let to_build = if pass == 0 {
                self.configs.node_names()
            } else {
                for wrapper in wrappers.values_mut() {
                    wrapper.reset()?;
                }
                self.configs.pending_reload().to_vec()
            };
            self.configs.take_reload();
            pass += 1;

            self.load_wrappers(&mut wrappers, &to_build)?;

            for name in &selected {
                if !wrappers.contains_key(name) {
                    return Err(ComposeError::NoSuchService(name.clone()));
                }
            }

            if self.include_dependencies && !selected.is_empty() {
                selected = dependency_closure(&wrappers, &selected);
            }

            let plan = plan_launches(&mut wrappers, &selected, cycle_action)?;
            debug!("Pass {}: launching {} node(s)", pass, plan.len());

            for launch in &plan {
                match launch {
                    Launch::Run(name) => {
                        debug!("Launching action for {}", name);
                        action(&wrappers[name.as_str()], &wrappers);
                    }
                    Launch::Ignore(name) => wrappers[name.as_str()].ignore(),
                }
            }

            let mut restart = false;
            let mut first_error = None;

            for launch in &plan {
                let Launch::Run(name) = launch else { continue };
                match wrappers[name.as_str()].wait() {
                    Ok(()) => {}
                    Err(e) if e.is_restart() => restart = true,
                    Err(e) => {
                        error!("Failed to start {}: {}", name, e);
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                }
            }

            if !restart {
                return first_error.map_or(Ok(()), Err);
            }

            info!("Restart requested, starting pass {}", pass + 1);
            if let Some(callback) = self.reload_callback.as_deref_mut() {
                if let Err(e) = callback(&mut *self.configs) {
                    error!("Failed calling reload callback: {:#}", e);
                }
            }
        }
    }

    fn load_wrappers(&self, wrappers: &mut WrapperMap, names: &[String]) -> ComposeResult<()> {
        for name in names {
            let Some(config) = self.configs.get(name) else {
                warn!("No configuration for {}, skipping", name);
                continue;
            };
            let service = self.factory.create(&*self.configs, name, config)?;
            wrappers.insert(
                name.clone(),
                ServiceWrapper::new(name, service, Arc::clone(self.events)),
            );
        }
        Ok(())
    }
}

fn is_selected(name: &str, selected: &HashSet<String>) -> bool {
    selected.is_empty() || selected.contains(name)
}

fn dependency_closure(wrappers: &WrapperMap, selected: &HashSet<String>) -> HashSet<String> {
    let mut closure = selected.clone();
    let mut pending: Vec<String> = selected.iter().cloned().collect();

    while let Some(name) = pending.pop() {
        let Some(wrapper) = wrappers.get(&name) else { continue };
        for dep in wrapper.service().dependent_services() {
            if closure.insert(dep.target.clone()) {
                pending.push(dep.target);
            }
        }
    }
    closure
}

/// Decides, before anything runs, the order in which wrappers are launched
/// or ignored. Graph errors abort the pass with nothing launched.
fn plan_launches(
    wrappers: &mut WrapperMap,
    selected: &HashSet<String>,
    cycle_action: Option<&CycleAction>,
) -> ComposeResult<Vec<Launch>> {
    let mut launched = HashSet::new();
    let mut plan = Vec::with_capacity(wrappers.len());
    let names: Vec<String> = wrappers.keys().cloned().collect();

    for name in &names {
        start_service(
            wrappers,
            Vec::new(),
            selected,
            &mut launched,
            name,
            &mut plan,
            cycle_action,
        )?;
    }
    Ok(plan)
}

fn start_service(
    wrappers: &mut WrapperMap,
    mut history: Vec<String>,
    selected: &HashSet<String>,
    launched: &mut HashSet<String>,
    name: &str,
    plan: &mut Vec<Launch>,
    cycle_action: Option<&CycleAction>,
) -> ComposeResult<()> {
    if !launched.insert(name.to_string()) {
        return Ok(());
    }

    history.push(name.to_string());

    let edges = wrappers[name].service().dependent_services();
    for dep in edges {
        let Some(target) = wrappers.get(&dep.target) else {
            debug!("Failed to find {}", dep.target);
            return Err(ComposeError::UndefinedDependency {
                service: name.to_string(),
                dependency: dep.target,
            });
        };

        if history.contains(&dep.target) {
            let cycle = format!("{}->{}", history.join("->"), dep.target);
            if !dep.optional {
                return Err(ComposeError::Cycle { path: cycle });
            }

            debug!("Ignoring cycle for {}", cycle);
            let target_service = Arc::clone(target.service());
            if let Some(wrapper) = wrappers.get_mut(name) {
                wrapper.ignore_dep(&dep.target);
            }
            if let Some(cycle_action) = cycle_action {
                debug!("Running cycle action for {}", cycle);
                cycle_action(target_service.as_ref())?;
            }
            continue;
        }

        start_service(
            wrappers,
            history.clone(),
            selected,
            launched,
            &dep.target,
            plan,
            cycle_action,
        )?;
    }

    if is_selected(name, selected) {
        plan.push(Launch::Run(name.to_string()));
    } else {
        plan.push(Launch::Ignore(name.to_string()));
    }
    Ok(())
}
