use super::event_bus::EventBus;
use super::traversal::{CycleAction, ReloadCallback, TraversalDriver, WrapperAction};
use super::wrapper::{ServiceWrapper, WrapperMap};
use crate::domain::{
    BuildOptions, ComposeError, ComposeResult, CreateOptions, Event, EventType, ProjectConfigs,
    Service, ServiceFactory, UpOptions,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::mpsc::SyncSender;
use tracing::debug;

/// A set of interrelated nodes and the operations that bring them up
pub struct Project {
    name: String,
    configs: ProjectConfigs,
    factory: Arc<dyn ServiceFactory>,
    events: Arc<EventBus>,
    reload_callback: Option<ReloadCallback>,
}

impl Project {
    pub fn new(name: &str, configs: ProjectConfigs, factory: Arc<dyn ServiceFactory>) -> Self {
        Self {
            name: name.to_string(),
            configs,
            factory,
            events: Arc::new(EventBus::new(name)),
            reload_callback: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn configs(&self) -> &ProjectConfigs {
        &self.configs
    }

    /// Installs a listener; the first one replaces the default logging sink
    pub fn add_listener(&self, listener: SyncSender<Event>) {
        self.events.add_listener(listener);
    }

    pub fn has_listener(&self) -> bool {
        self.events.has_listener()
    }

    pub fn notify(
        &self,
        event_type: EventType,
        service_name: &str,
        data: BTreeMap<String, String>,
    ) {
        self.events.notify(event_type, service_name, data);
    }

    /// Called between passes when a node asked for a restart. Configs it adds
    /// or replaces are rebuilt on the next pass.
    pub fn set_reload_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&mut ProjectConfigs) -> anyhow::Result<()> + Send + 'static,
    {
        self.reload_callback = Some(Box::new(callback));
    }

    /// Instantiates the service behind a node
    pub fn create_service(&self, name: &str) -> ComposeResult<Arc<dyn Service>> {
        let config = self
            .configs
            .get(name)
            .ok_or_else(|| ComposeError::NoSuchService(name.to_string()))?;
        Ok(self.factory.create(&self.configs, name, config)?)
    }

    pub fn build(&mut self, options: &BuildOptions, services: &[String]) -> ComposeResult<()> {
        let options = options.clone();
        let action = move |wrapper: &ServiceWrapper, wrappers: &WrapperMap| {
            let options = options.clone();
            wrapper.execute(
                Some(wrappers),
                EventType::ServiceBuildStart,
                EventType::ServiceBuild,
                move |service| service.build(&options),
            );
        };

        self.perform(
            EventType::ProjectBuildStart,
            EventType::ProjectBuildDone,
            services,
            true,
            &action,
            None,
        )
    }

    /// Creates every selected node. Safe to repeat: creating an existing node is a no-op.
    pub fn create(&mut self, options: &CreateOptions, services: &[String]) -> ComposeResult<()> {
        let options = options.clone();
        let action = move |wrapper: &ServiceWrapper, wrappers: &WrapperMap| {
            let options = options.clone();
            wrapper.execute(
                Some(wrappers),
                EventType::ServiceCreateStart,
                EventType::ServiceCreate,
                move |service| service.create(&options),
            );
        };

        self.perform(
            EventType::ProjectCreateStart,
            EventType::ProjectCreateDone,
            services,
            true,
            &action,
            None,
        )
    }

    /// Brings the selected nodes up. The target of an optional edge that closes
    /// a cycle is created right away, so it exists before its dependent starts.
    pub fn up(&mut self, options: &UpOptions, services: &[String]) -> ComposeResult<()> {
        let up_options = options.clone();
        let action = move |wrapper: &ServiceWrapper, wrappers: &WrapperMap| {
            let options = up_options.clone();
            wrapper.execute(
                Some(wrappers),
                EventType::ServiceUpStart,
                EventType::ServiceUp,
                move |service| service.up(&options),
            );
        };

        let create_options = options.create.clone();
        let cycle_action = move |service: &dyn Service| service.create(&create_options);

        self.perform(
            EventType::ProjectUpStart,
            EventType::ProjectUpDone,
            services,
            true,
            &action,
            Some(&cycle_action),
        )
    }

    /// Prints logs of the selected nodes. Nodes do not wait for one another.
    pub fn log(&mut self, follow: bool, services: &[String]) -> ComposeResult<()> {
        let action = move |wrapper: &ServiceWrapper, _: &WrapperMap| {
            wrapper.execute(
                None,
                EventType::ServiceLogStart,
                EventType::ServiceLog,
                move |service| service.log(follow),
            );
        };

        self.perform(
            EventType::NoEvent,
            EventType::NoEvent,
            services,
            false,
            &action,
            None,
        )
    }

    fn perform(
        &mut self,
        start: EventType,
        done: EventType,
        services: &[String],
        include_dependencies: bool,
        action: &WrapperAction,
        cycle_action: Option<&CycleAction>,
    ) -> ComposeResult<()> {
        debug!("{}: {:?} for {:?}", self.name, start, services);
        self.events.notify(start, "", BTreeMap::new());

        let result = TraversalDriver::new(&mut self.configs, self.factory.as_ref(), &self.events)
            .with_reload_callback(self.reload_callback.as_mut())
            .include_dependencies(include_dependencies)
            .for_each(services, action, cycle_action);

        self.events.notify(done, "", BTreeMap::new());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DependencyEdge, DependencyKind};
    use crate::test_support::{MockFactory, Outcome};
    use std::sync::mpsc::sync_channel;

    fn project(factory: &MockFactory) -> Project {
        Project::new("test", factory.project_configs(), Arc::new(factory.clone()))
    }

    #[test]
    fn up_emits_project_and_service_events() {
        let factory = MockFactory::new();
        factory.node("db", vec![]);
        let mut project = project(&factory);
        let (tx, rx) = sync_channel(64);
        project.add_listener(tx);

        project.up(&UpOptions::default(), &[]).unwrap();

        let events: Vec<_> = rx.try_iter().map(|e| (e.event_type, e.service_name)).collect();
        assert_eq!(
            events,
            vec![
                (EventType::ProjectUpStart, String::new()),
                (EventType::ServiceUpStart, "db".to_string()),
                (EventType::ServiceUp, "db".to_string()),
                (EventType::ProjectUpDone, String::new()),
            ]
        );
    }

    #[test]
    fn log_emits_no_project_events() {
        let factory = MockFactory::new();
        factory.node("db", vec![]);
        let mut project = project(&factory);
        let (tx, rx) = sync_channel(64);
        project.add_listener(tx);

        project.log(false, &[]).unwrap();

        let types: Vec<_> = rx.try_iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![EventType::ServiceLogStart, EventType::ServiceLog]);
        assert_eq!(factory.calls("db", "log"), 1);
    }

    #[test]
    fn log_does_not_pull_in_dependencies() {
        let factory = MockFactory::new();
        factory.node("db", vec![]);
        factory.node("web", vec![DependencyEdge::mandatory("db", DependencyKind::DependsOn)]);
        let mut project = project(&factory);

        project.log(false, &["web".to_string()]).unwrap();

        assert_eq!(factory.calls("web", "log"), 1);
        assert_eq!(factory.calls("db", "log"), 0);
    }

    #[test]
    fn up_creates_target_of_broken_cycle() {
        let factory = MockFactory::new();
        factory.node("a", vec![DependencyEdge::mandatory("b", DependencyKind::DependsOn)]);
        factory.node("b", vec![DependencyEdge::parse("a", DependencyKind::Link)]);
        let mut project = project(&factory);

        project.up(&UpOptions::default(), &[]).unwrap();

        assert_eq!(factory.calls("a", "create"), 1);
        assert_eq!(factory.calls("a", "up"), 1);
        assert_eq!(factory.calls("b", "up"), 1);
    }

    #[test]
    fn build_reports_unsupported_nodes() {
        let factory = MockFactory::new();
        factory.node("db", vec![]);
        factory.script("db", "build", vec![Outcome::Unsupported]);
        let mut project = project(&factory);

        let err = project.build(&BuildOptions::default(), &[]).unwrap_err();
        assert!(matches!(err, ComposeError::Unsupported { .. }));
    }

    #[test]
    fn create_service_rejects_unknown_name() {
        let factory = MockFactory::new();
        factory.node("db", vec![]);
        let project = project(&factory);

        assert_eq!(project.create_service("db").unwrap().name(), "db");
        assert!(matches!(
            project.create_service("ghost"),
            Err(ComposeError::NoSuchService(_))
        ));
    }
}
