use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle milestones reported to listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Suppresses notification
    NoEvent,

    ProjectBuildStart,
    ProjectBuildDone,
    ProjectCreateStart,
    ProjectCreateDone,
    ProjectUpStart,
    ProjectUpDone,
    /// A node was held back because one of its dependencies asked for a restart
    ProjectReload,
    /// A node asked for the graph to be visited again
    ProjectReloadTrigger,

    ServiceBuildStart,
    ServiceBuild,
    ServiceCreateStart,
    ServiceCreate,
    ServiceUpStart,
    ServiceUp,
    ServiceLogStart,
    ServiceLog,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoEvent => "",
            Self::ProjectBuildStart => "Building project",
            Self::ProjectBuildDone => "Project built",
            Self::ProjectCreateStart => "Creating project",
            Self::ProjectCreateDone => "Project created",
            Self::ProjectUpStart => "Starting project",
            Self::ProjectUpDone => "Project started",
            Self::ProjectReload => "Reloading project",
            Self::ProjectReloadTrigger => "Triggering project reload",
            Self::ServiceBuildStart => "Building",
            Self::ServiceBuild => "Built",
            Self::ServiceCreateStart => "Creating",
            Self::ServiceCreate => "Created",
            Self::ServiceUpStart => "Starting",
            Self::ServiceUp => "Started",
            Self::ServiceLogStart => "Following logs",
            Self::ServiceLog => "Logs done",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub event_type: EventType,
    /// Empty for project-level events
    pub service_name: String,
    pub data: BTreeMap<String, String>,
}

impl Event {
    pub fn new(event_type: EventType, service_name: &str, data: BTreeMap<String, String>) -> Self {
        Self {
            event_type,
            service_name: service_name.to_string(),
            data,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.service_name.is_empty() {
            write!(f, "{}", self.event_type)
        } else {
            write!(f, "[{}] {}", self.service_name, self.event_type)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_service_events_with_name() {
        let event = Event::new(EventType::ServiceCreate, "db", BTreeMap::new());
        assert_eq!(event.to_string(), "[db] Created");

        let event = Event::new(EventType::ProjectUpStart, "", BTreeMap::new());
        assert_eq!(event.to_string(), "Starting project");
    }
}
