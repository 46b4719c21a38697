use crate::domain::{Event, EventType};
use std::collections::BTreeMap;
use std::sync::mpsc::SyncSender;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

enum Sinks {
    /// Logs every event until a real listener is installed
    Default,
    Installed(Vec<SyncSender<Event>>),
}

/// Fans project lifecycle events out to listener channels.
///
/// Delivery is a blocking send: a listener that stops draining its channel
/// stalls every notifier.
pub struct EventBus {
    project_name: String,
    sinks: RwLock<Sinks>,
}

impl EventBus {
    pub fn new(project_name: &str) -> Self {
        Self {
            project_name: project_name.to_string(),
            sinks: RwLock::new(Sinks::Default),
        }
    }

    /// The first listener replaces the default logging sink; later ones are added.
    pub fn add_listener(&self, listener: SyncSender<Event>) {
        let mut sinks = self.sinks.write().unwrap_or_else(PoisonError::into_inner);
        match &mut *sinks {
            Sinks::Default => *sinks = Sinks::Installed(vec![listener]),
            Sinks::Installed(listeners) => listeners.push(listener),
        }
    }

    pub fn has_listener(&self) -> bool {
        matches!(
            *self.sinks.read().unwrap_or_else(PoisonError::into_inner),
            Sinks::Installed(_)
        )
    }

    pub fn notify(
        &self,
        event_type: EventType,
        service_name: &str,
        data: BTreeMap<String, String>,
    ) {
        if event_type == EventType::NoEvent {
            return;
        }

        let event = Event::new(event_type, service_name, data);

        // Senders are cloned so no lock is held during a blocking send
        let listeners = match &*self.sinks.read().unwrap_or_else(PoisonError::into_inner) {
            Sinks::Default => None,
            Sinks::Installed(listeners) => Some(listeners.clone()),
        };

        let Some(listeners) = listeners else {
            self.log_event(&event);
            return;
        };

        for listener in listeners {
            if listener.send(event.clone()).is_err() {
                debug!("Listener for project {} is gone, dropping {}", self.project_name, event);
            }
        }
    }

    fn log_event(&self, event: &Event) {
        if event.service_name.is_empty() {
            info!("Project [{}]: {}", self.project_name, event.event_type);
        } else {
            info!(
                "[{}] {} {}",
                self.project_name, event.event_type, event.service_name
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::sync_channel;

    #[test]
    fn first_listener_replaces_default() {
        let bus = EventBus::new("demo");
        assert!(!bus.has_listener());

        let (tx, rx) = sync_channel(8);
        bus.add_listener(tx);
        assert!(bus.has_listener());

        bus.notify(EventType::ServiceUpStart, "web", BTreeMap::new());
        let event = rx.try_recv().unwrap();
        assert_eq!(event.event_type, EventType::ServiceUpStart);
        assert_eq!(event.service_name, "web");
    }

    #[test]
    fn listeners_fan_out() {
        let bus = EventBus::new("demo");
        let (tx1, rx1) = sync_channel(8);
        let (tx2, rx2) = sync_channel(8);
        bus.add_listener(tx1);
        bus.add_listener(tx2);

        bus.notify(EventType::ProjectCreateStart, "", BTreeMap::new());

        assert_eq!(rx1.try_recv().unwrap().event_type, EventType::ProjectCreateStart);
        assert_eq!(rx2.try_recv().unwrap().event_type, EventType::ProjectCreateStart);
    }

    #[test]
    fn no_event_is_never_delivered() {
        let bus = EventBus::new("demo");
        let (tx, rx) = sync_channel(8);
        bus.add_listener(tx);

        bus.notify(EventType::NoEvent, "web", BTreeMap::new());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_listener_does_not_break_others() {
        let bus = EventBus::new("demo");
        let (tx1, rx1) = sync_channel(8);
        let (tx2, rx2) = sync_channel(8);
        bus.add_listener(tx1);
        bus.add_listener(tx2);
        drop(rx1);

        bus.notify(EventType::ServiceCreate, "db", BTreeMap::new());
        assert_eq!(rx2.try_recv().unwrap().service_name, "db");
    }

    #[test]
    fn default_sink_accepts_events() {
        let bus = EventBus::new("demo");
        bus.notify(EventType::ProjectUpDone, "", BTreeMap::new());
        assert!(!bus.has_listener());
    }
}
