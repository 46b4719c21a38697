mod event_bus;
mod project;
mod traversal;
mod wrapper;

pub use event_bus::EventBus;
pub use project::Project;
pub use traversal::{CycleAction, ReloadCallback, TraversalDriver, WrapperAction};
pub use wrapper::{ServiceWrapper, WrapperMap, WrapperStatus};
