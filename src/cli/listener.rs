use crate::orchestration::Project;
use anyhow::{Context, Result};
use std::sync::mpsc::sync_channel;
use std::thread::{self, JoinHandle};

const EVENT_BUFFER: usize = 64;

/// Installs a listener on `project` that prints each event on its own thread.
///
/// The thread exits once the project (and with it every sender) is dropped.
pub fn spawn_printer(project: &Project) -> Result<JoinHandle<()>> {
    let (tx, rx) = sync_channel(EVENT_BUFFER);
    project.add_listener(tx);

    thread::Builder::new()
        .name("stackbox-events".into())
        .spawn(move || {
            for event in rx {
                println!("{event}");
            }
        })
        .context("spawning event printer")
}
