use crate::domain::{BuildOptions, Container, ContainerRuntime, ContainerSpec, ContainerState};
use anyhow::{Context, Result, bail};
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use tracing::{debug, warn};

/// [`ContainerRuntime`] backed by the `podman` CLI
#[derive(Debug)]
pub struct PodmanAdapter;

impl PodmanAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PodmanAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerRuntime for PodmanAdapter {
    fn get_container(&self, name: &str) -> Result<Container> {
        let Some(id) = container_id(name)? else {
            return Ok(Container::missing());
        };

        let state = if container_running(name)? {
            ContainerState::Running
        } else {
            ContainerState::Stopped
        };
        Ok(Container::new(Some(id), state))
    }

    fn create_container(&self, spec: &ContainerSpec) -> Result<()> {
        podman(create_args(spec), &format!("creating container {}", spec.name))
    }

    fn start_container(&self, name: &str) -> Result<()> {
        podman(["start", name], &format!("starting container {name}"))
    }

    fn remove_container(&self, name: &str) -> Result<()> {
        let status = podman_status(["rm", "-f", name], &format!("removing container {name}"))?;

        if !status.success() {
            warn!("Could not remove {name} (it may not exist)");
        }

        Ok(())
    }

    fn build_image(
        &self,
        tag: &str,
        containerfile: &Path,
        context_dir: &Path,
        options: &BuildOptions,
    ) -> Result<()> {
        let mut args = vec![
            OsStr::new("build"),
            OsStr::new("-t"),
            OsStr::new(tag),
            OsStr::new("-f"),
            containerfile.as_os_str(),
        ];
        if options.no_cache {
            args.push(OsStr::new("--no-cache"));
        }
        if options.pull {
            args.push(OsStr::new("--pull"));
        }
        args.push(context_dir.as_os_str());

        podman(
            args,
            &format!("building image {tag} from {:?}", containerfile),
        )
    }

    fn logs(&self, name: &str, follow: bool) -> Result<()> {
        let mut args = vec!["logs"];
        if follow {
            args.push("--follow");
        }
        args.push(name);
        podman(args, &format!("reading logs of {name}"))
    }
}

/// Arguments of `podman create` for `spec`
pub fn create_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args: Vec<String> = vec!["create".into(), "--name".into(), spec.name.clone()];

    if let Some(net) = &spec.network {
        args.push("--network".into());
        args.push(net.clone());
    }
    if let Some(ipc) = &spec.ipc {
        args.push("--ipc".into());
        args.push(ipc.clone());
    }

    for port in &spec.ports {
        args.push("-p".into());
        args.push(port.clone());
    }

    for env in &spec.env {
        args.push("-e".into());
        args.push(env.clone());
    }

    for volume in &spec.volumes {
        args.push("-v".into());
        args.push(volume.clone());
    }

    for from in &spec.volumes_from {
        args.push("--volumes-from".into());
        args.push(from.clone());
    }

    for required in &spec.links {
        args.push("--requires".into());
        args.push(required.clone());
    }

    for (key, value) in &spec.labels {
        args.push("--label".into());
        args.push(format!("{key}={value}"));
    }

    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());
    args
}

fn container_id(name: &str) -> Result<Option<String>> {
    let output = Command::new("podman")
        .args(["container", "inspect", name, "--format", "{{.Id}}"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .with_context(|| format!("inspecting container {name}"))?;

    if !output.status.success() {
        debug!("Container {name} does not exist");
        return Ok(None);
    }

    let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok((!id.is_empty()).then_some(id))
}

fn container_running(name: &str) -> Result<bool> {
    let output = Command::new("podman")
        .args([
            "container",
            "inspect",
            name,
            "--format",
            "{{.State.Running}}",
        ])
        .stdout(Stdio::piped())
        .output()
        .with_context(|| format!("checking state of container {name}"))?;

    if !output.status.success() {
        return Ok(false);
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim() == "true")
}

fn podman<I, S>(args: I, context: &str) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let status = podman_status(args, context)?;
    ensure_success(status, context)
}

fn podman_status<I, S>(args: I, context: &str) -> Result<ExitStatus>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new("podman")
        .args(args.into_iter().map(|item| item.as_ref().to_os_string()))
        .status()
        .with_context(|| context.to_string())
}

fn ensure_success(status: ExitStatus, context: &str) -> Result<()> {
    if status.success() {
        return Ok(());
    }

    bail!("podman returned status {:?} ({context})", status)
}
