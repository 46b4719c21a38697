mod listener;

use crate::domain::project::normalize_project_name;
use crate::domain::{BuildOptions, CreateOptions, UpOptions};
use crate::infra::{PodmanAdapter, PodmanServiceFactory, load_project_configs, load_settings};
use crate::orchestration::Project;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

pub use listener::spawn_printer;

pub const LOG_ENV: &str = "STACKBOX_LOG";

#[derive(Parser, Debug)]
#[command(
    name = "stackbox",
    about = "Brings up a graph of interdependent containers in dependency order"
)]
pub struct Cli {
    /// Compose file, repeatable (default: files from stackbox.toml, else stackbox.yml)
    #[arg(short = 'f', long = "file")]
    pub files: Vec<PathBuf>,

    /// Project name (default: stackbox.toml, then the compose file, else the directory name)
    #[arg(short = 'p', long = "project-name")]
    pub project_name: Option<String>,

    /// Project directory
    #[arg(long, env = "STACKBOX_PROJECT_DIR", default_value = ".")]
    pub project_dir: PathBuf,

    /// Debug logging (overrides STACKBOX_LOG)
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Builds images of nodes that have a build section
    Build {
        #[arg(long)]
        no_cache: bool,
        /// Always pull newer base images
        #[arg(long)]
        pull: bool,
        services: Vec<String>,
    },
    /// Creates containers without starting them
    Create(CreateArgs),
    /// Creates and starts containers
    Up(CreateArgs),
    /// Prints container logs
    Logs {
        #[arg(short, long)]
        follow: bool,
        services: Vec<String>,
    },
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Build { .. } => "build",
            Self::Create(_) => "create",
            Self::Up(_) => "up",
            Self::Logs { .. } => "logs",
        }
    }
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Recreate containers even if they exist
    #[arg(long)]
    pub force_recreate: bool,
    /// Do not build missing images
    #[arg(long)]
    pub no_build: bool,
    pub services: Vec<String>,
}

impl CreateArgs {
    fn options(&self) -> CreateOptions {
        CreateOptions {
            force_recreate: self.force_recreate,
            no_build: self.no_build,
        }
    }
}

/// Loads the project described by `cli` on top of podman
pub fn load_project(cli: &Cli) -> Result<Project> {
    let dir = cli
        .project_dir
        .canonicalize()
        .with_context(|| format!("resolving project directory {:?}", cli.project_dir))?;
    let settings = load_settings(&dir)?;

    let files = if cli.files.is_empty() {
        settings.compose_files(&dir)
    } else {
        cli.files.clone()
    };
    let loaded = load_project_configs(&files)?;

    let name = match cli
        .project_name
        .as_deref()
        .or(settings.project_name.as_deref())
        .or(loaded.name.as_deref())
    {
        Some(name) => normalize_project_name(name),
        None => settings.project_name(&dir),
    };
    info!("Project {name}: {} node(s)", loaded.configs.len());

    let runtime = Arc::new(PodmanAdapter::new());
    let factory = PodmanServiceFactory::new(&name, runtime);
    let mut project = Project::new(&name, loaded.configs, Arc::new(factory));

    project.set_reload_callback(move |configs| {
        debug!("Reloading {:?}", files);
        let reloaded = load_project_configs(&files)?;
        configs.merge(reloaded.configs)?;
        Ok(())
    });

    Ok(project)
}

pub fn run(cli: Cli) -> Result<()> {
    let mut project = load_project(&cli)?;
    let printer = spawn_printer(&project)?;

    let result = match &cli.command {
        Commands::Build {
            no_cache,
            pull,
            services,
        } => {
            let options = BuildOptions {
                no_cache: *no_cache,
                pull: *pull,
            };
            project.build(&options, services)
        }
        Commands::Create(args) => project.create(&args.options(), &args.services),
        Commands::Up(args) => {
            let options = UpOptions {
                create: args.options(),
            };
            project.up(&options, &args.services)
        }
        Commands::Logs { follow, services } => project.log(*follow, services),
    };

    // Closes the event channel so the printer drains and exits
    drop(project);
    if printer.join().is_err() {
        debug!("Event printer panicked");
    }

    result.with_context(|| format!("{} failed", cli.command.name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn parses_global_and_command_flags() {
        let cli = Cli::parse_from([
            "stackbox", "-f", "a.yml", "-f", "b.yml", "-p", "shop", "up", "--no-build", "web",
        ]);

        assert_eq!(cli.files, vec![PathBuf::from("a.yml"), PathBuf::from("b.yml")]);
        assert_eq!(cli.project_name.as_deref(), Some("shop"));
        match cli.command {
            Commands::Up(args) => {
                assert!(args.no_build);
                assert!(!args.force_recreate);
                assert_eq!(args.services, vec!["web"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn logs_accepts_follow() {
        let cli = Cli::parse_from(["stackbox", "logs", "-f", "db", "web"]);
        match cli.command {
            Commands::Logs { follow, services } => {
                assert!(follow);
                assert_eq!(services, vec!["db", "web"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn load_project_uses_settings_and_compose_name() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join("stackbox.yml"),
            "name: Shop-Front\nservices:\n  db:\n    image: postgres\n",
        )?;

        let cli = Cli::parse_from([
            "stackbox",
            "--project-dir",
            dir.path().to_str().unwrap(),
            "create",
        ]);
        let project = load_project(&cli)?;

        assert_eq!(project.name(), "shopfront");
        assert!(project.configs().contains("db"));
        Ok(())
    }

    #[test]
    fn settings_name_wins_over_compose_name() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join("stackbox.yml"),
            "name: ignored\nservices:\n  db:\n    image: postgres\n",
        )?;
        fs::write(dir.path().join("stackbox.toml"), "project_name = \"billing\"\n")?;

        let cli = Cli::parse_from([
            "stackbox",
            "--project-dir",
            dir.path().to_str().unwrap(),
            "create",
        ]);
        assert_eq!(load_project(&cli)?.name(), "billing");
        Ok(())
    }
}
