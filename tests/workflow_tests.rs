use anyhow::Result;
use stackbox::domain::{
    BuildOptions, ComposeError, ContainerState, CreateOptions, ProjectConfigs, UpOptions,
};
use stackbox::infra::{PodmanServiceFactory, load_project_configs};
use stackbox::orchestration::Project;
use stackbox::test_support::MockRuntime;
use std::fs;
use std::path::Path;
use std::sync::Arc;

const COMPOSE: &str = r#"
name: shop
services:
  db:
    image: postgres:16
    environment: ["POSTGRES_PASSWORD=dev"]
  api:
    image: shop/api:latest
    depends_on: [db]
    volumes_from: ["data:ro"]
  web:
    image: nginx:1.27
    links: ["api:backend"]
    ports: ["8080:80"]
  worker:
    build: ./worker
containers:
  data:
    image: busybox
"#;

fn load(dir: &Path) -> Result<ProjectConfigs> {
    let file = dir.join("stackbox.yml");
    fs::write(&file, COMPOSE)?;
    Ok(load_project_configs(&[file])?.configs)
}

fn position(commands: &[String], command: &str) -> usize {
    commands
        .iter()
        .position(|c| c == command)
        .unwrap_or_else(|| panic!("{command} was never issued: {commands:?}"))
}

#[test]
fn test_workflow_up_from_compose_file() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let configs = load(temp_dir.path())?;

    let mock = Arc::new(MockRuntime::new());
    let factory = PodmanServiceFactory::new("shop", mock.clone());
    let mut project = Project::new("shop", configs, Arc::new(factory));

    project.up(&UpOptions::default(), &[])?;

    for name in ["shop_db", "shop_api", "shop_web", "shop_data", "shop_worker"] {
        assert_eq!(
            mock.get_state(name),
            Some(ContainerState::Running),
            "{name} should be running"
        );
    }

    let commands = mock.get_commands();
    assert!(position(&commands, "create:shop_db") < position(&commands, "create:shop_api"));
    assert!(position(&commands, "create:shop_data") < position(&commands, "create:shop_api"));
    assert!(position(&commands, "start:shop_api") < position(&commands, "create:shop_web"));
    // worker has no image, so it is built on first create
    assert!(
        position(&commands, "build_image:shop_worker") < position(&commands, "create:shop_worker")
    );

    let api = mock.get_spec("shop_api").unwrap();
    assert_eq!(api.volumes_from, vec!["shop_data:ro"]);
    let web = mock.get_spec("shop_web").unwrap();
    assert_eq!(web.links, vec!["shop_api"]);
    assert_eq!(web.ports, vec!["8080:80"]);

    Ok(())
}

#[test]
fn test_workflow_create_is_idempotent() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let configs = load(temp_dir.path())?;

    let mock = Arc::new(MockRuntime::new());
    let factory = PodmanServiceFactory::new("shop", mock.clone());
    let mut project = Project::new("shop", configs, Arc::new(factory));

    project.create(&CreateOptions::default(), &["web".to_string()])?;
    project.create(&CreateOptions::default(), &["web".to_string()])?;

    let mut creates: Vec<_> = mock
        .get_commands()
        .into_iter()
        .filter(|c| c.starts_with("create:"))
        .collect();
    creates.sort();
    assert_eq!(
        creates,
        vec!["create:shop_api", "create:shop_data", "create:shop_db", "create:shop_web"]
    );
    assert_eq!(mock.get_state("shop_worker"), None);
    assert_eq!(mock.get_state("shop_web"), Some(ContainerState::Stopped));

    Ok(())
}

#[test]
fn test_workflow_build_only_buildable_selection() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let configs = load(temp_dir.path())?;

    let mock = Arc::new(MockRuntime::new());
    let factory = PodmanServiceFactory::new("shop", mock.clone());
    let mut project = Project::new("shop", configs, Arc::new(factory));

    project.build(&BuildOptions::default(), &["worker".to_string()])?;
    assert_eq!(mock.get_commands(), vec!["build_image:shop_worker"]);

    let err = project
        .build(&BuildOptions::default(), &["db".to_string()])
        .unwrap_err();
    assert!(matches!(err, ComposeError::Unsupported { .. }));

    Ok(())
}

#[test]
fn test_workflow_logs_every_node() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let configs = load(temp_dir.path())?;

    let mock = Arc::new(MockRuntime::new());
    let factory = PodmanServiceFactory::new("shop", mock.clone());
    let mut project = Project::new("shop", configs, Arc::new(factory));

    project.log(false, &[])?;

    let mut logs: Vec<_> = mock
        .get_commands()
        .into_iter()
        .filter(|c| c.starts_with("logs:"))
        .collect();
    logs.sort();
    assert_eq!(
        logs,
        vec![
            "logs:shop_api",
            "logs:shop_data",
            "logs:shop_db",
            "logs:shop_web",
            "logs:shop_worker"
        ]
    );

    Ok(())
}
