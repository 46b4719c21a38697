use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_COMPOSE_FILE: &str = "stackbox.yml";

/// Settings loaded from a project's stackbox.toml
#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct ProjectSettings {
    /// Project name (default: directory name)
    #[serde(default)]
    pub project_name: Option<String>,

    /// Compose files, applied in order (relative to the project directory)
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

impl ProjectSettings {
    /// Project name for `dir`, normalized for use in container names
    pub fn project_name(&self, dir: &Path) -> String {
        let raw = self
            .project_name
            .clone()
            .or_else(|| {
                dir.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "default".to_string());
        normalize_project_name(&raw)
    }

    /// Compose files for `dir`, falling back to stackbox.yml
    pub fn compose_files(&self, dir: &Path) -> Vec<PathBuf> {
        if self.files.is_empty() {
            return vec![dir.join(DEFAULT_COMPOSE_FILE)];
        }
        self.files.iter().map(|f| dir.join(f)).collect()
    }
}

/// Lowercases and keeps only `[a-z0-9]`
pub fn normalize_project_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
