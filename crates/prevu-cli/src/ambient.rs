//! Ambient project and environment identity
//!
//! Used only when the caller does not supply an identifier explicitly.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

const COMPOSE_FILE_CANDIDATES: &[&str] = &[
    "compose.yaml",
    "compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
];

#[derive(Debug, Deserialize)]
struct ComposeFile {
    name: Option<String>,
}

/// Project name from the compose file's top-level `name` key, falling back
/// to the directory name.
pub fn ambient_project_name(compose_file: Option<&Path>) -> Result<String> {
    if let Some(path) = compose_file {
        return project_name_from_file(path);
    }

    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    for candidate in COMPOSE_FILE_CANDIDATES {
        let path = cwd.join(candidate);
        if path.exists() {
            return project_name_from_file(&path);
        }
    }

    cwd.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_owned)
        .context("Current directory has no usable name")
}

fn project_name_from_file(path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read compose file {}", path.display()))?;
    let compose: ComposeFile = serde_yaml::from_str(&text)
        .with_context(|| format!("Failed to parse compose file {}", path.display()))?;

    if let Some(name) = compose.name {
        return Ok(name);
    }

    path.parent()
        .and_then(|dir| dir.file_name())
        .and_then(|name| name.to_str())
        .map(str::to_owned)
        .context("Compose file directory has no usable name")
}

/// Environment id when not explicitly supplied: `PREVU_ENV_ID` from the
/// environment, else the project name itself.
pub fn ambient_env_id(project: &str) -> String {
    std::env::var("PREVU_ENV_ID").unwrap_or_else(|_| project.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_name_from_compose_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compose.yaml");
        std::fs::write(&path, "name: acme\nservices:\n  web:\n    image: nginx\n").unwrap();

        assert_eq!(ambient_project_name(Some(&path)).unwrap(), "acme");
    }

    #[test]
    fn falls_back_to_directory_name_without_name_key() {
        let dir = tempfile::tempdir().unwrap();
        let project_dir = dir.path().join("storefront");
        std::fs::create_dir(&project_dir).unwrap();
        let path = project_dir.join("compose.yaml");
        std::fs::write(&path, "services:\n  web:\n    image: nginx\n").unwrap();

        assert_eq!(ambient_project_name(Some(&path)).unwrap(), "storefront");
    }

    #[test]
    fn unreadable_compose_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compose.yaml");

        assert!(ambient_project_name(Some(&path)).is_err());
    }
}
