//! Locating and reading `sitepipe.toml`
//!
//! The config file is looked up from the working directory upward; the
//! directory it lives in becomes the project root that every configured path
//! is relative to.

use super::schema::{normalize_path, ConfigValidationError, SitepipeConfig};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Name of the configuration file looked up in the project tree
pub const CONFIG_FILE_NAME: &str = "sitepipe.toml";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse sitepipe.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Every problem found, one message each
    #[error("Invalid configuration:\n{}", format_problems(.0))]
    Validation(Vec<String>),
}

fn format_problems(problems: &[String]) -> String {
    problems.iter().map(|p| format!("  - {}", p)).collect::<Vec<_>>().join("\n")
}

/// Command-line flags that take precedence over the file.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub src: Option<PathBuf>,
    pub out: Option<PathBuf>,
    pub port: Option<u16>,
}

/// A configuration together with where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: SitepipeConfig,
    /// The file read, or `None` when running on defaults
    pub path: Option<PathBuf>,
    /// Directory configured paths are relative to
    pub root: PathBuf,
}

impl LoadedConfig {
    /// Load `explicit`, or the first `sitepipe.toml` found from `cwd` upward.
    ///
    /// Without a file the defaults apply and `cwd` is the project root.
    pub fn discover(explicit: Option<&Path>, cwd: &Path) -> Result<Self, ConfigError> {
        let located = match explicit {
            Some(path) => Some(cwd.join(path)),
            None => find_config_from(cwd.to_path_buf()),
        };

        let Some(path) = located else {
            debug!("No {} found, using defaults", CONFIG_FILE_NAME);
            return Self { config: default_config(), path: None, root: cwd.to_path_buf() }.checked();
        };

        debug!("Using config: {}", path.display());
        let config = parse_config(&path)?;
        let root = project_root(&path).map(Path::to_path_buf).unwrap_or_else(|| cwd.to_path_buf());

        Self { config, path: Some(path), root }.checked()
    }

    /// Apply command-line overrides and validate the result again.
    pub fn with_overrides(mut self, overrides: &CliOverrides) -> Result<Self, ConfigError> {
        merge_cli_overrides(&mut self.config, overrides);
        self.checked()
    }

    /// Every problem with the configuration, including where `project.out`
    /// sits relative to the project root and the source tree.
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = self.config.validate();

        let root = normalize_path(&self.root);
        let src = normalize_path(&resolve_path(&self.root, &self.config.project.src));
        let out = normalize_path(&resolve_path(&self.root, &self.config.project.out));

        // clean-dist deletes `out` recursively
        let message = if root.starts_with(&out) {
            Some("must not be the project root or one of its parents")
        } else if src.starts_with(&out) {
            Some("must not be or contain project.src")
        } else {
            None
        };
        if let Some(message) = message {
            errors.push(ConfigValidationError {
                field: "project.out".to_string(),
                message: message.to_string(),
            });
        }

        errors
    }

    fn checked(self) -> Result<Self, ConfigError> {
        into_result(self.validate())?;
        Ok(self)
    }
}

/// Search the working directory and its ancestors for `sitepipe.toml`.
pub fn find_config() -> Option<PathBuf> {
    env::current_dir().ok().and_then(find_config_from)
}

/// Search `start` and its ancestors for `sitepipe.toml`.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    start.ancestors().map(|dir| dir.join(CONFIG_FILE_NAME)).find(|candidate| candidate.is_file())
}

/// Load `path`, or the discovered config file, or the defaults.
pub fn load_config(path: Option<&Path>) -> Result<SitepipeConfig, ConfigError> {
    match path.map(Path::to_path_buf).or_else(find_config) {
        Some(path) => read_config(&path),
        None => Ok(default_config()),
    }
}

fn parse_config(path: &Path) -> Result<SitepipeConfig, ConfigError> {
    Ok(toml::from_str(&fs::read_to_string(path)?)?)
}

fn read_config(path: &Path) -> Result<SitepipeConfig, ConfigError> {
    let config = parse_config(path)?;
    into_result(config.validate())?;
    Ok(config)
}

fn into_result(errors: Vec<ConfigValidationError>) -> Result<(), ConfigError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation(errors.iter().map(ToString::to_string).collect()))
    }
}

/// Defaults, with the project named after the working directory.
pub fn default_config() -> SitepipeConfig {
    let mut config = SitepipeConfig::default();
    let dir_name = env::current_dir()
        .ok()
        .and_then(|dir| dir.file_name().map(|n| n.to_string_lossy().into_owned()));
    if let Some(name) = dir_name {
        config.project.name = name;
    }
    config
}

/// Apply command-line overrides to `config`.
pub fn merge_cli_overrides(config: &mut SitepipeConfig, overrides: &CliOverrides) {
    if let Some(src) = &overrides.src {
        config.project.src.clone_from(src);
    }
    if let Some(out) = &overrides.out {
        config.project.out.clone_from(out);
    }
    if let Some(port) = overrides.port {
        config.server.port = port;
    }
}

/// Directory holding a config file.
pub fn project_root(config_path: &Path) -> Option<&Path> {
    config_path.parent().filter(|p| !p.as_os_str().is_empty())
}

/// `path` relative to `project_root`, unless it is already absolute.
pub fn resolve_path(project_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_root.join(path)
    }
}
