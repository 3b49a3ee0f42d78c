//! Locating and loading `faultline.toml`.
//!
//! Searches the current directory then its ancestors, falling back to
//! `~/.config/faultline/faultline.toml`. Without any file the engine
//! defaults apply.

use crate::error::CliError;
use faultline_engine::EngineConfig;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE: &str = "faultline.toml";

/// The effective configuration and the file it came from, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedConfig {
    pub path: Option<PathBuf>,
    pub engine: EngineConfig,
}

impl LoadedConfig {
    /// Load `explicit` when given, otherwise the first discovered file.
    pub fn load(explicit: Option<&Path>) -> Result<Self, CliError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::current_dir()
                .ok()
                .and_then(|cwd| discover(&cwd, global_config_path().as_deref())),
        };
        match path {
            Some(path) => {
                let engine = load_from(&path)?;
                debug!(path = %path.display(), "loaded config");
                Ok(Self {
                    path: Some(path),
                    engine,
                })
            }
            None => Ok(Self {
                path: None,
                engine: EngineConfig::default(),
            }),
        }
    }
}

pub fn load_from(path: &Path) -> Result<EngineConfig, CliError> {
    let content = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    EngineConfig::from_toml_str(&content).map_err(|source| CliError::Config {
        path: path.to_path_buf(),
        source,
    })
}

/// First `faultline.toml` in `start` or its ancestors, then `global`.
pub fn discover(start: &Path, global: Option<&Path>) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !dir.pop() {
            break;
        }
    }
    global.filter(|g| g.is_file()).map(Path::to_path_buf)
}

pub fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("faultline").join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "faultline-config-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn discovers_config_in_ancestor() {
        let root = scratch("ancestor");
        let nested = root.join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join(CONFIG_FILE), "[session]\nmax_rounds = 7\n").unwrap();

        let found = discover(&nested, None).unwrap();
        assert_eq!(found, root.join(CONFIG_FILE));
        assert_eq!(load_from(&found).unwrap().session.max_rounds, 7);
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn falls_back_to_global() {
        let root = scratch("global");
        let global = root.join("global.toml");
        std::fs::write(&global, "").unwrap();
        let project = root.join("project");
        std::fs::create_dir_all(&project).unwrap();

        let found = discover(&project, Some(&global)).unwrap();
        if !project.ancestors().any(|d| d.join(CONFIG_FILE).is_file()) {
            assert_eq!(found, global);
        }
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn explicit_path_wins() {
        let root = scratch("explicit");
        let path = root.join("custom.toml");
        std::fs::write(&path, "[propagation]\nprobability = 0.9\n").unwrap();
        let loaded = LoadedConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.path.as_deref(), Some(path.as_path()));
        assert_eq!(loaded.engine.propagation.probability, 0.9);
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn invalid_values_report_the_file() {
        let root = scratch("invalid");
        let path = root.join(CONFIG_FILE);
        std::fs::write(&path, "[propagation]\nprobability = 1.5\n").unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(matches!(err, CliError::Config { .. }));
        assert!(err.to_string().contains(CONFIG_FILE));
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn missing_explicit_file_is_an_io_error() {
        let err = LoadedConfig::load(Some(Path::new("/nonexistent/faultline.toml"))).unwrap_err();
        assert!(matches!(err, CliError::Io { .. }));
    }
}
