use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::core::environment::ScopeMode;
use crate::core::interpreter::{LogicMode, RuntimeOptions, DEFAULT_MAX_CALL_DEPTH};

/// Settings read from `config.toml`. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub pretty_errors: bool,
    pub logic: LogicMode,
    pub scope: ScopeMode,
    pub max_call_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pretty_errors: false,
            logic: LogicMode::default(),
            scope: ScopeMode::default(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl Config {
    /// `explicit` must exist; the default path may be absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Parse config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            logic: self.logic,
            scope: self.scope,
            max_call_depth: self.max_call_depth,
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::home_dir().map(|h| h.join(".powerlang").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn fields_use_kebab_case_values() {
        let cfg = Config::from_toml("logic = \"short-circuit\"\nscope = \"shadow\"\nmax_call_depth = 64\n").unwrap();
        let opts = cfg.runtime_options();
        assert_eq!(opts.logic, LogicMode::ShortCircuit);
        assert_eq!(opts.scope, ScopeMode::Shadow);
        assert_eq!(opts.max_call_depth, 64);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml("colour = true").is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
