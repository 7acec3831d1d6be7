use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::report::ReportOptions;

const ENV_PREFIX: &str = "SYSINSPECT_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Tracing filter used when `RUST_LOG` is unset.
    pub log_level: String,
    pub color: bool,
    pub cpu_sample_ms: u64,
    pub process_sample_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            color: true,
            cpu_sample_ms: 1000,
            process_sample_ms: 100,
        }
    }
}

impl Config {
    /// `~/.config/sysinspect/config.yaml` (or the platform equivalent).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sysinspect").join("config.yaml"))
    }

    pub fn report_options(&self) -> ReportOptions {
        ReportOptions {
            cpu_sample: Duration::from_millis(self.cpu_sample_ms),
            process_sample: Duration::from_millis(self.process_sample_ms),
        }
    }
}

/// Defaults, then the YAML file, then `SYSINSPECT_*` variables.
///
/// An explicitly requested file must exist; the default one is optional.
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(path) => {
            if !path.is_file() {
                bail!("config file {} does not exist", path.display());
            }
            Some(path.to_path_buf())
        }
        None => Config::default_path(),
    };
    extract(path.as_deref())
}

fn extract(file: Option<&Path>) -> Result<Config> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    if let Some(path) = file {
        figment = figment.merge(Yaml::file(path));
    }
    figment
        .merge(Env::prefixed(ENV_PREFIX))
        .extract()
        .context("loading configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn defaults_without_file_or_env() {
        Jail::expect_with(|_jail| {
            let config = extract(None).map_err(|e| e.to_string())?;
            assert_eq!(config, Config::default());
            assert_eq!(config.report_options().cpu_sample, Duration::from_secs(1));
            assert_eq!(config.report_options().process_sample, Duration::from_millis(100));
            Ok(())
        });
    }

    #[test]
    fn file_then_env_override_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yaml", "log_level: debug\ncpu_sample_ms: 250\ncolor: true\n")?;
            jail.set_env("SYSINSPECT_COLOR", "false");

            let config = load(Some(Path::new("config.yaml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.log_level, "debug");
            assert_eq!(config.cpu_sample_ms, 250);
            assert!(!config.color);
            assert_eq!(config.process_sample_ms, 100);
            Ok(())
        });
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(Some(&dir.path().join("absent.yaml"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn missing_default_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let config = extract(Some(&dir.path().join("config.yaml"))).unwrap();
        assert_eq!(config.cpu_sample_ms, 1000);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "cpu_sample_ms: soon\n").unwrap();
        assert!(load(Some(&path)).is_err());
    }
}
