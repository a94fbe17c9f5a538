//! Layered loading of [`AppConfig`].
//!
//! A `base` file is read first, then the optional file named after the runtime environment
//! (`dev` or `prod`), then `APP_`-prefixed environment variables with `__` between nested keys,
//! e.g. `APP_METADATA_CACHE__LAZY_LOAD=true`. Files may be YAML or JSON.

use std::io;
use std::path::{Path, PathBuf};

use rust_cli_config::{Config, File};
use thiserror::Error;

use crate::environment::Environment;
use crate::shared::{AppConfig, ValidationError};

/// Directory, relative to the working directory, searched by [`load_config`].
const CONFIGURATION_DIR: &str = "configuration";

const EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

const BASE_STEM: &str = "base";

const ENV_PREFIX: &str = "APP";

/// Keys whose environment variable values are comma separated lists.
const LIST_KEYS: [&str; 1] = ["bigquery.additional_projects"];

#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    #[error("failed to determine runtime environment: {0}")]
    Environment(#[source] io::Error),

    #[error("no base configuration file (base.yaml, base.yml or base.json) in `{}`", .0.display())]
    MissingBaseFile(PathBuf),

    #[error("failed to read configuration: {0}")]
    Read(#[from] rust_cli_config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] ValidationError),
}

/// Loads and validates `./configuration` for the environment named by `APP_ENVIRONMENT`.
pub fn load_config() -> Result<AppConfig, LoadConfigError> {
    let directory = std::env::current_dir()
        .map_err(LoadConfigError::CurrentDir)?
        .join(CONFIGURATION_DIR);
    let environment = Environment::load().map_err(LoadConfigError::Environment)?;

    load_config_from(&directory, environment)
}

/// Loads and validates the configuration files in `directory`.
pub fn load_config_from(
    directory: &Path,
    environment: Environment,
) -> Result<AppConfig, LoadConfigError> {
    let base = find_file(directory, BASE_STEM)
        .ok_or_else(|| LoadConfigError::MissingBaseFile(directory.to_path_buf()))?;

    let mut builder = Config::builder().add_source(File::from(base));
    if let Some(overrides) = find_file(directory, environment.as_str()) {
        builder = builder.add_source(File::from(overrides));
    }

    let config: AppConfig = builder
        .add_source(environment_variables())
        .build()?
        .try_deserialize()?;
    config.validate()?;

    Ok(config)
}

fn environment_variables() -> rust_cli_config::Environment {
    LIST_KEYS.iter().fold(
        rust_cli_config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(","),
        |source, key| source.with_list_parse_key(key),
    )
}

/// Returns the first existing `{stem}.{extension}` file in `directory`.
fn find_file(directory: &Path, stem: &str) -> Option<PathBuf> {
    EXTENSIONS
        .iter()
        .map(|extension| directory.join(format!("{stem}.{extension}")))
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "bqmeta-config-{name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn environment_file_overrides_base() {
        let dir = scratch_dir("layering");
        fs::write(
            dir.join("base.yaml"),
            "bigquery:\n  project_id: base-project\nmetadata_cache:\n  cache_ttl_seconds: 120\n",
        )
        .unwrap();
        fs::write(dir.join("prod.json"), r#"{"metadata_cache": {"lazy_load": true}}"#).unwrap();

        let config = load_config_from(&dir, Environment::Prod).unwrap();

        assert_eq!(config.bigquery.project_id, "base-project");
        assert_eq!(config.metadata_cache.cache_ttl_seconds, 120);
        assert!(config.metadata_cache.lazy_load);
        assert!(config.metadata_cache.cache_enabled);

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn environment_file_is_optional() {
        let dir = scratch_dir("base-only");
        fs::write(dir.join("base.yml"), "bigquery:\n  project_id: p\n").unwrap();

        let config = load_config_from(&dir, Environment::Dev).unwrap();

        assert_eq!(config.bigquery.project_id, "p");
        assert!(!config.metadata_cache.lazy_load);

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn missing_base_file_is_reported() {
        let dir = scratch_dir("no-base");
        fs::write(dir.join("dev.yaml"), "bigquery:\n  project_id: p\n").unwrap();

        let err = load_config_from(&dir, Environment::Dev).unwrap_err();
        assert!(matches!(err, LoadConfigError::MissingBaseFile(_)));

        let missing = std::env::temp_dir().join("bqmeta-config-does-not-exist");
        let err = load_config_from(&missing, Environment::Dev).unwrap_err();
        assert!(matches!(err, LoadConfigError::MissingBaseFile(_)));

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn loaded_values_are_validated() {
        let dir = scratch_dir("invalid");
        fs::write(
            dir.join("base.yaml"),
            "bigquery:\n  project_id: p\nmetadata_cache:\n  parallel_threshold: 0\n",
        )
        .unwrap();

        let err = load_config_from(&dir, Environment::Dev).unwrap_err();
        assert!(matches!(err, LoadConfigError::Invalid(_)));

        fs::remove_dir_all(dir).unwrap();
    }
}
