use crate::env_resolver::EnvResolver;
use crate::error::{ConfigError, ConfigResult};
use crate::schema::RunnerConfig;
use serde_json::Value as JsonValue;
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "fcli.yaml";

/// Supported file formats for configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    Yaml,
    Json,
}

impl FileFormat {
    /// Detect file format from extension
    pub fn from_path<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => Ok(FileFormat::Yaml),
            Some("json") => Ok(FileFormat::Json),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => Err(ConfigError::UnsupportedFormat("no extension".to_string())),
        }
    }
}

/// Loads [`RunnerConfig`] from YAML/JSON, resolving environment references first.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    resolver: EnvResolver,
}

impl ConfigLoader {
    pub fn new(resolver: EnvResolver) -> Self {
        Self { resolver }
    }

    /// Load the explicitly requested file, or `./fcli.yaml` if present, or defaults.
    pub fn load(&self, explicit: Option<&Path>) -> ConfigResult<RunnerConfig> {
        match explicit {
            Some(path) => self.load_from_file(path),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    self.load_from_file(&default)
                } else {
                    tracing::debug!("no configuration file found, using defaults");
                    Ok(RunnerConfig::default())
                }
            }
        }
    }

    /// Load configuration from a file. A relative `actions_dir` is taken relative to
    /// the file's directory.
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<RunnerConfig> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let format = FileFormat::from_path(path)?;
        let mut config = self.parse_content(&content, format)?;

        if let Some(dir) = config.actions_dir.take() {
            let base = path.parent().unwrap_or_else(|| Path::new(""));
            config.actions_dir = Some(if dir.is_relative() { base.join(dir) } else { dir });
        }

        tracing::debug!(
            path = %path.display(),
            backends = config.backends.len(),
            "loaded configuration"
        );
        Ok(config)
    }

    /// Parse configuration content directly
    pub fn parse_content(&self, content: &str, format: FileFormat) -> ConfigResult<RunnerConfig> {
        let raw: JsonValue = match format {
            FileFormat::Yaml => serde_yaml::from_str(content)?,
            FileFormat::Json => serde_json::from_str(content)?,
        };
        // An empty YAML file parses as null
        let raw = if raw.is_null() {
            JsonValue::Object(Default::default())
        } else {
            raw
        };

        let resolved = self.resolver.resolve(&raw)?;
        let config: RunnerConfig = serde_json::from_value(resolved)?;
        config.validate()?;
        Ok(config)
    }
}
