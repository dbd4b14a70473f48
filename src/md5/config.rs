//! Settings for validation, skinning and output
//!
//! `defaults/md5.default.toml` is compiled in and always forms the bottom layer; see
//! [`Loader`] for what can be stacked on top.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat, Map, ValueKind};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

use super::processor::OutputFormat;
use super::skinning::JointTransformCache;
use super::validation::ValidationOptions;

const DEFAULT_TOML: &str = include_str!("../../defaults/md5.default.toml");

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Md5Config {
    pub validation: ValidationOptions,
    pub skinning: SkinningConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SkinningConfig {
    pub cache_capacity: usize,
}

impl SkinningConfig {
    pub fn cache(&self) -> JointTransformCache {
        JointTransformCache::new(self.cache_capacity)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Used when the caller does not name a format
    pub format: OutputFormat,
    pub pretty: bool,
}

/// Prefix of the environment variables read by [`Loader::with_environment`]
pub const ENV_PREFIX: &str = "MD5";

/// Layers, lowest first: the embedded defaults, TOML files, `MD5_*` environment
/// variables, explicit overrides.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    pub fn new() -> Self {
        let defaults = File::from_str(DEFAULT_TOML, FileFormat::Toml);
        Self {
            builder: Config::builder().add_source(defaults),
        }
    }

    fn layer_file(mut self, path: &Path, required: bool) -> Self {
        let file = File::from(path).format(FileFormat::Toml).required(required);
        self.builder = self.builder.add_source(file);
        self
    }

    /// A TOML file that must exist
    pub fn with_file(self, path: impl AsRef<Path>) -> Self {
        self.layer_file(path.as_ref(), true)
    }

    /// A TOML file that is skipped when absent, such as a per-user config
    pub fn with_optional_file(self, path: impl AsRef<Path>) -> Self {
        self.layer_file(path.as_ref(), false)
    }

    /// `MD5_SECTION__KEY=value`, e.g. `MD5_OUTPUT__FORMAT=json`
    pub fn with_environment(self) -> Self {
        self.with_environment_source(None)
    }

    /// Like [`Loader::with_environment`], reading `vars` instead of the process environment
    pub fn with_environment_source(mut self, vars: Option<Map<String, String>>) -> Self {
        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .source(vars);
        self.builder = self.builder.add_source(environment);
        self
    }

    /// Set one dotted key, e.g. `("output.format", "json")`
    pub fn set_override<I>(mut self, key: &str, value: I) -> Result<Self, ConfigError>
    where
        I: Into<ValueKind>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    /// Turn off the reference and frame-layout checks, whatever the lower layers say
    pub fn permissive(self) -> Result<Self, ConfigError> {
        self.set_override("validation.check_references", false)?
            .set_override("validation.check_frame_layout", false)
    }

    pub fn build(self) -> Result<Md5Config, ConfigError> {
        let config: Md5Config = self.builder.build()?.try_deserialize()?;
        debug!(
            format = %config.output.format,
            cache_capacity = config.skinning.cache_capacity,
            "loaded configuration"
        );
        Ok(config)
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

pub fn load_defaults() -> Result<Md5Config, ConfigError> {
    Loader::new().build()
}
