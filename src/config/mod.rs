use crate::models::TrackerConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Settings file looked up inside the config directory
pub const CONFIG_FILE_NAME: &str = "tryon.yaml";

/// Environment prefix; `TRYON_DETECTOR__API_KEY` sets `detector.api_key`
pub const ENV_PREFIX: &str = "TRYON";

/// Loads and saves the tracker settings.
///
/// Values come from `tryon.yaml` in the config directory, overlaid with
/// `TRYON_*` environment variables (`__` separates nested keys). The access
/// key is expected from the environment and is never written back to disk.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a ConfigManager for `config_dir`, creating the directory if needed.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
        })
    }

    /// Load settings from the file and the process environment.
    ///
    /// A missing file is not an error; defaults fill every unset value.
    pub fn load(&self) -> Result<TrackerConfig> {
        self.load_from(None)
    }

    /// Same as [`load`](Self::load) with an explicit set of environment variables.
    pub fn load_with_env<I>(&self, vars: I) -> Result<TrackerConfig>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.load_from(Some(vars.into_iter().collect()))
    }

    fn load_from(&self, env: Option<::config::Map<String, String>>) -> Result<TrackerConfig> {
        if !self.config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                self.config_path
            );
        }

        let settings = ::config::Config::builder()
            .add_source(
                ::config::File::new(self.config_path.as_str(), ::config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .source(env),
            )
            .build()
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        let config: TrackerConfig = settings
            .try_deserialize()
            .with_context(|| format!("Failed to parse config: {}", self.config_path))?;

        tracing::info!(
            "Loaded config from {} (detector: {})",
            self.config_path,
            if config.detector.is_offline() {
                "offline"
            } else {
                config.detector.endpoint.as_str()
            }
        );
        Ok(config)
    }

    /// Write settings as YAML, leaving out the access key.
    pub fn save(&self, config: &TrackerConfig) -> Result<()> {
        let mut on_disk = config.clone();
        on_disk.detector.api_key.clear();

        let yaml_string =
            serde_yaml_ng::to_string(&on_disk).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }
}
