use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

const CONFIG_FILE: &str = ".modkeeper/config.toml";

pub struct ModkeeperConfig {
    pub cache_dir: Option<PathBuf>,
    pub remote_url: Option<String>,
    pub branch: Option<String>,
    pub api_url: Option<String>,
    pub api_token: Option<String>,
}

impl ModkeeperConfig {
    /// Reads `$HOME/.modkeeper/config.toml`, if present, overridden by
    /// `MODKEEPER_*` environment variables.
    pub fn load() -> anyhow::Result<Self> {
        let file = home::home_dir().map(|home| home.join(CONFIG_FILE));
        let raw_config = RawConfig::load(file.as_deref(), None)?;

        Ok(Self {
            cache_dir: raw_config.cache.dir,
            remote_url: raw_config.remote.url,
            branch: raw_config.remote.branch,
            api_url: raw_config.api.url,
            api_token: raw_config.api.token,
        })
    }
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    remote: RemoteConfig,
    #[serde(default)]
    api: ApiConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct CacheConfig {
    dir: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RemoteConfig {
    url: Option<String>,
    branch: Option<String>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct ApiConfig {
    url: Option<String>,
    token: Option<String>,
}

impl RawConfig {
    fn load(file: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(File::from(file).format(FileFormat::Toml).required(false));
        }
        builder
            .add_source(
                Environment::with_prefix("MODKEEPER")
                    .separator("_")
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}
