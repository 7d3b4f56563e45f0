#[macro_use]
extern crate tracing;

mod app_config;
mod args;
mod playlist;
mod portal;

use app_config::AppConfig;
pub use app_config::{
    get_config_dir,
    get_data_dir,
};
pub use args::Args;
use eyre::bail;
pub use playlist::Playlist;
pub use portal::PortalConfig;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::HashMap,
    path::{
        Path,
        PathBuf,
    },
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten, skip_serializing)]
    app_config: AppConfig,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub video_list: PathBuf,
    #[serde(default)]
    pub headless: bool,
    #[serde(default)]
    pub mute_audio: bool,
    #[serde(default)]
    pub portal: PortalConfig,
}

const DEFAULT_CONFIG: &str = include_str!("default-config.yaml");

impl Default for Config {
    fn default() -> Self {
        serde_yml::from_str(DEFAULT_CONFIG).expect("Failed to parse default config")
    }
}

impl config::Source for Config {
    fn clone_into_box(&self) -> Box<dyn config::Source + Send + Sync> {
        Box::new((*self).clone())
    }

    fn collect(&self) -> Result<config::Map<String, config::Value>, config::ConfigError> {
        let mut cache = HashMap::<String, config::Value>::new();
        if !self.username.is_empty() {
            cache.insert("username".to_string(), self.username.clone().into());
        }
        if !self.password.is_empty() {
            cache.insert("password".to_string(), self.password.clone().into());
        }
        cache.insert(
            "video_list".to_string(),
            self.video_list.to_string_lossy().to_string().into(),
        );
        cache.insert("headless".to_string(), self.headless.into());
        cache.insert("mute_audio".to_string(), self.mute_audio.into());
        cache.insert(
            "portal".to_string(),
            config::ValueKind::Table(HashMap::from_iter([
                ("base_url".to_string(), self.portal.base_url.to_string().into()),
                ("login_path".to_string(), self.portal.login_path.clone().into()),
                (
                    "lesson_referer".to_string(),
                    self.portal.lesson_referer.clone().into(),
                ),
            ]))
            .into(),
        );
        Ok(cache)
    }
}

impl Config {
    pub fn new(args: Args) -> Result<Self, config::ConfigError> {
        let data_dir = get_data_dir();
        let config_dir = get_config_dir();
        let mut builder = config::Config::builder()
            .set_default("data_dir", data_dir.to_str().unwrap_or_default())?
            .set_default("config_dir", config_dir.to_str().unwrap_or_default())?;

        builder = builder.add_source(Config::default());

        let config_files = [("config.yaml", config::FileFormat::Yaml)];

        for (file, format) in &config_files {
            let source = config::File::from(config_dir.join(file))
                .format(*format)
                .required(false);
            builder = builder.add_source(source);
        }

        builder = builder.add_source(args);

        let cfg: Self = builder.build()?.try_deserialize()?;
        debug!(?cfg.video_list, headless = cfg.headless, "Loaded configuration");

        Ok(cfg)
    }

    /// Everything the run needs before a browser is worth launching.
    pub fn validate(&self) -> eyre::Result<()> {
        if self.username.is_empty() || self.password.is_empty() {
            bail!("portal credentials are not set; add them to config.yaml or pass --username/--password");
        }
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.app_config.data_dir
    }

    pub fn config_dir(&self) -> &Path {
        &self.app_config.config_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config_parses() {
        let config = Config::default();
        assert_eq!(config.video_list, PathBuf::from("video-list.txt"));
        assert!(!config.headless);
        assert!(config.mute_audio);
        assert_eq!(config.portal, PortalConfig::default());
    }

    #[test]
    fn validate_requires_credentials() {
        let mut config = Config::default();
        assert!(config.validate().is_err());
        config.username = "s2021".to_string();
        config.password = "hunter2".to_string();
        assert!(config.validate().is_ok());
    }
}
