use clap::Parser;

/// Course video autopilot
#[derive(Parser, Debug, Clone)]
#[command(author, version = version(), about, long_about = None)]
pub struct Args {
    /// Portal account (student id). Overrides the stored configuration.
    #[clap(long, value_name = "USER", env = "AUTOPILOT_USERNAME")]
    pub username: Option<String>,

    /// Portal password. Overrides the stored configuration.
    #[clap(long, value_name = "PASS", env = "AUTOPILOT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Path to the video list file (one video id or URL per line).
    #[clap(long = "video-list", value_name = "FILE")]
    pub video_list: Option<String>,

    /// Run the browser headless. The portal pauses hidden players, so this
    /// defaults to off.
    #[clap(long, action)]
    pub headless: Option<bool>,

    /// Portal base URL, e.g. for a staging instance.
    #[clap(long = "portal-url", value_name = "URL")]
    pub portal_url: Option<String>,
}

mod config_ext {
    use super::*;
    use config::{
        Map,
        Source,
        Value,
        ValueKind,
    };
    use std::collections::HashMap;

    impl Source for Args {
        fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
            Box::new((*self).clone())
        }

        fn collect(&self) -> Result<Map<String, Value>, config::ConfigError> {
            let mut cache = HashMap::<String, Value>::new();
            if let Some(username) = &self.username {
                cache.insert("username".to_string(), username.clone().into());
            }
            if let Some(password) = &self.password {
                cache.insert("password".to_string(), password.clone().into());
            }
            if let Some(video_list) = &self.video_list {
                cache.insert("video_list".to_string(), video_list.clone().into());
            }
            if let Some(headless) = &self.headless {
                cache.insert("headless".to_string(), (*headless).into());
            }
            if let Some(portal_url) = &self.portal_url {
                cache.insert(
                    "portal".to_string(),
                    ValueKind::Table(HashMap::from_iter([(
                        "base_url".to_string(),
                        portal_url.clone().into(),
                    )]))
                    .into(),
                );
            }
            Ok(cache)
        }
    }
}

pub fn version() -> String {
    let author = clap::crate_authors!();
    let config_dir_path = crate::get_config_dir().display().to_string();
    let data_dir_path = crate::get_data_dir().display().to_string();

    format!(
        "\
Authors: {author}

Config directory: {config_dir_path}
Data directory: {data_dir_path}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::Source as _;

    #[test]
    fn only_set_args_are_collected() {
        let args = Args {
            username: Some("s2021".to_string()),
            password: None,
            video_list: None,
            headless: Some(true),
            portal_url: None,
        };
        let map = args.collect().unwrap();
        assert_eq!(map.len(), 2);
        assert!(map.contains_key("username"));
        assert!(map.contains_key("headless"));
    }

    #[test]
    fn portal_url_collects_as_nested_table() {
        let args = Args {
            username: None,
            password: None,
            video_list: None,
            headless: None,
            portal_url: Some("https://staging.example.edu/".to_string()),
        };
        let map = args.collect().unwrap();
        assert!(map.contains_key("portal"));
    }
}
