use eyre::{
    Context as _,
    Result,
};
use serde::{
    Deserialize,
    Serialize,
};
use url::Url;

/// Addresses of the one portal this tool knows how to drive. Everything is
/// resolved relative to `base_url` so a staging instance can be pointed at
/// from `config.yaml`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PortalConfig {
    #[serde(default = "default_base_url")]
    pub base_url: Url,
    /// Path of the login page, joined onto `base_url`.
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Lesson overview page. Used as the `Referer` for video navigation and
    /// as the intermediate hop when direct navigation fails.
    #[serde(default = "default_lesson_referer")]
    pub lesson_referer: String,
}

fn default_base_url() -> Url {
    Url::parse("https://wsdx.hzau.edu.cn/").expect("default base url is valid")
}

fn default_login_path() -> String {
    "login/#/login".to_string()
}

fn default_lesson_referer() -> String {
    "ybdy/lesson/video?lesson_id=808".to_string()
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            login_path: default_login_path(),
            lesson_referer: default_lesson_referer(),
        }
    }
}

impl PortalConfig {
    pub fn login_url(&self) -> Result<Url> {
        self.base_url
            .join(&self.login_path)
            .context("failed to build login url")
    }

    pub fn referer_url(&self) -> Result<Url> {
        self.base_url
            .join(&self.lesson_referer)
            .context("failed to build lesson referer url")
    }

    /// Expands a bare video id from the playlist into the portal's play page.
    pub fn play_url(&self, video_id: &str) -> Result<Url> {
        self.base_url
            .join(&format!("ybdy/play?v_id={video_id}&r=video&t=2"))
            .with_context(|| format!("failed to build play url for video id {video_id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_urls_point_at_the_portal() {
        let portal = PortalConfig::default();
        assert_eq!(
            portal.login_url().unwrap().as_str(),
            "https://wsdx.hzau.edu.cn/login/#/login"
        );
        assert_eq!(
            portal.referer_url().unwrap().as_str(),
            "https://wsdx.hzau.edu.cn/ybdy/lesson/video?lesson_id=808"
        );
    }

    #[test]
    fn play_url_expands_bare_ids() {
        let portal = PortalConfig::default();
        assert_eq!(
            portal.play_url("1234").unwrap().as_str(),
            "https://wsdx.hzau.edu.cn/ybdy/play?v_id=1234&r=video&t=2"
        );
    }

    #[test]
    fn play_url_respects_custom_base() {
        let portal = PortalConfig {
            base_url: Url::parse("https://staging.example.edu/").unwrap(),
            ..Default::default()
        };
        assert_eq!(
            portal.play_url("7").unwrap().as_str(),
            "https://staging.example.edu/ybdy/play?v_id=7&r=video&t=2"
        );
    }
}
