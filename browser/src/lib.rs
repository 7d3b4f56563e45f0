#[macro_use]
extern crate tracing;

use autopilot_config::Config;
use chromiumoxide::{
    browser,
    cdp::browser_protocol::{
        browser::{
            GrantPermissionsParams,
            PermissionType,
        },
        emulation::{
            SetLocaleOverrideParams,
            SetTimezoneOverrideParams,
            SetUserAgentOverrideParams,
        },
        page::AddScriptToEvaluateOnNewDocumentParams,
    },
    Browser,
    Element,
    Handler,
    Page,
};
use eyre::{
    Context as _,
    Result,
};
use futures::StreamExt as _;
use std::{
    path::PathBuf,
    time::Duration,
};
use tokio::task::JoinHandle;

pub mod episodes;
pub mod login;
pub mod player;
mod selectors;
pub mod session;

/// Evaluated on every new document before page scripts run. The portal sniffs
/// for automation and pauses playback for "robot" browsers.
const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => false });
window.chrome = { runtime: {} };
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
Object.defineProperty(navigator, 'languages', { get: () => ['zh-CN', 'zh', 'en'] });
"#;

/// The `navigator.languages` spoof is worthless if the browser still reports
/// its own UA/locale/timezone, so the whole context is presented as a regular
/// Chinese-locale Chrome on Windows.
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const USER_AGENT_PLATFORM: &str = "Win32";
const ACCEPT_LANGUAGE: &str = "zh-CN,zh;q=0.9,en;q=0.8";
const LOCALE: &str = "zh-CN";
const TIMEZONE: &str = "Asia/Shanghai";

fn get_binary() -> Result<PathBuf> {
    // Chromium / Chrome can have different binary names
    let chrome = ["chromium", "google-chrome", "google-chrome-stable", "chrome"]
        .iter()
        .find_map(|name| {
            which::which(name).ok().map(|path| {
                debug!(?path, "found {} at", name);
                path
            })
        })
        .ok_or_else(|| eyre::eyre!("failed to find chromium or google-chrome binary"))?;
    debug!(?chrome, "chrome found at");
    Ok(chrome)
}

/// Create a new browser instance for the given config.
async fn create_browser(config: &Config) -> Result<(Browser, Handler)> {
    let binary = get_binary()?;

    let mut chrome_args = vec![
        "--disable-blink-features=AutomationControlled".to_string(),
        "--disable-features=IsolateOrigins,site-per-process".to_string(),
    ];
    if config.mute_audio {
        chrome_args.push("--mute-audio".to_string());
    }

    let user_data_dir = config.data_dir().join("browser-profile");
    std::fs::create_dir_all(&user_data_dir).context("failed to create browser profile directory")?;

    let mut builder = browser::BrowserConfig::builder();

    if !config.headless {
        // The portal pauses playback in hidden/background pages, so we run
        // with a visible window by default.
        builder = builder.with_head().window_size(1366, 768);
    }

    let browser_config = builder
        .user_data_dir(&user_data_dir)
        .chrome_executable(binary)
        .args(&chrome_args)
        .build()
        .map_err(|e| eyre::eyre!(e))
        .context("failed to build browser config")?;

    let (browser, handler) = browser::Browser::launch(browser_config)
        .await
        .context("failed to launch browser")?;

    // The portal asks for geolocation; an unanswered permission prompt would
    // block playback.
    let permissions = GrantPermissionsParams::builder()
        .permissions(vec![PermissionType::Geolocation])
        .build()
        .map_err(|e| eyre::eyre!(e))?;
    browser
        .execute(permissions)
        .await
        .context("failed to grant the geolocation permission")?;

    Ok((browser, handler))
}

fn drive_browser_events(mut handler: Handler) -> JoinHandle<()> {
    tokio::task::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(err) = event {
                if err.to_string().contains("ResetWithoutClosingHandshake") {
                    error!("Browser unexpectedly closed");
                    break;
                }
                error!("error in browser handler: {err:?}");
            }
        }
        debug!("Browser event handler stopped");
    })
}

async fn install_stealth_script(page: &Page) -> Result<()> {
    let script = AddScriptToEvaluateOnNewDocumentParams::builder()
        .source(STEALTH_SCRIPT)
        .build()
        .map_err(|e| eyre::eyre!(e))?;
    page.execute(script)
        .await
        .context("failed to install stealth script")?;

    page.execute(user_agent_override()?)
        .await
        .context("failed to override the user agent")?;

    let timezone = SetTimezoneOverrideParams::builder()
        .timezone_id(TIMEZONE)
        .build()
        .map_err(|e| eyre::eyre!(e))?;
    page.execute(timezone)
        .await
        .context("failed to override the timezone")?;

    page.execute(SetLocaleOverrideParams::builder().locale(LOCALE).build())
        .await
        .context("failed to override the locale")?;

    Ok(())
}

/// UA override shared between documents; `accept_language` also rewrites the
/// `Accept-Language` request header.
fn user_agent_override() -> Result<SetUserAgentOverrideParams> {
    SetUserAgentOverrideParams::builder()
        .user_agent(USER_AGENT)
        .accept_language(ACCEPT_LANGUAGE)
        .platform(USER_AGENT_PLATFORM)
        .build()
        .map_err(|e| eyre::eyre!(e))
}

/// First we attempt to wait for the page to load by waiting for a navigation response.
/// Then we add a loop to check if the element is present in the DOM.
/// In some cases when the processing power is low, the navigation might be completed,
/// but the page is still rendering the elements.
async fn wait_for_element(page: &Page, selector: &str, timeout: Duration) -> Result<Element> {
    let now = std::time::Instant::now();

    loop {
        if let Ok(element) = page.find_element(selector).await {
            return Ok(element);
        }

        // Sleep for a short duration to avoid busy waiting
        tokio::time::sleep(Duration::from_millis(100)).await;

        if now.elapsed() > timeout {
            return Err(eyre::eyre!("timeout waiting for element: {}", selector));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_override_presents_a_regular_chrome() {
        let params = user_agent_override().unwrap();
        assert!(params.user_agent.contains("Chrome/120"));
        assert!(!params.user_agent.to_lowercase().contains("headless"));
        assert_eq!(params.accept_language.as_deref(), Some("zh-CN,zh;q=0.9,en;q=0.8"));
        assert_eq!(params.platform.as_deref(), Some("Win32"));
    }

    #[test]
    fn stealth_script_covers_the_sniffed_surfaces() {
        for surface in ["webdriver", "window.chrome", "plugins", "languages"] {
            assert!(STEALTH_SCRIPT.contains(surface), "{surface} is not covered");
        }
    }

    #[test]
    fn context_overrides_tell_one_story() {
        // navigator.languages, the locale override and the Accept-Language
        // header must all present the same locale.
        assert!(STEALTH_SCRIPT.contains(LOCALE));
        assert!(ACCEPT_LANGUAGE.starts_with(LOCALE));
    }
}
