//! Portal login. The portal sometimes shows an image captcha; we cannot solve
//! it, so the image is saved to disk and the operator is asked to read it.

use crate::{
    selectors,
    wait_for_element,
};
use autopilot_config::Config;
use chromiumoxide::{
    cdp::browser_protocol::page::CaptureScreenshotFormat,
    Page,
};
use eyre::{
    Context as _,
    Result,
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};

const LOGIN_ELEMENT_TIMEOUT: Duration = Duration::from_secs(30);
/// The login form submits in-page, there is no navigation to wait for.
const LOGIN_SETTLE: Duration = Duration::from_secs(3);

/// Asks the operator for the captcha text. `image` points at the saved
/// screenshot when one could be taken; `None` back means no captcha was shown.
pub trait CaptchaPrompt {
    fn ask(&self, image: Option<&Path>) -> Result<Option<String>>;
}

pub(crate) async fn login(page: &Page, config: &Config, prompt: &dyn CaptchaPrompt) -> Result<()> {
    let login_url = config.portal.login_url()?;
    page.goto(login_url.to_string())
        .await
        .context("failed to open the login page")?;

    fill_input(page, selectors::USERNAME_INPUT, &config.username)
        .await
        .context("failed to fill in the student id")?;
    fill_input(page, selectors::PASSWORD_INPUT, &config.password)
        .await
        .context("failed to fill in the password")?;

    let captcha_image = save_captcha(page, config.data_dir()).await;
    let captcha = tokio::task::block_in_place(|| prompt.ask(captcha_image.as_deref()))?;
    if let Some(captcha) = captcha.as_deref().map(str::trim).filter(|text| !text.is_empty()) {
        fill_input(page, selectors::CAPTCHA_INPUT, captcha)
            .await
            .context("failed to fill in the captcha")?;
    }

    page.find_element(selectors::LOGIN_BUTTON)
        .await
        .context("could not find the login button")?
        .click()
        .await
        .context("failed to click the login button")?;

    tokio::time::sleep(LOGIN_SETTLE).await;
    info!("Logged into the portal");

    Ok(())
}

async fn fill_input(page: &Page, selector: &str, value: &str) -> Result<()> {
    let input = wait_for_element(page, selector, LOGIN_ELEMENT_TIMEOUT).await?;
    input
        .focus()
        .await
        .context("failed to focus the input")?
        .call_js_fn("function() { this.value = ''; }", true)
        .await
        .context("failed to clear the input")?;
    input.type_str(value).await.context("failed to type into the input")?;
    Ok(())
}

/// Screenshot the captcha element, if there is one. Failures are not fatal,
/// the operator can still read the captcha from the browser window.
async fn save_captcha(page: &Page, data_dir: &Path) -> Option<PathBuf> {
    let element = page.find_element(selectors::CAPTCHA_IMAGE).await.ok()?;

    if let Err(err) = std::fs::create_dir_all(data_dir) {
        warn!("failed to create data directory for the captcha image: {err}");
        return None;
    }

    let path = data_dir.join("captcha.png");
    match element.save_screenshot(CaptureScreenshotFormat::Png, &path).await {
        Ok(_) => {
            info!(?path, "Saved captcha image");
            Some(path)
        }
        Err(err) => {
            warn!("failed to screenshot the captcha image: {err}");
            None
        }
    }
}
