//! The run loop: one browser, one page, the playlist watched front to back.

use crate::{
    create_browser,
    drive_browser_events,
    episodes::{
        self,
        Episode,
    },
    install_stealth_script,
    login::{
        self,
        CaptchaPrompt,
    },
    player,
};
use autopilot_config::{
    Config,
    Playlist,
};
use chromiumoxide::{
    cdp::browser_protocol::{
        page::NavigateParams,
        target::CreateTargetParams,
    },
    Browser,
    Page,
};
use eyre::{
    bail,
    Context as _,
    ContextCompat as _,
    Result,
};
use std::{
    fmt,
    time::Duration,
};
use url::Url;

/// Lesson pages render the episode list well after DOMContentLoaded.
const NAVIGATION_SETTLE: Duration = Duration::from_secs(3);
const BETWEEN_ITEMS: Duration = Duration::from_secs(2);
const PAGE_CREATE_ATTEMPTS: usize = 5;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RunSummary {
    pub watched: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} watched, {} skipped, {} failed",
            self.watched, self.skipped, self.failed
        )
    }
}

/// Drives one logged-in page through the playlist.
#[derive(Debug)]
pub struct WatchSession {
    page: Page,
    config: Config,
}

impl WatchSession {
    /// Launch the browser, log in and watch every playlist entry in order.
    /// Per-entry failures are logged and counted, not propagated.
    pub async fn run(config: Config, playlist: Playlist, prompt: &dyn CaptchaPrompt) -> Result<RunSummary> {
        let (mut browser, handler) = create_browser(&config).await?;
        let browser_event_task_handle = drive_browser_events(handler);

        let page = Self::create_page(&mut browser, &config).await?;
        install_stealth_script(&page).await?;
        login::login(&page, &config, prompt).await.context("login failed")?;

        let session = Self { page, config };
        let summary = session.watch_all(&playlist).await;

        session.close(browser).await?;
        browser_event_task_handle.await?;

        Ok(summary)
    }

    async fn create_page(browser: &mut Browser, config: &Config) -> Result<Page> {
        let mut attempt = 0;
        loop {
            match Self::try_create_page(browser, config).await {
                Ok(page) => return Ok(page),
                Err(_) if attempt < PAGE_CREATE_ATTEMPTS => {
                    attempt += 1;
                    warn!(?attempt, "Failed to create a new page, retrying...");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_create_page(browser: &mut Browser, config: &Config) -> Result<Page> {
        let login_url = config.portal.login_url()?;

        let page = if let Ok(Some(page)) = browser
            .pages()
            .await
            .context("failed to get pages")
            .map(|pages| pages.into_iter().next())
        {
            page.goto(login_url.to_string())
                .await
                .context("failed to navigate to the login page")?;
            page
        } else {
            browser
                .new_page(
                    CreateTargetParams::builder()
                        .url(login_url.to_string())
                        .build()
                        .map_err(|e| eyre::eyre!(e))?,
                )
                .await
                .context("failed to create new page")?
        };

        let navigation = page
            .wait_for_navigation_response()
            .await
            .context("page could not navigate to the login page")?
            .with_context(|| format!("no request returned when creating a page for {login_url}"))?;

        if let Some(text) = &navigation.failure_text {
            bail!("when creating a new page the request failed: {text}");
        }

        debug!("Created a new page for {login_url}");

        Ok(page)
    }

    async fn watch_all(&self, playlist: &Playlist) -> RunSummary {
        let mut summary = RunSummary::default();
        let total = playlist.len();

        for (index, url) in playlist.iter().enumerate() {
            let label = format!("[{}/{total}]", index + 1);
            if let Err(err) = self.watch_entry(url, &label, &mut summary).await {
                error!("{label} failed: {err}; continuing with the next video");
                summary.failed += 1;
            }
            tokio::time::sleep(BETWEEN_ITEMS).await;
        }

        info!("Run finished: {summary}");
        summary
    }

    async fn watch_entry(&self, url: &Url, label: &str, summary: &mut RunSummary) -> Result<()> {
        self.navigate_with_fallback(url, label).await?;
        tokio::time::sleep(NAVIGATION_SETTLE).await;

        let episodes = episodes::extract(&self.page).await;
        match episodes.as_slice() {
            [] => {
                // No episode list, treat the entry as one bare video.
                if episodes::current_item_completed(&self.page).await {
                    info!("{label} video already complete, skipping");
                    summary.skipped += 1;
                } else {
                    self.play(url.as_str(), label).await?;
                    summary.watched += 1;
                }
            }

            [episode] => {
                log_episode_detail(label, episode);
                if episode.completed() {
                    info!("{label} video already complete, skipping");
                    summary.skipped += 1;
                } else {
                    self.play(&episode.url, label).await?;
                    summary.watched += 1;
                }
            }

            episodes => {
                for episode in episodes {
                    log_episode_detail(label, episode);
                }

                let pending: Vec<&Episode> = episodes.iter().filter(|episode| !episode.completed()).collect();
                let complete = episodes.len() - pending.len();
                info!(
                    "{label} found {} episodes, {complete} already complete",
                    episodes.len()
                );
                summary.skipped += complete;

                if pending.is_empty() {
                    info!("{label} all episodes complete, skipping");
                    return Ok(());
                }

                let total = pending.len();
                for (index, episode) in pending.iter().enumerate() {
                    let episode_label = format!("{label} [episode {}/{total}]", index + 1);
                    match self.play(&episode.url, &episode_label).await {
                        Ok(()) => summary.watched += 1,
                        Err(err) => {
                            error!("{episode_label} failed: {err}; continuing with the next episode");
                            summary.failed += 1;
                        }
                    }
                    if index + 1 < total {
                        tokio::time::sleep(BETWEEN_ITEMS).await;
                    }
                }
                info!("{label} finished all pending episodes");
            }
        }

        Ok(())
    }

    /// Navigate to a video page and supervise it until the video ends.
    async fn play(&self, url: &str, label: &str) -> Result<()> {
        info!("{label} starting playback of {url}");

        if let Err(err) = self.navigate(url).await {
            warn!("{label} navigation failed, retrying: {err}");
            self.navigate(url).await?;
        }

        player::watch_current(&self.page, label).await
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        let referer = self.config.portal.referer_url()?;
        let params = NavigateParams::builder()
            .url(url)
            .referrer(referer.to_string())
            .build()
            .map_err(|e| eyre::eyre!(e))?;
        self.page
            .goto(params)
            .await
            .with_context(|| format!("failed to navigate to {url}"))?;
        Ok(())
    }

    /// The portal rejects some deep links opened cold; going through the
    /// lesson page first usually fixes that.
    async fn navigate_with_fallback(&self, url: &Url, label: &str) -> Result<()> {
        if self.navigate(url.as_str()).await.is_ok() {
            return Ok(());
        }

        warn!("{label} direct navigation failed, going through the lesson page first");
        let referer = self.config.portal.referer_url()?;
        self.page
            .goto(referer.to_string())
            .await
            .context("failed to open the lesson page")?;
        tokio::time::sleep(BETWEEN_ITEMS).await;
        self.page
            .goto(url.to_string())
            .await
            .context("failed to open the video page via the lesson page")?;
        Ok(())
    }

    async fn close(self, mut browser: Browser) -> Result<()> {
        debug!("Closing the browser...");

        if let Err(err) = self.page.close().await {
            error!("Error closing page: {err}");
        }

        browser.close().await?;
        browser.wait().await?;

        info!("Closed the browser");
        Ok(())
    }
}

fn log_episode_detail(label: &str, episode: &Episode) {
    debug!(
        "{label} episode {:?}: completed={} classes={:?} inline_style={:?} link_color={:?} icon={:?}",
        episode.title,
        episode.completed(),
        episode.signals.classes,
        episode.signals.inline_style,
        episode.signals.link_color,
        episode.signals.background_image,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn summary_display_reads_naturally() {
        let summary = RunSummary {
            watched: 3,
            skipped: 2,
            failed: 1,
        };
        assert_eq!(summary.to_string(), "3 watched, 2 skipped, 1 failed");
    }
}
