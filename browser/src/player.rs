//! Playback supervision for a single video page.
//!
//! The portal fights unattended playback in a few ways: it pauses the player
//! when the tab loses visibility, runs a periodic forced pause, and resets
//! mute/rate from its own UI code. One injected patch neutralizes all of that,
//! and a polling loop keeps the player running and watches for the end.

use crate::{
    selectors,
    wait_for_element,
};
use chromiumoxide::{
    cdp::js_protocol::runtime::EvaluateParams,
    Page,
};
use eyre::{
    Context as _,
    Result,
};
use serde::Deserialize;
use std::{
    future::Future,
    pin::Pin,
    time::Duration,
};

const VIDEO_WAIT_TIMEOUT: Duration = Duration::from_secs(30);
/// How often a paused player gets kicked back into playing.
const NUDGE_INTERVAL: Duration = Duration::from_secs(10);
/// How often playback progress is logged.
const STATUS_INTERVAL: Duration = Duration::from_secs(3);
/// Backstop poll for the ended state, in case the in-page listener never fires.
const ENDED_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Keeps the page "visible", swallows future `visibilitychange` listeners,
/// disables the portal's forced pause loop, pins 1x playback and mutes the
/// player.
const KEEPALIVE_PATCH: &str = r#"
(() => {
    const redefine = (obj, prop, value) => {
        try {
            Object.defineProperty(obj, prop, { configurable: true, get: () => value });
        } catch (e) {}
    };
    redefine(document, 'hidden', false);
    redefine(document, 'visibilityState', 'visible');

    const nativeAdd = document.addEventListener.bind(document);
    document.addEventListener = function (type, listener, options) {
        if (type === 'visibilitychange') return;
        return nativeAdd(type, listener, options);
    };
    document.onvisibilitychange = null;

    if (typeof window.loop_pause === 'function') {
        window.loop_pause = () => {};
    }

    if (window.player && window.player.media) {
        window.player.media.playbackRate = 1;
        window.player.media.muted = true;
        window.player.on('ratechange', () => {
            if (window.player.media.playbackRate !== 1) {
                window.player.media.playbackRate = 1;
            }
        });
    }

    const v = document.querySelector('video#video');
    if (v) {
        v.muted = true;
        const observer = new MutationObserver(() => {
            if (!v.muted) v.muted = true;
        });
        observer.observe(v, { attributes: true, attributeFilter: ['muted'] });
    }
})()
"#;

const NUDGE_PLAYBACK: &str = r#"
(() => {
    if (window.player && typeof window.player.play === 'function') {
        if (window.player.paused) window.player.play();
        return;
    }
    const v = document.querySelector('video');
    if (v && v.paused && typeof v.play === 'function') v.play();
})()
"#;

const PLAYBACK_STATUS: &str = r#"
(() => {
    const v = document.querySelector('video#video');
    if (!v) return null;
    return {
        currentTime: v.currentTime || 0,
        duration: v.duration || 0,
        paused: v.paused,
        ended: v.ended,
    };
})()
"#;

const VIDEO_ENDED: &str = r#"
(() => {
    const v = document.querySelector('video#video');
    return !!(v && v.ended);
})()
"#;

/// Resolves once the video fires `ended`, retrying until the element shows up.
const WAIT_FOR_ENDED: &str = r#"
new Promise((resolve) => {
    const check = () => {
        const v = document.querySelector('video#video');
        if (!v) {
            setTimeout(check, 1000);
            return;
        }
        if (v.ended) {
            resolve(true);
            return;
        }
        v.addEventListener('ended', () => resolve(true), { once: true });
    };
    check();
})
"#;

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackStatus {
    pub current_time: f64,
    pub duration: f64,
    pub paused: bool,
    pub ended: bool,
}

impl PlaybackStatus {
    pub fn is_playing(&self) -> bool {
        !self.paused && !self.ended
    }

    pub fn progress_percent(&self) -> f64 {
        if self.duration > 0.0 {
            self.current_time / self.duration * 100.0
        } else {
            0.0
        }
    }

    pub fn describe(&self) -> &'static str {
        if self.ended {
            "ended"
        } else if self.is_playing() {
            "playing"
        } else {
            "paused"
        }
    }
}

/// `MM:SS`, or `HH:MM:SS` once an hour is reached.
pub fn format_timestamp(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "00:00".to_string();
    }
    let total = seconds as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

/// Supervise the video on the current page until it ends.
///
/// End-of-video detection races an in-page `ended` listener against a periodic
/// state poll; whichever fires first wins. If the listener cannot be installed
/// the poll alone decides.
pub(crate) async fn watch_current(page: &Page, label: &str) -> Result<()> {
    wait_for_element(page, selectors::VIDEO_ELEMENT, VIDEO_WAIT_TIMEOUT)
        .await
        .context("no video element on the page")?;

    apply_keepalive_patch(page).await?;
    nudge_playback(page).await;

    let mut nudge = tokio::time::interval(NUDGE_INTERVAL);
    let mut status = tokio::time::interval(STATUS_INTERVAL);
    let mut poll = tokio::time::interval(ENDED_POLL_INTERVAL);

    let mut ended_event: Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> =
        Box::pin(wait_for_ended_event(page));

    loop {
        tokio::select! {
            result = ended_event.as_mut() => {
                match result {
                    Ok(()) => {
                        info!("{label} video ended");
                        break;
                    }
                    Err(err) => {
                        debug!("{label} ended listener failed, relying on state polling: {err}");
                        ended_event = Box::pin(std::future::pending());
                    }
                }
            }

            _ = nudge.tick() => {
                nudge_playback(page).await;
            }

            _ = status.tick() => {
                if let Some(status) = playback_status(page).await {
                    info!(
                        "{label} {} | {}/{} | {:.1}%",
                        status.describe(),
                        format_timestamp(status.current_time),
                        format_timestamp(status.duration),
                        status.progress_percent(),
                    );
                    if status.ended {
                        info!("{label} video ended");
                        break;
                    }
                }
            }

            _ = poll.tick() => {
                if video_ended(page).await {
                    info!("{label} video ended (state poll)");
                    break;
                }
            }
        }
    }

    Ok(())
}

async fn apply_keepalive_patch(page: &Page) -> Result<()> {
    page.evaluate(KEEPALIVE_PATCH)
        .await
        .context("failed to apply keepalive patch")?;
    Ok(())
}

/// Best effort, a failed nudge just means the next one tries again.
async fn nudge_playback(page: &Page) {
    if let Err(err) = page.evaluate(NUDGE_PLAYBACK).await {
        debug!("playback nudge failed: {err}");
    }
}

async fn playback_status(page: &Page) -> Option<PlaybackStatus> {
    match page.evaluate(PLAYBACK_STATUS).await {
        Ok(result) => result.into_value::<Option<PlaybackStatus>>().unwrap_or_default(),
        Err(err) => {
            debug!("playback status probe failed: {err}");
            None
        }
    }
}

async fn video_ended(page: &Page) -> bool {
    match page.evaluate(VIDEO_ENDED).await {
        Ok(result) => result.into_value::<bool>().unwrap_or(false),
        Err(err) => {
            debug!("ended poll failed: {err}");
            false
        }
    }
}

async fn wait_for_ended_event(page: &Page) -> Result<()> {
    let params = EvaluateParams::builder()
        .expression(WAIT_FOR_ENDED)
        .await_promise(true)
        .return_by_value(true)
        .build()
        .map_err(|e| eyre::eyre!(e))?;
    page.evaluate(params)
        .await
        .context("failed to await the ended event")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn timestamps_roll_over_to_hours() {
        assert_eq!(format_timestamp(0.0), "00:00");
        assert_eq!(format_timestamp(59.9), "00:59");
        assert_eq!(format_timestamp(61.0), "01:01");
        assert_eq!(format_timestamp(3600.0), "01:00:00");
        assert_eq!(format_timestamp(3723.0), "01:02:03");
    }

    #[test]
    fn bogus_timestamps_format_as_zero() {
        assert_eq!(format_timestamp(f64::NAN), "00:00");
        assert_eq!(format_timestamp(f64::INFINITY), "00:00");
        assert_eq!(format_timestamp(-5.0), "00:00");
    }

    #[test]
    fn progress_handles_unknown_duration() {
        let status = PlaybackStatus {
            current_time: 10.0,
            duration: 0.0,
            ..Default::default()
        };
        assert_eq!(status.progress_percent(), 0.0);

        let status = PlaybackStatus {
            current_time: 30.0,
            duration: 120.0,
            ..Default::default()
        };
        assert_eq!(status.progress_percent(), 25.0);
    }

    #[test]
    fn describe_follows_player_state() {
        let playing = PlaybackStatus::default();
        assert_eq!(playing.describe(), "playing");

        let paused = PlaybackStatus {
            paused: true,
            ..Default::default()
        };
        assert_eq!(paused.describe(), "paused");

        let ended = PlaybackStatus {
            ended: true,
            ..Default::default()
        };
        assert_eq!(ended.describe(), "ended");
    }

    #[test]
    fn status_payload_deserializes() {
        let json = serde_json::json!({
            "currentTime": 12.5,
            "duration": 100.0,
            "paused": false,
            "ended": false,
        });
        let status: PlaybackStatus = serde_json::from_value(json).unwrap();
        assert!(status.is_playing());
        assert_eq!(status.progress_percent(), 12.5);
    }
}
