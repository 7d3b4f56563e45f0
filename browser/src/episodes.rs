//! Episode discovery on lesson pages.
//!
//! A lesson video can be split into sub-episodes listed next to the player.
//! The portal marks watched episodes visually (red link, icon, "已完成" text)
//! rather than through anything structured, so one JS probe collects the raw
//! styling signals per list item and the completion call is made here, where
//! it can be tested.

use crate::{
    selectors,
    wait_for_element,
};
use chromiumoxide::Page;
use eyre::{
    Context as _,
    Result,
};
use serde::Deserialize;
use std::time::Duration;

const LESSON_READY_TIMEOUT: Duration = Duration::from_secs(10);
const SINGLE_ITEM_TIMEOUT: Duration = Duration::from_secs(5);

/// Collects one record per `li` in the episode list, resolving relative hrefs
/// against the page URL.
const EXTRACT_EPISODES: &str = r#"
(() => {
    const list = document.querySelector('.video_lists ul');
    if (!list) return [];
    const episodes = [];
    for (const li of list.querySelectorAll('li')) {
        const link = li.querySelector('a[href*="r_id="]');
        if (!link) continue;
        const href = link.getAttribute('href');
        if (!href) continue;
        const span = li.querySelector('span');
        episodes.push({
            url: new URL(href, window.location.href).href,
            title: (link.textContent || '').trim(),
            signals: {
                classes: Array.from(li.classList),
                inlineStyle: link.getAttribute('style') || '',
                linkColor: window.getComputedStyle(link).color || '',
                spanColor: span ? (window.getComputedStyle(span).color || '') : '',
                text: li.textContent || '',
                backgroundImage: window.getComputedStyle(li).backgroundImage || '',
            },
        });
    }
    return episodes;
})()
"#;

/// Answers "is the item currently shown on this page already complete" for
/// pages whose list has a highlighted current entry but no usable links.
const CURRENT_ITEM_COMPLETED: &str = r#"
(() => {
    const list = document.querySelector('.video_lists ul');
    if (!list) return false;
    const current = list.querySelector('li.video_red1, li.video_red2, li.video_red3');
    if (!current) return false;
    const text = current.textContent || '';
    return current.classList.contains('video_red2')
        || current.classList.contains('video_red3')
        || text.includes('已完成')
        || text.includes('完成');
})()
"#;

/// `video_red1` marks the item currently playing; red styling on it does not
/// mean "watched".
const CURRENT_ITEM_CLASS: &str = "video_red1";
const COMPLETED_CLASSES: [&str; 2] = ["video_red2", "video_red3"];
const COMPLETED_ICONS: [&str; 2] = ["video_ico2", "video_ico3"];
const INLINE_RED_MARKERS: [&str; 4] = ["color:red", "color: red", "color:#ef0312", "color:#e61d1d"];
const COMPUTED_RED_MARKERS: [&str; 4] = ["rgb(239, 3, 18)", "rgb(230, 29, 29)", "#ef0312", "#e61d1d"];
const COMPLETED_TEXT_MARKERS: [&str; 2] = ["已完成", "完成"];

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Episode {
    pub url: String,
    pub title: String,
    pub signals: CompletionSignals,
}

impl Episode {
    pub fn completed(&self) -> bool {
        self.signals.completed()
    }
}

/// Raw styling observed on an episode list item. Which of these the portal
/// actually uses varies between lessons, hence the disjunction in
/// [`CompletionSignals::completed`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionSignals {
    pub classes: Vec<String>,
    pub inline_style: String,
    pub link_color: String,
    pub span_color: String,
    pub text: String,
    pub background_image: String,
}

impl CompletionSignals {
    pub fn completed(&self) -> bool {
        self.has_inline_red_style()
            || self.has_completed_class()
            || self.has_completed_icon()
            || (self.has_red_computed_color() && !self.is_current_item())
            || self.has_completed_text()
    }

    fn is_current_item(&self) -> bool {
        self.classes.iter().any(|class| class == CURRENT_ITEM_CLASS)
    }

    fn has_completed_class(&self) -> bool {
        self.classes
            .iter()
            .any(|class| COMPLETED_CLASSES.contains(&class.as_str()))
    }

    fn has_inline_red_style(&self) -> bool {
        INLINE_RED_MARKERS
            .iter()
            .any(|marker| self.inline_style.contains(marker))
    }

    fn has_red_computed_color(&self) -> bool {
        COMPUTED_RED_MARKERS
            .iter()
            .any(|marker| self.link_color.contains(marker) || self.span_color.contains(marker))
    }

    fn has_completed_text(&self) -> bool {
        COMPLETED_TEXT_MARKERS.iter().any(|marker| self.text.contains(marker))
    }

    fn has_completed_icon(&self) -> bool {
        COMPLETED_ICONS
            .iter()
            .any(|marker| self.background_image.contains(marker))
    }
}

/// Extract the episode list from the current lesson page. Any failure yields
/// an empty list so the caller falls back to treating the page as one bare
/// video.
pub async fn extract(page: &Page) -> Vec<Episode> {
    match try_extract(page).await {
        Ok(episodes) => episodes,
        Err(err) => {
            debug!("episode extraction failed, treating page as a bare video: {err}");
            Vec::new()
        }
    }
}

async fn try_extract(page: &Page) -> Result<Vec<Episode>> {
    wait_for_element(page, selectors::LESSON_READY, LESSON_READY_TIMEOUT).await?;
    page.evaluate(EXTRACT_EPISODES)
        .await
        .context("failed to evaluate episode probe")?
        .into_value()
        .context("failed to deserialize episode probe result")
}

/// Completion check for pages without an extractable episode list. Errors are
/// reported as "not complete" so the video gets played rather than skipped.
pub async fn current_item_completed(page: &Page) -> bool {
    let completed = async {
        wait_for_element(page, selectors::LESSON_READY, SINGLE_ITEM_TIMEOUT).await?;
        page.evaluate(CURRENT_ITEM_COMPLETED)
            .await
            .context("failed to evaluate completion probe")?
            .into_value::<bool>()
            .context("failed to deserialize completion probe result")
    }
    .await;

    match completed {
        Ok(completed) => completed,
        Err(err) => {
            debug!("completion probe failed, assuming not complete: {err}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals() -> CompletionSignals {
        CompletionSignals::default()
    }

    #[test]
    fn blank_signals_are_not_complete() {
        assert!(!signals().completed());
    }

    #[test]
    fn completed_classes_mark_completion() {
        for class in ["video_red2", "video_red3"] {
            let signals = CompletionSignals {
                classes: vec![class.to_string()],
                ..signals()
            };
            assert!(signals.completed(), "{class} should mark completion");
        }
    }

    #[test]
    fn inline_red_style_marks_completion() {
        for style in ["color:red", "color: red", "color:#ef0312", "color:#e61d1d"] {
            let signals = CompletionSignals {
                inline_style: format!("font-weight:bold;{style}"),
                ..signals()
            };
            assert!(signals.completed(), "{style} should mark completion");
        }
    }

    #[test]
    fn computed_red_marks_completion_on_link_or_span() {
        let link = CompletionSignals {
            link_color: "rgb(239, 3, 18)".to_string(),
            ..signals()
        };
        assert!(link.completed());

        let span = CompletionSignals {
            span_color: "rgb(230, 29, 29)".to_string(),
            ..signals()
        };
        assert!(span.completed());
    }

    #[test]
    fn computed_red_on_the_playing_item_does_not_count() {
        let signals = CompletionSignals {
            classes: vec!["video_red1".to_string()],
            link_color: "rgb(239, 3, 18)".to_string(),
            ..signals()
        };
        assert!(!signals.completed());
    }

    #[test]
    fn playing_item_with_completed_icon_still_counts() {
        let signals = CompletionSignals {
            classes: vec!["video_red1".to_string()],
            background_image: r#"url("/static/video_ico2.png")"#.to_string(),
            ..signals()
        };
        assert!(signals.completed());
    }

    #[test]
    fn completed_text_marks_completion() {
        let signals = CompletionSignals {
            text: "第1讲 (已完成)".to_string(),
            ..signals()
        };
        assert!(signals.completed());
    }

    #[test]
    fn probe_payload_deserializes() {
        let json = serde_json::json!({
            "url": "https://wsdx.hzau.edu.cn/ybdy/play?v_id=1&r_id=2",
            "title": "第1讲",
            "signals": {
                "classes": ["video_red2"],
                "inlineStyle": "",
                "linkColor": "rgb(239, 3, 18)",
                "spanColor": "",
                "text": "第1讲",
                "backgroundImage": "none",
            },
        });
        let episode: Episode = serde_json::from_value(json).unwrap();
        assert!(episode.completed());
        assert_eq!(episode.title, "第1讲");
    }
}
