//! Tiered extraction: one "query and project" script per tier.
//!
//! The page script returns every matching card as a loose JSON object.
//! Field tolerance and the item bound are enforced here, not in the page,
//! so the contract holds whatever the script hands back.

use tracing::debug;
use url::Url;

use tubescout_common::RawVideo;

use crate::browser::{BrowserError, BrowserPage, BrowserResult};

/// Search result cards on the results page.
pub const SEARCH_CARD_SELECTOR: &str = "ytd-video-renderer";
/// Related items region on a watch page.
pub const RELATED_REGION_SELECTOR: &str = "ytd-watch-next-secondary-results-renderer";
/// Compact cards inside the related region.
pub const RELATED_CARD_SELECTOR: &str = "ytd-compact-video-renderer";

/// Build the projection script for `selector`, capped at `limit` cards.
pub fn card_script(selector: &str, limit: usize) -> String {
    // Serializing through JSON yields a correctly escaped JS string literal.
    let selector = serde_json::Value::String(selector.to_string()).to_string();
    format!(
        r#"() => {{
    const results = [];
    const cards = document.querySelectorAll({selector});
    for (let i = 0; i < cards.length && results.length < {limit}; i++) {{
        const card = cards[i];
        const titleEl = card.querySelector('#video-title');
        const linkEl = card.querySelector('a#thumbnail') || card.querySelector('a#video-title');
        if (!titleEl || !linkEl) continue;
        const channelEl = card.querySelector('#channel-info #text') || card.querySelector('.ytd-channel-name #text');
        const viewsEl = card.querySelector('#metadata-line span:nth-child(1)');
        results.push({{
            title: (titleEl.innerText || '').trim(),
            url: linkEl.href || '',
            channel: channelEl ? channelEl.innerText.trim() : '',
            views: viewsEl ? viewsEl.innerText.trim() : ''
        }});
    }}
    return results;
}}"#
    )
}

/// Pull the external video id out of a watch or shorts URL.
pub fn video_id_from_url(raw: &str) -> String {
    let Ok(url) = Url::parse(raw) else {
        return String::new();
    };

    if let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "v") {
        return v.into_owned();
    }

    let mut segments = url.path_segments().into_iter().flatten();
    match (segments.next(), segments.next()) {
        (Some("shorts"), Some(id)) if !id.is_empty() => id.to_string(),
        _ => String::new(),
    }
}

/// Convert one element of the script result into a record, substituting
/// empty strings for anything missing.
fn project_card(value: &serde_json::Value) -> Option<RawVideo> {
    let obj = value.as_object()?;
    let field = |name: &str| {
        obj.get(name)
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };

    let url = field("url");
    let id = match field("id") {
        id if !id.is_empty() => id,
        _ => video_id_from_url(&url),
    };

    Some(RawVideo {
        title: field("title"),
        url,
        id,
        channel: field("channel"),
        views: field("views"),
    })
}

pub struct TieredExtractor;

impl TieredExtractor {
    /// Read at most `limit` cards matching `selector`, in page order.
    /// No match is an empty result, not an error.
    pub async fn extract(
        page: &dyn BrowserPage,
        selector: &str,
        limit: usize,
    ) -> BrowserResult<Vec<RawVideo>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let value = page.evaluate(&card_script(selector, limit)).await?;

        let cards = match value {
            serde_json::Value::Array(items) => items,
            serde_json::Value::Null => Vec::new(),
            other => {
                return Err(BrowserError::Script(format!(
                    "expected an array of cards for {selector}, got {other}"
                )))
            }
        };

        let videos: Vec<RawVideo> = cards.iter().filter_map(project_card).take(limit).collect();

        debug!(selector, count = videos.len(), "Extracted cards");
        Ok(videos)
    }
}
