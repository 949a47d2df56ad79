use crate::{LinkPreviewData, PostPreview};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Converts a backend post preview into the shape the preview card renders.
///
/// A missing or unreadable `created_at` falls back to today's UTC date, so the card always shows a
/// date. This is display policy only; it does not claim the post was made today.
pub fn map_post_preview_to_link_preview(post: PostPreview, url: &str) -> LinkPreviewData {
    map_post_preview_to_link_preview_at(post, url, Utc::now().date_naive())
}

/// Same as [`map_post_preview_to_link_preview`] with an explicit fallback date.
pub fn map_post_preview_to_link_preview_at(
    post: PostPreview,
    url: &str,
    today: NaiveDate,
) -> LinkPreviewData {
    let date = post
        .created_at
        .as_deref()
        .and_then(calendar_date)
        .unwrap_or(today);

    LinkPreviewData {
        url: url.to_string(),
        title: post.text_preview,
        author: post.author,
        date: Some(date.format("%Y-%m-%d").to_string()),
        content: post.text,
        images: post.images,
    }
}

fn calendar_date(timestamp: &str) -> Option<NaiveDate> {
    let timestamp = timestamp.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.date());
    }
    NaiveDate::parse_from_str(timestamp, "%Y-%m-%d").ok()
}
