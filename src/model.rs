use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

pub const DEFAULT_USERNAME: &str = "user_gen";
pub const DEFAULT_DESCRIPTION: &str = "AI Video Magic #viral";
pub const DEFAULT_LIKES: &str = "12K";
pub const DEFAULT_COMMENTS: &str = "450";
pub const SOUND_LABEL: &str = "Original Sound - AI Beats";

const PLAYABLE_SCHEMES: [&str; 3] = ["http", "https", "file"];

/// One item of the feed as held by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoEntry {
    pub id: String,
    pub video_url: String,
    pub username: Option<String>,
    pub description: Option<String>,
    pub like_count: Option<String>,
    pub comment_count: Option<String>,
}

impl VideoEntry {
    pub fn display_username(&self) -> &str {
        non_empty(self.username.as_deref()).unwrap_or(DEFAULT_USERNAME)
    }

    pub fn display_description(&self) -> &str {
        non_empty(self.description.as_deref()).unwrap_or(DEFAULT_DESCRIPTION)
    }

    pub fn display_likes(&self) -> &str {
        non_empty(self.like_count.as_deref()).unwrap_or(DEFAULT_LIKES)
    }

    pub fn display_comments(&self) -> &str {
        non_empty(self.comment_count.as_deref()).unwrap_or(DEFAULT_COMMENTS)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Feed item as returned by `GET /videos/feed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedItem {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub video_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "count_label")]
    pub likes: Option<String>,
    #[serde(default, deserialize_with = "count_label")]
    pub comments: Option<String>,
}

impl From<FeedItem> for VideoEntry {
    fn from(item: FeedItem) -> Self {
        VideoEntry {
            id: item.id,
            video_url: item.video_url.trim().to_string(),
            username: item.username,
            description: item.description,
            like_count: item.likes,
            comment_count: item.comments,
        }
    }
}

/// Converts a fetched batch into entries, dropping items without a playable
/// url and any repeated id (first occurrence wins).
pub fn entries_from_items(items: Vec<FeedItem>) -> Vec<VideoEntry> {
    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        if item.video_url.trim().is_empty() {
            tracing::warn!(id = %item.id, "dropping feed item without video_url");
            continue;
        }
        if !is_playable_url(&item.video_url) {
            tracing::warn!(
                id = %item.id,
                url = %item.video_url,
                "dropping feed item with unplayable video_url"
            );
            continue;
        }
        if !seen.insert(item.id.clone()) {
            tracing::warn!(id = %item.id, "dropping duplicate feed item");
            continue;
        }
        entries.push(VideoEntry::from(item));
    }
    entries
}

fn is_playable_url(raw: &str) -> bool {
    Url::parse(raw.trim())
        .map(|url| PLAYABLE_SCHEMES.contains(&url.scheme()))
        .unwrap_or(false)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    Str(String),
    Int(i64),
    Float(f64),
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::Str(s) => s,
        StringOrNumber::Int(n) => n.to_string(),
        StringOrNumber::Float(n) => n.to_string(),
    })
}

fn count_label<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        match Option::<StringOrNumber>::deserialize(deserializer)? {
            None => None,
            Some(StringOrNumber::Str(s)) => Some(s),
            Some(StringOrNumber::Int(n)) => Some(compact_count(n)),
            Some(StringOrNumber::Float(n)) => Some(compact_count(n.round() as i64)),
        },
    )
}

/// Formats a raw counter the way the overlay shows it: `950`, `1.2K`, `3M`.
pub fn compact_count(n: i64) -> String {
    let sign = if n < 0 { "-" } else { "" };
    let abs = n.unsigned_abs();
    let (value, suffix) = match abs {
        0..=999 => return format!("{sign}{abs}"),
        1_000..=999_999 => (abs as f64 / 1_000.0, "K"),
        1_000_000..=999_999_999 => (abs as f64 / 1_000_000.0, "M"),
        _ => (abs as f64 / 1_000_000_000.0, "B"),
    };
    let rounded = (value * 10.0).floor() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{sign}{}{suffix}", rounded as u64)
    } else {
        format!("{sign}{rounded:.1}{suffix}")
    }
}

/// Built-in entries served when the client runs without a backend.
pub fn sample_entries() -> Vec<VideoEntry> {
    vec![
        VideoEntry {
            id: "1".into(),
            video_url:
                "https://assets.mixkit.co/videos/preview/mixkit-waves-in-the-water-1164-large.mp4"
                    .into(),
            username: Some("ocean_vibe".into()),
            description: Some("Relaxing waves 🌊 #nature".into()),
            like_count: Some("1.2M".into()),
            comment_count: Some("4K".into()),
        },
        VideoEntry {
            id: "2".into(),
            video_url: "https://assets.mixkit.co/videos/preview/mixkit-tree-with-yellow-flowers-1173-large.mp4"
                .into(),
            username: Some("nature_lover".into()),
            description: Some("Spring is here! 🌸 #flowers".into()),
            like_count: Some("890K".into()),
            comment_count: Some("2K".into()),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_display_fields_fall_back() {
        let items: Vec<FeedItem> =
            serde_json::from_str(r#"[{"id": "a", "video_url": "https://v.test/a.mp4"}]"#).unwrap();
        let entry = VideoEntry::from(items.into_iter().next().unwrap());
        assert_eq!(entry.display_username(), "user_gen");
        assert_eq!(entry.display_description(), "AI Video Magic #viral");
        assert_eq!(entry.display_likes(), "12K");
        assert_eq!(entry.display_comments(), "450");
    }

    #[test]
    fn blank_strings_also_fall_back() {
        let entry = VideoEntry {
            id: "x".into(),
            video_url: "https://v.test/x.mp4".into(),
            username: Some("  ".into()),
            description: Some(String::new()),
            like_count: None,
            comment_count: Some("7".into()),
        };
        assert_eq!(entry.display_username(), DEFAULT_USERNAME);
        assert_eq!(entry.display_description(), DEFAULT_DESCRIPTION);
        assert_eq!(entry.display_comments(), "7");
    }

    #[test]
    fn numeric_ids_and_counts_are_accepted() {
        let items: Vec<FeedItem> = serde_json::from_str(
            r#"[{"id": 42, "video_url": "https://v.test/42.mp4", "likes": 1250, "comments": "4K"}]"#,
        )
        .unwrap();
        assert_eq!(items[0].id, "42");
        assert_eq!(items[0].likes.as_deref(), Some("1.2K"));
        assert_eq!(items[0].comments.as_deref(), Some("4K"));
    }

    #[test]
    fn compacts_counts() {
        assert_eq!(compact_count(0), "0");
        assert_eq!(compact_count(950), "950");
        assert_eq!(compact_count(1_000), "1K");
        assert_eq!(compact_count(12_345), "12.3K");
        assert_eq!(compact_count(1_200_000), "1.2M");
        assert_eq!(compact_count(3_000_000_000), "3B");
    }

    #[test]
    fn duplicate_and_urlless_items_are_dropped() {
        let items: Vec<FeedItem> = serde_json::from_str(
            r#"[
                {"id": "1", "video_url": "https://v.test/1.mp4"},
                {"id": "2", "video_url": "  "},
                {"id": "1", "video_url": "https://v.test/other.mp4"},
                {"id": "3", "video_url": "https://v.test/3.mp4"}
            ]"#,
        )
        .unwrap();
        let entries = entries_from_items(items);
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert_eq!(entries[0].video_url, "https://v.test/1.mp4");
    }

    #[test]
    fn only_http_and_file_urls_are_kept() {
        let items: Vec<FeedItem> = serde_json::from_str(
            r#"[
                {"id": "1", "video_url": "--script=/tmp/x.lua"},
                {"id": "2", "video_url": "javascript:alert(1)"},
                {"id": "3", "video_url": "/static/3.mp4"},
                {"id": "4", "video_url": " http://v.test/4.mp4 "},
                {"id": "5", "video_url": "file:///srv/videos/5.mp4"}
            ]"#,
        )
        .unwrap();
        let entries = entries_from_items(items);
        let urls: Vec<&str> = entries.iter().map(|e| e.video_url.as_str()).collect();
        assert_eq!(urls, vec!["http://v.test/4.mp4", "file:///srv/videos/5.mp4"]);
    }
}
