use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct AudioTrack {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) artist_name: String,
    pub(crate) audio_url: String,
}

/// One ephemeral post as delivered by the story service.
///
/// Only `viewed_by_viewer` and `likes` change after a fetch, and only through
/// the viewer's side-effect coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct StoryRecord {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) author_id: String,
    #[serde(default)]
    pub(crate) author_display_name: String,
    #[serde(default)]
    pub(crate) author_avatar_url: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) expires_at: DateTime<Utc>,
    #[serde(default)]
    pub(crate) text_content: Option<String>,
    #[serde(default)]
    pub(crate) media_url: Option<String>,
    #[serde(default)]
    pub(crate) audio_track: Option<AudioTrack>,
    #[serde(default)]
    pub(crate) is_owned_by_viewer: bool,
    #[serde(default)]
    pub(crate) viewed_by_viewer: bool,
    #[serde(default)]
    pub(crate) likes: BTreeSet<String>,
}

impl StoryRecord {
    pub(crate) fn is_liked_by(&self, viewer_id: &str) -> bool {
        self.likes.contains(viewer_id)
    }

    pub(crate) fn caption(&self) -> Option<&str> {
        self.text_content
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    pub(crate) fn media(&self) -> Option<&str> {
        self.media_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// A story with neither caption nor media still plays for its full slot.
    pub(crate) fn is_content_less(&self) -> bool {
        self.caption().is_none() && self.media().is_none()
    }

    /// Key used to group this record; blank author ids fall back to the display name.
    pub(crate) fn author_key(&self) -> AuthorKey {
        let author = self.author_id.trim();
        if author.is_empty() {
            AuthorKey::Orphan(self.author_display_name.trim().to_string())
        } else {
            AuthorKey::Account(author.to_string())
        }
    }

    /// Ownership follows the same trimmed author id that grouping uses.
    pub(crate) fn is_authored_by(&self, viewer_id: &str) -> bool {
        matches!(self.author_key(), AuthorKey::Account(author) if author == viewer_id.trim())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum AuthorKey {
    Account(String),
    Orphan(String),
}

impl AuthorKey {
    pub(crate) fn label(&self) -> &str {
        match self {
            Self::Account(id) | Self::Orphan(id) => id,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct DecodedStories {
    pub(crate) records: Vec<StoryRecord>,
    pub(crate) warnings: Vec<String>,
}

/// Decodes a story feed payload, skipping entries that do not parse.
///
/// Accepts either a bare JSON array or an object with a `stories` array.
/// Ownership is recomputed from the author id so a stale server flag cannot
/// misplace the viewer's own group.
pub(crate) fn decode_story_feed(raw: &str, viewer_id: &str) -> DecodedStories {
    let parsed: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            return DecodedStories {
                records: Vec::new(),
                warnings: vec![format!("story feed is not valid JSON: {err}")],
            };
        }
    };
    let items = match &parsed {
        Value::Array(items) => items.as_slice(),
        other => match other.get("stories").and_then(Value::as_array) {
            Some(items) => items.as_slice(),
            None => {
                return DecodedStories {
                    records: Vec::new(),
                    warnings: vec!["story feed has no `stories` array".to_string()],
                };
            }
        },
    };

    let mut decoded = DecodedStories::default();
    let mut skipped = 0usize;
    for item in items {
        match serde_json::from_value::<StoryRecord>(item.clone()) {
            Ok(mut record) if !record.id.trim().is_empty() => {
                record.is_owned_by_viewer = record.is_authored_by(viewer_id);
                decoded.records.push(record);
            }
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        decoded
            .warnings
            .push(format!("ignored {skipped} malformed story entr(ies)"));
    }
    decoded
}

#[cfg(test)]
pub(crate) fn story_at(id: &str, author_id: &str, created_at: &str) -> StoryRecord {
    let created_at = DateTime::parse_from_rfc3339(created_at)
        .expect("test timestamp should parse")
        .with_timezone(&Utc);
    StoryRecord {
        id: id.to_string(),
        author_id: author_id.to_string(),
        author_display_name: format!("{author_id} display"),
        author_avatar_url: None,
        created_at,
        expires_at: created_at + chrono::Duration::hours(24),
        text_content: Some(format!("caption {id}")),
        media_url: None,
        audio_track: None,
        is_owned_by_viewer: false,
        viewed_by_viewer: false,
        likes: BTreeSet::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_story_feed_skips_malformed_entries_and_recomputes_ownership() {
        let raw = r#"[
            {"id":"s1","author_id":"me","author_display_name":"Me",
             "created_at":"2026-10-19T10:00:00Z","expires_at":"2026-10-20T10:00:00Z",
             "is_owned_by_viewer":false},
            {"id":"bad","author_id":"a"},
            {"id":"a1","author_id":"a","author_display_name":"A",
             "created_at":"2026-10-19T09:50:00Z","expires_at":"2026-10-20T09:50:00Z",
             "likes":["me"],
             "audio_track":{"id":"t","title":"Song","artist_name":"Band","audio_url":"https://x/t.mp3"}}
        ]"#;

        let decoded = decode_story_feed(raw, "me");
        assert_eq!(decoded.records.len(), 2);
        assert!(decoded.records[0].is_owned_by_viewer);
        assert!(!decoded.records[1].is_owned_by_viewer);
        assert!(decoded.records[1].is_liked_by("me"));
        assert_eq!(
            decoded.records[1]
                .audio_track
                .as_ref()
                .map(|track| track.title.as_str()),
            Some("Song")
        );
        assert_eq!(decoded.warnings.len(), 1);
    }

    #[test]
    fn decode_story_feed_accepts_wrapped_object() {
        let raw = r#"{"stories":[{"id":"s1","author_id":"a",
            "created_at":"2026-10-19T10:00:00Z","expires_at":"2026-10-20T10:00:00Z"}]}"#;
        let decoded = decode_story_feed(raw, "me");
        assert_eq!(decoded.records.len(), 1);
        assert!(decoded.warnings.is_empty());
    }

    #[test]
    fn decode_story_feed_reports_invalid_json() {
        let decoded = decode_story_feed("not json", "me");
        assert!(decoded.records.is_empty());
        assert_eq!(decoded.warnings.len(), 1);
    }

    #[test]
    fn blank_author_id_groups_by_display_name() {
        let mut record = story_at("x", "  ", "2026-10-19T10:00:00Z");
        record.author_display_name = "Guest".to_string();
        assert_eq!(record.author_key(), AuthorKey::Orphan("Guest".to_string()));
    }

    #[test]
    fn padded_author_id_is_still_the_viewers_own() {
        let raw = r#"[{"id":"s1","author_id":" me ","author_display_name":"Me",
            "created_at":"2026-10-19T10:00:00Z","expires_at":"2026-10-20T10:00:00Z"}]"#;
        let decoded = decode_story_feed(raw, "me");
        assert!(decoded.records[0].is_owned_by_viewer);
        assert!(decoded.records[0].is_authored_by("me"));
        assert!(!story_at("x", "  ", "2026-10-19T10:00:00Z").is_authored_by(""));
    }

    #[test]
    fn content_less_story_has_no_caption_or_media() {
        let mut record = story_at("x", "a", "2026-10-19T10:00:00Z");
        record.text_content = Some("   ".to_string());
        assert!(record.is_content_less());
        record.media_url = Some("https://cdn/x.jpg".to_string());
        assert!(!record.is_content_less());
    }
}
