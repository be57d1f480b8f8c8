use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

use super::record::AudioTrack;

/// Stories expire a fixed day after they are posted.
pub(crate) const STORY_LIFETIME_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct StoryDraft {
    pub(crate) text_content: Option<String>,
    pub(crate) media_url: Option<String>,
    pub(crate) audio_track: Option<AudioTrack>,
    pub(crate) expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum DraftError {
    #[error("a story needs a caption or a media reference")]
    Empty,
    #[error("{field} must be an http(s) URL, got '{value}'")]
    InvalidUrl { field: &'static str, value: String },
    #[error("audio track needs a title when an audio URL is given")]
    MissingAudioTitle,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct DraftInput {
    pub(crate) text: Option<String>,
    pub(crate) media_url: Option<String>,
    pub(crate) audio_url: Option<String>,
    pub(crate) audio_title: Option<String>,
    pub(crate) audio_artist: Option<String>,
}

impl DraftInput {
    /// One-line summary echoed back when posting fails so the input can be retried.
    pub(crate) fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(text) = non_blank(self.text.as_deref()) {
            parts.push(format!("text=\"{text}\""));
        }
        if let Some(media) = non_blank(self.media_url.as_deref()) {
            parts.push(format!("media={media}"));
        }
        if let Some(audio) = non_blank(self.audio_url.as_deref()) {
            parts.push(format!("audio={audio}"));
        }
        if parts.is_empty() {
            "(empty)".to_string()
        } else {
            parts.join(" ")
        }
    }
}

pub(crate) fn build_draft(
    input: &DraftInput,
    now: DateTime<Utc>,
) -> Result<StoryDraft, DraftError> {
    let text_content = non_blank(input.text.as_deref()).map(str::to_string);
    let media_url = non_blank(input.media_url.as_deref())
        .map(|url| validate_url("media", url))
        .transpose()?;
    if text_content.is_none() && media_url.is_none() {
        return Err(DraftError::Empty);
    }

    let audio_track = match non_blank(input.audio_url.as_deref()) {
        Some(url) => {
            let audio_url = validate_url("audio", url)?;
            let title = non_blank(input.audio_title.as_deref())
                .ok_or(DraftError::MissingAudioTitle)?
                .to_string();
            Some(AudioTrack {
                id: String::new(),
                title,
                artist_name: non_blank(input.audio_artist.as_deref())
                    .unwrap_or("Unknown artist")
                    .to_string(),
                audio_url,
            })
        }
        None => None,
    };

    Ok(StoryDraft {
        text_content,
        media_url,
        audio_track,
        expires_at: now + Duration::hours(STORY_LIFETIME_HOURS),
    })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn validate_url(field: &'static str, url: &str) -> Result<String, DraftError> {
    let lowered = url.to_ascii_lowercase();
    if lowered.starts_with("https://") || lowered.starts_with("http://") {
        Ok(url.to_string())
    } else {
        Err(DraftError::InvalidUrl {
            field,
            value: url.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-19T10:00:00Z")
            .expect("timestamp should parse")
            .with_timezone(&Utc)
    }

    #[test]
    fn draft_expires_one_day_after_creation() {
        let input = DraftInput {
            text: Some("  night out  ".to_string()),
            ..DraftInput::default()
        };
        let draft = build_draft(&input, now()).expect("text-only draft is valid");
        assert_eq!(draft.text_content.as_deref(), Some("night out"));
        assert_eq!(draft.expires_at - now(), Duration::hours(24));
    }

    #[test]
    fn draft_requires_caption_or_media() {
        let input = DraftInput {
            text: Some("   ".to_string()),
            ..DraftInput::default()
        };
        assert_eq!(build_draft(&input, now()), Err(DraftError::Empty));
    }

    #[test]
    fn draft_rejects_non_http_media() {
        let input = DraftInput {
            media_url: Some("file:///tmp/x.jpg".to_string()),
            ..DraftInput::default()
        };
        assert!(matches!(
            build_draft(&input, now()),
            Err(DraftError::InvalidUrl { field: "media", .. })
        ));
    }

    #[test]
    fn draft_audio_needs_title_and_defaults_artist() {
        let mut input = DraftInput {
            media_url: Some("https://cdn/x.jpg".to_string()),
            audio_url: Some("https://cdn/song.mp3".to_string()),
            ..DraftInput::default()
        };
        assert_eq!(
            build_draft(&input, now()),
            Err(DraftError::MissingAudioTitle)
        );

        input.audio_title = Some("Anthem".to_string());
        let draft = build_draft(&input, now()).expect("audio draft is valid");
        let track = draft.audio_track.expect("audio track should be attached");
        assert_eq!(track.title, "Anthem");
        assert_eq!(track.artist_name, "Unknown artist");
    }

    #[test]
    fn summary_lists_only_filled_fields() {
        let input = DraftInput {
            text: Some("hi".to_string()),
            audio_url: Some(" ".to_string()),
            ..DraftInput::default()
        };
        assert_eq!(input.summary(), "text=\"hi\"");
        assert_eq!(DraftInput::default().summary(), "(empty)");
    }
}
