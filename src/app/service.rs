use chrono::Utc;
use serde_json::json;
use thiserror::Error;

use super::compose::StoryDraft;
use super::record::{StoryRecord, decode_story_feed};
use crate::db::{Database, DeleteResult};
use crate::http::{HttpError, Method, RetryPolicy, send_with_retries};

#[derive(Debug, Error)]
pub(crate) enum ServiceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server rejected request with HTTP {code}: {body}")]
    Status { code: u16, body: String },
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("story '{0}' no longer exists")]
    NotFound(String),
    #[error("only the author can delete story '{0}'")]
    Forbidden(String),
    #[error("local store error: {0}")]
    Storage(String),
}

impl From<HttpError> for ServiceError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Status { status, body, .. } => Self::Status { code: status, body },
            HttpError::Transport { .. } => Self::Transport(err.to_string()),
            HttpError::Decode(message) => Self::Decode(message),
        }
    }
}

impl From<anyhow::Error> for ServiceError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }
}

/// Everything the playback engine needs from the outside world.
///
/// Calls are blocking and issued one at a time from the viewer loop.
pub(crate) trait StoryService {
    fn fetch_stories(&self) -> Result<Vec<StoryRecord>, ServiceError>;
    fn mark_viewed(&self, story_id: &str) -> Result<(), ServiceError>;
    fn set_like(&self, story_id: &str, liked: bool) -> Result<(), ServiceError>;
    fn delete_story(&self, story_id: &str) -> Result<(), ServiceError>;
    fn create_story(&self, draft: &StoryDraft) -> Result<StoryRecord, ServiceError>;
}

/// Fetch failures degrade to an empty feed; the caller renders the empty state.
pub(crate) fn fetch_or_empty<S: StoryService + ?Sized>(service: &S) -> Vec<StoryRecord> {
    match service.fetch_stories() {
        Ok(records) => records,
        Err(err) => {
            tracing::warn!(error = %err, "story fetch failed; showing empty feed");
            Vec::new()
        }
    }
}

pub(crate) struct HttpStoryService {
    base_url: String,
    viewer_id: String,
    policy: RetryPolicy,
}

impl HttpStoryService {
    pub(crate) fn new(base_url: &str, viewer_id: &str, policy: RetryPolicy) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            viewer_id: viewer_id.to_string(),
            policy,
        }
    }

    fn story_url(&self, story_id: &str, suffix: &str) -> String {
        format!("{}/stories/{}{suffix}", self.base_url, encode_path_segment(story_id))
    }

    fn viewer_query(&self) -> Vec<(String, String)> {
        vec![("viewer".to_string(), self.viewer_id.clone())]
    }
}

impl StoryService for HttpStoryService {
    fn fetch_stories(&self) -> Result<Vec<StoryRecord>, ServiceError> {
        let url = format!("{}/stories", self.base_url);
        let raw = send_with_retries(Method::Get, &url, &self.viewer_query(), None, self.policy)?;
        let decoded = decode_story_feed(&raw, &self.viewer_id);
        for warning in &decoded.warnings {
            tracing::warn!("{warning}");
        }
        Ok(decoded.records)
    }

    // View marks and likes are issued from the playback loop and never retried.
    fn mark_viewed(&self, story_id: &str) -> Result<(), ServiceError> {
        let url = self.story_url(story_id, "/view");
        send_with_retries(
            Method::Post,
            &url,
            &self.viewer_query(),
            None,
            self.policy.single_attempt(),
        )?;
        Ok(())
    }

    fn set_like(&self, story_id: &str, liked: bool) -> Result<(), ServiceError> {
        let url = self.story_url(story_id, "/like");
        let method = if liked { Method::Post } else { Method::Delete };
        send_with_retries(
            method,
            &url,
            &self.viewer_query(),
            None,
            self.policy.single_attempt(),
        )?;
        Ok(())
    }

    fn delete_story(&self, story_id: &str) -> Result<(), ServiceError> {
        let url = self.story_url(story_id, "");
        match send_with_retries(Method::Delete, &url, &self.viewer_query(), None, self.policy) {
            Ok(_) => Ok(()),
            Err(HttpError::Status { status: 404, .. }) => {
                Err(ServiceError::NotFound(story_id.to_string()))
            }
            Err(HttpError::Status { status: 403, .. }) => {
                Err(ServiceError::Forbidden(story_id.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn create_story(&self, draft: &StoryDraft) -> Result<StoryRecord, ServiceError> {
        let url = format!("{}/stories", self.base_url);
        let body = json!({
            "author_id": self.viewer_id,
            "text_content": draft.text_content,
            "media_url": draft.media_url,
            "audio_track": draft.audio_track,
            "expires_at": draft.expires_at,
        })
        .to_string();
        let raw = send_with_retries(
            Method::Post,
            &url,
            &self.viewer_query(),
            Some(&body),
            self.policy.single_attempt(),
        )?;
        let mut record: StoryRecord =
            serde_json::from_str(&raw).map_err(|err| ServiceError::Decode(err.to_string()))?;
        record.is_owned_by_viewer = record.is_authored_by(&self.viewer_id);
        Ok(record)
    }
}

fn encode_path_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

/// Story service backed by the local SQLite store.
pub(crate) struct LocalStoryService {
    db: Database,
    viewer_id: String,
    author_display_name: String,
}

impl LocalStoryService {
    pub(crate) fn new(db: Database, viewer_id: &str) -> Self {
        Self {
            db,
            viewer_id: viewer_id.to_string(),
            author_display_name: viewer_id.to_string(),
        }
    }
}

impl StoryService for LocalStoryService {
    fn fetch_stories(&self) -> Result<Vec<StoryRecord>, ServiceError> {
        Ok(self.db.active_stories(&self.viewer_id, Utc::now())?)
    }

    fn mark_viewed(&self, story_id: &str) -> Result<(), ServiceError> {
        if !self.db.mark_viewed(story_id, &self.viewer_id)? {
            return Err(ServiceError::NotFound(story_id.to_string()));
        }
        Ok(())
    }

    fn set_like(&self, story_id: &str, liked: bool) -> Result<(), ServiceError> {
        if !self.db.set_like(story_id, &self.viewer_id, liked)? {
            return Err(ServiceError::NotFound(story_id.to_string()));
        }
        Ok(())
    }

    fn delete_story(&self, story_id: &str) -> Result<(), ServiceError> {
        match self.db.delete_story(story_id, &self.viewer_id)? {
            DeleteResult::Deleted => Ok(()),
            DeleteResult::Missing => Err(ServiceError::NotFound(story_id.to_string())),
            DeleteResult::NotOwner => Err(ServiceError::Forbidden(story_id.to_string())),
        }
    }

    fn create_story(&self, draft: &StoryDraft) -> Result<StoryRecord, ServiceError> {
        Ok(self.db.insert_story(
            &self.viewer_id,
            &self.author_display_name,
            draft,
            Utc::now(),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::app::compose::{DraftInput, build_draft};
    use crate::http::test_server::{Behavior, TestServer};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            connect_timeout: Duration::from_millis(200),
            read_timeout: Duration::from_millis(200),
            attempts: 2,
            retry_delay: Duration::from_millis(1),
        }
    }

    const FEED: &str = r#"[{"id":"a1","author_id":"alice","author_display_name":"Alice",
        "created_at":"2026-10-19T09:00:00Z","expires_at":"2026-10-20T09:00:00Z"}]"#;

    #[test]
    fn http_fetch_decodes_feed_and_sends_viewer() {
        let server = TestServer::spawn(vec![Behavior::Respond(200, FEED.to_string())]);
        let service = HttpStoryService::new(&format!("{}/", server.base_url), "me", policy());

        let records = service.fetch_stories().expect("fetch should succeed");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].author_display_name, "Alice");
        assert_eq!(server.request_lines()[0], "GET /stories?viewer=me HTTP/1.1");
    }

    #[test]
    fn http_fetch_failure_degrades_to_empty_feed() {
        let server = TestServer::spawn(vec![
            Behavior::Respond(500, "boom".to_string()),
            Behavior::Respond(500, "boom".to_string()),
        ]);
        let service = HttpStoryService::new(&server.base_url, "me", policy());
        assert!(fetch_or_empty(&service).is_empty());
    }

    #[test]
    fn http_like_and_unlike_use_post_and_delete() {
        let server = TestServer::spawn(vec![
            Behavior::Respond(204, String::new()),
            Behavior::Respond(204, String::new()),
        ]);
        let service = HttpStoryService::new(&server.base_url, "me", policy());
        service.set_like("a 1", true).expect("like should succeed");
        service.set_like("a 1", false).expect("unlike should succeed");

        let lines = server.request_lines();
        assert!(lines.contains(&"POST /stories/a%201/like?viewer=me HTTP/1.1".to_string()));
        assert!(lines.contains(&"DELETE /stories/a%201/like?viewer=me HTTP/1.1".to_string()));
    }

    #[test]
    fn http_mark_viewed_is_sent_once_even_on_failure() {
        let server = TestServer::spawn(vec![
            Behavior::Respond(503, "busy".to_string()),
            Behavior::Respond(204, String::new()),
        ]);
        let service = HttpStoryService::new(&server.base_url, "me", policy());

        let err = service.mark_viewed("a1").expect_err("503 should surface");
        assert!(matches!(err, ServiceError::Status { code: 503, .. }));
        assert_eq!(server.request_count(), 1);
        assert_eq!(
            server.request_lines()[0],
            "POST /stories/a1/view?viewer=me HTTP/1.1"
        );
    }

    #[test]
    fn http_like_failure_is_not_retried() {
        let server = TestServer::spawn(vec![
            Behavior::Respond(502, String::new()),
            Behavior::Respond(204, String::new()),
        ]);
        let service = HttpStoryService::new(&server.base_url, "me", policy());
        assert!(service.set_like("a1", true).is_err());
        assert_eq!(server.request_count(), 1);
    }

    #[test]
    fn http_delete_maps_not_found_and_forbidden() {
        let server = TestServer::spawn(vec![
            Behavior::Respond(404, String::new()),
            Behavior::Respond(403, String::new()),
        ]);
        let service = HttpStoryService::new(&server.base_url, "me", policy());
        assert!(matches!(
            service.delete_story("x"),
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.delete_story("x"),
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[test]
    fn http_create_is_not_retried() {
        let server = TestServer::spawn(vec![
            Behavior::Respond(503, "busy".to_string()),
            Behavior::Respond(201, "{}".to_string()),
        ]);
        let service = HttpStoryService::new(&server.base_url, "me", policy());
        let draft = build_draft(
            &DraftInput {
                text: Some("hello".to_string()),
                ..DraftInput::default()
            },
            Utc::now(),
        )
        .expect("draft should be valid");

        let err = service.create_story(&draft).expect_err("503 should surface");
        assert!(matches!(err, ServiceError::Status { code: 503, .. }));
        assert_eq!(server.request_count(), 1);
    }

    #[test]
    fn encode_path_segment_escapes_reserved_bytes() {
        assert_eq!(encode_path_segment("a/b c"), "a%2Fb%20c");
        assert_eq!(encode_path_segment("story-1_x.y~"), "story-1_x.y~");
    }
}
