use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::app::compose::StoryDraft;
use crate::app::record::{AudioTrack, StoryRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeleteResult {
    Deleted,
    Missing,
    NotOwner,
}

/// Local stand-in for the story backend: stories, likes and per-viewer views.
pub(crate) struct Database {
    conn: Connection,
}

impl Database {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub(crate) fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory().context("failed to open in-memory database")?,
        };
        db.migrate()?;
        Ok(db)
    }

    pub(crate) fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;
            CREATE TABLE IF NOT EXISTS stories (
                id TEXT PRIMARY KEY,
                author_id TEXT NOT NULL,
                author_display_name TEXT NOT NULL,
                author_avatar_url TEXT,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                text_content TEXT,
                media_url TEXT,
                audio_id TEXT,
                audio_title TEXT,
                audio_artist TEXT,
                audio_url TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_stories_expires_at ON stories(expires_at);
            CREATE TABLE IF NOT EXISTS story_likes (
                story_id TEXT NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
                viewer_id TEXT NOT NULL,
                PRIMARY KEY (story_id, viewer_id)
            );
            CREATE TABLE IF NOT EXISTS story_views (
                story_id TEXT NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
                viewer_id TEXT NOT NULL,
                viewed_at TEXT NOT NULL,
                PRIMARY KEY (story_id, viewer_id)
            );
            "#,
        )?;
        Ok(())
    }

    /// Unexpired stories as seen by `viewer_id`, in insertion order.
    pub(crate) fn active_stories(
        &self,
        viewer_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<StoryRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT s.id, s.author_id, s.author_display_name, s.author_avatar_url,
                   s.created_at, s.expires_at, s.text_content, s.media_url,
                   s.audio_id, s.audio_title, s.audio_artist, s.audio_url,
                   EXISTS(SELECT 1 FROM story_views v
                          WHERE v.story_id = s.id AND v.viewer_id = ?1)
            FROM stories s
            WHERE s.expires_at > ?2
            ORDER BY s.rowid
            "#,
        )?;
        let rows = stmt.query_map(params![viewer_id, timestamp(now)], |row| {
            story_from_row(row, viewer_id)
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }

        let mut likes = self.likes_by_story()?;
        for story in &mut out {
            if let Some(set) = likes.remove(&story.id) {
                story.likes = set;
            }
        }
        Ok(out)
    }

    fn likes_by_story(&self) -> Result<HashMap<String, BTreeSet<String>>> {
        let mut stmt = self
            .conn
            .prepare("SELECT story_id, viewer_id FROM story_likes")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out: HashMap<String, BTreeSet<String>> = HashMap::new();
        for row in rows {
            let (story_id, viewer_id) = row?;
            out.entry(story_id).or_default().insert(viewer_id);
        }
        Ok(out)
    }

    /// Returns false when the story does not exist.
    pub(crate) fn mark_viewed(&self, story_id: &str, viewer_id: &str) -> Result<bool> {
        if !self.story_exists(story_id)? {
            return Ok(false);
        }
        self.conn.execute(
            "INSERT OR IGNORE INTO story_views (story_id, viewer_id, viewed_at) VALUES (?1, ?2, ?3)",
            params![story_id, viewer_id, timestamp(Utc::now())],
        )?;
        Ok(true)
    }

    /// Returns false when the story does not exist.
    pub(crate) fn set_like(&self, story_id: &str, viewer_id: &str, liked: bool) -> Result<bool> {
        if !self.story_exists(story_id)? {
            return Ok(false);
        }
        if liked {
            self.conn.execute(
                "INSERT OR IGNORE INTO story_likes (story_id, viewer_id) VALUES (?1, ?2)",
                params![story_id, viewer_id],
            )?;
        } else {
            self.conn.execute(
                "DELETE FROM story_likes WHERE story_id = ?1 AND viewer_id = ?2",
                params![story_id, viewer_id],
            )?;
        }
        Ok(true)
    }

    pub(crate) fn delete_story(&self, story_id: &str, viewer_id: &str) -> Result<DeleteResult> {
        let author: Option<String> = self
            .conn
            .query_row(
                "SELECT author_id FROM stories WHERE id = ?1",
                params![story_id],
                |row| row.get(0),
            )
            .optional()?;
        match author {
            None => Ok(DeleteResult::Missing),
            Some(author) if author.trim() != viewer_id.trim() => Ok(DeleteResult::NotOwner),
            Some(_) => {
                self.conn
                    .execute("DELETE FROM stories WHERE id = ?1", params![story_id])?;
                Ok(DeleteResult::Deleted)
            }
        }
    }

    pub(crate) fn insert_story(
        &self,
        author_id: &str,
        author_display_name: &str,
        draft: &StoryDraft,
        now: DateTime<Utc>,
    ) -> Result<StoryRecord> {
        let record = StoryRecord {
            id: new_story_id(now),
            author_id: author_id.to_string(),
            author_display_name: author_display_name.to_string(),
            author_avatar_url: None,
            created_at: now,
            expires_at: draft.expires_at,
            text_content: draft.text_content.clone(),
            media_url: draft.media_url.clone(),
            audio_track: draft.audio_track.clone().map(|mut track| {
                if track.id.is_empty() {
                    track.id = format!("trk-{}", now.timestamp_micros());
                }
                track
            }),
            is_owned_by_viewer: true,
            viewed_by_viewer: false,
            likes: BTreeSet::new(),
        };
        self.upsert_story(&record)?;
        Ok(record)
    }

    /// Inserts or replaces a story row; the record's likes are added to any stored ones.
    pub(crate) fn upsert_story(&self, record: &StoryRecord) -> Result<()> {
        let audio = record.audio_track.as_ref();
        self.conn
            .execute(
                r#"
                INSERT INTO stories (
                    id, author_id, author_display_name, author_avatar_url, created_at,
                    expires_at, text_content, media_url, audio_id, audio_title,
                    audio_artist, audio_url
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                ON CONFLICT(id) DO UPDATE SET
                    author_id = excluded.author_id,
                    author_display_name = excluded.author_display_name,
                    author_avatar_url = excluded.author_avatar_url,
                    created_at = excluded.created_at,
                    expires_at = excluded.expires_at,
                    text_content = excluded.text_content,
                    media_url = excluded.media_url,
                    audio_id = excluded.audio_id,
                    audio_title = excluded.audio_title,
                    audio_artist = excluded.audio_artist,
                    audio_url = excluded.audio_url
                "#,
                params![
                    record.id,
                    record.author_id,
                    record.author_display_name,
                    record.author_avatar_url,
                    timestamp(record.created_at),
                    timestamp(record.expires_at),
                    record.text_content,
                    record.media_url,
                    audio.map(|track| track.id.as_str()),
                    audio.map(|track| track.title.as_str()),
                    audio.map(|track| track.artist_name.as_str()),
                    audio.map(|track| track.audio_url.as_str()),
                ],
            )
            .with_context(|| format!("failed to store story {}", record.id))?;
        for viewer_id in &record.likes {
            self.conn.execute(
                "INSERT OR IGNORE INTO story_likes (story_id, viewer_id) VALUES (?1, ?2)",
                params![record.id, viewer_id],
            )?;
        }
        Ok(())
    }

    fn story_exists(&self, story_id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM stories WHERE id = ?1",
                params![story_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

fn story_from_row(row: &Row<'_>, viewer_id: &str) -> rusqlite::Result<StoryRecord> {
    let author_id: String = row.get(1)?;
    let audio_url: Option<String> = row.get(11)?;
    let audio_track = match audio_url {
        Some(audio_url) => Some(AudioTrack {
            id: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
            title: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
            artist_name: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
            audio_url,
        }),
        None => None,
    };
    let mut record = StoryRecord {
        id: row.get(0)?,
        is_owned_by_viewer: false,
        author_id,
        author_display_name: row.get(2)?,
        author_avatar_url: row.get(3)?,
        created_at: parse_timestamp(row, 4)?,
        expires_at: parse_timestamp(row, 5)?,
        text_content: row.get(6)?,
        media_url: row.get(7)?,
        audio_track,
        viewed_by_viewer: row.get(12)?,
        likes: BTreeSet::new(),
    };
    record.is_owned_by_viewer = record.is_authored_by(viewer_id);
    Ok(record)
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

// Fixed-width UTC timestamps compare correctly as text.
fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn new_story_id(now: DateTime<Utc>) -> String {
    let nanos = now.timestamp_nanos_opt().unwrap_or_default();
    format!("st-{nanos:x}-{:x}", std::process::id())
}
