pub(crate) mod audio;
pub(crate) mod compose;
pub(crate) mod effects;
pub(crate) mod format;
pub(crate) mod grouping;
pub(crate) mod playback;
pub(crate) mod record;
pub(crate) mod service;
mod tui;
pub(crate) mod viewer;


use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;

use crate::cli::{Cli, Command, PostArgs, ViewArgs};
use crate::config::{AudioPlayer, Backend, Config};
use crate::db::Database;

use self::audio::{AudioSink, ProcessAudio, SilentAudio};
use self::compose::{DraftInput, build_draft};
use self::format::{format_age, format_expiry, truncate};
use self::grouping::{group_stories, representative_story};
use self::playback::OpenTarget;
use self::record::decode_story_feed;
use self::service::{
    HttpStoryService, LocalStoryService, ServiceError, StoryService, fetch_or_empty,
};

pub fn run(cli: Cli) -> Result<()> {
    let config = Config::resolve(&cli)?;

    match cli.command {
        Some(Command::Rail) => run_rail(&config)?,
        Some(Command::View(args)) => run_view(&config, &args)?,
        Some(Command::Post(args)) => run_post(&config, args)?,
        Some(Command::Delete { id }) => run_delete(&config, &id)?,
        Some(Command::Import { file }) => run_import(&config, &file)?,
        Some(Command::Tui) | None => {
            let service = open_service(&config)?;
            tui::run_tui(&config, service.as_ref())?
        }
    }

    Ok(())
}

fn run_rail(config: &Config) -> Result<()> {
    let service = open_service(config)?;
    let feed = fetch_or_empty(service.as_ref());
    let groups = group_stories(&feed, &config.viewer_id);
    if groups.is_empty() {
        println!("No active stories right now. Post one with `storyreel post --text ...`.");
        return Ok(());
    }

    let now = Utc::now();
    println!(
        "{:<2} {:<24} {:<8} {:<10} {:<20} {:<40}",
        "", "AUTHOR", "STORIES", "LATEST", "EXPIRES", "UP NEXT"
    );
    for group in &groups {
        let Some(story) = representative_story(group) else {
            continue;
        };
        let latest = group
            .newest()
            .map(|newest| format_age(newest.created_at, now))
            .unwrap_or_default();
        println!(
            "{:<2} {:<24} {:<8} {:<10} {:<20} {:<40}",
            if group.unviewed_count() > 0 { "*" } else { "" },
            truncate(group.display_name(), 24),
            group.len(),
            latest,
            format_expiry(story.expires_at, now),
            truncate(story.caption().or(story.media()).unwrap_or("-"), 40)
        );
    }
    Ok(())
}

fn run_view(config: &Config, args: &ViewArgs) -> Result<()> {
    let target = match (&args.story, args.index) {
        (Some(id), _) => OpenTarget::story(id.clone()),
        (None, Some(index)) => OpenTarget::index(index),
        (None, None) => OpenTarget::default(),
    };
    let service = open_service(config)?;
    match tui::run_viewer(config, service.as_ref(), &target)? {
        Some(report) => println!("{}", tui::report_summary(&report)),
        None => println!("No active stories right now."),
    }
    Ok(())
}

fn run_post(config: &Config, args: PostArgs) -> Result<()> {
    let input = DraftInput {
        text: args.text,
        media_url: args.media,
        audio_url: args.audio_url,
        audio_title: args.audio_title,
        audio_artist: args.audio_artist,
    };
    let draft = match build_draft(&input, Utc::now()) {
        Ok(draft) => draft,
        Err(err) => {
            println!("Story not posted: {err}");
            println!("Your input:\n{}", input.summary());
            return Ok(());
        }
    };

    let service = open_service(config)?;
    match service.create_story(&draft) {
        Ok(story) => {
            tracing::info!(story_id = %story.id, "story created");
            println!("Posted story {}", story.id);
            println!("  {}", format_expiry(story.expires_at, Utc::now()));
        }
        Err(err) => {
            tracing::warn!(error = %err, "story create failed");
            println!("Story not posted: {err}");
            println!("Your input (retry with the same flags):\n{}", input.summary());
        }
    }
    Ok(())
}

fn run_delete(config: &Config, story_id: &str) -> Result<()> {
    let service = open_service(config)?;
    match service.delete_story(story_id) {
        Ok(()) => println!("Deleted story {story_id}."),
        Err(ServiceError::NotFound(_)) => println!("No story with id {story_id}."),
        Err(ServiceError::Forbidden(_)) => {
            println!("Story {story_id} belongs to someone else; only the author can delete it.")
        }
        Err(err) => println!("Delete failed: {err}"),
    }
    Ok(())
}

fn run_import(config: &Config, file: &Path) -> Result<()> {
    let Backend::Local { db_path } = &config.backend else {
        bail!("import only works with the local store; drop --api-url / STORYREEL_API_URL");
    };
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read story feed {}", file.display()))?;
    let decoded = decode_story_feed(&raw, &config.viewer_id);
    for warning in &decoded.warnings {
        println!("Warning: {warning}");
    }

    let db = open_db(db_path)?;
    for record in &decoded.records {
        db.upsert_story(record)?;
    }
    println!(
        "Imported {} stor(ies) into {}",
        decoded.records.len(),
        db_path.display()
    );
    Ok(())
}

fn open_db(path: &Path) -> Result<Database> {
    let db = Database::open(path)?;
    db.migrate()?;
    Ok(db)
}

fn open_service(config: &Config) -> Result<Box<dyn StoryService>> {
    let service: Box<dyn StoryService> = match &config.backend {
        Backend::Local { db_path } => Box::new(LocalStoryService::new(
            open_db(db_path)?,
            &config.viewer_id,
        )),
        Backend::Http { base_url } => Box::new(HttpStoryService::new(
            base_url,
            &config.viewer_id,
            config.http,
        )),
    };
    Ok(service)
}

fn audio_sink(config: &Config) -> Box<dyn AudioSink> {
    match &config.audio_player {
        AudioPlayer::Disabled => Box::new(SilentAudio),
        AudioPlayer::Binary(player) => Box::new(ProcessAudio::new(player.clone())),
    }
}
