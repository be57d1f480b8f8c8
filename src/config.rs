use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use crate::app::playback::DEFAULT_STORY_DURATION;
use crate::cli::Cli;
use crate::http::RetryPolicy;
use crate::paths::database_file_path;

const FALLBACK_VIEWER_ID: &str = "me";
const DEFAULT_AUDIO_PLAYER: &str = "mpv";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Backend {
    Local { db_path: PathBuf },
    Http { base_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AudioPlayer {
    Disabled,
    Binary(PathBuf),
}

/// Settings resolved from flags, then environment, then defaults.
#[derive(Debug, Clone)]
pub(crate) struct Config {
    pub(crate) viewer_id: String,
    pub(crate) backend: Backend,
    pub(crate) story_duration: Duration,
    pub(crate) audio_player: AudioPlayer,
    pub(crate) http: RetryPolicy,
}

impl Config {
    pub(crate) fn resolve(cli: &Cli) -> Result<Self> {
        let backend = match cli.api_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Backend::Http {
                base_url: url.to_string(),
            },
            _ => Backend::Local {
                db_path: database_file_path()?,
            },
        };
        let config = Self {
            viewer_id: resolve_viewer_id(cli.viewer.as_deref(), env::var_os("USER")),
            backend,
            story_duration: resolve_story_duration(cli.story_ms.as_deref()),
            audio_player: resolve_audio_player_from_env(env::var_os("STORYREEL_AUDIO_PLAYER")),
            http: resolve_retry_policy_from_env(
                env::var("STORYREEL_HTTP_TIMEOUT_MS").ok(),
                env::var("STORYREEL_HTTP_ATTEMPTS").ok(),
            ),
        };
        tracing::debug!(
            viewer = %config.viewer_id,
            backend = ?config.backend,
            story_ms = config.story_duration.as_millis() as u64,
            "configuration resolved"
        );
        Ok(config)
    }
}

pub(crate) fn resolve_viewer_id(flag: Option<&str>, user_env: Option<OsString>) -> String {
    if let Some(viewer) = flag.map(str::trim).filter(|value| !value.is_empty()) {
        return viewer.to_string();
    }
    user_env
        .map(|value| value.to_string_lossy().trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| FALLBACK_VIEWER_ID.to_string())
}

/// Invalid or zero durations fall back to the default.
pub(crate) fn resolve_story_duration(raw: Option<&str>) -> Duration {
    let Some(raw) = raw else {
        return DEFAULT_STORY_DURATION;
    };
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Duration::from_millis(ms),
        _ => {
            tracing::warn!(value = raw, "ignoring invalid story duration");
            DEFAULT_STORY_DURATION
        }
    }
}

pub(crate) fn resolve_audio_player_from_env(env_value: Option<OsString>) -> AudioPlayer {
    match env_value {
        Some(value) if value.eq_ignore_ascii_case("none") => AudioPlayer::Disabled,
        Some(value) if !value.is_empty() => AudioPlayer::Binary(PathBuf::from(value)),
        _ => AudioPlayer::Binary(PathBuf::from(DEFAULT_AUDIO_PLAYER)),
    }
}

pub(crate) fn resolve_retry_policy_from_env(
    timeout_ms: Option<String>,
    attempts: Option<String>,
) -> RetryPolicy {
    let mut policy = RetryPolicy::default();
    if let Some(ms) = timeout_ms.and_then(|raw| raw.trim().parse::<u64>().ok())
        && ms > 0
    {
        policy.read_timeout = Duration::from_millis(ms);
    }
    if let Some(count) = attempts.and_then(|raw| raw.trim().parse::<usize>().ok())
        && count > 0
    {
        policy.attempts = count;
    }
    policy
}
