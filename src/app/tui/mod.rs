mod actions;
mod render;
mod session;

use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::widgets::TableState;

use crate::config::Config;

use super::audio::AudioSink;
use super::audio_sink;
use super::grouping::StoryGroup;
use super::playback::{OpenTarget, PlaybackClock, Transition};
use super::record::StoryRecord;
use super::service::{StoryService, fetch_or_empty};
use super::viewer::{DeleteOutcome, StoryViewer, ViewerReport, apply_report};

use self::actions::{
    delete_status, like_status, open_target_for, refresh_feed, regroup, selected_author,
    status_error, status_info,
};
use self::render::{draw_rail, draw_viewer};
use self::session::TuiSession;

/// Upper bound on the wait between redraws while a story plays.
pub(crate) const FRAME_INTERVAL: Duration = Duration::from_millis(100);

/// How long to block on input: never past the next redraw or auto-advance.
pub(crate) fn poll_timeout(remaining: Option<Duration>) -> Duration {
    match remaining {
        Some(remaining) => remaining.min(FRAME_INTERVAL),
        None => FRAME_INTERVAL,
    }
}

/// Monotonic milliseconds since the screen opened.
struct Clock {
    epoch: Instant,
}

impl Clock {
    fn start() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl PlaybackClock for Clock {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

#[derive(Debug, Clone)]
pub(super) struct PendingDelete {
    pub(super) caption: String,
    pub(super) resume_after: bool,
}

/// Everything the viewer screen draws for one frame.
pub(super) struct ViewerScreen<'a> {
    pub(super) group: &'a StoryGroup,
    pub(super) group_number: usize,
    pub(super) group_total: usize,
    pub(super) story_index: usize,
    pub(super) story: &'a StoryRecord,
    pub(super) progress: f64,
    pub(super) paused: bool,
    pub(super) liked: bool,
    pub(super) audio_playing: bool,
}

fn viewer_screen<'a, S, A>(viewer: &'a StoryViewer<'_, S, A>) -> Option<ViewerScreen<'a>>
where
    S: StoryService + ?Sized,
    A: AudioSink,
{
    let position = viewer.position()?;
    let group = viewer.current_group()?;
    let story = viewer.current()?;
    Some(ViewerScreen {
        group,
        group_number: position.group_index + 1,
        group_total: viewer.groups().len(),
        story_index: position.story_index,
        story,
        progress: viewer.progress(),
        paused: viewer.is_paused(),
        liked: story.is_liked_by(viewer.viewer_id()),
        audio_playing: viewer.active_audio_story() == Some(story.id.as_str())
            && !viewer.is_paused(),
    })
}

fn is_interrupt(key: &KeyEvent) -> bool {
    key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL)
}

/// Rail screen: one row per author, Enter plays from the representative story.
pub(crate) fn run_tui<S: StoryService + ?Sized>(config: &Config, service: &S) -> Result<()> {
    let mut session = TuiSession::enter()?;
    let viewer_id = config.viewer_id.as_str();

    let mut feed = fetch_or_empty(service);
    let mut groups = Vec::new();
    let mut table_state = TableState::default();
    regroup(viewer_id, &feed, &mut groups, &mut table_state, None);
    let mut status = if groups.is_empty() {
        status_info("No active stories. Press `r` to refresh or run `storyreel post`.")
    } else {
        status_info("Ready.")
    };

    loop {
        let now = chrono::Utc::now();
        session
            .terminal()
            .draw(|frame| draw_rail(frame, &groups, &mut table_state, &status, now))?;

        if !event::poll(Duration::from_millis(500))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        if is_interrupt(&key) {
            break;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => break,
            KeyCode::Char('r') => {
                refresh_feed(service, viewer_id, &mut feed, &mut groups, &mut table_state);
                status = status_info(&format!("Refreshed: {} active stories.", feed.len()));
            }
            KeyCode::Up | KeyCode::Char('k') => {
                if let Some(selected) = table_state.selected() {
                    table_state.select(Some(selected.saturating_sub(1)));
                }
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if let Some(selected) = table_state.selected()
                    && !groups.is_empty()
                {
                    let next = (selected + 1).min(groups.len().saturating_sub(1));
                    table_state.select(Some(next));
                }
            }
            KeyCode::Enter => {
                let Some(target) = table_state
                    .selected()
                    .and_then(|idx| groups.get(idx))
                    .and_then(open_target_for)
                else {
                    status = status_error("Nothing to play.");
                    continue;
                };
                let preferred = selected_author(&groups, &table_state);
                match play_feed(&mut session, config, service, &feed, &target)? {
                    Some(report) => {
                        apply_report(&mut feed, &report);
                        status = status_info(&report_summary(&report));
                    }
                    None => status = status_error("Nothing to play."),
                }
                regroup(
                    viewer_id,
                    &feed,
                    &mut groups,
                    &mut table_state,
                    preferred.as_ref(),
                );
            }
            _ => {}
        }
    }

    session.leave()
}

/// Opens the viewer straight from the command line and exits when it closes.
pub(crate) fn run_viewer<S: StoryService + ?Sized>(
    config: &Config,
    service: &S,
    target: &OpenTarget,
) -> Result<Option<ViewerReport>> {
    let feed = fetch_or_empty(service);
    if feed.is_empty() {
        return Ok(None);
    }
    let mut session = TuiSession::enter()?;
    let report = play_feed(&mut session, config, service, &feed, target)?;
    session.leave()?;
    Ok(report)
}

pub(crate) fn report_summary(report: &ViewerReport) -> String {
    let mut summary = format!("Viewed {} new stor(ies).", report.viewed.len());
    if !report.deleted.is_empty() {
        summary.push_str(&format!(" Deleted {}.", report.deleted.len()));
    }
    summary
}

fn play_feed<S: StoryService + ?Sized>(
    session: &mut TuiSession,
    config: &Config,
    service: &S,
    feed: &[StoryRecord],
    target: &OpenTarget,
) -> Result<Option<ViewerReport>> {
    let clock = Clock::start();
    let Some(mut viewer) = StoryViewer::open(
        feed,
        target,
        &config.viewer_id,
        config.story_duration,
        service,
        audio_sink(config),
        &clock,
    ) else {
        return Ok(None);
    };

    let outcome = play(session, &mut viewer);
    // Audio is released even when drawing failed.
    let report = viewer.close();
    outcome?;
    Ok(Some(report))
}

fn play<S, A>(session: &mut TuiSession, viewer: &mut StoryViewer<'_, S, A>) -> Result<()>
where
    S: StoryService + ?Sized,
    A: AudioSink,
{
    let mut pending_delete = None::<PendingDelete>;
    let mut status = status_info("Space hold/release  k like  q close");

    loop {
        if pending_delete.is_none() && viewer.tick() == Transition::Closed {
            break;
        }
        if !viewer.is_open() {
            break;
        }

        session.terminal().draw(|frame| {
            if let Some(screen) = viewer_screen(viewer) {
                draw_viewer(frame, &screen, &status, pending_delete.as_ref());
            }
        })?;

        // Measured after drawing so the wait ends at the advance deadline.
        if !event::poll(poll_timeout(viewer.remaining()))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        if is_interrupt(&key) {
            break;
        }

        if let Some(dialog) = pending_delete.as_ref() {
            match key.code {
                KeyCode::Char('y') | KeyCode::Enter => {
                    let resume_after = dialog.resume_after;
                    pending_delete = None;
                    let Some(outcome) = viewer.delete_current() else {
                        break;
                    };
                    status = delete_status(&outcome);
                    if matches!(outcome, DeleteOutcome::Deleted(Transition::Closed)) {
                        break;
                    }
                    if resume_after {
                        viewer.resume();
                    }
                }
                KeyCode::Esc | KeyCode::Char('n') => {
                    if dialog.resume_after {
                        viewer.resume();
                    }
                    pending_delete = None;
                    status = status_info("Delete canceled.");
                }
                _ => {}
            }
            continue;
        }

        let transition = match key.code {
            KeyCode::Char('q') | KeyCode::Esc => break,
            KeyCode::Right | KeyCode::Char('l') | KeyCode::Enter => viewer.advance(),
            KeyCode::Left | KeyCode::Char('h') => viewer.retreat(),
            KeyCode::Char(' ') => {
                viewer.toggle_pause();
                status = if viewer.is_paused() {
                    status_info("Paused. Space to resume.")
                } else {
                    status_info("Playing.")
                };
                Transition::Unchanged
            }
            KeyCode::Char('k') => {
                if let Some(outcome) = viewer.toggle_like() {
                    status = like_status(outcome);
                }
                Transition::Unchanged
            }
            KeyCode::Char('d') => {
                let Some(story) = viewer.current() else {
                    continue;
                };
                if !story.is_owned_by_viewer {
                    status = status_error("Only your own stories can be deleted.");
                    continue;
                }
                let caption = story
                    .caption()
                    .or(story.media())
                    .unwrap_or("(no content)")
                    .to_string();
                let resume_after = viewer.pause();
                pending_delete = Some(PendingDelete {
                    caption,
                    resume_after,
                });
                status = status_info("Confirm delete: y/Enter to delete, n/Esc to cancel.");
                Transition::Unchanged
            }
            _ => Transition::Unchanged,
        };
        if transition == Transition::Closed {
            break;
        }
    }

    Ok(())
}
