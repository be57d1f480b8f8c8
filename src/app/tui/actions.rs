use ratatui::widgets::TableState;

use crate::app::effects::LikeOutcome;
use crate::app::grouping::{StoryGroup, group_stories, representative_story};
use crate::app::playback::OpenTarget;
use crate::app::record::{AuthorKey, StoryRecord};
use crate::app::service::{ServiceError, StoryService, fetch_or_empty};
use crate::app::viewer::DeleteOutcome;

pub(super) fn status_info(msg: &str) -> String {
    format!("INFO: {msg}")
}

pub(super) fn status_error(msg: &str) -> String {
    format!("ERROR: {msg}")
}

/// Re-fetches the feed and regroups it, keeping the selection on `preferred`.
pub(super) fn refresh_feed<S: StoryService + ?Sized>(
    service: &S,
    viewer_id: &str,
    feed: &mut Vec<StoryRecord>,
    groups: &mut Vec<StoryGroup>,
    table_state: &mut TableState,
) {
    let preferred = selected_author(groups, table_state);
    *feed = fetch_or_empty(service);
    regroup(viewer_id, feed, groups, table_state, preferred.as_ref());
}

pub(super) fn regroup(
    viewer_id: &str,
    feed: &[StoryRecord],
    groups: &mut Vec<StoryGroup>,
    table_state: &mut TableState,
    preferred: Option<&AuthorKey>,
) {
    *groups = group_stories(feed, viewer_id);
    if groups.is_empty() {
        table_state.select(None);
        return;
    }

    if let Some(author) = preferred
        && let Some(idx) = groups.iter().position(|group| &group.author == author)
    {
        table_state.select(Some(idx));
        return;
    }

    match table_state.selected() {
        Some(selected) => table_state.select(Some(selected.min(groups.len() - 1))),
        None => table_state.select(Some(0)),
    }
}

pub(super) fn selected_author(
    groups: &[StoryGroup],
    table_state: &TableState,
) -> Option<AuthorKey> {
    table_state
        .selected()
        .and_then(|idx| groups.get(idx))
        .map(|group| group.author.clone())
}

/// Where Enter on a rail row starts playback.
pub(super) fn open_target_for(group: &StoryGroup) -> Option<OpenTarget> {
    representative_story(group).map(|story| OpenTarget::story(story.id.clone()))
}

pub(super) fn like_status(outcome: LikeOutcome) -> String {
    match outcome {
        LikeOutcome::Liked => status_info("Liked."),
        LikeOutcome::Unliked => status_info("Like removed."),
        LikeOutcome::Reverted { wanted: true } => status_error("Like failed; try again."),
        LikeOutcome::Reverted { wanted: false } => status_error("Unlike failed; try again."),
    }
}

pub(super) fn delete_status(outcome: &DeleteOutcome) -> String {
    match outcome {
        DeleteOutcome::Deleted(_) => status_info("Story deleted."),
        DeleteOutcome::NotOwner => status_error("Only your own stories can be deleted."),
        DeleteOutcome::Failed(ServiceError::NotFound(_)) => {
            status_error("Delete failed: story no longer exists.")
        }
        DeleteOutcome::Failed(err) => status_error(&format!("Delete failed: {err}")),
    }
}
