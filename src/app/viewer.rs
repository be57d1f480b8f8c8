use std::collections::HashMap;
use std::time::Duration;

use super::audio::AudioSink;
use super::effects::{EffectCoordinator, LikeOutcome};
use super::grouping::{StoryGroup, group_stories};
use super::playback::{
    OpenTarget, PlaybackClock, PlaybackController, PlaybackPosition, Transition,
    resolve_open_position,
};
use super::record::StoryRecord;
use super::service::{ServiceError, StoryService};

#[derive(Debug)]
pub(crate) enum DeleteOutcome {
    Deleted(Transition),
    NotOwner,
    Failed(ServiceError),
}

/// What the caller gets back when the viewer closes.
#[derive(Debug, Clone, Default)]
pub(crate) struct ViewerReport {
    /// Stories first seen in this session, in order.
    pub(crate) viewed: Vec<String>,
    pub(crate) deleted: Vec<String>,
    /// Final state of every remaining story, including like changes.
    pub(crate) stories: Vec<StoryRecord>,
}

/// An open story viewer: playback state plus its side effects.
///
/// Each input is processed to completion, side effects included, before the
/// method returns, so transitions never interleave. Time spent blocked in a
/// side effect is not charged to the displayed story's slot.
pub(crate) struct StoryViewer<'a, S: StoryService + ?Sized, A: AudioSink> {
    controller: PlaybackController,
    effects: EffectCoordinator<A>,
    service: &'a S,
    clock: &'a dyn PlaybackClock,
    deleted: Vec<String>,
}

impl<'a, S: StoryService + ?Sized, A: AudioSink> StoryViewer<'a, S, A> {
    /// Groups `feed`, resolves `target`, and enters the first story.
    /// Returns `None` for an empty feed.
    pub(crate) fn open(
        feed: &[StoryRecord],
        target: &OpenTarget,
        viewer_id: &str,
        duration: Duration,
        service: &'a S,
        audio: A,
        clock: &'a dyn PlaybackClock,
    ) -> Option<Self> {
        let groups = group_stories(feed, viewer_id);
        let start = resolve_open_position(&groups, feed, target);
        let controller = PlaybackController::open(groups, start, duration, clock.now_ms())?;
        let position = controller.position()?;
        tracing::debug!(
            group = position.group_index,
            story = position.story_index,
            "story viewer opened"
        );

        let mut viewer = Self {
            controller,
            effects: EffectCoordinator::new(viewer_id, audio),
            service,
            clock,
            deleted: Vec::new(),
        };
        viewer.apply(Transition::Entered(position));
        Some(viewer)
    }

    pub(crate) fn is_open(&self) -> bool {
        self.controller.is_open()
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.controller.is_paused()
    }

    pub(crate) fn position(&self) -> Option<PlaybackPosition> {
        self.controller.position()
    }

    pub(crate) fn groups(&self) -> &[StoryGroup] {
        self.controller.groups()
    }

    pub(crate) fn current_group(&self) -> Option<&StoryGroup> {
        self.controller.current_group()
    }

    pub(crate) fn current(&self) -> Option<&StoryRecord> {
        self.controller.current()
    }

    pub(crate) fn viewer_id(&self) -> &str {
        self.effects.viewer_id()
    }

    pub(crate) fn progress(&self) -> f64 {
        self.controller.progress(self.clock.now_ms())
    }

    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.controller.remaining(self.clock.now_ms())
    }

    pub(crate) fn active_audio_story(&self) -> Option<&str> {
        self.effects.active_audio_story()
    }

    #[cfg(test)]
    pub(crate) fn effects(&self) -> &EffectCoordinator<A> {
        &self.effects
    }

    pub(crate) fn tick(&mut self) -> Transition {
        let transition = self.controller.tick(self.clock.now_ms());
        self.apply(transition)
    }

    pub(crate) fn advance(&mut self) -> Transition {
        let transition = self.controller.advance(self.clock.now_ms());
        self.apply(transition)
    }

    pub(crate) fn retreat(&mut self) -> Transition {
        let transition = self.controller.retreat(self.clock.now_ms());
        self.apply(transition)
    }

    pub(crate) fn pause(&mut self) -> bool {
        let changed = self.controller.pause(self.clock.now_ms());
        if changed {
            self.effects.pause_audio();
        }
        changed
    }

    pub(crate) fn resume(&mut self) -> bool {
        let changed = self.controller.resume(self.clock.now_ms());
        if changed {
            self.off_the_clock(|viewer| viewer.effects.resume_audio());
        }
        changed
    }

    pub(crate) fn toggle_pause(&mut self) -> bool {
        if self.is_paused() {
            self.resume()
        } else {
            self.pause()
        }
    }

    /// Toggles the viewer's like on the displayed story. Playback timing is untouched.
    pub(crate) fn toggle_like(&mut self) -> Option<LikeOutcome> {
        self.off_the_clock(|viewer| {
            let story = viewer.controller.current_mut()?;
            Some(viewer.effects.toggle_like(story, viewer.service))
        })
    }

    /// Deletes the displayed story once the caller has confirmed.
    ///
    /// The story only leaves its group after the service accepts the delete.
    pub(crate) fn delete_current(&mut self) -> Option<DeleteOutcome> {
        let story = self.controller.current()?;
        if !story.is_owned_by_viewer {
            return Some(DeleteOutcome::NotOwner);
        }
        let story_id = story.id.clone();
        let accepted = self.off_the_clock(|viewer| viewer.service.delete_story(&story_id));
        if let Err(err) = accepted {
            tracing::warn!(story_id = %story_id, error = %err, "story delete failed");
            return Some(DeleteOutcome::Failed(err));
        }

        self.deleted.push(story_id.clone());
        let transition = self
            .controller
            .remove_story(&story_id, self.clock.now_ms())
            .unwrap_or(Transition::Unchanged);
        Some(DeleteOutcome::Deleted(self.apply(transition)))
    }

    /// Tears the viewer down: cancels the pending advance and releases audio.
    pub(crate) fn close(mut self) -> ViewerReport {
        let transition = self.controller.close();
        self.apply(transition);
        self.effects.release_audio();

        let stories = self
            .controller
            .groups()
            .iter()
            .flat_map(|group| group.stories.iter().cloned())
            .collect();
        ViewerReport {
            viewed: self.effects.viewed_in_session().to_vec(),
            deleted: std::mem::take(&mut self.deleted),
            stories,
        }
    }

    fn apply(&mut self, transition: Transition) -> Transition {
        match transition {
            Transition::Entered(position) => {
                tracing::trace!(
                    group = position.group_index,
                    story = position.story_index,
                    "entered story"
                );
                let paused = self.controller.is_paused();
                if let Some(story) = self.controller.current_mut() {
                    self.effects.enter_story(story, paused, self.service);
                }
                // The slot starts once the story can actually be shown.
                self.controller.restart_clock(self.clock.now_ms());
            }
            Transition::Closed => {
                tracing::debug!("story viewer closed");
                self.effects.release_audio();
            }
            Transition::Unchanged => {}
        }
        transition
    }

    fn off_the_clock<T>(&mut self, work: impl FnOnce(&mut Self) -> T) -> T {
        let started = self.clock.now_ms();
        let out = work(self);
        let blocked = self.clock.now_ms().saturating_sub(started);
        self.controller.discount(blocked);
        out
    }
}

/// Folds a closed viewer's report back into the feed it was opened from.
pub(crate) fn apply_report(feed: &mut Vec<StoryRecord>, report: &ViewerReport) {
    feed.retain(|story| !report.deleted.contains(&story.id));
    let finals: HashMap<&str, &StoryRecord> = report
        .stories
        .iter()
        .map(|story| (story.id.as_str(), story))
        .collect();
    for story in feed.iter_mut() {
        if report.viewed.contains(&story.id) {
            story.viewed_by_viewer = true;
        }
        if let Some(updated) = finals.get(story.id.as_str()) {
            story.viewed_by_viewer |= updated.viewed_by_viewer;
            story.likes = updated.likes.clone();
        }
    }
}
