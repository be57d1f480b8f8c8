use std::collections::HashSet;

use super::audio::AudioSink;
use super::record::StoryRecord;
use super::service::StoryService;

#[derive(Debug, Clone, PartialEq, Eq)]
struct AudioSlot {
    story_id: String,
    url: String,
    started: bool,
    paused: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LikeOutcome {
    Liked,
    Unliked,
    /// The service refused the change and the local toggle was undone.
    Reverted { wanted: bool },
}

/// Bridges the playback state machine to the story service and the audio sink.
///
/// Marks each story viewed at most once per session and owns the single
/// active audio slot.
pub(crate) struct EffectCoordinator<A: AudioSink> {
    viewer_id: String,
    audio: A,
    slot: Option<AudioSlot>,
    marked: HashSet<String>,
    viewed_in_session: Vec<String>,
}

impl<A: AudioSink> EffectCoordinator<A> {
    pub(crate) fn new(viewer_id: &str, audio: A) -> Self {
        Self {
            viewer_id: viewer_id.to_string(),
            audio,
            slot: None,
            marked: HashSet::new(),
            viewed_in_session: Vec::new(),
        }
    }

    pub(crate) fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    /// Ids newly marked viewed during this session, in viewing order.
    pub(crate) fn viewed_in_session(&self) -> &[String] {
        &self.viewed_in_session
    }

    pub(crate) fn active_audio_story(&self) -> Option<&str> {
        self.slot
            .as_ref()
            .filter(|slot| slot.started)
            .map(|slot| slot.story_id.as_str())
    }

    #[cfg(test)]
    pub(crate) fn audio(&self) -> &A {
        &self.audio
    }

    /// Runs the side effects of entering `story`.
    pub(crate) fn enter_story<S: StoryService + ?Sized>(
        &mut self,
        story: &mut StoryRecord,
        paused: bool,
        service: &S,
    ) {
        self.mark_viewed(story, service);
        self.switch_audio(story, paused);
    }

    fn mark_viewed<S: StoryService + ?Sized>(&mut self, story: &mut StoryRecord, service: &S) {
        if story.viewed_by_viewer {
            return;
        }
        story.viewed_by_viewer = true;
        if !self.marked.insert(story.id.clone()) {
            return;
        }
        self.viewed_in_session.push(story.id.clone());
        if let Err(err) = service.mark_viewed(&story.id) {
            tracing::warn!(
                story_id = %story.id,
                error = %err,
                "mark viewed failed; keeping local state"
            );
        }
    }

    fn switch_audio(&mut self, story: &StoryRecord, paused: bool) {
        self.release_audio();
        let Some(track) = story.audio_track.as_ref() else {
            return;
        };
        self.slot = Some(AudioSlot {
            story_id: story.id.clone(),
            url: track.audio_url.clone(),
            started: false,
            paused,
        });
        if !paused {
            self.start_slot();
        }
    }

    fn start_slot(&mut self) {
        let Some(slot) = self.slot.as_mut() else {
            return;
        };
        match self.audio.start(&slot.url, true) {
            Ok(()) => {
                slot.started = true;
                slot.paused = false;
            }
            Err(err) => {
                tracing::warn!(
                    story_id = %slot.story_id,
                    error = %err,
                    "audio start failed; continuing without audio"
                );
                self.slot = None;
            }
        }
    }

    pub(crate) fn pause_audio(&mut self) {
        let Some(slot) = self.slot.as_mut() else {
            return;
        };
        if slot.started && !slot.paused {
            self.audio.pause();
        }
        slot.paused = true;
    }

    /// Resumes from the paused position, or starts a track that was entered while paused.
    pub(crate) fn resume_audio(&mut self) {
        let Some(slot) = self.slot.as_mut() else {
            return;
        };
        if !slot.started {
            self.start_slot();
        } else if slot.paused {
            self.audio.resume();
            slot.paused = false;
        }
    }

    pub(crate) fn release_audio(&mut self) {
        if let Some(slot) = self.slot.take()
            && slot.started
        {
            self.audio.stop();
        }
    }

    /// Flips the viewer's like on `story`, reverting when the service refuses.
    pub(crate) fn toggle_like<S: StoryService + ?Sized>(
        &mut self,
        story: &mut StoryRecord,
        service: &S,
    ) -> LikeOutcome {
        let wanted = !story.is_liked_by(&self.viewer_id);
        apply_like(story, &self.viewer_id, wanted);
        match service.set_like(&story.id, wanted) {
            Ok(()) if wanted => LikeOutcome::Liked,
            Ok(()) => LikeOutcome::Unliked,
            Err(err) => {
                tracing::warn!(story_id = %story.id, error = %err, "like toggle failed; reverting");
                apply_like(story, &self.viewer_id, !wanted);
                LikeOutcome::Reverted { wanted }
            }
        }
    }
}

impl<A: AudioSink> Drop for EffectCoordinator<A> {
    fn drop(&mut self) {
        self.release_audio();
    }
}

fn apply_like(story: &mut StoryRecord, viewer_id: &str, liked: bool) {
    if liked {
        story.likes.insert(viewer_id.to_string());
    } else {
        story.likes.remove(viewer_id);
    }
}


#[cfg(test)]
mod tests {
    use super::fakes::{AudioCall, FakeService, RecordingAudio};
    use super::*;
    use crate::app::record::{AudioTrack, story_at};

    fn with_audio(mut story: StoryRecord, url: &str) -> StoryRecord {
        story.audio_track = Some(AudioTrack {
            id: format!("t-{}", story.id),
            title: "Track".to_string(),
            artist_name: "Artist".to_string(),
            audio_url: url.to_string(),
        });
        story
    }

    #[test]
    fn mark_viewed_is_called_once_per_story() {
        let service = FakeService::default();
        let mut effects = EffectCoordinator::new("me", RecordingAudio::default());
        let mut story = story_at("a1", "alice", "2026-10-19T09:00:00Z");

        effects.enter_story(&mut story, false, &service);
        effects.enter_story(&mut story, false, &service);
        // Even a fresh copy of the record is not re-marked within the session.
        let mut copy = story_at("a1", "alice", "2026-10-19T09:00:00Z");
        effects.enter_story(&mut copy, false, &service);

        assert!(story.viewed_by_viewer);
        assert!(copy.viewed_by_viewer);
        assert_eq!(*service.viewed.borrow(), vec!["a1".to_string()]);
        assert_eq!(effects.viewed_in_session(), ["a1".to_string()]);
    }

    #[test]
    fn already_viewed_story_is_not_marked() {
        let service = FakeService::default();
        let mut effects = EffectCoordinator::new("me", RecordingAudio::default());
        let mut story = story_at("a1", "alice", "2026-10-19T09:00:00Z");
        story.viewed_by_viewer = true;
        effects.enter_story(&mut story, false, &service);
        assert!(service.viewed.borrow().is_empty());
    }

    #[test]
    fn mark_viewed_failure_keeps_optimistic_state() {
        let service = FakeService::default();
        service.fail_views.set(true);
        let mut effects = EffectCoordinator::new("me", RecordingAudio::default());
        let mut story = story_at("a1", "alice", "2026-10-19T09:00:00Z");
        effects.enter_story(&mut story, false, &service);
        assert!(story.viewed_by_viewer);
        effects.enter_story(&mut story, false, &service);
        assert_eq!(service.viewed.borrow().len(), 1);
    }

    #[test]
    fn entering_a_silent_story_stops_previous_track() {
        let service = FakeService::default();
        let mut effects = EffectCoordinator::new("me", RecordingAudio::default());
        let mut loud = with_audio(story_at("a1", "alice", "2026-10-19T09:00:00Z"), "u1");
        let mut quiet = story_at("a2", "alice", "2026-10-19T09:10:00Z");

        effects.enter_story(&mut loud, false, &service);
        assert_eq!(effects.active_audio_story(), Some("a1"));
        effects.enter_story(&mut quiet, false, &service);
        assert_eq!(effects.active_audio_story(), None);
        assert_eq!(
            effects.audio().calls,
            vec![AudioCall::Start("u1".to_string()), AudioCall::Stop]
        );
    }

    #[test]
    fn switching_tracks_never_overlaps() {
        let service = FakeService::default();
        let mut effects = EffectCoordinator::new("me", RecordingAudio::default());
        let mut first = with_audio(story_at("a1", "alice", "2026-10-19T09:00:00Z"), "u1");
        let mut second = with_audio(story_at("a2", "alice", "2026-10-19T09:10:00Z"), "u2");

        effects.enter_story(&mut first, false, &service);
        effects.enter_story(&mut second, false, &service);
        effects.enter_story(&mut first, false, &service);
        assert_eq!(effects.audio().max_active, 1);
        assert_eq!(effects.audio().active, 1);
        assert_eq!(effects.active_audio_story(), Some("a1"));
    }

    #[test]
    fn track_entered_while_paused_starts_on_resume() {
        let service = FakeService::default();
        let mut effects = EffectCoordinator::new("me", RecordingAudio::default());
        let mut story = with_audio(story_at("a1", "alice", "2026-10-19T09:00:00Z"), "u1");

        effects.enter_story(&mut story, true, &service);
        assert!(effects.audio().calls.is_empty());
        effects.resume_audio();
        assert_eq!(effects.audio().calls, vec![AudioCall::Start("u1".to_string())]);

        effects.pause_audio();
        effects.resume_audio();
        assert_eq!(
            effects.audio().calls[1..],
            [AudioCall::Pause, AudioCall::Resume]
        );
    }

    #[test]
    fn audio_start_failure_is_silent() {
        let service = FakeService::default();
        let audio = RecordingAudio {
            fail_start: true,
            ..RecordingAudio::default()
        };
        let mut effects = EffectCoordinator::new("me", audio);
        let mut story = with_audio(story_at("a1", "alice", "2026-10-19T09:00:00Z"), "u1");
        effects.enter_story(&mut story, false, &service);
        assert_eq!(effects.active_audio_story(), None);
        effects.pause_audio();
        effects.release_audio();
        assert_eq!(effects.audio().calls, vec![AudioCall::Start("u1".to_string())]);
    }

    #[test]
    fn like_toggle_flips_membership_and_reverts_on_failure() {
        let service = FakeService::default();
        let mut effects = EffectCoordinator::new("me", RecordingAudio::default());
        let mut story = story_at("a1", "alice", "2026-10-19T09:00:00Z");

        assert_eq!(effects.toggle_like(&mut story, &service), LikeOutcome::Liked);
        assert!(story.is_liked_by("me"));
        assert_eq!(effects.toggle_like(&mut story, &service), LikeOutcome::Unliked);
        assert!(!story.is_liked_by("me"));

        service.fail_likes.set(true);
        assert_eq!(
            effects.toggle_like(&mut story, &service),
            LikeOutcome::Reverted { wanted: true }
        );
        assert!(!story.is_liked_by("me"));
        assert_eq!(
            *service.likes.borrow(),
            vec![
                ("a1".to_string(), true),
                ("a1".to_string(), false),
                ("a1".to_string(), true)
            ]
        );
    }
}
