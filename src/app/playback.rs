#[cfg(test)]
use std::cell::Cell;
use std::time::Duration;

use super::grouping::{StoryGroup, locate_story};
use super::record::StoryRecord;

pub(crate) const DEFAULT_STORY_DURATION: Duration = Duration::from_millis(5_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PlaybackPosition {
    pub(crate) group_index: usize,
    pub(crate) story_index: usize,
}

impl PlaybackPosition {
    pub(crate) const START: Self = Self {
        group_index: 0,
        story_index: 0,
    };

    pub(crate) fn new(group_index: usize, story_index: usize) -> Self {
        Self {
            group_index,
            story_index,
        }
    }
}

/// Where the viewer should open. The id wins; the flat index refers to the
/// unsorted feed and is translated through the record it points at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct OpenTarget {
    pub(crate) story_id: Option<String>,
    pub(crate) flat_index: Option<usize>,
}

impl OpenTarget {
    pub(crate) fn story(id: impl Into<String>) -> Self {
        Self {
            story_id: Some(id.into()),
            flat_index: None,
        }
    }

    pub(crate) fn index(flat_index: usize) -> Self {
        Self {
            story_id: None,
            flat_index: Some(flat_index),
        }
    }
}

pub(crate) fn resolve_open_position(
    groups: &[StoryGroup],
    feed: &[StoryRecord],
    target: &OpenTarget,
) -> PlaybackPosition {
    let by_id = target
        .story_id
        .as_deref()
        .and_then(|id| locate_story(groups, id));
    let by_index = || {
        target
            .flat_index
            .and_then(|idx| feed.get(idx))
            .and_then(|record| locate_story(groups, &record.id))
    };
    by_id
        .or_else(by_index)
        .map(|(group_index, story_index)| PlaybackPosition::new(group_index, story_index))
        .unwrap_or(PlaybackPosition::START)
}

/// Monotonic millisecond time source.
pub(crate) trait PlaybackClock {
    fn now_ms(&self) -> u64;
}

/// Hand-driven clock for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct ManualClock {
    now_ms: Cell<u64>,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn set(&self, now_ms: u64) {
        self.now_ms.set(now_ms);
    }

    pub(crate) fn advance(&self, by_ms: u64) {
        self.now_ms.set(self.now_ms.get() + by_ms);
    }
}

#[cfg(test)]
impl PlaybackClock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Unchanged,
    Entered(PlaybackPosition),
    Closed,
}

/// Elapsed time within the current story, kept as banked milliseconds plus
/// the start of the running stretch so pausing freezes the fraction exactly.
#[derive(Debug, Clone, Copy)]
struct ProgressClock {
    duration_ms: u64,
    banked_ms: u64,
    running_since_ms: Option<u64>,
}

impl ProgressClock {
    fn new(duration: Duration) -> Self {
        Self {
            duration_ms: (duration.as_millis() as u64).max(1),
            banked_ms: 0,
            running_since_ms: None,
        }
    }

    fn restart(&mut self, now_ms: u64, paused: bool) {
        self.banked_ms = 0;
        self.running_since_ms = (!paused).then_some(now_ms);
    }

    fn elapsed_ms(&self, now_ms: u64) -> u64 {
        let running = self
            .running_since_ms
            .map(|since| now_ms.saturating_sub(since))
            .unwrap_or(0);
        self.banked_ms.saturating_add(running).min(self.duration_ms)
    }

    fn freeze(&mut self, now_ms: u64) {
        self.banked_ms = self.elapsed_ms(now_ms);
        self.running_since_ms = None;
    }

    fn thaw(&mut self, now_ms: u64) {
        if self.running_since_ms.is_none() {
            self.running_since_ms = Some(now_ms);
        }
    }

    fn discount(&mut self, blocked_ms: u64) {
        if let Some(since) = self.running_since_ms {
            self.running_since_ms = Some(since.saturating_add(blocked_ms));
        }
    }

    fn fraction(&self, now_ms: u64) -> f64 {
        self.elapsed_ms(now_ms) as f64 / self.duration_ms as f64
    }

    fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.duration_ms - self.elapsed_ms(now_ms)
    }

    fn is_complete(&self, now_ms: u64) -> bool {
        self.elapsed_ms(now_ms) >= self.duration_ms
    }
}

/// Two-level story playback state machine.
///
/// Time is injected as monotonic milliseconds. While open, `position` always
/// indexes an existing story; `None` means the viewer is closed and every
/// further input is ignored.
#[derive(Debug, Clone)]
pub(crate) struct PlaybackController {
    groups: Vec<StoryGroup>,
    position: Option<PlaybackPosition>,
    paused: bool,
    clock: ProgressClock,
}

impl PlaybackController {
    /// Returns `None` when there is nothing to play.
    pub(crate) fn open(
        groups: Vec<StoryGroup>,
        start: PlaybackPosition,
        duration: Duration,
        now_ms: u64,
    ) -> Option<Self> {
        let groups: Vec<StoryGroup> = groups.into_iter().filter(|g| !g.is_empty()).collect();
        if groups.is_empty() {
            return None;
        }
        let start = if groups
            .get(start.group_index)
            .is_some_and(|group| start.story_index < group.len())
        {
            start
        } else {
            PlaybackPosition::START
        };

        let mut clock = ProgressClock::new(duration);
        clock.restart(now_ms, false);
        Some(Self {
            groups,
            position: Some(start),
            paused: false,
            clock,
        })
    }

    pub(crate) fn groups(&self) -> &[StoryGroup] {
        &self.groups
    }

    pub(crate) fn position(&self) -> Option<PlaybackPosition> {
        self.position
    }

    pub(crate) fn is_open(&self) -> bool {
        self.position.is_some()
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused
    }

    pub(crate) fn current_group(&self) -> Option<&StoryGroup> {
        self.position.map(|pos| &self.groups[pos.group_index])
    }

    pub(crate) fn current(&self) -> Option<&StoryRecord> {
        self.position
            .map(|pos| &self.groups[pos.group_index].stories[pos.story_index])
    }

    pub(crate) fn current_mut(&mut self) -> Option<&mut StoryRecord> {
        self.position
            .map(|pos| &mut self.groups[pos.group_index].stories[pos.story_index])
    }

    pub(crate) fn progress(&self, now_ms: u64) -> f64 {
        if self.is_open() {
            self.clock.fraction(now_ms)
        } else {
            0.0
        }
    }

    /// Time left before the automatic advance, `None` while paused or closed.
    pub(crate) fn remaining(&self, now_ms: u64) -> Option<Duration> {
        if !self.is_open() || self.paused {
            return None;
        }
        Some(Duration::from_millis(self.clock.remaining_ms(now_ms)))
    }

    /// Starts the current story's slot over at `now_ms`, keeping the pause state.
    pub(crate) fn restart_clock(&mut self, now_ms: u64) {
        if self.is_open() {
            self.clock.restart(now_ms, self.paused);
        }
    }

    /// Leaves `blocked_ms` out of the running slot.
    pub(crate) fn discount(&mut self, blocked_ms: u64) {
        if self.is_open() && !self.paused {
            self.clock.discount(blocked_ms);
        }
    }

    /// Fires the automatic advance once the current story has run its full slot.
    pub(crate) fn tick(&mut self, now_ms: u64) -> Transition {
        if !self.is_open() || self.paused || !self.clock.is_complete(now_ms) {
            return Transition::Unchanged;
        }
        self.advance(now_ms)
    }

    pub(crate) fn advance(&mut self, now_ms: u64) -> Transition {
        let Some(pos) = self.position else {
            return Transition::Unchanged;
        };
        let next = if pos.story_index + 1 < self.groups[pos.group_index].len() {
            PlaybackPosition::new(pos.group_index, pos.story_index + 1)
        } else if pos.group_index + 1 < self.groups.len() {
            PlaybackPosition::new(pos.group_index + 1, 0)
        } else {
            return self.close();
        };
        self.enter(next, now_ms)
    }

    pub(crate) fn retreat(&mut self, now_ms: u64) -> Transition {
        let Some(pos) = self.position else {
            return Transition::Unchanged;
        };
        let previous = if pos.story_index > 0 {
            PlaybackPosition::new(pos.group_index, pos.story_index - 1)
        } else if pos.group_index > 0 {
            let group_index = pos.group_index - 1;
            PlaybackPosition::new(group_index, self.groups[group_index].len() - 1)
        } else {
            return Transition::Unchanged;
        };
        self.enter(previous, now_ms)
    }

    /// Returns whether the state changed.
    pub(crate) fn pause(&mut self, now_ms: u64) -> bool {
        if !self.is_open() || self.paused {
            return false;
        }
        self.clock.freeze(now_ms);
        self.paused = true;
        true
    }

    /// Continues from the frozen fraction; the remaining time is the unplayed
    /// share of the slot, not a fresh slot.
    pub(crate) fn resume(&mut self, now_ms: u64) -> bool {
        if !self.is_open() || !self.paused {
            return false;
        }
        self.clock.thaw(now_ms);
        self.paused = false;
        true
    }

    pub(crate) fn close(&mut self) -> Transition {
        if self.position.take().is_none() {
            return Transition::Unchanged;
        }
        self.paused = false;
        self.clock.running_since_ms = None;
        Transition::Closed
    }

    /// Removes a story from its group after a confirmed delete.
    ///
    /// Emptied groups are dropped. Removing the displayed story moves to the
    /// story that followed it, or closes when nothing follows. Returns `None`
    /// when the id is unknown.
    pub(crate) fn remove_story(&mut self, story_id: &str, now_ms: u64) -> Option<Transition> {
        let (group_index, story_index) = locate_story(&self.groups, story_id)?;
        self.groups[group_index].stories.remove(story_index);
        let group_removed = self.groups[group_index].is_empty();
        if group_removed {
            self.groups.remove(group_index);
        }

        let Some(pos) = self.position else {
            return Some(Transition::Unchanged);
        };
        if (group_index, story_index) == (pos.group_index, pos.story_index) {
            // The follower, if any, now sits at the same coordinates.
            let follower = if !group_removed && story_index < self.groups[group_index].len() {
                Some(PlaybackPosition::new(group_index, story_index))
            } else if group_removed && group_index < self.groups.len() {
                Some(PlaybackPosition::new(group_index, 0))
            } else if !group_removed && group_index + 1 < self.groups.len() {
                Some(PlaybackPosition::new(group_index + 1, 0))
            } else {
                None
            };
            return Some(match follower {
                Some(next) => self.enter(next, now_ms),
                None => self.close(),
            });
        }

        let mut adjusted = pos;
        if group_removed && group_index < pos.group_index {
            adjusted.group_index -= 1;
        } else if group_index == pos.group_index && story_index < pos.story_index {
            adjusted.story_index -= 1;
        }
        self.position = Some(adjusted);
        Some(Transition::Unchanged)
    }

    fn enter(&mut self, next: PlaybackPosition, now_ms: u64) -> Transition {
        self.position = Some(next);
        self.clock.restart(now_ms, self.paused);
        Transition::Entered(next)
    }
}
