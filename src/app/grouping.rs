use std::collections::HashMap;

use super::record::{AuthorKey, StoryRecord};

/// One author's stories, newest first.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StoryGroup {
    pub(crate) author: AuthorKey,
    pub(crate) stories: Vec<StoryRecord>,
}

impl StoryGroup {
    pub(crate) fn len(&self) -> usize {
        self.stories.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.stories.is_empty()
    }

    pub(crate) fn newest(&self) -> Option<&StoryRecord> {
        self.stories.first()
    }

    pub(crate) fn display_name(&self) -> &str {
        self.newest()
            .map(|story| story.author_display_name.trim())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.author.label())
    }

    pub(crate) fn unviewed_count(&self) -> usize {
        self.stories
            .iter()
            .filter(|story| !story.viewed_by_viewer)
            .count()
    }
}

/// Partitions a flat feed into per-author groups.
///
/// The viewer's own group comes first when present; other groups follow by
/// their newest story, newest first. Records without an author id each get a
/// singleton group.
pub(crate) fn group_stories(records: &[StoryRecord], viewer_id: &str) -> Vec<StoryGroup> {
    let viewer_id = viewer_id.trim();
    let mut own = Vec::new();
    let mut others: Vec<StoryGroup> = Vec::new();
    let mut bucket_by_author: HashMap<String, usize> = HashMap::new();

    for record in records {
        match record.author_key() {
            AuthorKey::Account(author) if author == viewer_id => own.push(record.clone()),
            AuthorKey::Account(author) => match bucket_by_author.get(&author) {
                Some(&idx) => others[idx].stories.push(record.clone()),
                None => {
                    bucket_by_author.insert(author.clone(), others.len());
                    others.push(StoryGroup {
                        author: AuthorKey::Account(author),
                        stories: vec![record.clone()],
                    });
                }
            },
            orphan @ AuthorKey::Orphan(_) => others.push(StoryGroup {
                author: orphan,
                stories: vec![record.clone()],
            }),
        }
    }

    for group in &mut others {
        sort_newest_first(&mut group.stories);
    }
    // Stable sort keeps first-seen order for authors whose newest stories tie.
    others.sort_by(|a, b| {
        let a_newest = a.newest().map(|story| story.created_at);
        let b_newest = b.newest().map(|story| story.created_at);
        b_newest.cmp(&a_newest)
    });

    let mut groups = Vec::with_capacity(others.len() + 1);
    if !own.is_empty() {
        sort_newest_first(&mut own);
        groups.push(StoryGroup {
            author: AuthorKey::Account(viewer_id.to_string()),
            stories: own,
        });
    }
    groups.extend(others);
    groups
}

fn sort_newest_first(stories: &mut [StoryRecord]) {
    stories.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// The story a summary rail shows for a group: the first unviewed one, else the newest.
pub(crate) fn representative_story(group: &StoryGroup) -> Option<&StoryRecord> {
    group
        .stories
        .iter()
        .find(|story| !story.viewed_by_viewer)
        .or_else(|| group.newest())
}

/// Finds `(group_index, story_index)` of a story id.
pub(crate) fn locate_story(groups: &[StoryGroup], story_id: &str) -> Option<(usize, usize)> {
    groups.iter().enumerate().find_map(|(group_idx, group)| {
        group
            .stories
            .iter()
            .position(|story| story.id == story_id)
            .map(|story_idx| (group_idx, story_idx))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::record::story_at;

    fn ids(group: &StoryGroup) -> Vec<&str> {
        group.stories.iter().map(|story| story.id.as_str()).collect()
    }

    #[test]
    fn own_group_comes_first_even_when_older() {
        let records = vec![
            story_at("a1", "alice", "2026-10-19T12:00:00Z"),
            story_at("m1", "me", "2026-10-19T08:00:00Z"),
            story_at("b1", "bob", "2026-10-19T11:00:00Z"),
        ];
        let groups = group_stories(&records, "me");
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].author, AuthorKey::Account("me".to_string()));
        assert_eq!(ids(&groups[1]), vec!["a1"]);
        assert_eq!(ids(&groups[2]), vec!["b1"]);
    }

    #[test]
    fn other_groups_sort_by_newest_member() {
        let records = vec![
            story_at("a1", "alice", "2026-10-19T09:00:00Z"),
            story_at("b1", "bob", "2026-10-19T10:00:00Z"),
            story_at("a2", "alice", "2026-10-19T11:00:00Z"),
            story_at("c1", "carol", "2026-10-19T10:30:00Z"),
        ];
        let groups = group_stories(&records, "me");
        let order: Vec<&str> = groups.iter().map(|group| group.author.label()).collect();
        assert_eq!(order, vec!["alice", "carol", "bob"]);
        assert_eq!(ids(&groups[0]), vec!["a2", "a1"]);
    }

    #[test]
    fn grouping_preserves_every_record_in_descending_order() {
        let records = vec![
            story_at("a1", "alice", "2026-10-19T09:00:00Z"),
            story_at("a3", "alice", "2026-10-19T09:20:00Z"),
            story_at("a2", "alice", "2026-10-19T09:10:00Z"),
            story_at("m1", "me", "2026-10-19T07:00:00Z"),
            story_at("m2", "me", "2026-10-19T07:30:00Z"),
            story_at("b1", "bob", "2026-10-19T06:00:00Z"),
        ];
        let groups = group_stories(&records, "me");
        let total: usize = groups.iter().map(StoryGroup::len).sum();
        assert_eq!(total, records.len());
        for group in &groups {
            for pair in group.stories.windows(2) {
                assert!(pair[0].created_at >= pair[1].created_at);
            }
        }
        assert_eq!(ids(&groups[0]), vec!["m2", "m1"]);
    }

    #[test]
    fn padded_author_id_joins_the_own_group() {
        let records = vec![
            story_at("a1", "alice", "2026-10-19T12:00:00Z"),
            story_at("s1", " me", "2026-10-19T08:00:00Z"),
        ];
        let groups = group_stories(&records, "me");
        assert_eq!(groups[0].author, AuthorKey::Account("me".to_string()));
        assert!(groups[0].stories[0].is_authored_by("me"));
    }

    #[test]
    fn no_own_group_when_viewer_has_no_stories() {
        let records = vec![story_at("a1", "alice", "2026-10-19T09:00:00Z")];
        let groups = group_stories(&records, "me");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].author.label(), "alice");
    }

    #[test]
    fn orphan_records_become_singleton_groups() {
        let mut first = story_at("x1", "", "2026-10-19T09:00:00Z");
        first.author_display_name = "Guest".to_string();
        let mut second = story_at("x2", "", "2026-10-19T10:00:00Z");
        second.author_display_name = "Guest".to_string();
        let groups = group_stories(&[first, second], "me");
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|group| group.len() == 1));
        assert_eq!(groups[0].author, AuthorKey::Orphan("Guest".to_string()));
        assert_eq!(ids(&groups[0]), vec!["x2"]);
    }

    #[test]
    fn empty_feed_yields_no_groups() {
        assert!(group_stories(&[], "me").is_empty());
    }

    #[test]
    fn representative_prefers_first_unviewed() {
        let mut newest = story_at("a3", "alice", "2026-10-19T09:20:00Z");
        newest.viewed_by_viewer = true;
        let middle = story_at("a2", "alice", "2026-10-19T09:10:00Z");
        let oldest = story_at("a1", "alice", "2026-10-19T09:00:00Z");
        let groups = group_stories(&[oldest, newest, middle], "me");
        let rep = representative_story(&groups[0]).expect("group should not be empty");
        assert_eq!(rep.id, "a2");
    }

    #[test]
    fn representative_falls_back_to_newest_when_all_viewed() {
        let mut a1 = story_at("a1", "alice", "2026-10-19T09:00:00Z");
        let mut a2 = story_at("a2", "alice", "2026-10-19T09:10:00Z");
        a1.viewed_by_viewer = true;
        a2.viewed_by_viewer = true;
        let groups = group_stories(&[a1, a2], "me");
        let rep = representative_story(&groups[0]).expect("group should not be empty");
        assert_eq!(rep.id, "a2");
    }

    #[test]
    fn locate_story_reports_two_level_position() {
        let records = vec![
            story_at("s1", "me", "2026-10-19T10:00:00Z"),
            story_at("s2", "me", "2026-10-19T10:05:00Z"),
            story_at("a1", "alice", "2026-10-19T09:50:00Z"),
        ];
        let groups = group_stories(&records, "me");
        assert_eq!(locate_story(&groups, "s1"), Some((0, 1)));
        assert_eq!(locate_story(&groups, "a1"), Some((1, 0)));
        assert_eq!(locate_story(&groups, "missing"), None);
    }
}
