use chrono::{DateTime, Local, Utc};

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max.saturating_sub(3)).collect::<String>() + "..."
}

/// "just now", "12m ago", "3h ago", "2d ago".
pub(crate) fn format_age(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - created_at).num_minutes();
    if minutes < 1 {
        "just now".to_string()
    } else if minutes < 60 {
        format!("{minutes}m ago")
    } else if minutes < 24 * 60 {
        format!("{}h ago", minutes / 60)
    } else {
        format!("{}d ago", minutes / (24 * 60))
    }
}

pub(crate) fn format_expiry(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (expires_at - now).num_minutes();
    if expires_at <= now {
        "expired".to_string()
    } else if minutes < 1 {
        "expires in <1m".to_string()
    } else if minutes < 60 {
        format!("expires in {minutes}m")
    } else {
        format!("expires in {}h {:02}m", minutes / 60, minutes % 60)
    }
}

pub(crate) fn format_local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Fill ratio of each segment in a group's progress bar.
///
/// Stories before `current` are full, later ones empty.
pub(crate) fn segment_ratios(count: usize, current: usize, progress: f64) -> Vec<f64> {
    (0..count)
        .map(|index| match index.cmp(&current) {
            std::cmp::Ordering::Less => 1.0,
            std::cmp::Ordering::Equal => progress.clamp(0.0, 1.0),
            std::cmp::Ordering::Greater => 0.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn at(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .expect("timestamp should parse")
            .with_timezone(&Utc)
    }

    #[test]
    fn truncate_keeps_short_text_and_marks_cut() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer caption", 10), "a much ...");
        assert_eq!(truncate("héllo wörld", 8), "héllo...");
    }

    #[test]
    fn age_buckets() {
        let now = at("2026-10-19T12:00:00Z");
        assert_eq!(format_age(now - Duration::seconds(20), now), "just now");
        assert_eq!(format_age(now - Duration::minutes(12), now), "12m ago");
        assert_eq!(format_age(now - Duration::minutes(185), now), "3h ago");
        assert_eq!(format_age(now - Duration::hours(50), now), "2d ago");
    }

    #[test]
    fn expiry_countdown() {
        let now = at("2026-10-19T12:00:00Z");
        assert_eq!(format_expiry(now - Duration::minutes(1), now), "expired");
        assert_eq!(format_expiry(now + Duration::seconds(30), now), "expires in <1m");
        assert_eq!(format_expiry(now + Duration::minutes(45), now), "expires in 45m");
        assert_eq!(
            format_expiry(now + Duration::minutes(23 * 60 + 5), now),
            "expires in 23h 05m"
        );
    }

    #[test]
    fn segments_fill_before_current_only() {
        assert_eq!(segment_ratios(3, 1, 0.25), vec![1.0, 0.25, 0.0]);
        assert_eq!(segment_ratios(1, 0, 1.7), vec![1.0]);
        assert!(segment_ratios(0, 0, 0.5).is_empty());
    }
}
