//! Member labels for flattened rows.
//!
//! Which field of a [`Position`] becomes the row label is decided by the
//! `memberDisplayMode` option the query was sent with:
//!
//! | Mode | Label |
//! |---|---|
//! | `DEFAULT`, `COMPACT` | last element of `path` |
//! | `DISPLAY`, `COMPACT_DISPLAY` | `displayName`, else last of `displayNamePath`, else last of `path` |
//! | `MDX` | full `path` joined with `.` |
//!
//! A position without any usable label becomes `Position_{index}`.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::models::{MemberDisplayMode, Position};

/// `2022-01-01T00:00:00.000Z - [0]`
static TIME_MEMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2})T(.*?)\s*-\s*(\[.*?\])").expect("valid regex")
});

static TIME_OF_DAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\d:.]+Z$").expect("valid regex"));

/// Display mode requested in a wire `options` object. Absent or
/// unrecognized values fall back to [`MemberDisplayMode::Default`].
pub fn display_mode(options: Option<&Map<String, Value>>) -> MemberDisplayMode {
    options
        .and_then(|o| o.get("memberDisplayMode"))
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

/// Label of the position at `index` under `mode`.
pub fn member_label(position: &Position, mode: MemberDisplayMode, index: usize) -> String {
    let last_path = || position.path.last().filter(|s| !s.is_empty()).cloned();

    let label = match mode {
        MemberDisplayMode::Default | MemberDisplayMode::Compact => last_path(),
        MemberDisplayMode::Display | MemberDisplayMode::CompactDisplay => position
            .display_name
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| position.display_name_path.last().filter(|s| !s.is_empty()).cloned())
            .or_else(last_path),
        MemberDisplayMode::Mdx => {
            if position.path.is_empty() {
                None
            } else {
                Some(position.path.join("."))
            }
        }
    };

    label.unwrap_or_else(|| format!("Position_{}", index))
}

/// Relabel a time member to the last day of its year, keeping the time of
/// day and interval index: `2022-01-01T00:00:00.000Z - [0]` becomes
/// `2022-12-31T00:00:00.000Z - [0]`.
///
/// Returns `None` for labels that are not time members.
pub fn year_end_label(label: &str) -> Option<String> {
    let caps = TIME_MEMBER.captures(label)?;
    let date = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()?;
    let year_end = NaiveDate::from_ymd_opt(date.year(), 12, 31)?;

    let time = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
    let time = if TIME_OF_DAY.is_match(time) { time } else { "00:00:00.000Z" };

    Some(format!("{}T{} - {}", year_end.format("%Y-%m-%d"), time, &caps[3]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn position() -> Position {
        Position {
            path: vec!["North America".into(), "US".into()],
            display_name: Some("United States".into()),
            display_name_path: vec!["North America".into(), "United States".into()],
        }
    }

    #[test]
    fn test_labels_per_mode() {
        let p = position();
        assert_eq!(member_label(&p, MemberDisplayMode::Default, 0), "US");
        assert_eq!(member_label(&p, MemberDisplayMode::Compact, 0), "US");
        assert_eq!(member_label(&p, MemberDisplayMode::Display, 0), "United States");
        assert_eq!(member_label(&p, MemberDisplayMode::CompactDisplay, 0), "United States");
        assert_eq!(member_label(&p, MemberDisplayMode::Mdx, 0), "North America.US");
    }

    #[test]
    fn test_display_falls_back() {
        let mut p = position();
        p.display_name = None;
        assert_eq!(member_label(&p, MemberDisplayMode::Display, 0), "United States");

        p.display_name_path.clear();
        assert_eq!(member_label(&p, MemberDisplayMode::Display, 0), "US");
    }

    #[test]
    fn test_empty_position_gets_index_label() {
        let p = Position::default();
        assert_eq!(member_label(&p, MemberDisplayMode::Default, 3), "Position_3");
        assert_eq!(member_label(&p, MemberDisplayMode::Mdx, 1), "Position_1");
    }

    #[test]
    fn test_display_mode_from_options() {
        let options = json!({ "memberDisplayMode": "MDX" });
        assert_eq!(display_mode(options.as_object()), MemberDisplayMode::Mdx);

        let bogus = json!({ "memberDisplayMode": "FANCY" });
        assert_eq!(display_mode(bogus.as_object()), MemberDisplayMode::Default);
        assert_eq!(display_mode(None), MemberDisplayMode::Default);
    }

    #[test]
    fn test_year_end_label() {
        assert_eq!(
            year_end_label("2022-01-01T00:00:00.000Z - [0]").as_deref(),
            Some("2022-12-31T00:00:00.000Z - [0]")
        );
        assert_eq!(
            year_end_label("2021-07-01T12:30:00Z - [3]").as_deref(),
            Some("2021-12-31T12:30:00Z - [3]")
        );
        assert_eq!(year_end_label("Engineering"), None);
        assert_eq!(year_end_label("2022-13-01T00:00:00.000Z - [0]"), None);
    }
}
