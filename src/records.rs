//! Record domain logic shared by the vouch and veto flows: subject
//! normalization, vote reconciliation and status derivation. Everything
//! here is pure so it can be exercised without a database or a bot.

use lazy_regex::regex;

use crate::core::config::thresholds;

/// Direction of a single vote press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteDirection {
    Up,
    Down,
}

/// What a vote press did to the voter lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Voter was added to the pressed side.
    Added,
    /// Voter pressed the side they were already on; the vote was retracted.
    Removed,
    /// Voter moved from the opposite side to the pressed side.
    Switched,
}

/// Reconciles a vote press against the two voter lists.
/// A voter appears in at most one list afterwards.
pub fn apply_vote(
    upvoters: &mut Vec<String>,
    downvoters: &mut Vec<String>,
    voter: &str,
    direction: VoteDirection,
) -> VoteOutcome {
    let (same, other) = match direction {
        VoteDirection::Up => (upvoters, downvoters),
        VoteDirection::Down => (downvoters, upvoters),
    };

    if let Some(pos) = same.iter().position(|v| v == voter) {
        same.remove(pos);
        return VoteOutcome::Removed;
    }

    if let Some(pos) = other.iter().position(|v| v == voter) {
        other.remove(pos);
        same.push(voter.to_string());
        return VoteOutcome::Switched;
    }

    same.push(voter.to_string());
    VoteOutcome::Added
}

/// Vote counts needed to settle a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub required_upvotes: i64,
    pub required_downvotes: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            required_upvotes: thresholds::DEFAULT_REQUIRED_UPVOTES,
            required_downvotes: thresholds::DEFAULT_REQUIRED_DOWNVOTES,
        }
    }
}

/// Lifecycle state of a vouch or veto record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Approved => "approved",
            RecordStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(raw: &str) -> Self {
        match raw {
            "approved" => RecordStatus::Approved,
            "rejected" => RecordStatus::Rejected,
            _ => RecordStatus::Pending,
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "⏳",
            RecordStatus::Approved => "✅",
            RecordStatus::Rejected => "❌",
        }
    }
}

/// Derives the record status from the current vote counts.
/// The approval check runs first, so a record that somehow satisfies
/// both thresholds counts as approved.
pub fn derive_status(up_count: usize, down_count: usize, thresholds: &Thresholds) -> RecordStatus {
    if up_count as i64 >= thresholds.required_upvotes {
        RecordStatus::Approved
    } else if down_count as i64 >= thresholds.required_downvotes {
        RecordStatus::Rejected
    } else {
        RecordStatus::Pending
    }
}

/// Extracts a normalized subject handle from free-form user input.
/// Accepts an x.com profile URL or a bare handle with optional `@`,
/// and lowercases the result.
pub fn parse_subject(input: &str) -> Option<String> {
    let input = input.trim();
    let url_re = regex!(r"(?i)(?:https?://)?(?:www\.)?x\.com/([^/\s?]+)");
    if let Some(caps) = url_re.captures(input) {
        return Some(caps[1].to_lowercase());
    }
    let handle_re = regex!(r"^@?([a-zA-Z0-9_]+)$");
    handle_re.captures(input).map(|caps| caps[1].to_lowercase())
}

/// Appends a value to a list if not already present. Returns true when added.
pub fn push_unique(list: &mut Vec<String>, value: &str) -> bool {
    if list.iter().any(|v| v == value) {
        return false;
    }
    list.push(value.to_string());
    true
}

/// Merges an optional new description into an existing one.
/// Distinct non-empty descriptions are joined with a blank line.
pub fn merge_description(existing: Option<&str>, incoming: Option<&str>) -> Option<String> {
    match (
        existing.map(str::trim).filter(|s| !s.is_empty()),
        incoming.map(str::trim).filter(|s| !s.is_empty()),
    ) {
        (Some(old), Some(new)) if old != new => Some(format!("{old}\n\n{new}")),
        (Some(old), _) => Some(old.to_string()),
        (None, Some(new)) => Some(new.to_string()),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lists(up: &[&str], down: &[&str]) -> (Vec<String>, Vec<String>) {
        (
            up.iter().map(|s| s.to_string()).collect(),
            down.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn first_press_adds_vote() {
        let (mut up, mut down) = lists(&[], &[]);
        let outcome = apply_vote(&mut up, &mut down, "alice", VoteDirection::Up);
        assert_eq!(outcome, VoteOutcome::Added);
        assert_eq!(up, vec!["alice"]);
        assert!(down.is_empty());
    }

    #[test]
    fn same_side_press_retracts_vote() {
        let (mut up, mut down) = lists(&["alice"], &[]);
        let outcome = apply_vote(&mut up, &mut down, "alice", VoteDirection::Up);
        assert_eq!(outcome, VoteOutcome::Removed);
        assert!(up.is_empty());
        assert!(down.is_empty());
    }

    #[test]
    fn opposite_press_switches_side() {
        let (mut up, mut down) = lists(&["alice"], &[]);
        let outcome = apply_vote(&mut up, &mut down, "alice", VoteDirection::Down);
        assert_eq!(outcome, VoteOutcome::Switched);
        assert!(up.is_empty());
        assert_eq!(down, vec!["alice"]);
    }

    #[test]
    fn voter_never_ends_up_on_both_sides() {
        let (mut up, mut down) = lists(&[], &[]);
        for dir in [
            VoteDirection::Up,
            VoteDirection::Down,
            VoteDirection::Down,
            VoteDirection::Up,
            VoteDirection::Up,
        ] {
            apply_vote(&mut up, &mut down, "alice", dir);
            let on_up = up.iter().any(|v| v == "alice");
            let on_down = down.iter().any(|v| v == "alice");
            assert!(!(on_up && on_down));
        }
    }

    #[test]
    fn status_prefers_approval_when_both_thresholds_met() {
        let t = Thresholds {
            required_upvotes: 2,
            required_downvotes: 2,
        };
        assert_eq!(derive_status(2, 2, &t), RecordStatus::Approved);
        assert_eq!(derive_status(1, 2, &t), RecordStatus::Rejected);
        assert_eq!(derive_status(1, 1, &t), RecordStatus::Pending);
    }

    #[test]
    fn default_thresholds_are_fifteen_and_three() {
        let t = Thresholds::default();
        assert_eq!(t.required_upvotes, 15);
        assert_eq!(t.required_downvotes, 3);
        assert_eq!(derive_status(15, 0, &t), RecordStatus::Approved);
        assert_eq!(derive_status(0, 3, &t), RecordStatus::Rejected);
        assert_eq!(derive_status(14, 2, &t), RecordStatus::Pending);
    }

    #[test]
    fn parses_profile_url_and_bare_handle() {
        assert_eq!(parse_subject("https://x.com/Alice"), Some("alice".into()));
        assert_eq!(parse_subject("x.com/Bob?s=20"), Some("bob".into()));
        assert_eq!(parse_subject("www.x.com/carol/status"), Some("carol".into()));
        assert_eq!(parse_subject("@Dave_99"), Some("dave_99".into()));
        assert_eq!(parse_subject("Erin"), Some("erin".into()));
        assert_eq!(parse_subject("not a handle!"), None);
        assert_eq!(parse_subject(""), None);
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [RecordStatus::Pending, RecordStatus::Approved, RecordStatus::Rejected] {
            assert_eq!(RecordStatus::from_str(status.as_str()), status);
        }
        assert_eq!(RecordStatus::from_str("bogus"), RecordStatus::Pending);
    }

    #[test]
    fn merges_distinct_descriptions_with_blank_line() {
        assert_eq!(
            merge_description(Some("old"), Some("new")),
            Some("old\n\nnew".into())
        );
        assert_eq!(merge_description(Some("same"), Some("same")), Some("same".into()));
        assert_eq!(merge_description(None, Some("new")), Some("new".into()));
        assert_eq!(merge_description(Some("old"), None), Some("old".into()));
        assert_eq!(merge_description(None, None), None);
        assert_eq!(merge_description(Some("  "), Some("new")), Some("new".into()));
    }

    #[test]
    fn push_unique_skips_duplicates() {
        let mut list = vec!["alice".to_string()];
        assert!(!push_unique(&mut list, "alice"));
        assert!(push_unique(&mut list, "bob"));
        assert_eq!(list, vec!["alice", "bob"]);
    }
}
