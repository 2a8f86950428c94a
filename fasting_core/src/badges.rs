//! Badge catalogue and unlock rules.
//!
//! Badges are one-way: the rules only ever add ids to a profile.

use crate::{zones, Profile};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Condition under which a badge unlocks
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BadgeRule {
    /// The very first completed fast
    FirstFast,
    /// Lifetime completed fasts reach a count
    TotalFasts(u32),
    /// Current streak reaches a number of days
    Streak(u32),
    /// A single fast lasts at least this many seconds
    Duration(f64),
}

impl BadgeRule {
    /// Whether the rule holds after a fast of `duration_secs` has been counted
    pub fn is_met(&self, profile: &Profile, duration_secs: f64) -> bool {
        match *self {
            BadgeRule::FirstFast => profile.total_fasts_completed == 1,
            BadgeRule::TotalFasts(n) => profile.total_fasts_completed >= n,
            BadgeRule::Streak(days) => profile.current_streak >= days,
            BadgeRule::Duration(secs) => duration_secs >= secs,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Badge {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub rule: BadgeRule,
}

static BADGES: Lazy<Vec<Badge>> = Lazy::new(|| {
    vec![
        Badge {
            id: "first_fast",
            name: "First Fast",
            description: "Completed your first fast.",
            rule: BadgeRule::FirstFast,
        },
        Badge {
            id: "7_day_streak",
            name: "7-Day Warrior",
            description: "Completed a 7-day fasting streak.",
            rule: BadgeRule::Streak(7),
        },
        Badge {
            id: "30_day_streak",
            name: "Month of Consistency",
            description: "Completed a 30-day fasting streak.",
            rule: BadgeRule::Streak(30),
        },
        Badge {
            id: "10_fasts",
            name: "Fast Follower",
            description: "Completed 10 fasts.",
            rule: BadgeRule::TotalFasts(10),
        },
        Badge {
            id: "50_fasts",
            name: "Fasting Fanatic",
            description: "Completed 50 fasts.",
            rule: BadgeRule::TotalFasts(50),
        },
        Badge {
            id: "24_hour_fast",
            name: "24-Hour Club",
            description: "Completed a 24-hour fast.",
            rule: BadgeRule::Duration(24.0 * 3600.0),
        },
        Badge {
            id: "autophagy_unlocked",
            name: "Cellular Cleaner",
            description: "Reached the Autophagy zone.",
            rule: BadgeRule::Duration(zones::autophagy().threshold_seconds),
        },
    ]
});

static BADGE_INDEX: Lazy<HashMap<&'static str, usize>> = Lazy::new(|| {
    BADGES
        .iter()
        .enumerate()
        .map(|(i, b)| (b.id, i))
        .collect()
});

/// All badges in display order
pub fn all() -> &'static [Badge] {
    &BADGES
}

/// Look up a badge by id
pub fn badge(id: &str) -> Option<&'static Badge> {
    BADGE_INDEX.get(id).map(|&i| &BADGES[i])
}

/// Badges whose rules hold for the profile after a fast of `duration_secs`.
///
/// Does not consider what is already unlocked; callers union the result.
pub fn earned(profile: &Profile, duration_secs: f64) -> Vec<&'static Badge> {
    BADGES
        .iter()
        .filter(|b| b.rule.is_met(profile, duration_secs))
        .collect()
}
