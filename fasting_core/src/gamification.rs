//! Streaks, totals and badge unlocks for completed fasts.
//!
//! The engine owns the profile: it is only mutated inside
//! [`GamificationEngine::process_completed_fast`]. The in-memory profile is
//! the source of truth for the running process. If the durable write fails
//! the update is kept and reported; the next successful write reconciles
//! the stored record (at-least-once durability, not a transaction).

use crate::badges::{self, Badge};
use crate::profile::ProfileStore;
use crate::{Error, Profile, Result};
use chrono::{DateTime, Duration, FixedOffset, Utc};

/// What one completed fast changed
#[derive(Debug)]
pub struct FastOutcome {
    pub duration_secs: f64,
    pub current_streak: u32,
    pub total_fasts_completed: u32,
    /// Badges unlocked by this fast (not previously held)
    pub newly_unlocked: Vec<&'static Badge>,
    /// Result of the durable write; an error does not undo the update
    pub persisted: Result<()>,
}

pub struct GamificationEngine {
    profile: Profile,
    store: Box<dyn ProfileStore>,
    /// Offset used to decide calendar days for streaks
    offset: FixedOffset,
    /// Last save failed, so the stored profile is behind this one
    unsaved: bool,
}

impl GamificationEngine {
    /// Load the profile from `store`; an absent record starts an empty profile
    pub fn new(store: Box<dyn ProfileStore>, offset: FixedOffset) -> Self {
        let profile = store.load();
        tracing::debug!(
            "Loaded profile: {} fasts, streak {}",
            profile.total_fasts_completed,
            profile.current_streak
        );
        Self {
            profile,
            store,
            offset,
            unsaved: false,
        }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Reread the stored profile, unless it is behind the in-memory one
    pub fn reload(&mut self) {
        if self.unsaved {
            tracing::debug!("Profile has an unsaved update, keeping in-memory copy");
            return;
        }
        self.profile = self.store.load();
    }

    /// Count a finished fast, update streaks, unlock badges and persist.
    pub fn process_completed_fast(
        &mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> FastOutcome {
        let duration_secs = (end - start).num_milliseconds() as f64 / 1000.0;

        self.profile.total_fasts_completed = self.profile.total_fasts_completed.saturating_add(1);
        update_streak(&mut self.profile, end, &self.offset);

        let mut newly_unlocked = Vec::new();
        for badge in badges::earned(&self.profile, duration_secs) {
            if self.profile.unlock_badge(badge.id) {
                tracing::info!("Unlocked badge: {} ({})", badge.name, badge.id);
                newly_unlocked.push(badge);
            }
        }

        tracing::info!(
            "Completed fast #{} ({:.1}h), streak {} (longest {})",
            self.profile.total_fasts_completed,
            duration_secs / 3600.0,
            self.profile.current_streak,
            self.profile.longest_streak
        );

        let persisted = self.store.save(&self.profile).map_err(|e| {
            tracing::warn!("Failed to save profile: {}. Keeping in-memory update.", e);
            Error::PersistenceWrite(e.to_string())
        });
        self.unsaved = persisted.is_err();

        FastOutcome {
            duration_secs,
            current_streak: self.profile.current_streak,
            total_fasts_completed: self.profile.total_fasts_completed,
            newly_unlocked,
            persisted,
        }
    }
}

/// True if both instants fall on the same calendar day at `offset`
pub fn is_same_day(a: DateTime<Utc>, b: DateTime<Utc>, offset: &FixedOffset) -> bool {
    a.with_timezone(offset).date_naive() == b.with_timezone(offset).date_naive()
}

/// Apply one completion at `completed_at` to the streak counters
///
/// Streak rules:
/// 1. No previous fast → streak starts at 1
/// 2. Completion on the day after the previous one → streak grows by 1
/// 3. Completion on the same day as the previous one → unchanged
/// 4. Anything else (a gap of two or more days) → streak restarts at 1
pub fn update_streak(profile: &mut Profile, completed_at: DateTime<Utc>, offset: &FixedOffset) {
    match profile.last_fast_date {
        None => profile.current_streak = 1,
        Some(last) => {
            if is_same_day(completed_at, last + Duration::hours(24), offset) {
                profile.current_streak = profile.current_streak.saturating_add(1);
            } else if !is_same_day(completed_at, last, offset) {
                tracing::debug!("Streak broken (last fast {}), restarting", last);
                profile.current_streak = 1;
            }
        }
    }

    profile.longest_streak = profile.longest_streak.max(profile.current_streak);
    profile.last_fast_date = Some(completed_at);
}
