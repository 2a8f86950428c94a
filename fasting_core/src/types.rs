//! Core domain types for the fasting tracker.
//!
//! This module defines the fundamental types used throughout the system:
//! - The persisted fasting session record
//! - The lifetime profile aggregate
//! - Conversions between wall-clock instants and epoch seconds

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ============================================================================
// Session Types
// ============================================================================

/// Whether a fast is currently in progress
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FastingState {
    #[default]
    Idle,
    Fasting,
}

impl FastingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FastingState::Idle => "idle",
            FastingState::Fasting => "fasting",
        }
    }
}

/// The durable part of the single active-or-idle fasting session.
///
/// Elapsed time is derived from `start_timestamp` and never stored.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub state: FastingState,
    /// Seconds since the Unix epoch, 0 when idle
    #[serde(default)]
    pub start_timestamp: f64,
    /// Goal length in seconds, 0 when idle
    #[serde(default)]
    pub goal_duration: f64,
}

impl Session {
    /// Repair a record that violates the idle/fasting invariant.
    ///
    /// Returns true if anything was changed.
    pub fn normalize(&mut self) -> bool {
        match self.state {
            FastingState::Idle => {
                if self.start_timestamp != 0.0 || self.goal_duration != 0.0 {
                    self.start_timestamp = 0.0;
                    self.goal_duration = 0.0;
                    return true;
                }
                false
            }
            FastingState::Fasting => {
                let valid = self.goal_duration.is_finite()
                    && self.goal_duration > 0.0
                    && self.start_timestamp.is_finite()
                    && self.start_timestamp > 0.0;
                if !valid {
                    *self = Session::default();
                    return true;
                }
                false
            }
        }
    }
}

/// A single field write against the session record
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SessionField {
    State(FastingState),
    StartTimestamp(f64),
    GoalDuration(f64),
}

impl SessionField {
    pub fn apply(self, session: &mut Session) {
        match self {
            SessionField::State(state) => session.state = state,
            SessionField::StartTimestamp(ts) => session.start_timestamp = ts,
            SessionField::GoalDuration(goal) => session.goal_duration = goal,
        }
    }
}

// ============================================================================
// Profile Types
// ============================================================================

/// Lifetime statistics and achievements, persisted as one record
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub current_streak: u32,
    #[serde(default)]
    pub longest_streak: u32,
    #[serde(default)]
    pub total_fasts_completed: u32,
    #[serde(default)]
    pub last_fast_date: Option<DateTime<Utc>>,
    #[serde(default, rename = "unlockedBadgeIDs")]
    pub unlocked_badge_ids: BTreeSet<String>,
}

impl Profile {
    /// Insert a badge id; returns true if it was not already unlocked
    pub fn unlock_badge(&mut self, id: &str) -> bool {
        if self.unlocked_badge_ids.contains(id) {
            return false;
        }
        self.unlocked_badge_ids.insert(id.to_string())
    }

    pub fn has_badge(&self, id: &str) -> bool {
        self.unlocked_badge_ids.contains(id)
    }
}

// ============================================================================
// Time Conversions
// ============================================================================

/// Instant as fractional seconds since the Unix epoch (millisecond precision)
pub fn epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

/// Fractional epoch seconds back to an instant, if representable
pub fn from_epoch_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis((secs * 1000.0).round() as i64)
}
