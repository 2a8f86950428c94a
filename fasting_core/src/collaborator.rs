//! Collaborators for running on a single machine.
//!
//! Notifications and the live session are surfaced through the log, the
//! health store is the interval journal, and the companion device reads a
//! context snapshot file.

use crate::effects::{Collaborator, Effect};
use crate::journal::{CompletedInterval, IntervalJournal};
use crate::persist::save_json_atomic;
use crate::{FastingState, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Snapshot of the session as seen by a companion device
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompanionContext {
    pub state: FastingState,
    pub start_timestamp: f64,
    pub goal_duration: f64,
    pub synced_at: Option<DateTime<Utc>>,
}

pub struct LocalCollaborator {
    journal: IntervalJournal,
    context_path: PathBuf,
}

impl LocalCollaborator {
    pub fn new(journal_path: impl Into<PathBuf>, context_path: impl Into<PathBuf>) -> Self {
        Self {
            journal: IntervalJournal::new(journal_path),
            context_path: context_path.into(),
        }
    }
}

impl Collaborator for LocalCollaborator {
    fn apply(&self, effect: &Effect) -> Result<()> {
        match effect {
            Effect::ScheduleCompletionNotification { fire_after_secs } => {
                tracing::info!(
                    "Completion notification scheduled in {:.1}h",
                    fire_after_secs / 3600.0
                );
            }
            Effect::CancelScheduledNotification => {
                tracing::info!("Pending completion notification cancelled");
            }
            Effect::CreateLiveSession {
                goal_secs,
                initial_zone,
                initial_progress,
            } => {
                tracing::info!(
                    "Live session started: goal {:.1}h, zone {}, {:.0}%",
                    goal_secs / 3600.0,
                    initial_zone,
                    initial_progress * 100.0
                );
            }
            Effect::UpdateLiveSession {
                zone_name,
                progress,
                elapsed_secs,
            } => {
                tracing::debug!(
                    "Live session: {} at {:.0}% ({:.0}s elapsed)",
                    zone_name,
                    progress * 100.0,
                    elapsed_secs
                );
            }
            Effect::EndLiveSession { final_progress } => {
                tracing::info!("Live session ended at {:.0}%", final_progress * 100.0);
            }
            Effect::SyncContext {
                state,
                start_timestamp,
                goal_duration,
            } => {
                let context = CompanionContext {
                    state: *state,
                    start_timestamp: *start_timestamp,
                    goal_duration: *goal_duration,
                    synced_at: Some(Utc::now()),
                };
                save_json_atomic(&self.context_path, &context)?;
            }
            Effect::PersistCompletedInterval { start, end } => {
                self.journal.append(&CompletedInterval::new(*start, *end))?;
            }
        }
        Ok(())
    }
}
