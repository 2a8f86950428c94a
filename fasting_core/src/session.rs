//! Session engine: the idle/fasting state machine.
//!
//! ```text
//! Idle --start--> Fasting --end / tick past goal--> Idle
//!                    ^  |
//!                    +--+ edit_start_time
//! ```
//!
//! The engine keeps no timer of its own. The caller drives it with `tick`
//! once per second while a fast is running, and serializes every command
//! (start, end, edit) through the same thread of control as the ticks.
//! Session fields are written through [`SessionStore`] before any effect
//! of the transition is dispatched.

use crate::config::DataPaths;
use crate::effects::{Effect, EffectSink};
use crate::gamification::{FastOutcome, GamificationEngine};
use crate::profile::FileProfileStore;
use crate::session_store::{FileSessionBackend, SessionStore};
use crate::zones::{self, Zone};
use crate::{
    epoch_seconds, from_epoch_seconds, Error, FastingState, Profile, Result, SessionField,
};
use chrono::{DateTime, FixedOffset, Utc};
use std::sync::Arc;

/// Live-session refresh cadence, in whole elapsed seconds
pub const ZONE_UPDATE_INTERVAL_SECS: i64 = 30;

/// A fast that just ended
#[derive(Debug)]
pub struct CompletedFast {
    pub end: DateTime<Utc>,
    /// Raw elapsed seconds at the end; negative if the start was moved past `end`
    pub elapsed_secs: f64,
    pub goal_secs: f64,
    /// Gamification result, absent if the session had no usable start time
    pub outcome: Option<FastOutcome>,
}

impl CompletedFast {
    pub fn reached_goal(&self) -> bool {
        self.elapsed_secs >= self.goal_secs
    }
}

pub struct SessionEngine {
    store: SessionStore,
    gamification: GamificationEngine,
    effects: Arc<dyn EffectSink>,
    /// Derived from `now - start`, refreshed on every tick and transition
    elapsed: f64,
}

impl SessionEngine {
    /// Build the engine around existing stores, resuming any fast in progress.
    pub fn new(
        store: SessionStore,
        gamification: GamificationEngine,
        effects: Arc<dyn EffectSink>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut engine = Self {
            store,
            gamification,
            effects,
            elapsed: 0.0,
        };

        if engine.state() == FastingState::Fasting {
            engine.elapsed = engine.elapsed_at(now);
            tracing::info!(
                "Resumed fast: {:.0}s of {:.0}s elapsed",
                engine.elapsed,
                engine.goal()
            );
        }

        engine.store.sync_context();
        engine
    }

    /// Build the engine on the JSON files under `paths`
    pub fn open(
        paths: &DataPaths,
        offset: FixedOffset,
        effects: Arc<dyn EffectSink>,
        now: DateTime<Utc>,
    ) -> Self {
        let store = SessionStore::open(
            Box::new(FileSessionBackend::new(&paths.session)),
            Arc::clone(&effects),
        );
        let gamification =
            GamificationEngine::new(Box::new(FileProfileStore::new(&paths.profile)), offset);
        Self::new(store, gamification, effects, now)
    }

    /// Re-read the durable session and profile, picking up transitions made
    /// by another process since this engine was built. Dispatches nothing.
    pub fn reload(&mut self, now: DateTime<Utc>) {
        let was_fasting = self.is_fasting();
        self.store.reload();
        self.gamification.reload();

        self.elapsed = if self.is_fasting() {
            self.elapsed_at(now)
        } else {
            0.0
        };
        if was_fasting && !self.is_fasting() {
            tracing::info!("Fast was ended elsewhere");
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> FastingState {
        self.store.session().state
    }

    pub fn is_fasting(&self) -> bool {
        self.state() == FastingState::Fasting
    }

    /// Elapsed seconds as of the last tick or transition (0 when idle)
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn goal(&self) -> f64 {
        self.store.session().goal_duration
    }

    pub fn start_timestamp(&self) -> f64 {
        self.store.session().start_timestamp
    }

    pub fn current_zone(&self) -> &'static Zone {
        zones::zone_for(self.elapsed)
    }

    /// Fraction of the goal completed, `0.0..=1.0`
    pub fn progress(&self) -> f64 {
        zones::zone_progress(self.elapsed, self.goal())
    }

    pub fn remaining(&self) -> f64 {
        (self.goal() - self.elapsed).max(0.0)
    }

    pub fn time_in_current_zone(&self) -> f64 {
        zones::time_in_current_zone(self.elapsed)
    }

    pub fn profile(&self) -> &Profile {
        self.gamification.profile()
    }

    /// True while the durable session record lags the in-memory one
    pub fn has_unsaved_session(&self) -> bool {
        self.store.is_dirty()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Begin a fast of `goal` seconds at `now`.
    pub fn start(&mut self, goal: f64, now: DateTime<Utc>) -> Result<()> {
        if self.is_fasting() {
            return Err(Error::InvalidState("a fast is already in progress".into()));
        }
        if !goal.is_finite() || goal <= 0.0 {
            return Err(Error::InvalidGoal(goal));
        }

        self.store.put(&[
            SessionField::StartTimestamp(epoch_seconds(now)),
            SessionField::GoalDuration(goal),
            SessionField::State(FastingState::Fasting),
        ]);
        self.elapsed = 0.0;

        tracing::info!("Started fast with a {:.1}h goal", goal / 3600.0);

        self.effects.dispatch(Effect::ScheduleCompletionNotification {
            fire_after_secs: goal,
        });
        self.effects.dispatch(Effect::CreateLiveSession {
            goal_secs: goal,
            initial_zone: zones::first().name,
            initial_progress: 0.0,
        });
        Ok(())
    }

    /// Advance the clock to `now`.
    ///
    /// Refreshes the live session every 30 elapsed seconds and ends the fast
    /// once the goal is reached; returns the completed fast in that case.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<CompletedFast> {
        if !self.is_fasting() {
            return None;
        }

        self.elapsed = self.elapsed_at(now);

        if (self.elapsed.floor() as i64) % ZONE_UPDATE_INTERVAL_SECS == 0 {
            self.publish_zone_update();
        }

        if self.elapsed >= self.goal() {
            tracing::info!("Fasting goal reached after {:.0}s", self.elapsed);
            return self.end(now);
        }

        None
    }

    /// End the running fast at `now`. Ending while idle does nothing.
    pub fn end(&mut self, now: DateTime<Utc>) -> Option<CompletedFast> {
        if !self.is_fasting() {
            tracing::debug!("End requested while idle, nothing to do");
            return None;
        }

        self.elapsed = self.elapsed_at(now);
        let goal_secs = self.goal();
        let start_ts = self.start_timestamp();

        let start = if start_ts > 0.0 {
            from_epoch_seconds(start_ts)
        } else {
            None
        };
        if start.is_none() {
            tracing::warn!("Fast has no usable start time ({}), not counted", start_ts);
        }

        let outcome = start.map(|start| self.gamification.process_completed_fast(start, now));

        self.store.put(&[
            SessionField::State(FastingState::Idle),
            SessionField::StartTimestamp(0.0),
            SessionField::GoalDuration(0.0),
        ]);

        tracing::info!("Ended fast after {:.0}s", self.elapsed);

        if let Some(start) = start {
            self.effects
                .dispatch(Effect::PersistCompletedInterval { start, end: now });
        }
        self.effects.dispatch(Effect::CancelScheduledNotification);
        self.effects.dispatch(Effect::EndLiveSession { final_progress: 1.0 });

        Some(CompletedFast {
            end: now,
            elapsed_secs: self.elapsed,
            goal_secs,
            outcome,
        })
    }

    /// Move the start of the running fast to `new_start`.
    ///
    /// A start in the future gives a negative elapsed time. It is kept as-is
    /// for the eventual completion, while zone and progress read it as zero.
    pub fn edit_start_time(&mut self, new_start: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
        if !self.is_fasting() {
            return Err(Error::InvalidState("no fast in progress".into()));
        }

        let start_ts = epoch_seconds(new_start);
        if start_ts <= 0.0 {
            return Err(Error::Other(format!(
                "start time {} is before the Unix epoch",
                new_start
            )));
        }

        self.store.put(&[SessionField::StartTimestamp(start_ts)]);
        self.elapsed = self.elapsed_at(now);

        tracing::info!(
            "Moved fast start to {}, {:.0}s elapsed",
            new_start.to_rfc3339(),
            self.elapsed
        );

        self.publish_zone_update();

        self.effects.dispatch(Effect::CancelScheduledNotification);
        let remaining = self.goal() - self.elapsed;
        if remaining > 0.0 {
            self.effects.dispatch(Effect::ScheduleCompletionNotification {
                fire_after_secs: remaining,
            });
        }
        Ok(())
    }

    fn publish_zone_update(&self) {
        self.effects.dispatch(Effect::UpdateLiveSession {
            zone_name: self.current_zone().name,
            progress: self.progress(),
            elapsed_secs: self.elapsed,
        });
    }

    /// Seconds from the stored start to `now`, computed on whole milliseconds
    fn elapsed_at(&self, now: DateTime<Utc>) -> f64 {
        let start_ms = (self.start_timestamp() * 1000.0).round() as i64;
        (now.timestamp_millis() - start_ms) as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::RecordingSink;
    use crate::profile::MemoryProfileStore;
    use crate::session_store::MemorySessionBackend;
    use crate::Session;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::Ordering;

    const HOUR: f64 = 3600.0;

    struct Harness {
        engine: SessionEngine,
        sink: RecordingSink,
        sessions: MemorySessionBackend,
        profiles: MemoryProfileStore,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 8, 0, 0).unwrap()
    }

    fn secs(n: i64) -> Duration {
        Duration::seconds(n)
    }

    fn harness_with(sessions: MemorySessionBackend, now: DateTime<Utc>) -> Harness {
        crate::logging::init_test();
        let sink = RecordingSink::default();
        let profiles = MemoryProfileStore::default();
        let effects: Arc<dyn EffectSink> = Arc::new(sink.clone());

        let store = SessionStore::open(Box::new(sessions.clone()), Arc::clone(&effects));
        let gamification = GamificationEngine::new(
            Box::new(profiles.clone()),
            FixedOffset::east_opt(0).unwrap(),
        );
        let engine = SessionEngine::new(store, gamification, effects, now);
        sink.take();

        Harness {
            engine,
            sink,
            sessions,
            profiles,
        }
    }

    fn harness() -> Harness {
        harness_with(MemorySessionBackend::default(), t0())
    }

    fn fasting_harness(goal: f64) -> Harness {
        let mut h = harness();
        h.engine.start(goal, t0()).unwrap();
        h.sink.take();
        h
    }

    #[test]
    fn test_end_without_usable_start_is_not_counted() {
        let sessions = MemorySessionBackend::default();
        *sessions.saved.lock().unwrap() = Some(Session {
            state: FastingState::Fasting,
            start_timestamp: 1e300,
            goal_duration: HOUR,
        });
        let mut h = harness_with(sessions, t0());
        assert!(h.engine.is_fasting());

        let completed = h.engine.end(t0()).unwrap();

        assert!(completed.outcome.is_none());
        assert!(!h.engine.is_fasting());
        assert_eq!(h.engine.profile().total_fasts_completed, 0);
        assert!(h.profiles.saved.lock().unwrap().is_none());

        let effects = h.sink.take();
        assert!(!effects
            .iter()
            .any(|e| matches!(e, Effect::PersistCompletedInterval { .. })));
        assert!(effects.contains(&Effect::CancelScheduledNotification));
        assert!(effects.contains(&Effect::EndLiveSession { final_progress: 1.0 }));
        assert_eq!(
            h.sessions.saved.lock().unwrap().clone(),
            Some(Session::default())
        );
    }

    #[test]
    fn test_reload_sees_fast_ended_elsewhere() {
        let mut h = fasting_harness(16.0 * HOUR);
        let sessions = h.sessions.clone();
        let profiles = h.profiles.clone();

        // A second engine over the same records ends the fast
        let mut other = {
            let effects: Arc<dyn EffectSink> = Arc::new(RecordingSink::default());
            let store = SessionStore::open(Box::new(sessions), Arc::clone(&effects));
            let gamification = GamificationEngine::new(
                Box::new(profiles),
                FixedOffset::east_opt(0).unwrap(),
            );
            SessionEngine::new(store, gamification, effects, t0() + secs(7200))
        };
        other.end(t0() + secs(7200)).unwrap();

        h.engine.reload(t0() + secs(7201));

        assert!(!h.engine.is_fasting());
        assert_eq!(h.engine.elapsed(), 0.0);
        assert_eq!(h.engine.profile().total_fasts_completed, 1);
        assert!(h.engine.tick(t0() + secs(7202)).is_none());
        assert!(h.engine.end(t0() + secs(7203)).is_none());
        assert!(h.sink.take().is_empty());
    }

    #[test]
    fn test_reload_refreshes_elapsed_after_external_edit() {
        let mut h = fasting_harness(16.0 * HOUR);
        let earlier = t0() - secs(3600);
        *h.sessions.saved.lock().unwrap() = Some(Session {
            state: FastingState::Fasting,
            start_timestamp: epoch_seconds(earlier),
            goal_duration: 16.0 * HOUR,
        });

        h.engine.reload(t0() + secs(60));

        assert!(h.engine.is_fasting());
        assert_eq!(h.engine.elapsed(), 3660.0);
        assert_eq!(h.engine.start_timestamp(), epoch_seconds(earlier));
    }

    #[test]
    fn test_start_from_idle() {
        let mut h = harness();

        h.engine.start(16.0 * HOUR, t0()).unwrap();

        assert_eq!(h.engine.state(), FastingState::Fasting);
        assert_eq!(h.engine.elapsed(), 0.0);
        assert_eq!(h.engine.goal(), 16.0 * HOUR);
        assert_eq!(h.engine.start_timestamp(), epoch_seconds(t0()));
        assert_eq!(h.engine.current_zone().name, "Anabolic");

        let saved = h.sessions.saved.lock().unwrap().clone().unwrap();
        assert_eq!(saved.state, FastingState::Fasting);

        assert_eq!(
            h.sink.take(),
            vec![
                Effect::SyncContext {
                    state: FastingState::Fasting,
                    start_timestamp: epoch_seconds(t0()),
                    goal_duration: 16.0 * HOUR,
                },
                Effect::ScheduleCompletionNotification {
                    fire_after_secs: 16.0 * HOUR
                },
                Effect::CreateLiveSession {
                    goal_secs: 16.0 * HOUR,
                    initial_zone: "Anabolic",
                    initial_progress: 0.0,
                },
            ]
        );
    }

    #[test]
    fn test_start_while_fasting_is_rejected() {
        let mut h = fasting_harness(16.0 * HOUR);

        let err = h.engine.start(18.0 * HOUR, t0() + secs(60)).unwrap_err();

        assert!(matches!(err, Error::InvalidState(_)));
        assert_eq!(h.engine.goal(), 16.0 * HOUR);
        assert!(h.sink.take().is_empty());
    }

    #[test]
    fn test_start_requires_positive_goal() {
        let mut h = harness();

        assert!(matches!(h.engine.start(0.0, t0()), Err(Error::InvalidGoal(_))));
        assert!(matches!(h.engine.start(-60.0, t0()), Err(Error::InvalidGoal(_))));
        assert_eq!(h.engine.state(), FastingState::Idle);
        assert!(h.sessions.saved.lock().unwrap().is_none());
    }

    #[test]
    fn test_tick_while_idle_is_noop() {
        let mut h = harness();

        assert!(h.engine.tick(t0() + secs(30)).is_none());
        assert_eq!(h.engine.elapsed(), 0.0);
        assert!(h.sink.take().is_empty());
    }

    #[test]
    fn test_tick_reports_zone_and_progress() {
        let mut h = fasting_harness(57_600.0);

        assert!(h.engine.tick(t0() + secs(14_400)).is_none());

        assert_eq!(h.engine.current_zone().name, "Catabolic");
        assert_eq!(h.engine.progress(), 0.25);
        assert_eq!(
            h.sink.take(),
            vec![Effect::UpdateLiveSession {
                zone_name: "Catabolic",
                progress: 0.25,
                elapsed_secs: 14_400.0,
            }]
        );
    }

    #[test]
    fn test_zone_update_only_on_thirty_second_marks() {
        let mut h = fasting_harness(HOUR);

        for n in [1, 29, 31, 59] {
            h.engine.tick(t0() + secs(n));
        }
        assert!(h.sink.take().is_empty());

        h.engine.tick(t0() + secs(60));
        assert_eq!(h.sink.take().len(), 1);
    }

    #[test]
    fn test_tick_past_goal_completes_fast() {
        let mut h = fasting_harness(HOUR);

        let completed = h.engine.tick(t0() + secs(3600)).unwrap();

        assert!(completed.reached_goal());
        assert_eq!(completed.elapsed_secs, HOUR);
        assert_eq!(h.engine.state(), FastingState::Idle);
        assert_eq!(h.engine.goal(), 0.0);
        assert_eq!(h.engine.start_timestamp(), 0.0);
        assert_eq!(h.engine.profile().total_fasts_completed, 1);

        let effects = h.sink.take();
        assert!(effects.contains(&Effect::PersistCompletedInterval {
            start: t0(),
            end: t0() + secs(3600),
        }));
        assert!(effects.contains(&Effect::CancelScheduledNotification));
        assert_eq!(
            effects.last(),
            Some(&Effect::EndLiveSession { final_progress: 1.0 })
        );
    }

    #[test]
    fn test_end_persists_idle_before_effects() {
        let mut h = fasting_harness(16.0 * HOUR);

        let completed = h.engine.end(t0() + secs(2 * 3600)).unwrap();

        assert!(!completed.reached_goal());
        let outcome = completed.outcome.unwrap();
        assert_eq!(outcome.duration_secs, 2.0 * HOUR);
        assert!(outcome.persisted.is_ok());

        let saved = h.sessions.saved.lock().unwrap().clone().unwrap();
        assert_eq!(saved, Session::default());
        let profile = h.profiles.saved.lock().unwrap().clone().unwrap();
        assert_eq!(profile.total_fasts_completed, 1);

        let effects = h.sink.take();
        assert!(matches!(
            effects.first(),
            Some(Effect::SyncContext {
                state: FastingState::Idle,
                ..
            })
        ));
    }

    #[test]
    fn test_end_twice_counts_once() {
        let mut h = fasting_harness(16.0 * HOUR);

        assert!(h.engine.end(t0() + secs(100)).is_some());
        h.sink.take();
        assert!(h.engine.end(t0() + secs(200)).is_none());

        assert_eq!(h.engine.profile().total_fasts_completed, 1);
        assert!(h.sink.take().is_empty());
    }

    #[test]
    fn test_edit_start_time_recomputes_elapsed() {
        let mut h = fasting_harness(16.0 * HOUR);
        let now = t0() + secs(600);

        h.engine.edit_start_time(now - secs(5000), now).unwrap();

        assert_eq!(h.engine.elapsed(), 5000.0);
        assert_eq!(h.engine.goal(), 16.0 * HOUR);
        assert_eq!(
            h.sink.take(),
            vec![
                Effect::SyncContext {
                    state: FastingState::Fasting,
                    start_timestamp: epoch_seconds(now - secs(5000)),
                    goal_duration: 16.0 * HOUR,
                },
                Effect::UpdateLiveSession {
                    zone_name: "Anabolic",
                    progress: 5000.0 / (16.0 * HOUR),
                    elapsed_secs: 5000.0,
                },
                Effect::CancelScheduledNotification,
                Effect::ScheduleCompletionNotification {
                    fire_after_secs: 16.0 * HOUR - 5000.0
                },
            ]
        );
    }

    #[test]
    fn test_edit_start_time_while_idle_is_rejected() {
        let mut h = harness();

        let err = h.engine.edit_start_time(t0() - secs(60), t0()).unwrap_err();

        assert!(matches!(err, Error::InvalidState(_)));
        assert!(h.sink.take().is_empty());
    }

    #[test]
    fn test_future_start_keeps_raw_elapsed() {
        let mut h = fasting_harness(16.0 * HOUR);
        let now = t0() + secs(60);

        h.engine.edit_start_time(now + secs(600), now).unwrap();

        assert_eq!(h.engine.elapsed(), -600.0);
        assert_eq!(h.engine.current_zone().name, "Anabolic");
        assert_eq!(h.engine.progress(), 0.0);
        assert_eq!(h.engine.time_in_current_zone(), 0.0);

        let completed = h.engine.end(now).unwrap();
        assert_eq!(completed.elapsed_secs, -600.0);
        assert_eq!(completed.outcome.unwrap().duration_secs, -600.0);
    }

    #[test]
    fn test_edit_past_goal_waits_for_tick() {
        let mut h = fasting_harness(HOUR);
        let now = t0() + secs(60);

        h.engine.edit_start_time(now - secs(2 * 3600), now).unwrap();
        assert!(h.engine.is_fasting());
        assert!(!h
            .sink
            .take()
            .iter()
            .any(|e| matches!(e, Effect::ScheduleCompletionNotification { .. })));

        let completed = h.engine.tick(now + secs(1)).unwrap();
        assert!(completed.reached_goal());
    }

    #[test]
    fn test_resume_after_restart() {
        let sessions = MemorySessionBackend::default();
        {
            let mut h = harness_with(sessions.clone(), t0());
            h.engine.start(16.0 * HOUR, t0()).unwrap();
        }

        let h = harness_with(sessions, t0() + secs(7200));

        assert_eq!(h.engine.state(), FastingState::Fasting);
        assert_eq!(h.engine.elapsed(), 7200.0);
        assert_eq!(h.engine.remaining(), 14.0 * HOUR);
    }

    #[test]
    fn test_resume_past_goal_completes_on_first_tick() {
        let sessions = MemorySessionBackend::default();
        *sessions.saved.lock().unwrap() = Some(Session {
            state: FastingState::Fasting,
            start_timestamp: epoch_seconds(t0()),
            goal_duration: HOUR,
        });

        let mut h = harness_with(sessions, t0() + secs(5 * 3600));
        let completed = h.engine.tick(t0() + secs(5 * 3600)).unwrap();

        assert_eq!(completed.elapsed_secs, 5.0 * HOUR);
        assert_eq!(h.engine.state(), FastingState::Idle);
    }

    #[test]
    fn test_session_write_failure_does_not_block_transition() {
        let sessions = MemorySessionBackend::default();
        sessions.fail_writes.store(true, Ordering::SeqCst);
        let mut h = harness_with(sessions.clone(), t0());

        h.engine.start(HOUR, t0()).unwrap();

        assert!(h.engine.is_fasting());
        assert!(h.engine.has_unsaved_session());

        sessions.fail_writes.store(false, Ordering::SeqCst);
        h.engine.end(t0() + secs(10));
        assert!(!h.engine.has_unsaved_session());
        assert_eq!(sessions.saved.lock().unwrap().clone().unwrap(), Session::default());
    }

    #[test]
    fn test_file_backed_engine_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(temp_dir.path());
        let offset = FixedOffset::east_opt(0).unwrap();
        let sink: Arc<dyn EffectSink> = Arc::new(RecordingSink::default());

        let mut engine = SessionEngine::open(&paths, offset, Arc::clone(&sink), t0());
        engine.start(HOUR, t0()).unwrap();
        drop(engine);

        let mut engine = SessionEngine::open(&paths, offset, Arc::clone(&sink), t0() + secs(1800));
        assert_eq!(engine.elapsed(), 1800.0);
        engine.tick(t0() + secs(3600)).unwrap();
        drop(engine);

        let engine = SessionEngine::open(&paths, offset, sink, t0() + secs(4000));
        assert_eq!(engine.state(), FastingState::Idle);
        assert_eq!(engine.profile().total_fasts_completed, 1);
        assert!(engine.profile().has_badge("first_fast"));
    }
}
