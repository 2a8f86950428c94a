//! Outbound effects and their fire-and-forget dispatch.
//!
//! The session engine never talks to notification, live-activity, health
//! or companion services directly. It emits [`Effect`] values into an
//! [`EffectSink`]; a [`Dispatcher`] task hands them to a [`Collaborator`]
//! in order, logs failures and moves on. Effects are best-effort and may
//! be delivered more than once across restarts; they are never a source of
//! truth for session or profile state.

use crate::{Error, FastingState, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One outbound call from the core to an external collaborator
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    ScheduleCompletionNotification {
        fire_after_secs: f64,
    },
    CancelScheduledNotification,
    CreateLiveSession {
        goal_secs: f64,
        initial_zone: &'static str,
        initial_progress: f64,
    },
    UpdateLiveSession {
        zone_name: &'static str,
        progress: f64,
        elapsed_secs: f64,
    },
    EndLiveSession {
        final_progress: f64,
    },
    SyncContext {
        state: FastingState,
        start_timestamp: f64,
        goal_duration: f64,
    },
    /// Health-record write for a finished fast
    PersistCompletedInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl Effect {
    pub fn label(&self) -> &'static str {
        match self {
            Effect::ScheduleCompletionNotification { .. } => "schedule_completion_notification",
            Effect::CancelScheduledNotification => "cancel_scheduled_notification",
            Effect::CreateLiveSession { .. } => "create_live_session",
            Effect::UpdateLiveSession { .. } => "update_live_session",
            Effect::EndLiveSession { .. } => "end_live_session",
            Effect::SyncContext { .. } => "sync_context",
            Effect::PersistCompletedInterval { .. } => "persist_completed_interval",
        }
    }
}

/// Where the engine sends effects. Must not block.
pub trait EffectSink: Send + Sync {
    fn dispatch(&self, effect: Effect);
}

/// The external services behind the effects
pub trait Collaborator: Send + Sync {
    fn apply(&self, effect: &Effect) -> Result<()>;
}

enum Command {
    Effect(Effect),
    Shutdown,
}

/// Sink feeding a running [`Dispatcher`]
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Command>,
}

impl EffectSink for ChannelSink {
    fn dispatch(&self, effect: Effect) {
        let label = effect.label();
        if self.tx.send(Command::Effect(effect)).is_err() {
            tracing::warn!("Dispatcher stopped, dropping {} effect", label);
        }
    }
}

/// Handle to the background task delivering effects
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Command>,
    handle: JoinHandle<()>,
}

impl Dispatcher {
    /// Deliver everything queued so far, then stop the task
    pub async fn shutdown(self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Err(e) = self.handle.await {
            tracing::warn!("Effect dispatcher task failed: {}", e);
        }
    }
}

/// Start the dispatcher task on the current tokio runtime.
///
/// Each effect runs on the blocking pool so slow collaborators never hold up
/// the tick loop; effects are still applied one at a time, in emission order.
pub fn spawn_dispatcher(collaborator: Arc<dyn Collaborator>) -> (ChannelSink, Dispatcher) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Command>();

    let handle = tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            let effect = match command {
                Command::Effect(effect) => effect,
                Command::Shutdown => break,
            };

            let label = effect.label();
            let collaborator = Arc::clone(&collaborator);
            let outcome = tokio::task::spawn_blocking(move || collaborator.apply(&effect)).await;

            match outcome {
                Ok(Ok(())) => tracing::debug!("Delivered {} effect", label),
                Ok(Err(e)) => {
                    let err = Error::SideEffect(format!("{}: {}", label, e));
                    tracing::warn!("{}", err);
                }
                Err(e) => tracing::warn!("Effect {} aborted: {}", label, e),
            }
        }
        tracing::debug!("Effect dispatcher stopped");
    });

    (ChannelSink { tx: tx.clone() }, Dispatcher { tx, handle })
}

/// Sink that keeps every effect in memory, for tests
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct RecordingSink {
    effects: Arc<std::sync::Mutex<Vec<Effect>>>,
}

#[cfg(test)]
impl RecordingSink {
    /// Drain the effects recorded so far
    pub fn take(&self) -> Vec<Effect> {
        std::mem::take(&mut *self.effects.lock().unwrap())
    }
}

#[cfg(test)]
impl EffectSink for RecordingSink {
    fn dispatch(&self, effect: Effect) {
        self.effects.lock().unwrap().push(effect);
    }
}
