//! Write-through store for the fasting session record.
//!
//! Every mutation goes through [`SessionStore::put`], which saves the whole
//! record synchronously and only then publishes the new context to the
//! companion device. A failed save never blocks the in-memory transition:
//! it is logged, the store is marked dirty, and the next `put` rewrites the
//! full record.

use crate::effects::{Effect, EffectSink};
use crate::persist::{load_json_or_default, save_json_atomic};
use crate::{Result, Session, SessionField};
use std::path::PathBuf;
use std::sync::Arc;

/// Durable home of the session record
pub trait SessionBackend: Send {
    /// Load the last saved record; a missing record is an idle session
    fn load(&self) -> Session;
    fn save(&mut self, session: &Session) -> Result<()>;
}

/// JSON file backend with locking and atomic replace
pub struct FileSessionBackend {
    path: PathBuf,
}

impl FileSessionBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SessionBackend for FileSessionBackend {
    fn load(&self) -> Session {
        load_json_or_default(&self.path)
    }

    fn save(&mut self, session: &Session) -> Result<()> {
        save_json_atomic(&self.path, session)
    }
}

pub struct SessionStore {
    session: Session,
    backend: Box<dyn SessionBackend>,
    effects: Arc<dyn EffectSink>,
    dirty: bool,
}

impl SessionStore {
    /// Load the persisted record, repairing it if it breaks the session invariant
    pub fn open(mut backend: Box<dyn SessionBackend>, effects: Arc<dyn EffectSink>) -> Self {
        let (session, dirty) = load_normalized(backend.as_mut());
        Self {
            session,
            backend,
            effects,
            dirty,
        }
    }

    /// Replace the in-memory record with the durable one.
    ///
    /// Picks up changes made by another process. A record that is still dirty
    /// here is rewritten instead, since the durable copy is the stale one.
    pub fn reload(&mut self) {
        if self.dirty {
            tracing::debug!("Session record unsaved, rewriting instead of reloading");
            self.put(&[]);
            return;
        }
        let (session, dirty) = load_normalized(self.backend.as_mut());
        self.session = session;
        self.dirty = dirty;
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// True if the last save failed and the durable record is stale
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Apply field writes, persist the record, then sync the context.
    pub fn put(&mut self, fields: &[SessionField]) {
        for field in fields {
            field.apply(&mut self.session);
        }

        match self.backend.save(&self.session) {
            Ok(()) => {
                if self.dirty {
                    tracing::info!("Session record persisted after earlier write failure");
                }
                self.dirty = false;
            }
            Err(e) => {
                self.dirty = true;
                tracing::warn!(
                    "Persistence write failed for session record: {}. Will retry on next change.",
                    e
                );
            }
        }

        self.sync_context();
    }

    /// Publish the current record to the companion device
    pub fn sync_context(&self) {
        self.effects.dispatch(Effect::SyncContext {
            state: self.session.state,
            start_timestamp: self.session.start_timestamp,
            goal_duration: self.session.goal_duration,
        });
    }
}

fn load_normalized(backend: &mut dyn SessionBackend) -> (Session, bool) {
    let mut session = backend.load();
    let mut dirty = false;

    if session.normalize() {
        tracing::warn!("Persisted session was inconsistent, reset to {:?}", session);
        if let Err(e) = backend.save(&session) {
            tracing::warn!("Failed to save repaired session record: {}", e);
            dirty = true;
        }
    }

    (session, dirty)
}

/// In-memory backend that can be told to fail, for tests
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct MemorySessionBackend {
    pub saved: Arc<std::sync::Mutex<Option<Session>>>,
    pub fail_writes: Arc<std::sync::atomic::AtomicBool>,
}

#[cfg(test)]
impl SessionBackend for MemorySessionBackend {
    fn load(&self) -> Session {
        self.saved.lock().unwrap().clone().unwrap_or_default()
    }

    fn save(&mut self, session: &Session) -> Result<()> {
        if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(crate::Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        *self.saved.lock().unwrap() = Some(session.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::RecordingSink;
    use crate::FastingState;
    use std::sync::atomic::Ordering;

    fn fasting_fields() -> [SessionField; 3] {
        [
            SessionField::StartTimestamp(1_700_000_000.0),
            SessionField::GoalDuration(57_600.0),
            SessionField::State(FastingState::Fasting),
        ]
    }

    #[test]
    fn test_put_persists_then_syncs() {
        let backend = MemorySessionBackend::default();
        let sink = RecordingSink::default();
        let mut store = SessionStore::open(Box::new(backend.clone()), Arc::new(sink.clone()));

        store.put(&fasting_fields());

        let saved = backend.saved.lock().unwrap().clone().unwrap();
        assert_eq!(saved.state, FastingState::Fasting);
        assert_eq!(saved.goal_duration, 57_600.0);
        assert_eq!(
            sink.take(),
            vec![Effect::SyncContext {
                state: FastingState::Fasting,
                start_timestamp: 1_700_000_000.0,
                goal_duration: 57_600.0,
            }]
        );
    }

    #[test]
    fn test_failed_write_keeps_memory_and_retries() {
        let backend = MemorySessionBackend::default();
        backend.fail_writes.store(true, Ordering::SeqCst);
        let sink = RecordingSink::default();
        let mut store = SessionStore::open(Box::new(backend.clone()), Arc::new(sink.clone()));

        store.put(&fasting_fields());
        assert!(store.is_dirty());
        assert_eq!(store.session().state, FastingState::Fasting);
        assert!(backend.saved.lock().unwrap().is_none());
        // Context still goes out even though the write failed
        assert_eq!(sink.take().len(), 1);

        backend.fail_writes.store(false, Ordering::SeqCst);
        store.put(&[SessionField::StartTimestamp(1_700_000_100.0)]);

        assert!(!store.is_dirty());
        let saved = backend.saved.lock().unwrap().clone().unwrap();
        assert_eq!(saved.state, FastingState::Fasting);
        assert_eq!(saved.start_timestamp, 1_700_000_100.0);
    }

    #[test]
    fn test_open_repairs_inconsistent_record() {
        let backend = MemorySessionBackend::default();
        *backend.saved.lock().unwrap() = Some(Session {
            state: FastingState::Fasting,
            start_timestamp: 1_700_000_000.0,
            goal_duration: 0.0,
        });

        let store =
            SessionStore::open(Box::new(backend.clone()), Arc::new(RecordingSink::default()));
        assert_eq!(store.session().state, FastingState::Idle);
        assert!(!store.is_dirty());
        assert_eq!(backend.saved.lock().unwrap().clone(), Some(Session::default()));
    }

    #[test]
    fn test_unsaved_repair_is_dirty() {
        let backend = MemorySessionBackend::default();
        *backend.saved.lock().unwrap() = Some(Session {
            state: FastingState::Idle,
            start_timestamp: 1_700_000_000.0,
            goal_duration: 0.0,
        });
        backend.fail_writes.store(true, Ordering::SeqCst);

        let store = SessionStore::open(Box::new(backend), Arc::new(RecordingSink::default()));
        assert_eq!(store.session(), &Session::default());
        assert!(store.is_dirty());
    }

    #[test]
    fn test_reload_picks_up_external_change() {
        let backend = MemorySessionBackend::default();
        let mut store =
            SessionStore::open(Box::new(backend.clone()), Arc::new(RecordingSink::default()));
        store.put(&fasting_fields());

        // Another process ends the fast
        *backend.saved.lock().unwrap() = Some(Session::default());

        store.reload();
        assert_eq!(store.session(), &Session::default());
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_reload_rewrites_dirty_record() {
        let backend = MemorySessionBackend::default();
        backend.fail_writes.store(true, Ordering::SeqCst);
        let mut store =
            SessionStore::open(Box::new(backend.clone()), Arc::new(RecordingSink::default()));
        store.put(&fasting_fields());
        assert!(store.is_dirty());

        backend.fail_writes.store(false, Ordering::SeqCst);
        store.reload();

        assert!(!store.is_dirty());
        assert_eq!(store.session().state, FastingState::Fasting);
        let saved = backend.saved.lock().unwrap().clone().unwrap();
        assert_eq!(saved.state, FastingState::Fasting);
    }

    #[test]
    fn test_file_backend_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("session.json");
        let sink = Arc::new(RecordingSink::default());

        let mut store = SessionStore::open(Box::new(FileSessionBackend::new(&path)), sink.clone());
        store.put(&fasting_fields());
        drop(store);

        let reopened = SessionStore::open(Box::new(FileSessionBackend::new(&path)), sink);
        assert_eq!(reopened.session().state, FastingState::Fasting);
        assert_eq!(reopened.session().start_timestamp, 1_700_000_000.0);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains(r#""state":"fasting""#));
    }
}
