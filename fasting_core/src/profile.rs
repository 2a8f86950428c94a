//! Profile persistence.
//!
//! The profile is written as one JSON record, replaced atomically, so a
//! reader sees either the previous or the new profile and never a mix.

use crate::persist::{load_json_or_default, save_json_atomic};
use crate::{Profile, Result};
use std::path::PathBuf;

/// Durable home of the profile record
pub trait ProfileStore: Send {
    /// Load the saved profile; a missing or unreadable record is an empty profile
    fn load(&self) -> Profile;
    fn save(&mut self, profile: &Profile) -> Result<()>;
}

pub struct FileProfileStore {
    path: PathBuf,
}

impl FileProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ProfileStore for FileProfileStore {
    fn load(&self) -> Profile {
        load_json_or_default(&self.path)
    }

    fn save(&mut self, profile: &Profile) -> Result<()> {
        save_json_atomic(&self.path, profile)
    }
}

/// In-memory store that can be told to fail, for tests
#[cfg(test)]
#[derive(Clone, Default)]
pub(crate) struct MemoryProfileStore {
    pub saved: std::sync::Arc<std::sync::Mutex<Option<Profile>>>,
    pub fail_writes: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

#[cfg(test)]
impl ProfileStore for MemoryProfileStore {
    fn load(&self) -> Profile {
        self.saved.lock().unwrap().clone().unwrap_or_default()
    }

    fn save(&mut self, profile: &Profile) -> Result<()> {
        if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(crate::Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only volume",
            )));
        }
        *self.saved.lock().unwrap() = Some(profile.clone());
        Ok(())
    }
}
