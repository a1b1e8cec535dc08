use crate::CoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Exclusive advisory lock held for the duration of one tool invocation.
///
/// It serializes writers of the static config document
/// (`chord_services_config.json`) and the secret store
/// (`data/.runtime_config.json`), along with the environment files derived
/// from them. Neither document is locked on its own, so every CLI job takes
/// this lock at [`ChordLayout::lock_file`](chord_store::ChordLayout::lock_file)
/// before resolving config.
pub struct InvocationLock {
    lock_file: File,
}

fn open_lock_file(lock_path: &Path) -> Result<File, CoreError> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path)?)
}

impl InvocationLock {
    /// Block until the lock is free.
    pub fn acquire(lock_path: &Path) -> Result<Self, CoreError> {
        let file = open_lock_file(lock_path)?;
        file.lock_exclusive()
            .map_err(|e| CoreError::Io(std::io::Error::new(std::io::ErrorKind::WouldBlock, e)))?;
        Ok(Self { lock_file: file })
    }

    /// `None` if another invocation holds the lock.
    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, CoreError> {
        let file = open_lock_file(lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { lock_file: file })),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for InvocationLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("tmp").join(".chord-container.lock");
        let _lock = InvocationLock::acquire(&lock_path).unwrap();
        assert!(lock_path.exists());
    }

    #[test]
    fn try_acquire_returns_none_when_held() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("test.lock");

        let _lock = InvocationLock::acquire(&lock_path).unwrap();
        assert!(InvocationLock::try_acquire(&lock_path).unwrap().is_none());
    }

    #[test]
    fn second_invocation_on_same_root_is_excluded() {
        let dir = tempfile::tempdir().unwrap();
        let layout = chord_store::ChordLayout::new(dir.path());
        let _running = InvocationLock::acquire(&layout.lock_file()).unwrap();
        assert!(InvocationLock::try_acquire(&layout.lock_file()).unwrap().is_none());

        let other = tempfile::tempdir().unwrap();
        let other_layout = chord_store::ChordLayout::new(other.path());
        assert!(InvocationLock::try_acquire(&other_layout.lock_file()).unwrap().is_some());
    }

    #[test]
    fn lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("test.lock");
        {
            let _lock = InvocationLock::acquire(&lock_path).unwrap();
        }
        assert!(InvocationLock::try_acquire(&lock_path).unwrap().is_some());
    }
}
