//! Single-writer guard (spec.md §4.2).
//!
//! An OS-level advisory lock on a known lockfile inside the data
//! directory, asserted once at process start. If the lock is already
//! held, the process refuses to start and names the PID when it can be
//! read back from the lockfile. The lock is released on normal shutdown
//! (when the guard drops) and on crash (the kernel reclaims an advisory
//! lock when the holding process dies).

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub struct SingleWriterGuard {
    file: File,
    path: PathBuf,
}

impl SingleWriterGuard {
    /// Acquire the lock or fail with a message naming the PID already
    /// holding it, if the lockfile's contents can be read.
    pub fn acquire(base_dir: &Path) -> Result<Self, String> {
        std::fs::create_dir_all(base_dir)
            .map_err(|e| format!("cannot create data directory {}: {e}", base_dir.display()))?;
        let path = base_dir.join(".runtrace.lock");

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| format!("cannot open lockfile {}: {e}", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            let mut existing = String::new();
            let _ = file.read_to_string(&mut existing);
            let holder = existing.trim();
            return Err(if holder.is_empty() {
                format!("single-writer lock {} is already held", path.display())
            } else {
                format!(
                    "single-writer lock {} is already held by pid {holder}",
                    path.display()
                )
            });
        }

        file.set_len(0).map_err(|e| e.to_string())?;
        file.write_all(std::process::id().to_string().as_bytes())
            .map_err(|e| e.to_string())?;

        Ok(SingleWriterGuard { file, path })
    }
}

impl Drop for SingleWriterGuard {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}
