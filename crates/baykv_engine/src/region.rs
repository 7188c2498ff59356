//! Environment home directory and its shared region.
//!
//! ```text
//! <home>/
//! ├─ __baykv.region   # CBOR metadata: format version, clean flag, flags
//! ├─ __baykv.lock     # advisory lock shared by every open environment
//! └─ *.db             # database files, resolved relative to home
//! ```
//!
//! The first environment to open the home marks the region dirty; the last
//! one to close marks it clean. Finding it dirty with nobody else attached
//! means a previous process died without closing, and opening requires
//! `RECOVER`.

use crate::error::{EngineError, EngineResult};
use crate::flags::EnvFlags;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const REGION_FILE: &str = "__baykv.region";
const REGION_TEMP: &str = "__baykv.region.tmp";
const LOCK_FILE: &str = "__baykv.lock";

/// Region format version written by this build.
pub(crate) const REGION_VERSION: u16 = 1;

/// Persisted region metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct RegionMeta {
    pub(crate) version: u16,
    pub(crate) clean: bool,
    pub(crate) flags: u32,
}

/// An attached environment home.
#[derive(Debug)]
pub(crate) struct Region {
    home: PathBuf,
    lock_file: File,
}

impl Region {
    /// Attaches to `home`, creating it when `CREATE` is given.
    pub(crate) fn open(home: &Path, flags: EnvFlags, mode: u32) -> EngineResult<Self> {
        if !home.exists() {
            if !flags.contains(EnvFlags::CREATE) {
                return Err(EngineError::NotFound);
            }
            fs::create_dir_all(home)?;
        }
        if !home.is_dir() {
            return Err(EngineError::invalid_argument(format!(
                "environment home is not a directory: {}",
                home.display()
            )));
        }

        let meta_path = home.join(REGION_FILE);
        if !meta_path.exists() && !flags.contains(EnvFlags::CREATE) {
            return Err(EngineError::NotFound);
        }

        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true).truncate(false);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(mode);
        }
        #[cfg(not(unix))]
        let _ = mode;
        let lock_file = options.open(home.join(LOCK_FILE))?;

        let region = Self {
            home: home.to_path_buf(),
            lock_file,
        };

        if region.lock_file.try_lock_exclusive().is_ok() {
            // nobody else is attached
            let result = region.attach_first(flags);
            let unlocked = FileExt::unlock(&region.lock_file);
            result?;
            unlocked?;
            FileExt::lock_shared(&region.lock_file)?;
        } else {
            FileExt::lock_shared(&region.lock_file)?;
            let meta = region
                .load_meta()?
                .ok_or_else(|| EngineError::run_recovery("environment region missing"))?;
            check_version(&meta)?;
        }

        Ok(region)
    }

    fn attach_first(&self, flags: EnvFlags) -> EngineResult<()> {
        if let Some(meta) = self.load_meta()? {
            check_version(&meta)?;
            if !meta.clean {
                if !flags.contains(EnvFlags::RECOVER) {
                    return Err(EngineError::run_recovery(format!(
                        "environment {} was not shut down cleanly",
                        self.home.display()
                    )));
                }
                tracing::info!(home = %self.home.display(), "running recovery");
            }
        }
        self.save_meta(&RegionMeta {
            version: REGION_VERSION,
            clean: false,
            flags: flags.bits(),
        })
    }

    /// Detaches, marking the region clean if this was the last attachment.
    pub(crate) fn close(self) -> EngineResult<()> {
        FileExt::unlock(&self.lock_file)?;
        if self.lock_file.try_lock_exclusive().is_ok() {
            let result = self.load_meta().and_then(|meta| {
                let flags = meta.map_or(0, |m| m.flags);
                self.save_meta(&RegionMeta {
                    version: REGION_VERSION,
                    clean: true,
                    flags,
                })
            });
            FileExt::unlock(&self.lock_file)?;
            result?;
        }
        Ok(())
    }

    /// Returns the home directory.
    pub(crate) fn home(&self) -> &Path {
        &self.home
    }

    fn meta_path(&self) -> PathBuf {
        self.home.join(REGION_FILE)
    }

    /// Loads the region metadata; `None` for a new home.
    pub(crate) fn load_meta(&self) -> EngineResult<Option<RegionMeta>> {
        load_meta(&self.meta_path())
    }

    /// Saves the region metadata atomically (write, sync, rename).
    pub(crate) fn save_meta(&self, meta: &RegionMeta) -> EngineResult<()> {
        let temp_path = self.home.join(REGION_TEMP);

        let mut data = Vec::new();
        ciborium::ser::into_writer(meta, &mut data)
            .map_err(|e| EngineError::invalid_state(format!("region encode failed: {e}")))?;
        let mut file = File::create(&temp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, self.meta_path())?;
        sync_directory(&self.home)
    }
}

fn load_meta(path: &Path) -> EngineResult<Option<RegionMeta>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if data.is_empty() {
        return Ok(None);
    }
    ciborium::de::from_reader(data.as_slice())
        .map(Some)
        .map_err(|e| EngineError::run_recovery(format!("environment region unreadable: {e}")))
}

fn check_version(meta: &RegionMeta) -> EngineResult<()> {
    if meta.version != REGION_VERSION {
        return Err(EngineError::VersionMismatch {
            found: meta.version,
            supported: REGION_VERSION,
        });
    }
    Ok(())
}

#[cfg(unix)]
fn sync_directory(path: &Path) -> EngineResult<()> {
    File::open(path)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_path: &Path) -> EngineResult<()> {
    // NTFS journals metadata updates
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_home_without_create() {
        let dir = tempdir().unwrap();
        let result = Region::open(&dir.path().join("absent"), EnvFlags::empty(), 0o644);
        assert!(matches!(result, Err(EngineError::NotFound)));
    }

    #[test]
    fn existing_dir_without_region_needs_create() {
        let dir = tempdir().unwrap();
        let result = Region::open(dir.path(), EnvFlags::empty(), 0o644);
        assert!(matches!(result, Err(EngineError::NotFound)));
    }

    #[test]
    fn clean_close_then_reopen() {
        let dir = tempdir().unwrap();
        let home = dir.path().join("env");

        let region = Region::open(&home, EnvFlags::CREATE, 0o644).unwrap();
        assert!(!region.load_meta().unwrap().unwrap().clean);
        region.close().unwrap();

        let region = Region::open(&home, EnvFlags::empty(), 0o644).unwrap();
        region.close().unwrap();
        assert!(load_meta(&home.join(REGION_FILE)).unwrap().unwrap().clean);
    }

    #[test]
    fn second_attachment_keeps_region_dirty() {
        let dir = tempdir().unwrap();
        let first = Region::open(dir.path(), EnvFlags::CREATE, 0o644).unwrap();
        let second = Region::open(dir.path(), EnvFlags::empty(), 0o644).unwrap();

        second.close().unwrap();
        assert!(!first.load_meta().unwrap().unwrap().clean);
        first.close().unwrap();
        assert!(load_meta(&dir.path().join(REGION_FILE)).unwrap().unwrap().clean);
    }

    #[test]
    fn unclean_shutdown_requires_recover() {
        let dir = tempdir().unwrap();
        let region = Region::open(dir.path(), EnvFlags::CREATE, 0o644).unwrap();
        region.close().unwrap();

        // simulate a process that died while attached
        let region = Region::open(dir.path(), EnvFlags::empty(), 0o644).unwrap();
        region
            .save_meta(&RegionMeta {
                version: REGION_VERSION,
                clean: false,
                flags: 0,
            })
            .unwrap();
        drop(region);

        let result = Region::open(dir.path(), EnvFlags::CREATE, 0o644);
        assert!(matches!(result, Err(EngineError::RunRecovery(_))));

        let region =
            Region::open(dir.path(), EnvFlags::CREATE | EnvFlags::RECOVER, 0o644).unwrap();
        region.close().unwrap();
    }

    #[test]
    fn newer_region_version_rejected() {
        let dir = tempdir().unwrap();
        let region = Region::open(dir.path(), EnvFlags::CREATE, 0o644).unwrap();
        region
            .save_meta(&RegionMeta {
                version: REGION_VERSION + 1,
                clean: true,
                flags: 0,
            })
            .unwrap();
        drop(region);

        let result = Region::open(dir.path(), EnvFlags::empty(), 0o644);
        assert!(matches!(result, Err(EngineError::VersionMismatch { .. })));
    }
}
