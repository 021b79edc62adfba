//! Atomic file writes with timestamped backups
//!
//! Contents are validated before anything touches disk, written to a sibling
//! temp file, synced, and renamed over the target. The previous version is
//! copied to `<backup dir>/<name>.<timestamp>.bak` first.

use crate::error::{StoreError, StoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Where backups of replaced files go and how many survive.
#[derive(Clone, Debug, Default)]
pub struct BackupPolicy {
    pub enabled: bool,
    /// Directory for backups; relative paths resolve against the file's parent.
    /// `None` puts them next to the file.
    pub dir: Option<PathBuf>,
    /// Backups kept per file after a write; `None` keeps all.
    pub keep: Option<usize>,
}

impl BackupPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn sibling() -> Self {
        Self { enabled: true, dir: None, keep: None }
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self { enabled: true, dir: Some(dir.into()), keep: None }
    }

    pub fn keep(mut self, keep: usize) -> Self {
        self.keep = Some(keep);
        self
    }

    pub fn from_config(config: &aios_core::config::HousekeepingConfig) -> Self {
        Self::in_dir(&config.backup_dir).keep(config.keep_backups)
    }

    fn backup_dir_for(&self, path: &Path) -> PathBuf {
        let parent = parent_of(path);
        match &self.dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => parent.join(dir),
            None => parent,
        }
    }
}

fn parent_of(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn file_name(path: &Path) -> StoreResult<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| StoreError::NotAFile(path.to_path_buf()))
}

/// Write raw bytes atomically. Returns the backup path when one was made.
pub fn write_bytes_atomic(
    path: &Path,
    contents: &[u8],
    backup: &BackupPolicy,
) -> StoreResult<Option<PathBuf>> {
    let name = file_name(path)?;
    let parent = parent_of(path);
    fs::create_dir_all(&parent).map_err(|e| StoreError::io(&parent, e))?;

    let tmp = parent.join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()));
    if let Err(e) = write_synced(&tmp, contents).and_then(|()| keep_permissions(path, &tmp)) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    let backup_path = if backup.enabled && path.exists() {
        match make_backup(path, &name, backup) {
            Ok(p) => Some(p),
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                return Err(e);
            }
        }
    } else {
        None
    };

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::io(path, e));
    }
    debug!("wrote {} ({} bytes)", path.display(), contents.len());

    if let Some(keep) = backup.keep.filter(|_| backup.enabled) {
        prune_backups(path, backup, keep)?;
    }
    Ok(backup_path)
}

fn write_synced(tmp: &Path, contents: &[u8]) -> StoreResult<()> {
    let mut file = fs::File::create(tmp).map_err(|e| StoreError::io(tmp, e))?;
    file.write_all(contents).map_err(|e| StoreError::io(tmp, e))?;
    file.sync_all().map_err(|e| StoreError::io(tmp, e))
}

/// The replacement inherits the mode of the file it replaces.
fn keep_permissions(path: &Path, tmp: &Path) -> StoreResult<()> {
    let Ok(existing) = fs::metadata(path) else {
        return Ok(());
    };
    fs::set_permissions(tmp, existing.permissions()).map_err(|e| StoreError::io(tmp, e))
}

const BACKUP_STAMP: &str = "%Y%m%d_%H%M%S_%6f";

/// `<name>.<YYYYmmdd_HHMMSS_ffffff>.bak` for exactly this `name`.
fn is_backup_of(candidate: &str, name: &str) -> bool {
    let Some(stamp) = candidate
        .strip_prefix(name)
        .and_then(|rest| rest.strip_prefix('.'))
        .and_then(|rest| rest.strip_suffix(".bak"))
    else {
        return false;
    };
    let bytes = stamp.as_bytes();
    bytes.len() == 22
        && bytes.iter().enumerate().all(|(i, b)| match i {
            8 | 15 => *b == b'_',
            _ => b.is_ascii_digit(),
        })
}

fn make_backup(path: &Path, name: &str, policy: &BackupPolicy) -> StoreResult<PathBuf> {
    let dir = policy.backup_dir_for(path);
    fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
    let stamp = chrono::Local::now().format(BACKUP_STAMP);
    let backup = dir.join(format!("{}.{}.bak", name, stamp));
    fs::copy(path, &backup).map_err(|e| StoreError::io(&backup, e))?;
    info!("backup: {} -> {}", path.display(), backup.display());
    Ok(backup)
}

/// Validate, then write text atomically.
///
/// A validation error leaves the original untouched and creates no temp file.
pub fn write_text_atomic<F>(
    path: &Path,
    contents: &str,
    validate: F,
    backup: &BackupPolicy,
) -> StoreResult<Option<PathBuf>>
where
    F: FnOnce(&str) -> Result<(), String>,
{
    validate(contents).map_err(|reason| StoreError::Validation {
        path: path.to_path_buf(),
        reason,
    })?;
    write_bytes_atomic(path, contents.as_bytes(), backup)
}

/// Serialize pretty JSON and write it only if it parses back.
pub fn write_json_atomic<T: Serialize>(
    path: &Path,
    value: &T,
    backup: &BackupPolicy,
) -> StoreResult<Option<PathBuf>> {
    let mut text = serde_json::to_string_pretty(value).map_err(|e| StoreError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    text.push('\n');
    write_json_str_atomic(path, &text, backup)
}

/// Write already-rendered JSON text; rejected unless it parses.
pub fn write_json_str_atomic(
    path: &Path,
    text: &str,
    backup: &BackupPolicy,
) -> StoreResult<Option<PathBuf>> {
    write_text_atomic(
        path,
        text,
        |t| {
            serde_json::from_str::<serde_json::Value>(t)
                .map(|_| ())
                .map_err(|e| format!("not valid JSON: {}", e))
        },
        backup,
    )
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<T> {
    let text = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| StoreError::Json {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read-modify-write. A missing file starts from `T::default()`.
pub fn update_json<T, F>(path: &Path, backup: &BackupPolicy, update: F) -> StoreResult<T>
where
    T: DeserializeOwned + Serialize + Default,
    F: FnOnce(&mut T),
{
    let mut value: T = if path.exists() {
        read_json(path)?
    } else {
        T::default()
    };
    update(&mut value);
    write_json_atomic(path, &value, backup)?;
    Ok(value)
}

/// Delete all but the newest `keep` backups of `path`. Returns what was removed.
pub fn prune_backups(path: &Path, policy: &BackupPolicy, keep: usize) -> StoreResult<Vec<PathBuf>> {
    let name = file_name(path)?;
    let dir = policy.backup_dir_for(path);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut backups: Vec<PathBuf> = fs::read_dir(&dir)
        .map_err(|e| StoreError::io(&dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy())
                .is_some_and(|n| is_backup_of(&n, &name))
        })
        .collect();
    // Timestamps sort lexically.
    backups.sort();

    let excess = backups.len().saturating_sub(keep);
    let mut removed = Vec::with_capacity(excess);
    for old in backups.into_iter().take(excess) {
        match fs::remove_file(&old) {
            Ok(()) => removed.push(old),
            Err(e) => warn!("could not prune {}: {}", old.display(), e),
        }
    }
    if !removed.is_empty() {
        debug!("pruned {} backups of {}", removed.len(), name);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn backup_dir_resolution() {
        let p = Path::new("/data/state.json");
        assert_eq!(BackupPolicy::sibling().backup_dir_for(p), PathBuf::from("/data"));
        assert_eq!(
            BackupPolicy::in_dir(".backups").backup_dir_for(p),
            PathBuf::from("/data/.backups")
        );
        assert_eq!(
            BackupPolicy::in_dir("/var/bak").backup_dir_for(p),
            PathBuf::from("/var/bak")
        );
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        write_text_atomic(&path, "one", |_| Ok(()), &BackupPolicy::none()).unwrap();
        write_text_atomic(&path, "two", |_| Ok(()), &BackupPolicy::none()).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt".to_string()]);
        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
    }

    #[test]
    fn backup_names_match_exactly() {
        assert!(is_backup_of("foo.20240101_120000_000001.bak", "foo"));
        assert!(!is_backup_of("foo.txt.20240101_120000_000001.bak", "foo"));
        assert!(!is_backup_of("foo.old.bak", "foo"));
        assert!(!is_backup_of("foo.20240101_120000.bak", "foo"));
        assert!(!is_backup_of("foobar.20240101_120000_000001.bak", "foo"));
    }

    #[test]
    fn directory_path_is_rejected() {
        let err = write_bytes_atomic(Path::new("/"), b"x", &BackupPolicy::none()).unwrap_err();
        assert!(matches!(err, StoreError::NotAFile(_)));
    }
}
