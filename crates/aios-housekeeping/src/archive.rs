//! Archive matching files into a timestamped folder of gzip members
//!
//! Layout: `<dest>/archive_<YYYYmmdd_HHMMSS>[_label]/<relative path>.gz` plus a
//! `manifest.json` listing every entry. `restore` reads the manifest back.

use crate::error::{StoreError, StoreResult};
use crate::store::{read_json, write_bytes_atomic, write_json_atomic, BackupPolicy};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Clone, Debug, Default)]
pub struct ArchiveOptions {
    /// Delete each original once its compressed copy is written.
    pub remove_originals: bool,
    /// Only archive files not modified for at least this long.
    pub min_age: Option<Duration>,
    /// Appended to the folder name.
    pub label: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    /// Path relative to the archived root, `/`-separated.
    pub path: String,
    /// Member path relative to the archive folder.
    pub archived: String,
    pub size: u64,
    pub compressed_size: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveManifest {
    pub id: uuid::Uuid,
    pub created_at: DateTime<Utc>,
    pub root: PathBuf,
    pub folder: PathBuf,
    pub patterns: Vec<String>,
    pub originals_removed: bool,
    pub entries: Vec<ArchiveEntry>,
}

impl ArchiveManifest {
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    pub fn compressed_size(&self) -> u64 {
        self.entries.iter().map(|e| e.compressed_size).sum()
    }
}

fn build_globset(patterns: &[String]) -> StoreResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| StoreError::Pattern { pattern: pattern.clone(), source: e })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| StoreError::Pattern { pattern: patterns.join(","), source: e })
}

fn relative_key(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn old_enough(path: &Path, min_age: Option<Duration>) -> bool {
    let Some(min_age) = min_age else {
        return true;
    };
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age >= min_age)
}

/// Compress every file under `root` whose relative path matches a pattern.
///
/// Hidden entries and the destination directory itself are never archived.
/// When nothing matches, no folder is created and the manifest is empty.
pub fn archive(
    root: &Path,
    patterns: &[String],
    dest: &Path,
    options: &ArchiveOptions,
) -> StoreResult<ArchiveManifest> {
    let globs = build_globset(patterns)?;
    let created_at = Utc::now();
    let mut folder_name = format!("archive_{}", created_at.format("%Y%m%d_%H%M%S"));
    if let Some(label) = options.label.as_deref().filter(|l| !l.is_empty()) {
        folder_name.push('_');
        folder_name.push_str(label);
    }
    let base = dest.join(&folder_name);
    let dest_canonical = fs::canonicalize(dest).ok();

    let mut manifest = ArchiveManifest {
        id: uuid::Uuid::new_v4(),
        created_at,
        root: root.to_path_buf(),
        folder: base.clone(),
        patterns: patterns.to_vec(),
        originals_removed: options.remove_originals,
        entries: Vec::new(),
    };

    let walker = WalkDir::new(root).min_depth(1).into_iter().filter_entry(|e| {
        let hidden = e.file_name().to_string_lossy().starts_with('.');
        let is_dest = dest_canonical
            .as_ref()
            .is_some_and(|d| fs::canonicalize(e.path()).is_ok_and(|p| &p == d));
        !hidden && !is_dest
    });

    let mut sources = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        if globs.is_match(relative) && old_enough(entry.path(), options.min_age) {
            sources.push((entry.path().to_path_buf(), relative.to_path_buf()));
        }
    }
    sources.sort();

    if sources.is_empty() {
        info!("archive: nothing under {} matches {:?}", root.display(), patterns);
        return Ok(manifest);
    }

    let folder = claim_folder(dest, &folder_name)?;
    manifest.folder = folder.clone();

    for (source, relative) in &sources {
        let data = fs::read(source).map_err(|e| StoreError::io(source, e))?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&data).map_err(|e| StoreError::io(source, e))?;
        let compressed = encoder.finish().map_err(|e| StoreError::io(source, e))?;

        let key = relative_key(relative);
        let archived = format!("{}.gz", key);
        write_bytes_atomic(&folder.join(&archived), &compressed, &BackupPolicy::none())?;
        debug!("archived {} ({} -> {} bytes)", key, data.len(), compressed.len());

        manifest.entries.push(ArchiveEntry {
            path: key,
            archived,
            size: data.len() as u64,
            compressed_size: compressed.len() as u64,
        });
    }

    write_json_atomic(&folder.join(MANIFEST_FILE), &manifest, &BackupPolicy::none())?;

    if options.remove_originals {
        for (source, _) in &sources {
            if let Err(e) = fs::remove_file(source) {
                warn!("archive: could not remove {}: {}", source.display(), e);
            }
        }
    }

    info!(
        "archived {} files into {} ({} -> {} bytes)",
        manifest.entries.len(),
        folder.display(),
        manifest.total_size(),
        manifest.compressed_size()
    );
    Ok(manifest)
}

/// Create a fresh archive folder, suffixing `_N` when the name is taken.
/// `create_dir` fails on an existing directory, so two runs never share one.
fn claim_folder(dest: &Path, name: &str) -> StoreResult<PathBuf> {
    fs::create_dir_all(dest).map_err(|e| StoreError::io(dest, e))?;
    let mut candidate = dest.join(name);
    let mut n = 1;
    loop {
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                candidate = dest.join(format!("{}_{}", name, n));
                n += 1;
            }
            Err(e) => return Err(StoreError::io(&candidate, e)),
        }
    }
}

/// A manifest path that stays inside the directory it is joined to.
fn contained(path: &str) -> StoreResult<&Path> {
    let p = Path::new(path);
    let normal = !path.is_empty() && p.components().all(|c| matches!(c, Component::Normal(_)));
    if normal {
        Ok(p)
    } else {
        Err(StoreError::UnsafePath(path.to_string()))
    }
}

/// Decompress an archive back under `target`.
///
/// `location` is the archive folder or its `manifest.json`. Existing files are
/// skipped unless `overwrite` is set. Entries that would land outside `target`
/// or the archive folder are refused. Returns the restored paths.
pub fn restore(location: &Path, target: &Path, overwrite: bool) -> StoreResult<Vec<PathBuf>> {
    let manifest_path = if location.is_dir() {
        location.join(MANIFEST_FILE)
    } else {
        location.to_path_buf()
    };
    let folder = manifest_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let manifest: ArchiveManifest = read_json(&manifest_path)?;

    let mut restored = Vec::new();
    for entry in &manifest.entries {
        let destination = target.join(contained(&entry.path)?);
        if destination.exists() && !overwrite {
            warn!("restore: {} exists, skipping", destination.display());
            continue;
        }
        let member = folder.join(contained(&entry.archived)?);
        let compressed = fs::File::open(&member).map_err(|e| StoreError::io(&member, e))?;
        let mut data = Vec::new();
        GzDecoder::new(compressed)
            .read_to_end(&mut data)
            .map_err(|e| StoreError::io(&member, e))?;
        write_bytes_atomic(&destination, &data, &BackupPolicy::none())?;
        restored.push(destination);
    }
    info!("restored {} files into {}", restored.len(), target.display());
    Ok(restored)
}
