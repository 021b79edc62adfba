//! Root directory cleanup
//!
//! Stray top-level files (reports, logs, state dumps, ad-hoc tests) are moved
//! into their folders by ordered glob rules. Planning and execution are
//! separate so a dry run shows exactly what `--execute` would do.

use crate::error::{StoreError, StoreResult};
use aios_core::config::{CleanupRuleConfig, HousekeepingConfig};
use globset::{Glob, GlobMatcher};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

struct Rule {
    pattern: String,
    matcher: GlobMatcher,
    destination: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlannedMove {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub rule: String,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct CleanupPlan {
    pub moves: Vec<PlannedMove>,
    /// Top-level files no rule matched.
    pub untouched: Vec<PathBuf>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct CleanupReport {
    pub dry_run: bool,
    pub moved: Vec<PlannedMove>,
    pub failed: Vec<(PathBuf, String)>,
}

pub struct Cleaner {
    root: PathBuf,
    rules: Vec<Rule>,
    protected: HashSet<String>,
}

impl Cleaner {
    pub fn new(
        root: impl Into<PathBuf>,
        rules: &[CleanupRuleConfig],
        protected: &[String],
    ) -> StoreResult<Self> {
        let rules = rules
            .iter()
            .map(|r| {
                let matcher = Glob::new(&r.pattern)
                    .map_err(|e| StoreError::Pattern { pattern: r.pattern.clone(), source: e })?
                    .compile_matcher();
                Ok(Rule {
                    pattern: r.pattern.clone(),
                    matcher,
                    destination: PathBuf::from(&r.destination),
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;
        Ok(Self {
            root: root.into(),
            rules,
            protected: protected.iter().cloned().collect(),
        })
    }

    pub fn from_config(root: impl Into<PathBuf>, config: &HousekeepingConfig) -> StoreResult<Self> {
        Self::new(root, &config.rules, &config.protected)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Match top-level files against the rules. First matching rule wins.
    pub fn plan(&self) -> StoreResult<CleanupPlan> {
        let mut plan = CleanupPlan::default();
        let mut entries = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = entry?;
            if entry.file_type().is_file() {
                entries.push(entry.into_path());
            }
        }
        entries.sort();

        for source in entries {
            let name = match source.file_name() {
                Some(n) => n.to_string_lossy().into_owned(),
                None => continue,
            };
            if name.starts_with('.') || self.protected.contains(&name) {
                debug!("cleanup: skipping {}", name);
                continue;
            }
            match self.rules.iter().find(|r| r.matcher.is_match(&name)) {
                Some(rule) => plan.moves.push(PlannedMove {
                    destination: self.root.join(&rule.destination).join(&name),
                    source,
                    rule: rule.pattern.clone(),
                }),
                None => plan.untouched.push(source),
            }
        }
        Ok(plan)
    }

    /// Perform the planned moves. Existing destinations are never overwritten.
    pub fn execute(&self, plan: &CleanupPlan, dry_run: bool) -> CleanupReport {
        let mut report = CleanupReport { dry_run, ..CleanupReport::default() };
        for planned in &plan.moves {
            if dry_run {
                info!(
                    "[dry-run] {} -> {}",
                    planned.source.display(),
                    planned.destination.display()
                );
                report.moved.push(planned.clone());
                continue;
            }
            match move_file(&planned.source, &planned.destination) {
                Ok(destination) => {
                    info!("moved {} -> {}", planned.source.display(), destination.display());
                    report.moved.push(PlannedMove { destination, ..planned.clone() });
                }
                Err(e) => {
                    warn!("cleanup failed for {}: {}", planned.source.display(), e);
                    report.failed.push((planned.source.clone(), e.to_string()));
                }
            }
        }
        report
    }
}

fn move_file(source: &Path, destination: &Path) -> StoreResult<PathBuf> {
    let dir = destination
        .parent()
        .ok_or_else(|| StoreError::NotAFile(destination.to_path_buf()))?;
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

    let target = unique_destination(destination);
    if fs::rename(source, &target).is_err() {
        // Cross-device: copy then remove.
        fs::copy(source, &target).map_err(|e| StoreError::io(&target, e))?;
        fs::remove_file(source).map_err(|e| StoreError::io(source, e))?;
    }
    Ok(target)
}

/// `name_<timestamp>.ext` when `path` is taken.
fn unique_destination(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let mut candidate = path.with_file_name(format!("{}_{}{}", stem, stamp, ext));
    let mut n = 1;
    while candidate.exists() {
        candidate = path.with_file_name(format!("{}_{}_{}{}", stem, stamp, n, ext));
        n += 1;
    }
    candidate
}
