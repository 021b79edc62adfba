//! Find overlong lines and splice coordinator fixes back into files

use aios_agents::Coordinator;
use aios_core::{char_len, LineRequest, Resolution};
use aios_housekeeping::{write_text_atomic, BackupPolicy};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Directory names never descended into.
const SKIP_DIRS: [&str; 6] = ["__pycache__", "node_modules", "target", "venv", "archive", "build"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LongLine {
    /// 1-based.
    pub line_number: usize,
    pub length: usize,
    pub text: String,
}

pub fn find_long_lines(text: &str, max_length: usize) -> Vec<LongLine> {
    text.lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let length = char_len(line.trim_end());
            (length > max_length).then(|| LongLine {
                line_number: i + 1,
                length,
                text: line.to_string(),
            })
        })
        .collect()
}

/// Files under `root` matching any of `patterns`, skipping hidden and build
/// directories. A file path is returned as-is.
pub fn collect_files(root: &Path, patterns: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    let globs = build_globset(patterns)?;
    let mut files = Vec::new();
    let walker = WalkDir::new(root).into_iter().filter_entry(|e| {
        let name = e.file_name().to_string_lossy();
        e.depth() == 0
            || !(name.starts_with('.')
                || (e.file_type().is_dir() && SKIP_DIRS.iter().any(|d| *d == name)))
    });
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if globs.is_match(relative) || globs.is_match(entry.file_name()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for p in patterns {
        builder.add(Glob::new(p)?);
    }
    Ok(builder.build()?)
}

#[derive(Clone, Debug)]
pub struct FixOptions {
    /// Write the file; otherwise only report.
    pub execute: bool,
    /// Also splice fallback splits the coordinator marked low-confidence.
    pub accept_low_confidence: bool,
    pub backup: BackupPolicy,
}

impl Default for FixOptions {
    fn default() -> Self {
        Self {
            execute: false,
            accept_low_confidence: false,
            backup: BackupPolicy::sibling(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct LineOutcome {
    pub line_number: usize,
    pub original: String,
    pub fixed: String,
    pub resolution: Resolution,
    pub confidence: f32,
    pub applied: bool,
    pub errors: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub long_lines: usize,
    pub applied: usize,
    pub written: bool,
    pub backup: Option<PathBuf>,
    pub outcomes: Vec<LineOutcome>,
}

/// Run the coordinator on every overlong line of `path`.
///
/// Fixes are applied when the result fits and is not low-confidence (unless
/// allowed). In execute mode the file is rewritten atomically, and only if
/// the rewrite has no more overlong lines than the original.
pub async fn fix_file(
    path: &Path,
    coordinator: &Coordinator,
    options: &FixOptions,
) -> anyhow::Result<FileReport> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e))?;
    let max_length = coordinator.settings().max_length;
    let long_lines = find_long_lines(&text, max_length);
    let file_label = path.display().to_string();

    let mut report = FileReport {
        path: path.to_path_buf(),
        long_lines: long_lines.len(),
        applied: 0,
        written: false,
        backup: None,
        outcomes: Vec::with_capacity(long_lines.len()),
    };
    if long_lines.is_empty() {
        debug!("{}: clean", file_label);
        return Ok(report);
    }
    info!("{}: {} overlong lines", file_label, long_lines.len());

    for long in &long_lines {
        let request = LineRequest::new(long.text.trim_end()).at(&file_label, long.line_number);
        let result = coordinator.coordinate(request).await;
        let applied = result.success
            && result.changed()
            && (!result.low_confidence || options.accept_low_confidence);
        if !applied {
            debug!(
                "{}:{} not applied ({:?}, low_confidence={})",
                file_label, long.line_number, result.resolution, result.low_confidence
            );
        }
        report.outcomes.push(LineOutcome {
            line_number: long.line_number,
            original: result.original.clone(),
            fixed: result.fixed.clone(),
            resolution: result.resolution,
            confidence: result.confidence,
            applied,
            errors: result.errors,
        });
    }
    report.applied = report.outcomes.iter().filter(|o| o.applied).count();

    if !options.execute || report.applied == 0 {
        return Ok(report);
    }

    let rewritten = splice(&text, &report.outcomes);
    let before = long_lines.len();
    report.backup = write_text_atomic(
        path,
        &rewritten,
        |candidate| {
            let after = find_long_lines(candidate, max_length).len();
            if after > before {
                Err(format!("rewrite has {} overlong lines, original had {}", after, before))
            } else {
                Ok(())
            }
        },
        &options.backup,
    )?;
    report.written = true;
    info!("{}: applied {} fixes", file_label, report.applied);
    Ok(report)
}

/// Replace applied lines, keeping the file's newline style and trailing newline.
pub fn splice(text: &str, outcomes: &[LineOutcome]) -> String {
    let newline = if text.contains("\r\n") { "\r\n" } else { "\n" };
    let mut out: Vec<String> = Vec::new();
    for (i, line) in text.lines().enumerate() {
        match outcomes.iter().find(|o| o.applied && o.line_number == i + 1) {
            Some(outcome) => out.extend(outcome.fixed.lines().map(str::to_string)),
            None => out.push(line.to_string()),
        }
    }
    let mut rewritten = out.join(newline);
    if text.ends_with('\n') {
        rewritten.push_str(newline);
    }
    rewritten
}

/// Summary line per file for the CLI.
pub fn describe(report: &FileReport) -> String {
    if report.long_lines == 0 {
        return format!("{}: ok", report.path.display());
    }
    let verb = if report.written { "fixed" } else { "fixable" };
    let skipped = report.long_lines - report.applied;
    format!(
        "{}: {} overlong, {} {}, {} left",
        report.path.display(),
        report.long_lines,
        report.applied,
        verb,
        skipped
    )
}
