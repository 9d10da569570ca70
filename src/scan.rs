use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::parsing::{parse_embedded_config, EmbeddedConfig, SkipReason};

/// Suffixes editors and operators leave behind on copies of a source file.
pub const BACKUP_SUFFIXES: &[&str] = &[".bak", ".orig", ".old", ".tmp"];

fn dated_backup_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\.\d{8}$").expect("static backup pattern compiles"))
}

/// Whether `filename` looks like a backup copy (`x.py.bak`, `x.py.20250623`,
/// `x.py~`, `#x.py#`).
pub fn is_backup_file(filename: &str) -> bool {
    if dated_backup_pattern().is_match(filename) {
        return true;
    }
    if filename.ends_with('~') {
        return true;
    }
    if filename.starts_with('#') && filename.ends_with('#') {
        return true;
    }
    let lower = filename.to_lowercase();
    BACKUP_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

pub fn is_candidate_file(filename: &str, source_suffix: &str) -> bool {
    filename.ends_with(source_suffix) && !is_backup_file(filename)
}

/// Files directly inside any directory under `root` whose name starts with
/// `dir_prefix`, filtered to non-backup files ending in `source_suffix`.
///
/// Symlinks to files are followed. Unreadable directories are logged and
/// skipped. Results are in walk order,
/// sorted by name within each directory.
pub fn find_source_files(root: &Path, dir_prefix: &str, source_suffix: &str) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let iter = walkdir::WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter();

    for result in iter {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        // symlinked files count; symlinked directories are not descended into
        if !entry.path().is_file() {
            continue;
        }
        let in_batch_dir = entry
            .path()
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(dir_prefix))
            .unwrap_or(false);
        if !in_batch_dir {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            warn!(path = %entry.path().display(), "ignoring non-UTF-8 file name");
            continue;
        };
        if is_candidate_file(name, source_suffix) {
            paths.push(entry.into_path());
        }
    }
    paths
}

/// Read `path` and parse the embedded `variable` literal from it.
pub fn extract_from_file(path: &Path, variable: &str) -> Result<EmbeddedConfig, SkipReason> {
    let text = std::fs::read_to_string(path).map_err(|e| SkipReason::Unreadable(e.to_string()))?;
    parse_embedded_config(&text, variable)
}

/// A source file together with what it declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredConfig {
    pub path: PathBuf,
    pub config: EmbeddedConfig,
}

/// Walk `root` and return every file that yielded a usable embedded config.
/// Files that don't are logged with their skip reason.
pub fn discover_configs(
    root: &Path,
    dir_prefix: &str,
    source_suffix: &str,
    variable: &str,
) -> Vec<DiscoveredConfig> {
    let mut found = Vec::new();
    for path in find_source_files(root, dir_prefix, source_suffix) {
        info!("Processing file: {}", path.display());
        match extract_from_file(&path, variable) {
            Ok(config) => found.push(DiscoveredConfig { path, config }),
            Err(reason) => warn!(path = %path.display(), "skipping file: {}", reason),
        }
    }
    found
}
