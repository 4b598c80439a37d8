//! File scanner
//!
//! Lists the watched directory, keeps regular files that have been left
//! alone for the quiet period, and splits them into source files and
//! processed markers.

use std::path::Path;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use crate::config::{ControllerConfig, MatchMode};
use crate::{Error, Result};

/// One entry of a directory listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// File name without any directory component
    pub name: String,
    /// Whether the entry is a regular file (not a directory, symlink, ...)
    pub is_regular_file: bool,
    /// Last modification time
    pub last_modified: SystemTime,
}

/// Raw input file awaiting processing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFile {
    /// Full file name, also the value of the ownership label
    pub name: String,
    /// File name with the source extension stripped
    pub base_name: String,
}

/// Output artifact marking a source file as handled
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessedFile {
    /// Full file name
    pub name: String,
    /// File name with the processed extension stripped
    pub base_name: String,
}

/// Result of one directory scan, both sequences ordered by name
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScannedFiles {
    /// Files matching the source extension
    pub sources: Vec<SourceFile>,
    /// Files matching the processed extension
    pub processed: Vec<ProcessedFile>,
}

/// Trait abstracting the directory listing primitive
///
/// Allows tests to feed synthetic listings with arbitrary modification times.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DirectoryLister: Send + Sync {
    /// List the entries of `path`
    ///
    /// Fails with [`Error::Io`] when the directory cannot be read.
    async fn list(&self, path: &Path) -> Result<Vec<DirectoryEntry>>;
}

/// Lists a directory on the local filesystem
#[derive(Clone, Copy, Debug, Default)]
pub struct FsDirectoryLister;

#[async_trait]
impl DirectoryLister for FsDirectoryLister {
    async fn list(&self, path: &Path) -> Result<Vec<DirectoryEntry>> {
        let mut dir = tokio::fs::read_dir(path)
            .await
            .map_err(|e| Error::io(path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(|e| Error::io(path, e))? {
            let Ok(name) = entry.file_name().into_string() else {
                warn!(path = ?entry.path(), "skipping file with non UTF-8 name");
                continue;
            };
            // Entries can vanish between readdir and stat
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    debug!(file = %name, error = %e, "skipping entry without metadata");
                    continue;
                }
            };
            let is_regular_file = metadata.file_type().is_file();
            entries.extend(listed_entry(name, is_regular_file, metadata.modified()));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

/// Entry for a listed file, or `None` when the platform has no mtime for it
fn listed_entry(
    name: String,
    is_regular_file: bool,
    modified: std::io::Result<SystemTime>,
) -> Option<DirectoryEntry> {
    match modified {
        Ok(last_modified) => Some(DirectoryEntry {
            name,
            is_regular_file,
            last_modified,
        }),
        Err(e) => {
            debug!(file = %name, error = %e, "skipping entry without modification time");
            None
        }
    }
}

/// Extension matching rules shared by the scanner and the resolver
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionMatcher {
    source_extension: String,
    processed_extension: String,
    mode: MatchMode,
}

impl ExtensionMatcher {
    /// Create a matcher for the given extensions (without leading dot)
    pub fn new(
        source_extension: impl Into<String>,
        processed_extension: impl Into<String>,
        mode: MatchMode,
    ) -> Self {
        Self {
            source_extension: source_extension.into(),
            processed_extension: processed_extension.into(),
            mode,
        }
    }

    /// Build the matcher described by the controller configuration
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(
            config.source_extension.clone(),
            config.processed_extension.clone(),
            config.match_mode,
        )
    }

    /// Classify a file name as a processed marker
    pub fn as_processed(&self, name: &str) -> Option<ProcessedFile> {
        let base_name = match self.mode {
            MatchMode::Substring => name
                .split_once(self.processed_extension.as_str())
                .map(|(base, _)| base),
            MatchMode::Suffix => strip_extension(name, &self.processed_extension),
        }?;
        Some(ProcessedFile {
            name: name.to_string(),
            base_name: base_name.to_string(),
        })
    }

    /// Classify a file name as a source file
    pub fn as_source(&self, name: &str) -> Option<SourceFile> {
        match self.mode {
            MatchMode::Substring => name
                .contains(self.source_extension.as_str())
                .then(|| SourceFile {
                    name: name.to_string(),
                    base_name: self.source_base_name(name).to_string(),
                }),
            MatchMode::Suffix => {
                strip_extension(name, &self.source_extension).map(|base| SourceFile {
                    name: name.to_string(),
                    base_name: base.to_string(),
                })
            }
        }
    }

    /// Name with everything from the first `.<source-ext>` removed
    ///
    /// Returns the whole name when the dotted extension does not occur.
    pub fn source_base_name<'a>(&self, name: &'a str) -> &'a str {
        let dotted = format!(".{}", self.source_extension);
        match self.mode {
            MatchMode::Substring => name.split_once(&dotted).map_or(name, |(base, _)| base),
            MatchMode::Suffix => name.strip_suffix(&dotted).unwrap_or(name),
        }
    }

    /// Whether `processed` marks `source` as already handled
    pub fn is_handled_by(&self, source: &SourceFile, processed: &ProcessedFile) -> bool {
        match self.mode {
            // An empty prefix would be contained in every name
            MatchMode::Substring => {
                !processed.base_name.is_empty() && source.name.contains(&processed.base_name)
            }
            MatchMode::Suffix => source.base_name == processed.base_name,
        }
    }
}

/// `name` minus a trailing `.<ext>`, provided something is left
fn strip_extension<'a>(name: &'a str, ext: &str) -> Option<&'a str> {
    name.strip_suffix(ext)
        .and_then(|rest| rest.strip_suffix('.'))
        .filter(|base| !base.is_empty())
}

/// Whether a file last modified at `modified` has been quiet long enough
///
/// Files stamped in the future are never quiet.
pub fn is_quiet(modified: SystemTime, now: SystemTime, quiet_period: Option<Duration>) -> bool {
    let Some(quiet_period) = quiet_period else {
        return true;
    };
    now.duration_since(modified)
        .map(|age| age > quiet_period)
        .unwrap_or(false)
}

/// Filter and classify a directory listing
///
/// Processed wins when a name matches both extensions, so the two output
/// sequences are disjoint.
pub fn classify(
    mut entries: Vec<DirectoryEntry>,
    now: SystemTime,
    quiet_period: Option<Duration>,
    matcher: &ExtensionMatcher,
) -> ScannedFiles {
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    let mut scanned = ScannedFiles::default();
    for entry in entries {
        if !entry.is_regular_file {
            continue;
        }
        if !is_quiet(entry.last_modified, now, quiet_period) {
            debug!(file = %entry.name, "file modified within quiet period, skipping");
            continue;
        }
        if let Some(processed) = matcher.as_processed(&entry.name) {
            scanned.processed.push(processed);
        } else if let Some(source) = matcher.as_source(&entry.name) {
            scanned.sources.push(source);
        }
    }
    scanned
}

/// List the watched directory and classify its files
pub async fn scan(
    lister: &dyn DirectoryLister,
    config: &ControllerConfig,
    now: SystemTime,
) -> Result<ScannedFiles> {
    let entries = lister.list(&config.directory).await?;
    let matcher = ExtensionMatcher::from_config(config);
    Ok(classify(entries, now, config.quiet_period, &matcher))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, age_secs: u64, now: SystemTime) -> DirectoryEntry {
        DirectoryEntry {
            name: name.to_string(),
            is_regular_file: true,
            last_modified: now - Duration::from_secs(age_secs),
        }
    }

    fn suffix() -> ExtensionMatcher {
        ExtensionMatcher::new("mzML", "pep.xml", MatchMode::Suffix)
    }

    fn substring() -> ExtensionMatcher {
        ExtensionMatcher::new("mzML", "pep.xml", MatchMode::Substring)
    }

    fn names<T>(items: &[T], f: impl Fn(&T) -> &str) -> Vec<String> {
        items.iter().map(|i| f(i).to_string()).collect()
    }

    #[test]
    fn splits_sources_and_processed() {
        let now = SystemTime::now();
        let scanned = classify(
            vec![
                entry("b.mzML", 300, now),
                entry("a.pep.xml", 300, now),
                entry("a.mzML", 300, now),
                entry("notes.txt", 300, now),
            ],
            now,
            None,
            &suffix(),
        );
        assert_eq!(names(&scanned.sources, |s| s.name.as_str()), ["a.mzML", "b.mzML"]);
        assert_eq!(names(&scanned.processed, |p| p.name.as_str()), ["a.pep.xml"]);
        assert_eq!(scanned.processed[0].base_name, "a");
        assert_eq!(scanned.sources[0].base_name, "a");
    }

    #[test]
    fn non_regular_entries_are_ignored() {
        let now = SystemTime::now();
        let mut dir = entry("run.mzML", 300, now);
        dir.is_regular_file = false;
        let scanned = classify(vec![dir], now, None, &suffix());
        assert!(scanned.sources.is_empty());
    }

    /// Story: a file still being copied in is left alone
    ///
    /// With a 60s quiet period a file touched 5 seconds ago is skipped. Two
    /// minutes later, unmodified, it is picked up.
    #[test]
    fn story_quiet_period_defers_files_being_written() {
        let now = SystemTime::now();
        let quiet = Some(Duration::from_secs(60));
        let fresh = entry("c.mzML", 5, now);

        let first = classify(vec![fresh.clone()], now, quiet, &suffix());
        assert!(first.sources.is_empty());

        let later = now + Duration::from_secs(120);
        let second = classify(vec![fresh], later, quiet, &suffix());
        assert_eq!(names(&second.sources, |s| s.name.as_str()), ["c.mzML"]);
    }

    #[test]
    fn future_timestamps_are_not_quiet() {
        let now = SystemTime::now();
        let future = now + Duration::from_secs(30);
        assert!(!is_quiet(future, now, Some(Duration::from_secs(1))));
        assert!(is_quiet(future, now, None));
    }

    #[test]
    fn quiet_period_boundary_is_exclusive() {
        let now = SystemTime::now();
        let quiet = Some(Duration::from_secs(60));
        assert!(!is_quiet(now - Duration::from_secs(60), now, quiet));
        assert!(is_quiet(now - Duration::from_secs(61), now, quiet));
    }

    #[test]
    fn suffix_mode_requires_dotted_suffix() {
        let m = suffix();
        assert!(m.as_source("run.mzML").is_some());
        assert!(m.as_source("run.mzML.bak").is_none());
        assert!(m.as_source("runmzML").is_none());
        assert!(m.as_source(".mzML").is_none());
        assert!(m.as_processed("run.pep.xml").is_some());
        assert!(m.as_processed("pep.xml.run.mzML").is_none());
    }

    #[test]
    fn substring_mode_matches_anywhere() {
        let m = substring();
        assert!(m.as_source("run.mzML.bak").is_some());
        let processed = m.as_processed("run.pep.xml.gz").unwrap();
        assert_eq!(processed.base_name, "run.");
    }

    #[test]
    fn processed_wins_when_both_extensions_match() {
        let now = SystemTime::now();
        let scanned = classify(
            vec![entry("x.mzML.pep.xml", 300, now)],
            now,
            None,
            &substring(),
        );
        assert!(scanned.sources.is_empty());
        assert_eq!(scanned.processed.len(), 1);
    }

    #[test]
    fn source_base_name_strips_first_dotted_extension() {
        assert_eq!(substring().source_base_name("sample_001.mzML"), "sample_001");
        assert_eq!(substring().source_base_name("a.mzML.mzML"), "a");
        assert_eq!(suffix().source_base_name("a.mzML.mzML"), "a.mzML");
        assert_eq!(suffix().source_base_name("plain"), "plain");
    }

    #[tokio::test]
    async fn fs_lister_reports_regular_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.mzML"), b"data").unwrap();
        std::fs::write(dir.path().join("a.pep.xml"), b"data").unwrap();
        std::fs::create_dir(dir.path().join("nested.mzML")).unwrap();

        let entries = FsDirectoryLister.list(dir.path()).await.unwrap();

        let listed: Vec<(&str, bool)> = entries
            .iter()
            .map(|e| (e.name.as_str(), e.is_regular_file))
            .collect();
        assert_eq!(
            listed,
            [("a.pep.xml", true), ("b.mzML", true), ("nested.mzML", false)]
        );
    }

    #[test]
    fn entry_without_mtime_is_skipped_not_fatal() {
        let unsupported = std::io::Error::new(std::io::ErrorKind::Unsupported, "no mtime");
        assert_eq!(listed_entry("a.mzML".to_string(), true, Err(unsupported)), None);

        let now = SystemTime::now();
        let entry = listed_entry("b.mzML".to_string(), true, Ok(now));
        assert_eq!(entry.map(|e| e.last_modified), Some(now));
    }

    #[tokio::test]
    async fn fs_lister_fails_on_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let err = FsDirectoryLister.list(&missing).await.unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[tokio::test]
    async fn scan_uses_the_configured_directory() {
        let now = SystemTime::now();
        let config = crate::testing::config("/data/incoming");

        let mut lister = MockDirectoryLister::new();
        lister
            .expect_list()
            .withf(|path| path.to_str() == Some("/data/incoming"))
            .returning(move |_| {
                Ok(vec![DirectoryEntry {
                    name: "d.mzML".to_string(),
                    is_regular_file: true,
                    last_modified: now - Duration::from_secs(600),
                }])
            });

        let scanned = scan(&lister, &config, now).await.unwrap();
        assert_eq!(scanned.sources.len(), 1);
    }
}
