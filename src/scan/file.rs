//! Filesystem sweep.
//!
//! Every regular file under the root is classified by name. Plain files go
//! to the matcher by path; office containers are opened as zip archives and
//! their members matched from memory, stopping at the first matching member.
//! A failure on one file skips that file only.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use zip::ZipArchive;

use crate::config::ScanConfig;
use crate::error::{AgentError, Result};
use crate::matcher::Matcher;

use super::classify::{classify, ContentKind};
use super::{MatchResult, ScanStats, ScanTarget};

pub struct FileScanEngine<'a> {
    matcher: &'a dyn Matcher,
    max_member_size: u64,
    follow_symlinks: bool,
}

impl<'a> FileScanEngine<'a> {
    pub fn new(matcher: &'a dyn Matcher) -> Self {
        let defaults = ScanConfig::default();
        Self {
            matcher,
            max_member_size: defaults.max_member_size,
            follow_symlinks: defaults.follow_symlinks,
        }
    }

    pub fn with_config(mut self, config: &ScanConfig) -> Self {
        self.max_member_size = config.max_member_size;
        self.follow_symlinks = config.follow_symlinks;
        self
    }

    /// Walk `root` lazily, yielding one result per matching file.
    pub fn scan(&self, root: &Path) -> FileMatches<'a> {
        let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
        tracing::debug!(root = %root.display(), "walking");

        FileMatches {
            matcher: self.matcher,
            max_member_size: self.max_member_size,
            walker: WalkDir::new(root)
                .follow_links(self.follow_symlinks)
                .into_iter(),
            stats: ScanStats::default(),
        }
    }
}

/// Lazy sequence of file matches. See [`FileScanEngine::scan`].
pub struct FileMatches<'a> {
    matcher: &'a dyn Matcher,
    max_member_size: u64,
    walker: walkdir::IntoIter,
    stats: ScanStats,
}

impl FileMatches<'_> {
    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    fn scan_file(&self, path: &Path) -> Result<Vec<String>> {
        match classify(path) {
            ContentKind::Plain => self.matcher.scan(&ScanTarget::File { path }),
            ContentKind::OfficeContainer => self.scan_container(path),
        }
    }

    fn scan_container(&self, path: &Path) -> Result<Vec<String>> {
        let archive_error = |e: zip::result::ZipError| AgentError::Archive {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        let file = File::open(path)?;
        let mut archive = ZipArchive::new(BufReader::new(file)).map_err(archive_error)?;

        for index in 0..archive.len() {
            let (member, data) = {
                let entry = archive.by_index(index).map_err(archive_error)?;
                if entry.is_dir() {
                    continue;
                }
                let member = entry.name().to_string();
                if entry.size() > self.max_member_size {
                    tracing::debug!(
                        archive = %path.display(),
                        member = %member,
                        size = entry.size(),
                        "member too large, skipped"
                    );
                    continue;
                }

                // The declared size can lie; never inflate past the limit.
                let mut data = Vec::with_capacity(entry.size() as usize);
                entry
                    .take(self.max_member_size + 1)
                    .read_to_end(&mut data)?;
                if data.len() as u64 > self.max_member_size {
                    tracing::debug!(
                        archive = %path.display(),
                        member = %member,
                        "member inflates past limit, skipped"
                    );
                    continue;
                }
                (member, data)
            };

            let rules = self.matcher.scan(&ScanTarget::ArchiveMember {
                archive: path,
                member: &member,
                data: &data,
            })?;
            if !rules.is_empty() {
                tracing::debug!(archive = %path.display(), member = %member, "container member matched");
                return Ok(rules);
            }
        }

        Ok(Vec::new())
    }
}

impl Iterator for FileMatches<'_> {
    type Item = MatchResult;

    fn next(&mut self) -> Option<MatchResult> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!(path = ?e.path(), error = %e, "unreadable directory entry");
                    self.stats.skipped += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                // Unfollowed links still count when they point at a file.
                if !entry.path_is_symlink() {
                    continue;
                }
                match std::fs::metadata(entry.path()) {
                    Ok(meta) if meta.is_file() => {}
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::debug!(path = %entry.path().display(), error = %e, "dangling link");
                        self.stats.skipped += 1;
                        continue;
                    }
                }
            }

            let path: PathBuf = entry.into_path();
            match self.scan_file(&path) {
                Ok(rules) => {
                    self.stats.scanned += 1;
                    if !rules.is_empty() {
                        self.stats.matched += 1;
                        return Some(MatchResult::file(path, rules));
                    }
                }
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "file skipped");
                    self.stats.skipped += 1;
                }
            }
        }
    }
}
