//! Download detection by directory polling
//!
//! Browser downloads land in the session's download directory under a
//! server-chosen name. Completion is inferred from a before/after listing
//! delta: Chrome writes `*.crdownload` while transferring and renames to the
//! final name when done, so a new file with the expected extension is taken
//! as complete. Growth of that file is not re-checked.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::harvest_error::{HarvestError, HarvestResult};

/// File names present in a directory at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySnapshot {
    names: BTreeSet<OsString>,
}

impl DirectorySnapshot {
    pub fn capture(dir: &Path) -> HarvestResult<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| HarvestError::file_system(dir, e))?;
        let mut names = BTreeSet::new();
        for entry in entries {
            let entry = entry.map_err(|e| HarvestError::file_system(dir, e))?;
            names.insert(entry.file_name());
        }
        Ok(Self { names })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(std::ffi::OsStr::new(name))
    }

    /// Names in `self` but not in `before` that end with `extension`, sorted
    fn arrivals<'a>(&'a self, before: &'a Self, extension: &'a str) -> impl Iterator<Item = &'a OsString> {
        self.names
            .difference(&before.names)
            .filter(move |name| name.to_str().is_some_and(|n| n.ends_with(extension)))
    }
}

impl<S: Into<OsString>> FromIterator<S> for DirectorySnapshot {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Polls a download directory for newly completed files
#[derive(Debug, Clone, Copy)]
pub struct DownloadWatcher {
    poll_interval: Duration,
}

impl DownloadWatcher {
    pub const fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Wait until a file with `extension` that is absent from `before` shows up.
    ///
    /// The directory is checked at least once, then every poll interval until
    /// `timeout` elapses. When several files arrive at once the
    /// lexicographically first one is returned.
    pub fn wait_for_new_file(
        &self,
        dir: &Path,
        before: &DirectorySnapshot,
        extension: &str,
        timeout: Duration,
    ) -> Option<PathBuf> {
        debug!("Waiting up to {:?} for a new {} file in {:?}", timeout, extension, dir);
        let deadline = Instant::now() + timeout;

        loop {
            match DirectorySnapshot::capture(dir) {
                Ok(now) => {
                    if let Some(name) = now.arrivals(before, extension).find(|name| dir.join(name).is_file()) {
                        let path = dir.join(name);
                        info!("📥 Download detected: {:?}", path);
                        return Some(path);
                    }
                }
                Err(e) => debug!("Download directory not readable yet: {}", e),
            }

            let now = Instant::now();
            if now >= deadline {
                warn!("No new {} file appeared in {:?} within {:?}", extension, dir, timeout);
                return None;
            }
            std::thread::sleep(self.poll_interval.min(deadline - now));
        }
    }

    /// Move `source` to `<dir>/<canonical_base_name><extension>`, replacing any prior file.
    ///
    /// The existing destination is removed first and the source renamed
    /// second. A crash between the two calls leaves no file at the canonical
    /// path, never a truncated one.
    pub fn commit_as(
        &self,
        source: &Path,
        dir: &Path,
        canonical_base_name: &str,
        extension: &str,
    ) -> HarvestResult<PathBuf> {
        let destination = dir.join(format!("{canonical_base_name}{extension}"));
        if source == destination {
            return Ok(destination);
        }

        if !source.is_file() {
            return Err(HarvestError::file_system(
                source,
                std::io::Error::new(ErrorKind::NotFound, "downloaded file vanished before commit"),
            ));
        }

        std::fs::create_dir_all(dir).map_err(|e| HarvestError::file_system(dir, e))?;

        match std::fs::remove_file(&destination) {
            Ok(()) => info!("Removed existing file: {:?}", destination),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(HarvestError::file_system(&destination, e)),
        }

        std::fs::rename(source, &destination).map_err(|e| HarvestError::file_system(source, e))?;
        info!("✅ Renamed {:?} -> {:?}", source, destination);
        Ok(destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn watcher() -> DownloadWatcher {
        DownloadWatcher::new(Duration::from_millis(20))
    }

    #[test]
    fn new_file_is_detected_and_old_one_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.csv"), "old").unwrap();
        let before = DirectorySnapshot::capture(dir.path()).unwrap();
        assert!(before.contains("a.csv"));

        std::fs::write(dir.path().join("b.csv"), "new").unwrap();
        let found = watcher().wait_for_new_file(dir.path(), &before, ".csv", Duration::from_millis(200));
        assert_eq!(found, Some(dir.path().join("b.csv")));
    }

    #[test]
    fn partial_downloads_do_not_count() {
        let dir = TempDir::new().unwrap();
        let before = DirectorySnapshot::capture(dir.path()).unwrap();
        std::fs::write(dir.path().join("report.csv.crdownload"), "partial").unwrap();

        let started = Instant::now();
        let found = watcher().wait_for_new_file(dir.path(), &before, ".csv", Duration::from_millis(120));
        assert!(found.is_none());
        assert!(started.elapsed() >= Duration::from_millis(120));
    }

    #[test]
    fn file_arriving_while_polling_is_found() {
        let dir = TempDir::new().unwrap();
        let before = DirectorySnapshot::capture(dir.path()).unwrap();
        let target = dir.path().join("Informe.csv");
        let writer_target = target.clone();
        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(60));
            std::fs::write(writer_target, "SubCategoria,Year,Valor\n").unwrap();
        });

        let found = watcher().wait_for_new_file(dir.path(), &before, ".csv", Duration::from_secs(5));
        writer.join().unwrap();
        assert_eq!(found, Some(target));
    }

    #[test]
    fn commit_twice_keeps_only_latest_content() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("first.csv");
        let second = dir.path().join("second.csv");
        std::fs::write(&first, "one").unwrap();
        std::fs::write(&second, "two").unwrap();

        let w = watcher();
        let dest = w.commit_as(&first, dir.path(), "2000-02-ExportacionesPais", ".csv").unwrap();
        let again = w.commit_as(&second, dir.path(), "2000-02-ExportacionesPais", ".csv").unwrap();

        assert_eq!(dest, again);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "two");
        let remaining: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(remaining.len(), 1);
    }

    #[test]
    fn commit_of_missing_source_is_a_file_system_error() {
        let dir = TempDir::new().unwrap();
        let result = watcher().commit_as(&dir.path().join("gone.csv"), dir.path(), "x", ".csv");
        assert!(matches!(result, Err(HarvestError::FileSystem { .. })));
    }

    #[test]
    fn snapshot_from_names_matches_capture() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.csv"), "").unwrap();
        let captured = DirectorySnapshot::capture(dir.path()).unwrap();
        let built: DirectorySnapshot = ["a.csv"].into_iter().collect();
        assert_eq!(captured, built);
        assert!(built.contains("a.csv"));
        assert!(!built.contains("b.csv"));
    }
}
