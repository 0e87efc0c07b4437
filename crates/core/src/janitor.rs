//! Reclaims scratch files left behind by crashed or killed requests.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Delete regular files in `dir` last modified more than `max_age` ago.
pub fn sweep(dir: &Path, max_age: Duration) -> SweepReport {
    sweep_at(dir, max_age, SystemTime::now())
}

/// [`sweep`] with an explicit clock. Errors are logged and counted, never returned.
pub fn sweep_at(dir: &Path, max_age: Duration, now: SystemTime) -> SweepReport {
    let mut report = SweepReport::default();
    let cutoff = now.checked_sub(max_age).unwrap_or(SystemTime::UNIX_EPOCH);

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return report,
        Err(e) => {
            tracing::error!("Failed to list {}: {}", dir.display(), e);
            report.failed += 1;
            return report;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::error!("Failed to read entry in {}: {}", dir.display(), e);
                report.failed += 1;
                continue;
            }
        };
        let path = entry.path();
        let modified = match entry.metadata() {
            Ok(meta) if meta.is_file() => meta.modified(),
            Ok(_) => continue,
            Err(e) => Err(e),
        };
        report.scanned += 1;

        let stale = match modified {
            Ok(mtime) => mtime < cutoff,
            Err(e) => {
                tracing::error!("Failed to stat {}: {}", path.display(), e);
                report.failed += 1;
                continue;
            }
        };
        if !stale {
            continue;
        }

        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("Removed stale file {}", path.display());
                report.removed += 1;
            }
            // Already gone: a request's own guard got there first.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::error!("Failed to remove stale file {}: {}", path.display(), e);
                report.failed += 1;
            }
        }
    }

    if report.removed > 0 || report.failed > 0 {
        tracing::info!(
            "Swept {}: {} scanned, {} removed, {} failed",
            dir.display(),
            report.scanned,
            report.removed,
            report.failed
        );
    }
    report
}

/// Run [`sweep`] every `interval` on the tokio runtime. The first sweep runs immediately.
pub fn spawn_periodic(
    dir: PathBuf,
    max_age: Duration,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let dir = dir.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || sweep(&dir, max_age)).await {
                tracing::error!("Sweep task failed: {}", e);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs::File;

    const HOUR: Duration = Duration::from_secs(3600);

    fn aged_file(dir: &Path, name: &str, age: Duration) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
        path
    }

    #[test]
    fn removes_only_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        let old = aged_file(dir.path(), "epub_old.epub", 2 * HOUR);
        let fresh = aged_file(dir.path(), "epub_new.epub", Duration::from_secs(300));

        let report = sweep(dir.path(), HOUR);
        assert_eq!(
            report,
            SweepReport {
                scanned: 2,
                removed: 1,
                failed: 0
            }
        );
        assert!(!old.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn subdirectories_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        let report = sweep_at(dir.path(), HOUR, SystemTime::now() + 10 * HOUR);
        assert_eq!(report.scanned, 0);
        assert!(dir.path().join("nested").is_dir());
    }

    #[test]
    fn missing_directory_is_empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let report = sweep(&dir.path().join("never-created"), HOUR);
        assert_eq!(report, SweepReport::default());
    }

    #[test]
    fn explicit_clock_decides_staleness() {
        let dir = tempfile::tempdir().unwrap();
        let path = aged_file(dir.path(), "a.epub", Duration::ZERO);
        assert_eq!(sweep_at(dir.path(), HOUR, SystemTime::now()).removed, 0);
        assert_eq!(
            sweep_at(dir.path(), HOUR, SystemTime::now() + 2 * HOUR).removed,
            1
        );
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn periodic_sweep_runs_on_first_tick() {
        let dir = tempfile::tempdir().unwrap();
        let old = aged_file(dir.path(), "old.epub", 2 * HOUR);

        let handle = spawn_periodic(dir.path().to_path_buf(), HOUR, Duration::from_secs(900));
        for _ in 0..200 {
            if !old.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
        assert!(!old.exists());
    }
}
