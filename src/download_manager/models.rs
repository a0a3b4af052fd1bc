//! In-memory download job state.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;

/// Sentinel for a transfer whose size is not yet known.
pub const TOTAL_SIZE_UNKNOWN: i64 = -1;

#[derive(Debug, Clone, Copy)]
struct Progress {
    percentage: f64,
    total_size: i64,
}

/// One in-flight download, exclusively owned by the download manager's queue
/// for its lifetime. The worker updates progress through `record_progress`;
/// everything else reads snapshots.
#[derive(Debug)]
pub struct DownloadJob {
    pub uuid: String,
    pub url: String,
    pub destination: PathBuf,
    pub display_name: String,
    progress: Mutex<Progress>,
}

impl DownloadJob {
    pub fn new(
        uuid: impl Into<String>,
        url: impl Into<String>,
        destination: PathBuf,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            url: url.into(),
            destination,
            display_name: display_name.into(),
            progress: Mutex::new(Progress {
                percentage: 0.0,
                total_size: TOTAL_SIZE_UNKNOWN,
            }),
        }
    }

    /// Record the bytes transferred so far. The reported percentage is
    /// monotonically non-decreasing and capped at 100.
    pub fn record_progress(&self, downloaded: u64, total: Option<u64>) {
        let mut progress = self.progress.lock().unwrap();
        if let Some(total) = total {
            progress.total_size = total as i64;
            if total > 0 {
                let percentage = (downloaded as f64 / total as f64 * 100.0).min(100.0);
                if percentage > progress.percentage {
                    progress.percentage = percentage;
                }
            }
        }
    }

    /// Force the job to 100%, called once the byte stream is drained. Covers
    /// transfers where the total size was never announced.
    pub fn mark_complete(&self) {
        self.progress.lock().unwrap().percentage = 100.0;
    }

    pub fn snapshot(&self) -> DownloadSnapshot {
        let progress = *self.progress.lock().unwrap();
        DownloadSnapshot {
            uuid: self.uuid.clone(),
            name: self.display_name.clone(),
            percentage: progress.percentage,
            total_size: progress.total_size,
        }
    }
}

/// Point-in-time view of one in-flight download.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadSnapshot {
    pub uuid: String,
    pub name: String,
    pub percentage: f64,
    pub total_size: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> DownloadJob {
        DownloadJob::new(
            "A1",
            "https://a/x.bundle",
            PathBuf::from("/tmp/A1.bundle"),
            "appliance one",
        )
    }

    #[test]
    fn test_progress_starts_at_zero_with_unknown_size() {
        let snapshot = job().snapshot();
        assert_eq!(snapshot.percentage, 0.0);
        assert_eq!(snapshot.total_size, TOTAL_SIZE_UNKNOWN);
    }

    #[test]
    fn test_progress_is_monotonic_and_capped() {
        let job = job();
        job.record_progress(50, Some(100));
        assert_eq!(job.snapshot().percentage, 50.0);

        // A lower reading never decreases the percentage
        job.record_progress(25, Some(100));
        assert_eq!(job.snapshot().percentage, 50.0);

        job.record_progress(250, Some(100));
        assert_eq!(job.snapshot().percentage, 100.0);
        assert_eq!(job.snapshot().total_size, 100);
    }

    #[test]
    fn test_unknown_total_leaves_percentage_until_completion() {
        let job = job();
        job.record_progress(1024, None);
        assert_eq!(job.snapshot().percentage, 0.0);
        job.mark_complete();
        assert_eq!(job.snapshot().percentage, 100.0);
    }
}
