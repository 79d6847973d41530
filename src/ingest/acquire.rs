/// Document acquisition.
///
/// Takes queued dataset file URLs one at a time, resolves each to its
/// temporary download location and streams the document over the fixed
/// local path. Failures come back typed: transient ones leave the URL in a
/// retry slot for the next tick, fatal ones mean an operator is needed.

use crate::config::{DataPlatformConfig, RetryConfig};
use crate::ingest::knmi::OpenDataApi;
use crate::logging::{Component, log_knmi_failure};
use crate::model::{AcquireError, KnmiError};
use crate::queue::{QueueSender, QueueStore};
use crate::retry::{IsRetryable, RetryPolicy};
use crate::scheduler::Acquire;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A document that now sits at the local path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredFile {
    pub url: String,
    pub bytes: u64,
}

pub struct FileAcquirer {
    api: OpenDataApi,
    queue: QueueStore,
    document_path: PathBuf,
    policy: RetryPolicy,
    max_consecutive_failures: u32,
    /// URL whose last acquisition exhausted its retries.
    retry_slot: Option<String>,
    consecutive_failures: u32,
}

impl FileAcquirer {
    pub fn new(api: OpenDataApi, queue: QueueStore, document_path: &Path, retry: &RetryConfig) -> Self {
        Self::with_policy(api, queue, document_path, RetryPolicy::from(retry), retry.max_consecutive_failures)
    }

    pub fn with_policy(
        api: OpenDataApi,
        queue: QueueStore,
        document_path: &Path,
        policy: RetryPolicy,
        max_consecutive_failures: u32,
    ) -> Self {
        FileAcquirer {
            api,
            queue,
            document_path: document_path.to_path_buf(),
            policy,
            max_consecutive_failures: max_consecutive_failures.max(1),
            retry_slot: None,
            consecutive_failures: 0,
        }
    }

    /// True when a call to [`acquire_next`](Self::acquire_next) would not block.
    pub fn has_pending(&self) -> bool {
        self.retry_slot.is_some() || !self.queue.is_empty()
    }

    /// Downloads the next pending document, blocking on the queue if needed.
    pub fn acquire_next(&mut self) -> Result<AcquiredFile, AcquireError> {
        let url = match self.retry_slot.take() {
            Some(url) => url,
            None => self.queue.dequeue().map_err(|_| AcquireError::QueueClosed)?,
        };

        info!(component = %Component::Acquire, "Get the download URL from: {}", url);

        let result = self.policy.run(
            || self.fetch(&url),
            |attempt, err| {
                debug!(component = %Component::Acquire, attempt, "Attempt failed");
                log_knmi_failure(&url, "download", err);
            },
        );

        match result {
            Ok(bytes) => {
                self.consecutive_failures = 0;
                info!(
                    component = %Component::Acquire,
                    bytes,
                    path = %self.document_path.display(),
                    "Document stored"
                );
                Ok(AcquiredFile { url, bytes })
            }
            Err(err) if err.is_retryable() => self.record_transient(url, err),
            Err(err) => Err(AcquireError::Fatal {
                url,
                reason: err.to_string(),
            }),
        }
    }

    fn fetch(&self, url: &str) -> Result<u64, KnmiError> {
        let download_url = self.api.get_file_url(url)?;
        debug!(component = %Component::Acquire, %download_url, "Resolved temporary download URL");
        self.api.download_to(&download_url, &self.document_path)
    }

    fn record_transient(&mut self, url: String, err: KnmiError) -> Result<AcquiredFile, AcquireError> {
        self.consecutive_failures += 1;

        if self.consecutive_failures >= self.max_consecutive_failures {
            return Err(AcquireError::Fatal {
                reason: format!(
                    "{} acquisitions in a row failed, last error: {}",
                    self.consecutive_failures, err
                ),
                url,
            });
        }

        warn!(
            component = %Component::Acquire,
            failures = self.consecutive_failures,
            limit = self.max_consecutive_failures,
            "Download postponed to next tick"
        );
        self.retry_slot = Some(url.clone());
        Err(AcquireError::Transient { url, source: err })
    }
}

impl Acquire for FileAcquirer {
    fn has_pending(&self) -> bool {
        FileAcquirer::has_pending(self)
    }

    fn acquire_next(&mut self) -> Result<(), AcquireError> {
        FileAcquirer::acquire_next(self).map(|_| ())
    }
}

/// Queues the dataset's newest file when no local document exists yet.
///
/// Returns true when a URL was queued. Failures are logged and otherwise
/// ignored: the next notification fills the gap.
pub fn bootstrap_latest(
    api: &OpenDataApi,
    config: &DataPlatformConfig,
    document_path: &Path,
    queue: &QueueSender,
) -> bool {
    if !config.bootstrap_latest || document_path.exists() {
        return false;
    }

    match api.latest_file_url(&config.dataset_name, &config.dataset_version) {
        Ok(url) => {
            info!(component = %Component::Acquire, %url, "No local document, queued latest file");
            queue.enqueue(url);
            true
        }
        Err(err) => {
            log_knmi_failure(&config.dataset_name, "list latest file", &err);
            false
        }
    }
}
