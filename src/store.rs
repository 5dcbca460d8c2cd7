//! External store client: synchronization primitives over the sheet RPC.
//!
//! The spreadsheet is shared with human editors who insert and delete rows
//! at will, so a row index observed once is worthless a moment later. Every
//! primitive here re-resolves the partition title and re-scans for its
//! target row by key before touching anything; nothing caches a row
//! position across calls.
//!
//! All primitives run under the retry policy: transient failures (rate
//! limit, temporary unavailability) back off exponentially, permanent
//! failures propagate immediately.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{Error, Result};

/// Task-row span within a sprint partition (columns A..I, see the row
/// schema in `task`).
pub const ROW_FIRST_COLUMN: char = 'A';
pub const ROW_LAST_COLUMN: char = 'I';

/// One sheet of the spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Stable sheet id (gid)
    pub id: i64,
    /// Human title, e.g. "спринт 37 (08.09-14.09)"
    pub title: String,
}

/// A row located by key scan: its current (transient) 1-based index and
/// the cell values of the full task-row span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundRow {
    pub row: u32,
    pub cells: Vec<String>,
}

/// Pre-image of a structurally deleted row, tagged with the partition
/// title resolved at delete time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedRow {
    pub cells: Vec<String>,
    pub partition_title: String,
}

/// The raw sheet RPC boundary.
///
/// Implemented by `transport::sheets` for the Google Sheets v4 API and by
/// in-memory fakes in tests. Implementations classify failures into
/// [`Error::StoreTransient`] vs [`Error::StorePermanent`]; the retry logic
/// lives above this trait, not inside it.
#[async_trait]
pub trait SheetApi: Send + Sync {
    async fn list_partitions(&self) -> Result<Vec<Partition>>;

    /// Read a rectangular range (A1 notation, e.g. "A2:C" or "C:C") from
    /// the named partition. Trailing empty rows and cells may be absent.
    async fn read_range(&self, partition_title: &str, range: &str) -> Result<Vec<Vec<String>>>;

    /// Overwrite-write a rectangular range. No merge semantics; the caller
    /// supplies exact bounds.
    async fn write_range(
        &self,
        partition_title: &str,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<()>;

    /// Structurally delete one 1-based row (shifting rows below it up),
    /// not a value-clear.
    async fn delete_row(&self, partition_id: i64, row: u32) -> Result<()>;
}

/// Backoff policy for transient store errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }
}

/// High-level store client combining the RPC boundary with the
/// synchronization primitives.
#[derive(Clone)]
pub struct StoreClient {
    api: Arc<dyn SheetApi>,
    retry: RetryPolicy,
}

impl StoreClient {
    pub fn new(api: Arc<dyn SheetApi>, retry: RetryPolicy) -> Self {
        Self { api, retry }
    }

    /// Run an operation under the retry policy.
    ///
    /// Attempt k sleeps `base * 2^k` after a transient failure; a permanent
    /// failure propagates without retry; exhausting `max_attempts` yields
    /// [`Error::RetryExhausted`] carrying the last transient error.
    pub async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last = String::new();
        for attempt in 1..=self.retry.max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    // Exponent capped so a misconfigured attempt count
                    // cannot overflow the Duration multiply.
                    let delay = self.retry.base_delay * 2u32.saturating_pow(attempt.min(16));
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient store error, backing off"
                    );
                    last = err.to_string();
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
        Err(Error::RetryExhausted {
            attempts: self.retry.max_attempts,
            last,
        })
    }

    pub async fn list_partitions(&self) -> Result<Vec<Partition>> {
        self.with_retry(|| self.api.list_partitions()).await
    }

    /// Resolve a partition's current title from its stable id.
    pub async fn resolve_partition_title(&self, partition_id: i64) -> Result<String> {
        let partitions = self.list_partitions().await?;
        partitions
            .into_iter()
            .find(|p| p.id == partition_id)
            .map(|p| p.title)
            .ok_or_else(|| Error::PartitionNotFound(format!("gid {partition_id}")))
    }

    pub async fn read_range(&self, partition_title: &str, range: &str) -> Result<Vec<Vec<String>>> {
        self.with_retry(|| self.api.read_range(partition_title, range))
            .await
    }

    pub async fn write_range(
        &self,
        partition_title: &str,
        range: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<()> {
        self.with_retry(|| self.api.write_range(partition_title, range, rows.clone()))
            .await
    }

    /// Write a single cell, e.g. `write_cell(title, 'D', 7, "ИТ🤖")`.
    pub async fn write_cell(
        &self,
        partition_title: &str,
        column: char,
        row: u32,
        value: &str,
    ) -> Result<()> {
        let range = format!("{column}{row}");
        self.write_range(partition_title, &range, vec![vec![value.to_string()]])
            .await
    }

    /// First 1-based row where every scanned cell is empty or absent.
    ///
    /// `columns` is a column range like "C:C". Returns one-past-last when
    /// the whole scanned range is occupied.
    pub async fn find_first_empty_row(&self, partition_title: &str, columns: &str) -> Result<u32> {
        let rows = self.read_range(partition_title, columns).await?;
        for (index, row) in rows.iter().enumerate() {
            if row.iter().all(|cell| cell.trim().is_empty()) {
                return Ok(index as u32 + 1);
            }
        }
        Ok(rows.len() as u32 + 1)
    }

    /// Scan `key_column` top-down for the first cell ending with `suffix`
    /// and return that row's task-span cells with its current index.
    ///
    /// First match wins; uniqueness is not guaranteed by the store.
    pub async fn find_row_by_suffix(
        &self,
        partition_title: &str,
        key_column: char,
        suffix: &str,
    ) -> Result<Option<FoundRow>> {
        let range = format!("{key_column}:{key_column}");
        let keys = self.read_range(partition_title, &range).await?;
        let hit = keys.iter().position(|row| {
            row.first()
                .map(|key| key.ends_with(suffix))
                .unwrap_or(false)
        });
        let row = match hit {
            Some(index) => index as u32 + 1,
            None => return Ok(None),
        };
        let span = format!("{ROW_FIRST_COLUMN}{row}:{ROW_LAST_COLUMN}{row}");
        let mut cells = self.read_range(partition_title, &span).await?;
        let found = Some(FoundRow {
            row,
            cells: cells.drain(..).next().unwrap_or_default(),
        });
        Ok(found)
    }

    /// Find a row by key suffix, snapshot it, then structurally delete it.
    ///
    /// Returns the pre-image tagged with the partition title resolved at
    /// delete time, or None when no row matches. Find and delete are not
    /// atomic against concurrent writers; the snapshot is what the row
    /// held immediately before the delete call.
    pub async fn delete_row_by_suffix(
        &self,
        partition_id: i64,
        key_column: char,
        suffix: &str,
    ) -> Result<Option<DeletedRow>> {
        let title = self.resolve_partition_title(partition_id).await?;
        let found = match self.find_row_by_suffix(&title, key_column, suffix).await? {
            Some(found) => found,
            None => return Ok(None),
        };
        self.with_retry(|| self.api.delete_row(partition_id, found.row))
            .await?;
        Ok(Some(DeletedRow {
            cells: found.cells,
            partition_title: title,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with the scripted error until `failures` is spent, then
    /// returns an empty partition list.
    struct Flaky {
        failures: AtomicU32,
        transient: bool,
    }

    #[async_trait]
    impl SheetApi for Flaky {
        async fn list_partitions(&self) -> Result<Vec<Partition>> {
            if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                n.checked_sub(1)
            })
            .is_ok()
            {
                return Err(if self.transient {
                    Error::StoreTransient("quota exceeded".into())
                } else {
                    Error::StorePermanent("forbidden".into())
                });
            }
            Ok(Vec::new())
        }

        async fn read_range(&self, _: &str, _: &str) -> Result<Vec<Vec<String>>> {
            Ok(Vec::new())
        }

        async fn write_range(&self, _: &str, _: &str, _: Vec<Vec<String>>) -> Result<()> {
            Ok(())
        }

        async fn delete_row(&self, _: i64, _: u32) -> Result<()> {
            Ok(())
        }
    }

    fn client(failures: u32, transient: bool, max_attempts: u32) -> StoreClient {
        StoreClient::new(
            Arc::new(Flaky {
                failures: AtomicU32::new(failures),
                transient,
            }),
            RetryPolicy {
                max_attempts,
                base_delay: Duration::ZERO,
            },
        )
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_errors() {
        let client = client(2, true, 5);
        assert!(client.list_partitions().await.is_ok());
    }

    #[tokio::test]
    async fn retry_exhausts_after_max_attempts() {
        let client = client(u32::MAX, true, 3);
        let err = client.list_partitions().await.unwrap_err();
        match err {
            Error::RetryExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(last.contains("quota"));
            }
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let client = client(u32::MAX, false, 5);
        let err = client.list_partitions().await.unwrap_err();
        assert!(matches!(err, Error::StorePermanent(_)));
    }
}
