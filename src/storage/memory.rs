use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::{MarketStore, drift_rows, upsert_rows};
use crate::error::StoreError;
use crate::logic::DriftParams;
use crate::models::{EntryUpdate, StoredEntry};

/// 进程内存储，可注入读写故障
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<FxHashMap<String, StoredEntry>>,
    fail_loads: AtomicBool,
    fail_writes: AtomicBool,
    upsert_calls: AtomicU64,
    drift_calls: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: impl IntoIterator<Item = StoredEntry>) -> Self {
        let store = Self::default();
        {
            let mut map = store.rows.lock();
            for row in rows {
                map.insert(row.item_id.clone(), row);
            }
        }
        store
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    pub fn row(&self, item_id: &str) -> Option<StoredEntry> {
        self.rows.lock().get(item_id).cloned()
    }

    /// 按物品 ID 排序
    pub fn rows(&self) -> Vec<StoredEntry> {
        let mut rows: Vec<_> = self.rows.lock().values().cloned().collect();
        rows.sort_by(|a, b| a.item_id.cmp(&b.item_id));
        rows
    }

    pub fn upsert_calls(&self) -> u64 {
        self.upsert_calls.load(Ordering::Relaxed)
    }

    pub fn drift_calls(&self) -> u64 {
        self.drift_calls.load(Ordering::Relaxed)
    }

    fn check(&self, flag: &AtomicBool, what: &str) -> Result<(), StoreError> {
        if flag.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable(format!("memory store {what} disabled")));
        }
        Ok(())
    }
}

impl MarketStore for MemoryStore {
    fn load_all(&self) -> BoxFuture<'_, Result<Vec<StoredEntry>, StoreError>> {
        async move {
            self.check(&self.fail_loads, "load")?;
            Ok(self.rows.lock().values().cloned().collect())
        }
        .boxed()
    }

    fn upsert_batch(&self, rows: Vec<EntryUpdate>) -> BoxFuture<'_, Result<(), StoreError>> {
        async move {
            self.upsert_calls.fetch_add(1, Ordering::Relaxed);
            self.check(&self.fail_writes, "write")?;
            upsert_rows(&mut self.rows.lock(), rows);
            Ok(())
        }
        .boxed()
    }

    fn apply_global_drift(
        &self,
        now: DateTime<Utc>,
        params: DriftParams,
    ) -> BoxFuture<'_, Result<usize, StoreError>> {
        async move {
            self.drift_calls.fetch_add(1, Ordering::Relaxed);
            self.check(&self.fail_writes, "write")?;
            Ok(drift_rows(&mut self.rows.lock(), now, &params))
        }
        .boxed()
    }
}
