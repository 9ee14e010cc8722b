use std::{io, path::{Path, PathBuf}};

use chrono::{DateTime, FixedOffset, Offset, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use rustc_hash::FxHashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{MarketStore, drift_rows, upsert_rows};
use crate::error::StoreError;
use crate::logic::DriftParams;
use crate::models::{EntryUpdate, StoredEntry};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, bincode::Encode, bincode::Decode)]
struct DiskRow {
    item_id: String,
    mod_price: f64,
    base_price: f64,
    sold_units: u64,
    bought_units: u64,
    last_update_ms: i64,
    utc_offset_secs: i32,
}

#[derive(Debug, Clone, PartialEq, bincode::Encode, bincode::Decode)]
struct Snapshot {
    version: u32,
    rows: Vec<DiskRow>,
}

impl From<&StoredEntry> for DiskRow {
    fn from(row: &StoredEntry) -> Self {
        Self {
            item_id: row.item_id.clone(),
            mod_price: row.mod_price,
            base_price: row.base_price,
            sold_units: row.sold_units,
            bought_units: row.bought_units,
            last_update_ms: row.last_update.timestamp_millis(),
            utc_offset_secs: row.last_update.offset().local_minus_utc(),
        }
    }
}

impl From<DiskRow> for StoredEntry {
    fn from(row: DiskRow) -> Self {
        let offset = FixedOffset::east_opt(row.utc_offset_secs).unwrap_or_else(|| Utc.fix());
        let utc = DateTime::<Utc>::from_timestamp_millis(row.last_update_ms).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Self {
            item_id: row.item_id,
            mod_price: row.mod_price,
            base_price: row.base_price,
            sold_units: row.sold_units,
            bought_units: row.bought_units,
            last_update: utc.with_timezone(&offset),
        }
    }
}

/// 单文件快照存储 (bincode)
///
/// 所有行常驻内存，每次变更后整体写入临时文件再原子替换。
/// 首次变更前会先从磁盘补水，避免覆盖尚未读取的行。
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    rows: Mutex<Option<FxHashMap<String, StoredEntry>>>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), rows: Mutex::new(None) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_disk(path: &Path) -> Result<FxHashMap<String, StoredEntry>, StoreError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("📂 快照文件 {} 不存在，从空市场开始", path.display());
                return Ok(FxHashMap::default());
            }
            Err(e) => return Err(e.into()),
        };

        let (snapshot, _): (Snapshot, usize) = bincode::decode_from_slice(&bytes, bincode::config::standard())?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::UnsupportedVersion(snapshot.version));
        }
        Ok(snapshot
            .rows
            .into_iter()
            .map(|row| (row.item_id.clone(), StoredEntry::from(row)))
            .collect())
    }

    async fn write_disk(path: &Path, rows: &FxHashMap<String, StoredEntry>) -> Result<(), StoreError> {
        let mut disk_rows: Vec<DiskRow> = rows.values().map(DiskRow::from).collect();
        disk_rows.sort_by(|a, b| a.item_id.cmp(&b.item_id));
        let snapshot = Snapshot { version: SNAPSHOT_VERSION, rows: disk_rows };
        let bytes = bincode::encode_to_vec(&snapshot, bincode::config::standard())?;

        let temp_path = PathBuf::from(format!("{}.tmp", path.display()));
        tokio::fs::write(&temp_path, bytes).await?;
        tokio::fs::rename(&temp_path, path).await?;
        debug!("💾 快照已写入 {} ({} 行)", path.display(), rows.len());
        Ok(())
    }

    /// 在已补水行集合的副本上执行变更，落盘成功后才替换内存中的行
    async fn mutate<R>(
        &self,
        f: impl FnOnce(&mut FxHashMap<String, StoredEntry>) -> R,
    ) -> Result<R, StoreError> {
        let mut guard = self.rows.lock().await;
        if guard.is_none() {
            *guard = Some(Self::read_disk(&self.path).await?);
        }
        let rows = guard.get_or_insert_with(FxHashMap::default);
        let mut next = rows.clone();
        let out = f(&mut next);
        Self::write_disk(&self.path, &next).await?;
        *rows = next;
        Ok(out)
    }
}

impl MarketStore for FileStore {
    fn load_all(&self) -> BoxFuture<'_, Result<Vec<StoredEntry>, StoreError>> {
        async move {
            let rows = Self::read_disk(&self.path).await?;
            let out = rows.values().cloned().collect();
            *self.rows.lock().await = Some(rows);
            Ok(out)
        }
        .boxed()
    }

    fn upsert_batch(&self, rows: Vec<EntryUpdate>) -> BoxFuture<'_, Result<(), StoreError>> {
        async move { self.mutate(|map| upsert_rows(map, rows)).await }.boxed()
    }

    fn apply_global_drift(
        &self,
        now: DateTime<Utc>,
        params: DriftParams,
    ) -> BoxFuture<'_, Result<usize, StoreError>> {
        async move { self.mutate(|map| drift_rows(map, now, &params)).await }.boxed()
    }
}
