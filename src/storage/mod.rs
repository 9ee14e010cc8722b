//! 存储边界：启动时全量加载、批量 upsert、存储侧全局漂移。
//!
//! 两个实现共享同一套行级语义：
//! - upsert：不存在则插入；乘数、基准价、时间戳覆盖；成交量累加增量；
//! - 全局漂移：逐行套用与内存相同的漂移规则，包括从未载入缓存的行。

pub mod file;
pub mod memory;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rustc_hash::FxHashMap;

use crate::error::StoreError;
use crate::logic::{DriftOutcome, DriftParams};
use crate::models::{EntryUpdate, StoredEntry};

pub use self::file::FileStore;
pub use self::memory::MemoryStore;

pub trait MarketStore: Send + Sync {
    /// 全量读取持久化行，仅在启动时调用一次
    fn load_all(&self) -> BoxFuture<'_, Result<Vec<StoredEntry>, StoreError>>;

    /// 尽力而为的批量写入
    fn upsert_batch(&self, rows: Vec<EntryUpdate>) -> BoxFuture<'_, Result<(), StoreError>>;

    /// 对所有持久化行推进漂移，返回被推进的行数
    fn apply_global_drift(
        &self,
        now: DateTime<Utc>,
        params: DriftParams,
    ) -> BoxFuture<'_, Result<usize, StoreError>>;
}

pub(crate) fn upsert_rows(rows: &mut FxHashMap<String, StoredEntry>, updates: Vec<EntryUpdate>) {
    for update in updates {
        match rows.get_mut(&update.item_id) {
            Some(row) => {
                row.mod_price = update.mod_price;
                row.base_price = update.base_price;
                row.sold_units = row.sold_units.saturating_add(update.sold_delta);
                row.bought_units = row.bought_units.saturating_add(update.bought_delta);
                row.last_update = update.last_update.fixed_offset();
            }
            None => {
                rows.insert(update.item_id.clone(), StoredEntry::from_update(&update));
            }
        }
    }
}

pub(crate) fn drift_rows(
    rows: &mut FxHashMap<String, StoredEntry>,
    now: DateTime<Utc>,
    params: &DriftParams,
) -> usize {
    rows.values_mut()
        .map(|row| row.apply_drift(params, now))
        .filter(|outcome| *outcome == DriftOutcome::Advanced)
        .count()
}
