use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::models::TradeSide;

/// 运行时计数器，全部为宽松原子操作
#[derive(Debug, Default)]
pub struct MarketMetrics {
    pub sale_batches: AtomicU64,
    pub purchase_batches: AtomicU64,
    pub units_sold: AtomicU64,
    pub units_bought: AtomicU64,
    pub rows_persisted: AtomicU64,
    pub write_failures: AtomicU64,
    pub channel_dropped: AtomicU64,
    pub sweeps: AtomicU64,
    pub start_time: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub sale_batches: u64,
    pub purchase_batches: u64,
    pub units_sold: u64,
    pub units_bought: u64,
    pub rows_persisted: u64,
    pub write_failures: u64,
    pub channel_dropped: u64,
    pub sweeps: u64,
    pub cached_items: usize,
    pub loaded: bool,
    pub uptime_sec: i64,
}

impl MarketMetrics {
    pub fn new(start_time: i64) -> Self {
        Self { start_time, ..Default::default() }
    }

    pub fn record_batch(&self, side: TradeSide, units: u64) {
        let (batches, counter) = match side {
            TradeSide::Sale => (&self.sale_batches, &self.units_sold),
            TradeSide::Purchase => (&self.purchase_batches, &self.units_bought),
        };
        batches.fetch_add(1, Ordering::Relaxed);
        counter.fetch_add(units, Ordering::Relaxed);
    }

    pub fn snapshot(&self, now: i64, cached_items: usize, loaded: bool) -> MetricsSnapshot {
        MetricsSnapshot {
            sale_batches: self.sale_batches.load(Ordering::Relaxed),
            purchase_batches: self.purchase_batches.load(Ordering::Relaxed),
            units_sold: self.units_sold.load(Ordering::Relaxed),
            units_bought: self.units_bought.load(Ordering::Relaxed),
            rows_persisted: self.rows_persisted.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            channel_dropped: self.channel_dropped.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            cached_items,
            loaded,
            uptime_sec: (now - self.start_time).max(0),
        }
    }
}
