use std::{sync::{Arc, atomic::Ordering}, time::Duration};

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use tokio::{sync::{mpsc, oneshot}, time};
use tracing::{debug, error, info};

use crate::logic::DriftParams;
use crate::metrics::MarketMetrics;
use crate::models::EntryUpdate;
use crate::storage::MarketStore;

/// 交给后台写入任务的作业
#[derive(Debug)]
pub enum PersistJob {
    /// 一个成交批次产生的 upsert 行
    Upsert(Vec<EntryUpdate>),
    /// 周期清扫：先写出积压行，再推进存储侧全局漂移
    GlobalDrift { now: DateTime<Utc>, params: DriftParams },
    /// 立即写出积压行并回执
    Flush(oneshot::Sender<()>),
    /// 写出积压行后退出
    Shutdown(oneshot::Sender<()>),
}

impl PersistJob {
    pub fn kind(&self) -> &'static str {
        match self {
            PersistJob::Upsert(_) => "upsert",
            PersistJob::GlobalDrift { .. } => "global-drift",
            PersistJob::Flush(_) => "flush",
            PersistJob::Shutdown(_) => "shutdown",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    /// 积压行数达到该值立即写出
    pub batch_rows: usize,
    pub flush_every: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self { batch_rows: 256, flush_every: Duration::from_millis(500) }
    }
}

// =========================================================================
// 批量持久化核心 (Batch Writer)
// =========================================================================

/// 后台写入循环
///
/// 同一物品的多行在积压期间合并；写入失败只记日志与计数，不重试。
pub async fn run_persistence_worker(
    mut rx: mpsc::Receiver<PersistJob>,
    store: Arc<dyn MarketStore>,
    metrics: Arc<MarketMetrics>,
    settings: WorkerSettings,
) {
    let mut pending: FxHashMap<String, EntryUpdate> = FxHashMap::default();
    let mut flush_interval = time::interval_at(time::Instant::now() + settings.flush_every, settings.flush_every);
    flush_interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            job = rx.recv() => match job {
                Some(PersistJob::Upsert(rows)) => {
                    for row in rows {
                        match pending.get_mut(&row.item_id) {
                            Some(existing) => existing.absorb(row),
                            None => { pending.insert(row.item_id.clone(), row); }
                        }
                    }
                    if pending.len() >= settings.batch_rows {
                        flush_batch(&mut pending, store.as_ref(), &metrics).await;
                    }
                }
                Some(PersistJob::GlobalDrift { now, params }) => {
                    flush_batch(&mut pending, store.as_ref(), &metrics).await;
                    match store.apply_global_drift(now, params).await {
                        Ok(rows) => debug!("🌊 存储侧漂移完成: {} 行", rows),
                        Err(e) => {
                            metrics.write_failures.fetch_add(1, Ordering::Relaxed);
                            error!("❌ 存储侧漂移失败: {}", e);
                        }
                    }
                }
                Some(PersistJob::Flush(ack)) => {
                    flush_batch(&mut pending, store.as_ref(), &metrics).await;
                    let _ = ack.send(());
                }
                Some(PersistJob::Shutdown(ack)) => {
                    info!("👋 写入任务收到停机指令，正在写出剩余 {} 行...", pending.len());
                    flush_batch(&mut pending, store.as_ref(), &metrics).await;
                    let _ = ack.send(());
                    break;
                }
                None => {
                    info!("👋 写入通道关闭，正在写出剩余 {} 行...", pending.len());
                    flush_batch(&mut pending, store.as_ref(), &metrics).await;
                    break;
                }
            },
            _ = flush_interval.tick() => {
                if !pending.is_empty() {
                    flush_batch(&mut pending, store.as_ref(), &metrics).await;
                }
            }
        }
    }
}

async fn flush_batch(
    pending: &mut FxHashMap<String, EntryUpdate>,
    store: &dyn MarketStore,
    metrics: &MarketMetrics,
) {
    if pending.is_empty() {
        return;
    }
    let mut rows: Vec<EntryUpdate> = pending.drain().map(|(_, row)| row).collect();
    rows.sort_by(|a, b| a.item_id.cmp(&b.item_id));
    let count = rows.len();

    match store.upsert_batch(rows).await {
        Ok(()) => {
            metrics.rows_persisted.fetch_add(count as u64, Ordering::Relaxed);
            debug!("💾 已写出 {} 行动态价格", count);
        }
        Err(e) => {
            metrics.write_failures.fetch_add(1, Ordering::Relaxed);
            error!("❌ 动态价格批量写入失败 ({} 行): {}", count, e);
        }
    }
}
