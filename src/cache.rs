//! 动态价格缓存
//!
//! 进程内唯一的可变共享状态：物品 ID → [`PriceEntry`]。
//! 成交在锁内同步完成 (补漂移 → 施加冲击 → 记录)，随后把变更行交给后台写入任务，
//! 调用方立即能读到新乘数，持久化最终一致。
//!
//! 查询不推进漂移：长期无人交易的物品会返回上次结算的乘数，
//! 直到下一次成交或周期清扫。

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot,
};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::StoreError;
use crate::logic::{DriftOutcome, PricingParams, aggregate_batch};
use crate::metrics::MarketMetrics;
use crate::models::{EntryUpdate, NEUTRAL_MOD_PRICE, PriceEntry, StoredEntry, TradeReport, TradeSide};
use crate::persistence::PersistJob;
use crate::storage::MarketStore;

pub struct PriceCache {
    entries: RwLock<FxHashMap<String, PriceEntry>>,
    loaded: AtomicBool,
    next_drift_persist: Mutex<DateTime<Utc>>,
    drift_persist_interval: TimeDelta,
    params: PricingParams,
    clock: Arc<dyn Clock>,
    persist_tx: mpsc::Sender<PersistJob>,
    metrics: Arc<MarketMetrics>,
}

impl PriceCache {
    pub fn new(
        params: PricingParams,
        drift_persist_interval: TimeDelta,
        clock: Arc<dyn Clock>,
        persist_tx: mpsc::Sender<PersistJob>,
        metrics: Arc<MarketMetrics>,
    ) -> Self {
        let next = clock.now() + drift_persist_interval;
        Self {
            entries: RwLock::new(FxHashMap::with_capacity_and_hasher(2048, Default::default())),
            loaded: AtomicBool::new(false),
            next_drift_persist: Mutex::new(next),
            drift_persist_interval,
            params,
            clock,
            persist_tx,
            metrics,
        }
    }

    pub fn params(&self) -> &PricingParams {
        &self.params
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// 启动加载是否已完成
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    // =========================================================================
    // 1. 查询
    // =========================================================================

    /// 新物品的起始乘数：中性值夹取到配置边界内
    pub fn neutral_multiplier(&self) -> f64 {
        self.params.clamp(NEUTRAL_MOD_PRICE)
    }

    fn new_entry(&self) -> PriceEntry {
        PriceEntry { mod_price: self.neutral_multiplier(), ..PriceEntry::default() }
    }

    /// 当前乘数；物品不存在时以中性默认值创建
    pub fn current_multiplier(&self, item_id: &str) -> f64 {
        if let Some(entry) = self.entries.read().get(item_id) {
            return entry.mod_price;
        }
        let mut map = self.entries.write();
        map.entry(item_id.to_owned()).or_insert_with(|| self.new_entry()).mod_price
    }

    /// 卖出 `units` 件后的乘数预览，不修改状态
    pub fn projected_after_sale(&self, item_id: &str, units: i64) -> f64 {
        self.projected(item_id, TradeSide::Sale, units)
    }

    /// 买入 `units` 件后的乘数预览，不修改状态
    pub fn projected_after_purchase(&self, item_id: &str, units: i64) -> f64 {
        self.projected(item_id, TradeSide::Purchase, units)
    }

    pub fn projected(&self, item_id: &str, side: TradeSide, units: i64) -> f64 {
        let current = self
            .entries
            .read()
            .get(item_id)
            .map_or_else(|| self.neutral_multiplier(), |entry| entry.mod_price);
        self.params.project(current, side, units)
    }

    /// 单个条目的拷贝，不会创建条目
    pub fn entry(&self, item_id: &str) -> Option<PriceEntry> {
        self.entries.read().get(item_id).cloned()
    }

    /// 全部条目，按物品 ID 排序
    pub fn snapshot(&self) -> Vec<(String, PriceEntry)> {
        let mut items: Vec<_> = self
            .entries
            .read()
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        items
    }

    // =========================================================================
    // 2. 成交上报 (fire-and-forget)
    // =========================================================================

    pub fn apply_sale(&self, batch: &[TradeReport]) {
        self.apply_batch(batch, TradeSide::Sale);
    }

    pub fn apply_purchase(&self, batch: &[TradeReport]) {
        self.apply_batch(batch, TradeSide::Purchase);
    }

    fn apply_batch(&self, batch: &[TradeReport], side: TradeSide) {
        if batch.is_empty() {
            return;
        }
        if !self.is_loaded() {
            debug!("动态市场缓存尚未加载，缺失条目按中性基线处理");
        }

        let aggregated = aggregate_batch(batch);
        if aggregated.is_empty() {
            return;
        }

        let now = self.clock.now();
        let mut updates = Vec::with_capacity(aggregated.len());
        let mut total_units = 0u64;
        let mut map = self.entries.write();
        for (item_id, agg) in aggregated {
            let entry = map.entry(item_id.clone()).or_insert_with(|| self.new_entry());
            let (sold_delta, bought_delta) = entry.apply_trade(&self.params, side, &agg, now);
            total_units = total_units.saturating_add(agg.units);
            updates.push(EntryUpdate {
                item_id,
                base_price: entry.base_price,
                mod_price: entry.mod_price,
                sold_delta,
                bought_delta,
                last_update: now,
            });
        }

        self.metrics.record_batch(side, total_units);
        // 持锁入队：通道顺序即内存变更顺序，写入任务按提交顺序合并
        self.submit(PersistJob::Upsert(updates));
    }

    // =========================================================================
    // 3. 启动加载
    // =========================================================================

    /// 从存储全量加载；已存在的条目被持久化行覆盖
    ///
    /// 失败时只记录一次错误，缓存继续以中性默认值服务，周期清扫保持关闭。
    pub async fn load_from(&self, store: &dyn MarketStore) -> Result<usize, StoreError> {
        let rows = match store.load_all().await {
            Ok(rows) => rows,
            Err(e) => {
                error!("🚨 动态市场缓存加载失败，在有新成交前回退为中性价格: {}", e);
                return Err(e);
            }
        };

        let mut count = 0;
        {
            let mut map = self.entries.write();
            for row in rows {
                if row.item_id.trim().is_empty() {
                    continue;
                }
                let (item_id, entry) = self.hydrate(row);
                map.insert(item_id, entry);
                count += 1;
            }
        }

        self.loaded.store(true, Ordering::Release);
        info!("✅ 动态市场缓存已加载: {} 条", count);
        Ok(count)
    }

    fn hydrate(&self, row: StoredEntry) -> (String, PriceEntry) {
        let last_update = row.last_update.with_timezone(&Utc);
        let entry = PriceEntry {
            mod_price: self.params.clamp(row.mod_price),
            base_price: if row.base_price.is_finite() { row.base_price.max(0.0) } else { 0.0 },
            sold_units: row.sold_units,
            bought_units: row.bought_units,
            last_update: (last_update != DateTime::<Utc>::UNIX_EPOCH).then_some(last_update),
        };
        (row.item_id, entry)
    }

    // =========================================================================
    // 4. 周期清扫
    // =========================================================================

    /// 到达计划时间时执行清扫；未加载完成前从不执行
    pub fn maybe_sweep(&self) -> bool {
        if !self.is_loaded() {
            return false;
        }
        let now = self.clock.now();
        {
            let mut next = self.next_drift_persist.lock();
            if now < *next {
                return false;
            }
            *next = now + self.drift_persist_interval;
        }
        self.sweep_at(now);
        true
    }

    /// 立即清扫 (不改变下一次计划时间)；未加载完成前拒绝执行
    pub fn sweep(&self) -> bool {
        if !self.is_loaded() {
            return false;
        }
        self.sweep_at(self.clock.now());
        true
    }

    pub fn next_sweep_at(&self) -> DateTime<Utc> {
        *self.next_drift_persist.lock()
    }

    fn sweep_at(&self, now: DateTime<Utc>) {
        let advanced = {
            let mut map = self.entries.write();
            map.values_mut()
                .map(|entry| entry.apply_drift(&self.params.drift, now))
                .filter(|outcome| *outcome == DriftOutcome::Advanced)
                .count()
        };
        self.metrics.sweeps.fetch_add(1, Ordering::Relaxed);
        debug!("🌊 周期漂移清扫: {} 条内存条目已推进", advanced);
        self.submit(PersistJob::GlobalDrift { now, params: self.params.drift });
    }

    // =========================================================================
    // 5. 后台写入
    // =========================================================================

    /// 等待积压行写出；写入任务已退出时返回 `false`
    pub async fn flush(&self) -> bool {
        let (ack, done) = oneshot::channel();
        if self.persist_tx.send(PersistJob::Flush(ack)).await.is_err() {
            return false;
        }
        done.await.is_ok()
    }

    /// 通知写入任务写出剩余行并退出
    pub async fn shutdown_worker(&self) -> bool {
        let (ack, done) = oneshot::channel();
        if self.persist_tx.send(PersistJob::Shutdown(ack)).await.is_err() {
            return false;
        }
        done.await.is_ok()
    }

    fn submit(&self, job: PersistJob) {
        match self.persist_tx.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => {
                self.metrics.channel_dropped.fetch_add(1, Ordering::Relaxed);
                warn!("⚠️ 持久化通道拥堵，丢弃 {} 作业", job.kind());
            }
            Err(TrySendError::Closed(job)) => {
                self.metrics.channel_dropped.fetch_add(1, Ordering::Relaxed);
                warn!("⚠️ 持久化任务已停止，丢弃 {} 作业", job.kind());
            }
        }
    }
}
