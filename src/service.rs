//! 启动编排：缓存、后台写入、启动加载、周期清扫

use std::{sync::Arc, time::Duration};

use tokio::{sync::mpsc, task::JoinHandle, time};
use tracing::{info, warn};

use crate::cache::PriceCache;
use crate::clock::Clock;
use crate::config::MarketConfig;
use crate::metrics::MarketMetrics;
use crate::persistence::{WorkerSettings, run_persistence_worker};
use crate::storage::MarketStore;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Market {
    cache: Arc<PriceCache>,
    metrics: Arc<MarketMetrics>,
    loader: Option<JoinHandle<()>>,
    worker: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

impl Market {
    /// 必须在 tokio 运行时内调用。缓存立即可用，加载在后台完成。
    pub fn start(config: &MarketConfig, store: Arc<dyn MarketStore>, clock: Arc<dyn Clock>) -> Self {
        let metrics = Arc::new(MarketMetrics::new(clock.now().timestamp()));
        let (tx, rx) = mpsc::channel(config.channel_capacity);

        let cache = Arc::new(PriceCache::new(
            config.pricing_params(),
            config.drift_persist_interval(),
            clock,
            tx,
            metrics.clone(),
        ));

        let settings = WorkerSettings {
            batch_rows: config.persist_batch_rows,
            flush_every: config.persist_flush(),
        };
        let worker = tokio::spawn(run_persistence_worker(rx, store.clone(), metrics.clone(), settings));

        let loader = {
            let cache = cache.clone();
            tokio::spawn(async move {
                // 失败已在 load_from 内记录
                let _ = cache.load_from(store.as_ref()).await;
            })
        };

        let sweeper = tokio::spawn(sweep_task(cache.clone(), config.sweep_poll()));

        info!(
            "🚀 动态市场已启动 (清扫间隔 {}s, 批量 {} 行)",
            config.drift_persist_interval_secs, config.persist_batch_rows
        );

        Self { cache, metrics, loader: Some(loader), worker, sweeper }
    }

    pub fn cache(&self) -> &Arc<PriceCache> {
        &self.cache
    }

    pub fn metrics(&self) -> &Arc<MarketMetrics> {
        &self.metrics
    }

    /// 等待启动加载结束；返回是否加载成功
    pub async fn ready(&mut self) -> bool {
        if let Some(loader) = self.loader.take() {
            let _ = loader.await;
        }
        self.cache.is_loaded()
    }

    /// 停止清扫，写出积压行后关闭写入任务
    pub async fn shutdown(self) {
        info!("💾 执行最终同步...");
        self.sweeper.abort();
        if let Some(loader) = self.loader {
            loader.abort();
        }

        match time::timeout(SHUTDOWN_TIMEOUT, self.cache.shutdown_worker()).await {
            Ok(true) => {}
            Ok(false) => warn!("⚠️ 写入任务已提前退出"),
            Err(_) => warn!("⏰ 刷盘任务超时，部分价格变更可能丢失。"),
        }
        if time::timeout(SHUTDOWN_TIMEOUT, self.worker).await.is_err() {
            warn!("⏰ 写入任务未能按时退出");
        }
    }
}

async fn sweep_task(cache: Arc<PriceCache>, poll: Duration) {
    let mut ticker = time::interval(poll);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        cache.maybe_sweep();
    }
}
