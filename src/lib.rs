//! 动态市场价格缓存
//!
//! 按物品维护价格乘数：卖出压价、买入抬价，无人交易时随时间漂移回目标值，
//! 变更批量异步写入持久化存储。

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod logic;
pub mod metrics;
pub mod models;
pub mod persistence;
pub mod service;
pub mod storage;

pub use cache::PriceCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::MarketConfig;
pub use error::{ConfigError, MarketError, StoreError};
pub use models::{PriceEntry, StoredEntry, TradeReport, TradeSide};
pub use service::Market;
pub use storage::{FileStore, MarketStore, MemoryStore};
