use serde::{Deserialize, Serialize};
use chrono::{DateTime, FixedOffset, Utc};

// =========================================================================
// 1. 宏定义 (Macros)
// =========================================================================

macro_rules! web_model {
    ($($item:tt)*) => {
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        $($item)*
    };
}

/// 中性乘数：新物品的默认价格系数
pub const NEUTRAL_MOD_PRICE: f64 = 1.0;

// =========================================================================
// 2. 核心模型 (Models)
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    /// 玩家向市场卖出，压低乘数
    Sale,
    /// 玩家从市场买入，抬高乘数
    Purchase,
}

impl TradeSide {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeSide::Sale => "sale",
            TradeSide::Purchase => "purchase",
        }
    }
}

web_model! {
    /// 单个物品在内存中的动态价格状态
    ///
    /// `last_update` 为 `None` 表示从未计算过漂移 (新建条目)。
    pub struct PriceEntry {
        pub mod_price: f64,
        pub base_price: f64,
        pub sold_units: u64,
        pub bought_units: u64,
        pub last_update: Option<DateTime<Utc>>,
    }
}

impl Default for PriceEntry {
    fn default() -> Self {
        Self {
            mod_price: NEUTRAL_MOD_PRICE,
            base_price: 0.0,
            sold_units: 0,
            bought_units: 0,
            last_update: None,
        }
    }
}

web_model! {
    /// 调用方上报的一条成交记录
    pub struct TradeReport {
        pub item_id: String,
        pub units: i64,
        #[serde(default)]
        pub unit_base_price: f64,
    }
}

impl TradeReport {
    pub fn new(item_id: impl Into<String>, units: i64, unit_base_price: f64) -> Self {
        Self { item_id: item_id.into(), units, unit_base_price }
    }
}

web_model! {
    /// 推送给存储层的一行 upsert
    ///
    /// 乘数、基准价、时间戳为完整状态；成交量为本批次增量。
    pub struct EntryUpdate {
        pub item_id: String,
        pub base_price: f64,
        pub mod_price: f64,
        pub sold_delta: u64,
        pub bought_delta: u64,
        pub last_update: DateTime<Utc>,
    }
}

impl EntryUpdate {
    /// 合并同一物品后提交的一行：增量累加，状态取后提交者
    ///
    /// 以提交顺序为准，不比较时间戳；时钟回拨后的成交同样覆盖先前状态。
    pub fn absorb(&mut self, later: EntryUpdate) {
        self.sold_delta = self.sold_delta.saturating_add(later.sold_delta);
        self.bought_delta = self.bought_delta.saturating_add(later.bought_delta);
        self.base_price = later.base_price;
        self.mod_price = later.mod_price;
        self.last_update = later.last_update;
    }
}

web_model! {
    /// 存储层持有的持久化行
    ///
    /// 时间戳可能带任意时区偏移，加载时统一归一化为 UTC。
    pub struct StoredEntry {
        pub item_id: String,
        pub mod_price: f64,
        pub base_price: f64,
        pub sold_units: u64,
        pub bought_units: u64,
        pub last_update: DateTime<FixedOffset>,
    }
}

impl StoredEntry {
    pub fn from_update(update: &EntryUpdate) -> Self {
        Self {
            item_id: update.item_id.clone(),
            mod_price: update.mod_price,
            base_price: update.base_price,
            sold_units: update.sold_delta,
            bought_units: update.bought_delta,
            last_update: update.last_update.fixed_offset(),
        }
    }
}

// =========================================================================
// 3. Web 模型
// =========================================================================

web_model! {
    pub struct TradeBatchRequest {
        #[serde(default)]
        pub reports: Vec<TradeReport>,
    }
}

web_model! {
    pub struct MultiplierResponse {
        pub item_id: String,
        pub multiplier: f64,
    }
}

web_model! {
    pub struct ProjectionQuery {
        pub side: TradeSide,
        pub units: i64,
    }
}

web_model! {
    pub struct ProjectionResponse {
        pub item_id: String,
        pub side: TradeSide,
        pub units: i64,
        pub current: f64,
        pub projected: f64,
    }
}

web_model! {
    pub struct MarketItemView {
        pub item_id: String,
        #[serde(flatten)]
        pub entry: PriceEntry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn update(mod_price: f64, sold: u64, bought: u64, secs: i64) -> EntryUpdate {
        EntryUpdate {
            item_id: "ore".into(),
            base_price: mod_price * 10.0,
            mod_price,
            sold_delta: sold,
            bought_delta: bought,
            last_update: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn absorb_sums_deltas_and_keeps_latest_state() {
        let mut row = update(0.9, 10, 0, 100);
        row.absorb(update(0.8, 5, 3, 200));
        assert_eq!(row.sold_delta, 15);
        assert_eq!(row.bought_delta, 3);
        assert_eq!(row.mod_price, 0.8);
        assert_eq!(row.last_update.timestamp(), 200);
    }

    #[test]
    fn absorb_follows_submission_order_after_clock_rewind() {
        let mut row = update(0.8, 1, 0, 200);
        row.absorb(update(0.9, 1, 0, 100));
        assert_eq!(row.sold_delta, 2);
        assert_eq!(row.mod_price, 0.9);
        assert_eq!(row.last_update.timestamp(), 100);
    }

    #[test]
    fn report_deserializes_camel_case() {
        let req: TradeBatchRequest = serde_json::from_str(
            r#"{"reports":[{"itemId":"ore","units":3,"unitBasePrice":2.5}]}"#,
        )
        .unwrap();
        assert_eq!(req.reports, vec![TradeReport::new("ore", 3, 2.5)]);
    }
}
